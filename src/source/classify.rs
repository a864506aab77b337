use super::SourceKind;

/// Strategy deciding whether a source URL points at an archive or at a
/// version-control repository.
pub trait SourceClassifier: Send + Sync {
    fn classify(&self, url: &str) -> SourceKind;
}

/// Classifies by the URL's final path segment: a `.git` suffix means a
/// repository to clone, anything else an archive to download.
///
/// This never probes the server, so an archive served from a `.git`-suffixed
/// URL is misclassified.
#[derive(Debug, Clone)]
pub struct SuffixClassifier {
    suffix: String,
}

impl Default for SuffixClassifier {
    fn default() -> Self {
        Self::new(".git")
    }
}

impl SuffixClassifier {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

impl SourceClassifier for SuffixClassifier {
    fn classify(&self, url: &str) -> SourceKind {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let last_segment = path.trim_end_matches('/').rsplit(['/', ':']).next().unwrap_or(path);
        if last_segment.len() > self.suffix.len()
            && last_segment
                .to_ascii_lowercase()
                .ends_with(&self.suffix.to_ascii_lowercase())
        {
            SourceKind::VersionControl
        } else {
            SourceKind::Archive
        }
    }
}
