use std::path::{Component, Path};

/// Incrementally computes the path prefix (in whole segments) shared by every
/// archive entry.
///
/// The candidate starts as the first entry's top-level segment and only ever
/// shrinks, so the result is either that segment or empty.
#[derive(Debug, Default)]
pub struct CommonRoot {
    candidate: Option<Vec<String>>,
}

impl CommonRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, entry: &Path) {
        let segments: Vec<String> = entry
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        match &mut self.candidate {
            None => {
                self.candidate = Some(segments.into_iter().take(1).collect());
            }
            Some(candidate) => {
                let shared = candidate
                    .iter()
                    .zip(segments.iter())
                    .take_while(|(a, b)| a == b)
                    .count();
                candidate.truncate(shared);
            }
        }
    }

    /// The shared root, or an empty string when entries share no top segment
    /// or no entry was observed.
    pub fn finish(self) -> String {
        self.candidate.map(|c| c.join("/")).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_of(entries: &[&str]) -> String {
        let mut root = CommonRoot::new();
        for e in entries {
            root.observe(Path::new(e));
        }
        root.finish()
    }

    #[test]
    fn test_single_root_bundle() {
        assert_eq!(
            root_of(&["foo/", "foo/a.php", "foo/assets/app.js", "foo/readme.txt"]),
            "foo"
        );
    }

    #[test]
    fn test_no_shared_top_segment() {
        assert_eq!(root_of(&["a/x", "b/y"]), "");
    }

    #[test]
    fn test_divergence_is_permanent() {
        assert_eq!(root_of(&["a/x", "b/y", "a/z"]), "");
    }

    #[test]
    fn test_empty_archive() {
        assert_eq!(root_of(&[]), "");
    }

    #[test]
    fn test_leading_dot_segment_ignored() {
        assert_eq!(root_of(&["./pkg/a", "./pkg/b"]), "pkg");
    }

    #[test]
    fn test_root_is_at_most_one_segment() {
        assert_eq!(root_of(&["pkg/src/a.rs", "pkg/src/b.rs"]), "pkg");
    }

    #[test]
    fn test_single_top_level_file() {
        assert_eq!(root_of(&["readme.txt"]), "readme.txt");
    }
}
