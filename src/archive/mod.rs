mod root;
mod tar_gz;
mod zip;

use crate::runtime::Runtime;
use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

pub use root::CommonRoot;
pub use tar_gz::TarGzExtractor;
pub use zip::ZipExtractor;

/// What an extraction produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Top-level directory shared by every entry; empty if there is none.
    pub common_root: String,
}

impl ExtractionResult {
    /// Location of the common root inside the extraction directory, if any.
    pub fn root_in(&self, extract_to: &Path) -> Option<PathBuf> {
        if self.common_root.is_empty() {
            None
        } else {
            Some(extract_to.join(&self.common_root))
        }
    }
}

/// Trait for format-specific archive extractors
pub trait ArchiveExtractor: Send + Sync {
    /// Check if this extractor can handle the given archive format
    fn can_handle(&self, archive_path: &Path) -> bool;

    /// Unpack every entry below `extract_to`, preserving relative paths, and
    /// report the entries' common root.
    fn extract<R: Runtime + ?Sized>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<ExtractionResult>;
}

/// Dispatcher that selects the appropriate extractor based on archive format.
pub struct ArchiveExtractorImpl {
    tar_gz: TarGzExtractor,
    zip: ZipExtractor,
}

impl Default for ArchiveExtractorImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveExtractorImpl {
    pub fn new() -> Self {
        Self {
            tar_gz: TarGzExtractor,
            zip: ZipExtractor,
        }
    }
}

impl ArchiveExtractor for ArchiveExtractorImpl {
    fn can_handle(&self, archive_path: &Path) -> bool {
        self.tar_gz.can_handle(archive_path) || self.zip.can_handle(archive_path)
    }

    #[tracing::instrument(skip(self, runtime))]
    fn extract<R: Runtime + ?Sized>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<ExtractionResult> {
        if self.tar_gz.can_handle(archive_path) {
            return self.tar_gz.extract(runtime, archive_path, extract_to);
        }
        if self.zip.can_handle(archive_path) {
            return self.zip.extract(runtime, archive_path, extract_to);
        }
        Err(anyhow!(
            "Unsupported archive format: {}",
            archive_path.display()
        ))
    }
}

/// Relative path of an entry if it is safe to unpack (no absolute paths, no
/// `..`), otherwise `None`.
pub(crate) fn sanitize_entry_path(path: &Path) -> Option<PathBuf> {
    use std::path::Component;

    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use anyhow::Result;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs::{self, File};
    use tar::Builder;
    use tempfile::tempdir;

    fn create_test_tar_gz(path: &Path, files: &[(&str, &str)]) -> Result<()> {
        let file = File::create(path)?;
        let enc = GzEncoder::new(file, Compression::default());
        let mut tar = Builder::new(enc);

        for (f, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_path(f)?;
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            tar.append(&header, content.as_bytes())?;
        }

        tar.into_inner()?.finish()?;
        Ok(())
    }

    fn create_test_zip(path: &Path, files: &[(&str, &str)]) -> Result<()> {
        use ::zip::CompressionMethod;
        use ::zip::ZipWriter;
        use ::zip::write::FileOptions;
        use std::io::Write;

        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options: FileOptions<()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, content) in files {
            zip.start_file(*name, options)?;
            zip.write_all(content.as_bytes())?;
        }

        zip.finish()?;
        Ok(())
    }

    #[test]
    fn test_extractor_impl_can_handle() {
        let extractor = ArchiveExtractorImpl::new();
        assert!(extractor.can_handle(Path::new("file.tar.gz")));
        assert!(extractor.can_handle(Path::new("file.tgz")));
        assert!(extractor.can_handle(Path::new("file.zip")));
        assert!(!extractor.can_handle(Path::new("file.unknown")));
    }

    #[test]
    fn test_extractor_impl_dispatches_to_tar_gz() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("test.tar.gz");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path)?;

        create_test_tar_gz(&archive_path, &[("test_dir/file1.txt", "test content")])?;

        let result = ArchiveExtractorImpl::new().extract(&RealRuntime, &archive_path, &extract_path)?;

        assert_eq!(result.common_root, "test_dir");
        assert_eq!(
            fs::read_to_string(extract_path.join("test_dir/file1.txt"))?,
            "test content"
        );
        Ok(())
    }

    #[test]
    fn test_extractor_impl_dispatches_to_zip() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("test.zip");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path)?;

        create_test_zip(&archive_path, &[("test_dir/file1.txt", "test content from zip")])?;

        let result = ArchiveExtractorImpl::new().extract(&RealRuntime, &archive_path, &extract_path)?;

        assert_eq!(result.common_root, "test_dir");
        assert_eq!(
            result.root_in(&extract_path),
            Some(extract_path.join("test_dir"))
        );
        assert_eq!(
            fs::read_to_string(extract_path.join("test_dir/file1.txt"))?,
            "test content from zip"
        );
        Ok(())
    }

    #[test]
    fn test_extractor_impl_unsupported_format() {
        let extractor = ArchiveExtractorImpl::new();
        let result = extractor.extract(
            &RealRuntime,
            Path::new("/tmp/file.unknown"),
            Path::new("/tmp/out"),
        );
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Unsupported archive format")
        );
    }

    #[test]
    fn test_empty_root_has_no_location() {
        let result = ExtractionResult {
            common_root: String::new(),
        };
        assert_eq!(result.root_in(Path::new("/tmp/x")), None);
    }

    #[test]
    fn test_sanitize_entry_path() {
        assert_eq!(
            sanitize_entry_path(Path::new("./a/b.txt")),
            Some(PathBuf::from("a/b.txt"))
        );
        assert_eq!(sanitize_entry_path(Path::new("../evil")), None);
        assert_eq!(sanitize_entry_path(Path::new("/etc/passwd")), None);
        assert_eq!(sanitize_entry_path(Path::new(".")), None);
    }
}
