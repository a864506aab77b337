use crate::runtime::Runtime;
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::{debug, info, warn};
use std::path::Path;
use tar::{Archive, EntryType};

use super::{ArchiveExtractor, CommonRoot, ExtractionResult, sanitize_entry_path};

/// Extractor for gzip-compressed tarballs (.tar.gz, .tgz)
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn can_handle(&self, archive_path: &Path) -> bool {
        let name = archive_path.to_string_lossy().to_lowercase();
        name.ends_with(".tar.gz") || name.ends_with(".tgz")
    }

    fn extract<R: Runtime + ?Sized>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<ExtractionResult> {
        debug!("Extracting tarball {:?} to {:?}...", archive_path, extract_to);
        let file = runtime
            .open(archive_path)
            .with_context(|| format!("Failed to open archive at {:?}", archive_path))?;

        let mut archive = Archive::new(GzDecoder::new(file));
        let mut root = CommonRoot::new();

        for entry in archive.entries().context("Failed to read tar entries")? {
            let mut entry = entry.context("Failed to read tar entry")?;
            let entry_type = entry.header().entry_type();

            if matches!(entry_type, EntryType::Symlink | EntryType::Link) {
                let path = entry.path().map(|p| p.into_owned()).unwrap_or_default();
                let target = entry
                    .link_name()
                    .ok()
                    .flatten()
                    .map(|t| t.into_owned())
                    .unwrap_or_default();
                warn!(
                    "Not extracting link {:?} -> {:?} from {:?}; the package may be incomplete",
                    path, target, archive_path
                );
                continue;
            }

            // pax global headers and similar metadata are not package content
            if !matches!(
                entry_type,
                EntryType::Regular | EntryType::Directory | EntryType::Continuous
            ) {
                debug!("Skipping tar entry of type {:?}", entry_type);
                continue;
            }

            let raw_path = entry.path().context("Invalid path in tar entry")?.into_owned();
            let entry_path = match sanitize_entry_path(&raw_path) {
                Some(path) => path,
                None => {
                    debug!("Skipping entry with invalid path: {:?}", raw_path);
                    continue;
                }
            };
            root.observe(&entry_path);

            let full_path = extract_to.join(&entry_path);

            if entry_type == EntryType::Directory {
                runtime.create_dir_all(&full_path)?;
                continue;
            }

            if let Some(parent) = full_path.parent() {
                runtime.create_dir_all(parent)?;
            }
            let mut dest_file = runtime.create_file(&full_path)?;
            std::io::copy(&mut entry, &mut dest_file)
                .with_context(|| format!("Failed to extract file {:?}", full_path))?;
            drop(dest_file);

            #[cfg(unix)]
            if let Ok(mode) = entry.header().mode()
                && let Err(e) = runtime.set_permissions(&full_path, mode)
            {
                debug!("Failed to set permissions on {:?}: {}", full_path, e);
            }
        }

        let result = ExtractionResult {
            common_root: root.finish(),
        };
        info!(
            "Extraction complete (common root: {:?}).",
            result.common_root
        );
        Ok(result)
    }
}
