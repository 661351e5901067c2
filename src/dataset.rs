use std::path::Path;

use crate::features::FeatureExtractor;
use crate::{Desc, Result};

/// Read every image under `root`, one folder per class, and reduce each to
/// its descriptor set.
///
/// `classes` maps folder names to labels (`true` = positive class), so the
/// caller decides the dataset layout. A missing folder, an undecodable file
/// and an image with zero detected descriptors are all skipped with a
/// warning; only directory-level I/O is fatal.
///
/// Entries are visited in path order, which keeps the pooled descriptor
/// ordering (and everything seeded downstream) stable across runs.
pub fn load_dataset(
    root: &Path,
    classes: &[(String, bool)],
    extractor: &FeatureExtractor,
) -> Result<Vec<(Vec<Desc>, bool)>> {
    let mut images = Vec::new();

    for (folder, positive) in classes {
        let dir = root.join(folder);
        if !dir.is_dir() {
            log::warn!("class folder {} is missing, skipping", dir.display());
            continue;
        }

        let mut entries: Vec<_> = dir.read_dir()?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|entry| entry.path());

        let before = images.len();
        for entry in entries {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("skipping unreadable {}: {}", path.display(), e);
                    continue;
                }
            };
            let descriptors = extractor.extract(&bytes);
            if descriptors.is_empty() {
                log::warn!("no descriptors in {}, skipping", path.display());
                continue;
            }
            images.push((descriptors, *positive));
        }
        log::info!(
            "{}: {} usable images (label {})",
            dir.display(),
            images.len() - before,
            *positive as u8
        );
    }

    Ok(images)
}
