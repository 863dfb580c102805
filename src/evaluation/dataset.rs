use crate::error::{SegError, SegResult};
use crate::segmentation::preprocess::to_grayscale;
use crate::segmentation::FrameId;
use image::GrayImage;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Masks addressed by frame id
pub type MaskSet = BTreeMap<FrameId, GrayImage>;

/// A file that was skipped while loading a mask set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of loading a directory: the usable masks and what was skipped
#[derive(Debug, Default)]
pub struct LoadedMasks {
    pub masks: MaskSet,
    pub failures: Vec<LoadFailure>,
}

/// Load every `.png` mask of a directory as grayscale, keyed by frame id
///
/// A file that does not decode, carries no frame number, or repeats an
/// already loaded id is skipped and recorded; the rest of the directory is
/// still loaded. A missing or unreadable directory is an error.
pub fn load_mask_set<P: AsRef<Path>>(dir: P) -> SegResult<LoadedMasks> {
    let dir = dir.as_ref();
    let _span = tracing::debug_span!("load_mask_set", dir = %dir.display()).entered();

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));
        if path.is_file() && is_png {
            paths.push(path);
        }
    }
    paths.sort();

    let mut loaded = LoadedMasks::default();
    for path in paths {
        let Some(id) = FrameId::from_path(&path) else {
            skip(&mut loaded, path, "file name carries no frame number".to_string());
            continue;
        };
        if loaded.masks.contains_key(&id) {
            skip(&mut loaded, path, format!("duplicate frame {id}"));
            continue;
        }
        match load_mask(&path) {
            Ok(mask) => {
                loaded.masks.insert(id, mask);
            }
            Err(err) => skip(&mut loaded, path, err.to_string()),
        }
    }

    tracing::info!(
        "Loaded {} masks from {} ({} skipped)",
        loaded.masks.len(),
        dir.display(),
        loaded.failures.len()
    );
    Ok(loaded)
}

/// Decode one mask image as 8-bit grayscale
pub fn load_mask(path: &Path) -> SegResult<GrayImage> {
    let image = image::open(path).map_err(|source| SegError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(to_grayscale(&image))
}

fn skip(loaded: &mut LoadedMasks, path: PathBuf, reason: String) {
    tracing::warn!("Skipping {}: {}", path.display(), reason);
    loaded.failures.push(LoadFailure { path, reason });
}
