//! Frame discovery.
//!
//! Frames are found recursively under a root directory and returned sorted
//! lexicographically on the full path, which is the only ordering the
//! pipeline guarantees.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{LprError, LprResult};

pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

/// Collect every image file below `root` whose extension is in `extensions`
/// (case insensitive).
pub fn discover_frames(root: impl AsRef<Path>, extensions: &[String]) -> LprResult<Vec<PathBuf>> {
    let root = root.as_ref();
    // an unreadable root is fatal, unreadable entries below it are not
    fs::read_dir(root).map_err(|source| LprError::Directory {
        path: root.to_path_buf(),
        source,
    })?;

    let mut frames: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_image_extension(path, extensions))
        .collect();
    frames.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
    debug!("found {} frames in {}", frames.len(), root.display());
    Ok(frames)
}

fn has_image_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// The second `_` separated field of the file stem, `cam_1699999_x.jpg` gives `1699999`.
pub fn frame_id(path: impl AsRef<Path>) -> LprResult<String> {
    let path = path.as_ref();
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.split('_').nth(1))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| LprError::MalformedFilename(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fs::File;

    fn default_extensions() -> Vec<String> {
        IMAGE_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
    }

    #[test]
    fn sorted_by_full_path_not_timestamp() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        for name in &["b_100.bmp", "a_100.png", "a_050.jpg", "notes.txt"] {
            File::create(dir.path().join(name))?;
        }
        let frames = discover_frames(dir.path(), &default_extensions())?;
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a_050.jpg", "a_100.png", "b_100.bmp"]);
        Ok(())
    }

    #[test]
    fn searches_recursively_and_ignores_case() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("day1/cam"))?;
        File::create(dir.path().join("day1/cam/x_1.JPG"))?;
        File::create(dir.path().join("z_2.webp"))?;
        let frames = discover_frames(dir.path(), &default_extensions())?;
        assert_eq!(frames.len(), 2);
        assert!(frames[0].ends_with("day1/cam/x_1.JPG"));
        Ok(())
    }

    #[test]
    fn missing_root_is_fatal() {
        let err = discover_frames("/definitely/not/here", &default_extensions()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn frame_id_takes_second_field() {
        assert_eq!(frame_id("/data/cam_1700000000_03.png").unwrap(), "1700000000");
        assert_eq!(frame_id("crop_0915.png").unwrap(), "0915");
    }

    #[test]
    fn frame_id_needs_two_fields() {
        assert!(matches!(frame_id("frame.png"), Err(LprError::MalformedFilename(_))));
        assert!(matches!(frame_id("frame_.png"), Err(LprError::MalformedFilename(_))));
    }
}
