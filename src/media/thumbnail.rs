use crate::error::Result;
use crate::state::data::Partition;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name of the image thumbnail cache
pub const IMAGE_THUMBS: &str = "local-image-thumbs";
/// Directory name of the video thumbnail cache
pub const VIDEO_THUMBS: &str = "local-video-thumbs";

/// Get the default cache root
/// Returns ~/.cache/media-feed on Linux
pub fn default_cache_root() -> Option<PathBuf> {
    let mut path = dirs::cache_dir().or_else(dirs::home_dir)?;
    path.push("media-feed");
    Some(path)
}

/// Thumbnail bytes on disk, keyed by store row id.
///
/// Producing the thumbnails is somebody else's job; this only stores,
/// returns and drops them.
#[derive(Debug, Clone)]
pub struct DiskCache {
    name: String,
    dir: PathBuf,
}

impl DiskCache {
    /// Open the cache `name` under `root`, creating its directory if needed
    pub fn open(root: &Path, name: &str) -> Result<Self> {
        let dir = root.join(name);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            name: name.to_string(),
            dir,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the thumbnail path for an item id (doesn't check it exists)
    pub fn path_for(&self, item_id: i64) -> PathBuf {
        self.dir.join(format!("{}.thumb", item_id))
    }

    pub fn contains(&self, item_id: i64) -> bool {
        self.path_for(item_id).exists()
    }

    pub fn put(&self, item_id: i64, data: &[u8]) -> Result<PathBuf> {
        let path = self.path_for(item_id);
        fs::write(&path, data)?;
        Ok(path)
    }

    pub fn get(&self, item_id: i64) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(item_id)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop one entry, returns whether anything was there
    pub fn remove(&self, item_id: i64) -> Result<bool> {
        match fs::remove_file(self.path_for(item_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop every entry, returns how many files were removed
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "thumb") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        debug!("🧹 Cleared {} thumbnails from {}", removed, self.name);
        Ok(removed)
    }
}

/// The two thumbnail caches, one per media kind.
///
/// Created once at startup and handed to whoever needs them.
#[derive(Debug, Clone)]
pub struct ThumbnailCaches {
    pub image: DiskCache,
    pub video: DiskCache,
}

impl ThumbnailCaches {
    pub fn open(root: &Path) -> Result<Self> {
        Ok(Self {
            image: DiskCache::open(root, IMAGE_THUMBS)?,
            video: DiskCache::open(root, VIDEO_THUMBS)?,
        })
    }

    pub fn for_partition(&self, partition: Partition) -> &DiskCache {
        match partition {
            Partition::Images => &self.image,
            Partition::Videos => &self.video,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let root = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(root.path(), IMAGE_THUMBS).unwrap();
        assert_eq!(cache.get(1).unwrap(), None);

        let path = cache.put(1, b"thumb").unwrap();
        assert!(path.starts_with(root.path().join(IMAGE_THUMBS)));
        assert!(cache.contains(1));
        assert_eq!(cache.get(1).unwrap().as_deref(), Some(&b"thumb"[..]));

        assert!(cache.remove(1).unwrap());
        assert!(!cache.remove(1).unwrap());
    }

    #[test]
    fn test_clear_only_touches_thumbnails() {
        let root = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(root.path(), VIDEO_THUMBS).unwrap();
        cache.put(1, b"a").unwrap();
        cache.put(2, b"b").unwrap();
        fs::write(cache.dir().join("keep.txt"), b"x").unwrap();

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.dir().join("keep.txt").exists());
    }

    #[test]
    fn test_caches_are_split_by_partition() {
        let root = tempfile::tempdir().unwrap();
        let caches = ThumbnailCaches::open(root.path()).unwrap();
        caches.for_partition(Partition::Videos).put(7, b"v").unwrap();
        assert!(caches.video.contains(7));
        assert!(!caches.image.contains(7));
        assert_eq!(caches.image.name(), IMAGE_THUMBS);
    }
}
