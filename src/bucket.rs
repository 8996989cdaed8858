/// Bucket identity
///
/// A bucket is the folder a media file lives in. The store assigns every row
/// a bucket id computed from the lowercased folder path, and the feed must
/// compute the exact same value or well-known buckets silently stop matching.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Folder (relative to the storage root) holding camera captures
pub const CAMERA_DIR: &str = "DCIM/Camera";
/// Folder (relative to the storage root) holding downloads
pub const DOWNLOAD_DIR: &str = "download";

/// Display name given to the camera bucket
pub const CAMERA_NAME: &str = "Camera";
/// Display name given to the download bucket
pub const DOWNLOAD_NAME: &str = "download";

/// Identity of a group of media sharing a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(pub i32);

impl BucketId {
    /// Sentinel for "no bucket"
    pub const INVALID: BucketId = BucketId(-1);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compute the bucket id of a folder path.
///
/// Lowercases the path and applies the 31-multiplier string hash over UTF-16
/// code units with wrapping 32-bit arithmetic, the same function the store
/// uses when it assigns bucket ids to rows.
pub fn bucket_id(path: &str) -> BucketId {
    let hash = path
        .to_lowercase()
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32));
    BucketId(hash)
}

/// Bucket id of the folder containing `file`
pub fn bucket_id_for_file(file: &Path) -> BucketId {
    match file.parent() {
        Some(parent) => bucket_id(&parent.to_string_lossy()),
        None => BucketId::INVALID,
    }
}

/// Bucket ids of the conventional camera and download folders.
///
/// Computed once at startup from the storage root and handed to whoever
/// needs to compare against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WellKnownBuckets {
    pub camera: BucketId,
    pub download: BucketId,
}

impl WellKnownBuckets {
    pub fn from_root(storage_root: &Path) -> Self {
        let root = storage_root.to_string_lossy();
        let root = root.trim_end_matches('/');
        Self {
            camera: bucket_id(&format!("{}/{}", root, CAMERA_DIR)),
            download: bucket_id(&format!("{}/{}", root, DOWNLOAD_DIR)),
        }
    }

    /// Canonical display name for a well-known bucket
    pub fn canonical_name(&self, id: BucketId) -> Option<&'static str> {
        if id == self.camera {
            Some(CAMERA_NAME)
        } else if id == self.download {
            Some(DOWNLOAD_NAME)
        } else {
            None
        }
    }
}
