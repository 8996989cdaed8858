/// Shared data structures for the media feed
///
/// These structs represent the data model that flows between
/// the media store, the derived cache and the in-memory feed.
use crate::bucket::BucketId;
use crate::error::{MediaError, Result};
use crate::media::orientation::normalize_degrees;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Longest title kept when a title is generated with truncation
pub const MAX_TITLE_CHARS: usize = 32;

/// The two partitions of the media store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partition {
    Images,
    Videos,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Images, Partition::Videos];

    /// Table holding the rows of this partition
    pub fn table(self) -> &'static str {
        match self {
            Partition::Images => "images",
            Partition::Videos => "videos",
        }
    }

    /// Path segment used in content locators
    pub fn segment(self) -> &'static str {
        match self {
            Partition::Images => "images",
            Partition::Videos => "video",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "images" => Some(Partition::Images),
            "video" => Some(Partition::Videos),
            _ => None,
        }
    }

    /// Partitions selected by a mime filter
    pub fn selected(include_images: bool, include_videos: bool) -> Vec<Partition> {
        let mut partitions = Vec::with_capacity(2);
        if include_images {
            partitions.push(Partition::Images);
        }
        if include_videos {
            partitions.push(Partition::Videos);
        }
        partitions
    }
}

/// One row of the media store
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRow {
    pub id: i64,
    pub partition: Partition,
    pub bucket_id: BucketId,
    /// Folder name the row lives in (e.g., "Camera")
    pub bucket_display_name: String,
    /// Full path to the media file
    pub path: String,
    /// Filename only (e.g., "IMG_0001.jpg")
    pub display_name: String,
    pub mime_type: String,
    /// Orientation in whole degrees
    pub orientation: i32,
    /// Unix timestamp (seconds)
    pub date_added: i64,
}

/// Where an item can be found.
///
/// Store rows are addressed as `content://media/<partition>/<id>`,
/// loose files as `file:///absolute/path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentLocator {
    Content { partition: Partition, id: i64 },
    File(PathBuf),
}

impl ContentLocator {
    pub fn parse(locator: &str) -> Result<Self> {
        let url = Url::parse(locator)
            .map_err(|e| MediaError::invalid_locator(locator, e.to_string()))?;

        match url.scheme() {
            "content" => {
                if url.host_str() != Some("media") {
                    return Err(MediaError::invalid_locator(locator, "unknown authority"));
                }
                let mut segments = url
                    .path_segments()
                    .ok_or_else(|| MediaError::invalid_locator(locator, "missing path"))?;
                let partition = segments
                    .next()
                    .and_then(Partition::from_segment)
                    .ok_or_else(|| MediaError::invalid_locator(locator, "unknown partition"))?;
                let id = segments
                    .next()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| MediaError::invalid_locator(locator, "missing row id"))?;
                Ok(ContentLocator::Content { partition, id })
            }
            "file" => url
                .to_file_path()
                .map(ContentLocator::File)
                .map_err(|_| MediaError::invalid_locator(locator, "not an absolute file path")),
            other => Err(MediaError::invalid_locator(
                locator,
                format!("unsupported scheme {}", other),
            )),
        }
    }

    pub fn for_row(partition: Partition, id: i64) -> Self {
        ContentLocator::Content { partition, id }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, ContentLocator::File(_))
    }
}

impl fmt::Display for ContentLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentLocator::Content { partition, id } => {
                write!(f, "content://media/{}/{}", partition.segment(), id)
            }
            ContentLocator::File(path) => match Url::from_file_path(path) {
                Ok(url) => write!(f, "{}", url),
                Err(()) => write!(f, "file://{}", path.display()),
            },
        }
    }
}

/// Represents a single image or video in the feed
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    /// Row id in the store
    pub id: i64,
    pub partition: Partition,
    /// Content locator (URI string)
    pub content_uri: String,
    /// Rotation in degrees, always in [0, 360)
    pub rotation: f32,
    pub display_name: String,
    pub mime_type: String,
    pub file_path: String,
    pub date_added: i64,
    /// Owning set. Navigation only, the set owns the item and not the other way around.
    pub parent_set: BucketId,
}

impl MediaItem {
    pub fn from_row(row: &MediaRow) -> Self {
        Self {
            id: row.id,
            partition: row.partition,
            content_uri: ContentLocator::for_row(row.partition, row.id).to_string(),
            rotation: normalize_degrees(row.orientation as f32),
            display_name: row.display_name.clone(),
            mime_type: row.mime_type.clone(),
            file_path: row.path.clone(),
            date_added: row.date_added,
            parent_set: row.bucket_id,
        }
    }

    pub fn locator(&self) -> Result<ContentLocator> {
        ContentLocator::parse(&self.content_uri)
    }
}

/// Where a set's content comes from
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SetSource {
    #[default]
    Local,
    /// Backed by a remote album, never reconciled against the local store
    Remote { album_id: i64 },
}

/// A bucket of media items as shown in the feed
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSet {
    pub id: BucketId,
    pub name: String,
    pub title: String,
    pub subtitle: String,
    pub num_items_loaded: usize,
    pub num_expected_items: usize,
    /// Set once `generate_title` has run against the current name
    pub title_generated: bool,
    pub source: SetSource,
    items: Vec<MediaItem>,
}

impl MediaSet {
    /// Create an empty shell set
    pub fn new(id: BucketId, source: SetSource) -> Self {
        Self {
            id,
            name: String::new(),
            title: String::new(),
            subtitle: String::new(),
            num_items_loaded: 0,
            num_expected_items: 0,
            title_generated: false,
            source,
            items: Vec::new(),
        }
    }

    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn item_mut(&mut self, item_id: i64) -> Option<&mut MediaItem> {
        self.items.iter_mut().find(|item| item.id == item_id)
    }

    pub fn is_shell(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_local(&self) -> bool {
        self.source == SetSource::Local
    }

    /// Add an item, taking ownership and pointing it back at this set.
    /// Items already present (same row id) are replaced in place.
    pub fn add_item(&mut self, mut item: MediaItem) {
        item.parent_set = self.id;
        if let Some(existing) = self.item_mut(item.id) {
            *existing = item;
            return;
        }
        self.items.push(item);
        self.num_items_loaded = self.items.len();
        if self.num_expected_items < self.num_items_loaded {
            self.num_expected_items = self.num_items_loaded;
        }
    }

    /// Drop items by row id, returns how many were removed
    pub fn remove_items(&mut self, item_ids: &[i64]) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !item_ids.contains(&item.id));
        self.num_items_loaded = self.items.len();
        before - self.items.len()
    }

    pub fn set_num_expected_items(&mut self, count: usize) {
        self.num_expected_items = count;
    }

    /// Regenerate the display title and subtitle from the name and counts
    pub fn generate_title(&mut self, truncate: bool) {
        let name = if self.name.is_empty() {
            format!("Bucket {}", self.id)
        } else {
            self.name.clone()
        };

        self.title = if truncate && name.chars().count() > MAX_TITLE_CHARS {
            let mut short: String = name.chars().take(MAX_TITLE_CHARS - 1).collect();
            short.push('…');
            short
        } else {
            name
        };

        self.subtitle = match self.num_expected_items {
            1 => "1 item".to_string(),
            n => format!("{} items", n),
        };
        self.title_generated = true;
    }
}

/// Argument shape for batch operations: a set plus an optional item list.
///
/// `items == None` means the whole bucket, `Some(list)` means exactly
/// these items, even when the list is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaBucket {
    pub set: BucketId,
    pub items: Option<Vec<MediaItem>>,
}

impl MediaBucket {
    pub fn whole(set: BucketId) -> Self {
        Self { set, items: None }
    }

    pub fn with_items(set: BucketId, items: Vec<MediaItem>) -> Self {
        Self {
            set,
            items: Some(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, orientation: i32) -> MediaRow {
        MediaRow {
            id,
            partition: Partition::Images,
            bucket_id: BucketId(42),
            bucket_display_name: "Camera".to_string(),
            path: format!("/sdcard/DCIM/Camera/IMG_{:04}.jpg", id),
            display_name: format!("IMG_{:04}.jpg", id),
            mime_type: "image/jpeg".to_string(),
            orientation,
            date_added: 1_700_000_000,
        }
    }

    #[test]
    fn test_parse_content_locator() {
        let locator = ContentLocator::parse("content://media/video/17").unwrap();
        assert_eq!(
            locator,
            ContentLocator::Content {
                partition: Partition::Videos,
                id: 17
            }
        );
        assert_eq!(locator.to_string(), "content://media/video/17");
        assert!(!locator.is_file());
    }

    #[test]
    fn test_parse_file_locator() {
        let locator = ContentLocator::parse("file:///sdcard/DCIM/Camera/a%20b.jpg").unwrap();
        assert_eq!(
            locator,
            ContentLocator::File(PathBuf::from("/sdcard/DCIM/Camera/a b.jpg"))
        );
        assert!(locator.is_file());
    }

    #[test]
    fn test_reject_bad_locators() {
        assert!(ContentLocator::parse("not a uri").is_err());
        assert!(ContentLocator::parse("http://example.com/1").is_err());
        assert!(ContentLocator::parse("content://media/audio/1").is_err());
        assert!(ContentLocator::parse("content://media/images/abc").is_err());
    }

    #[test]
    fn test_item_from_row_normalizes_rotation() {
        let item = MediaItem::from_row(&row(3, -90));
        assert_eq!(item.rotation, 270.0);
        assert_eq!(item.content_uri, "content://media/images/3");
        assert_eq!(item.parent_set, BucketId(42));
    }

    #[test]
    fn test_add_and_remove_items() {
        let mut set = MediaSet::new(BucketId(42), SetSource::Local);
        assert!(set.is_shell());
        set.add_item(MediaItem::from_row(&row(1, 0)));
        set.add_item(MediaItem::from_row(&row(2, 0)));
        set.add_item(MediaItem::from_row(&row(2, 90)));
        assert_eq!(set.num_items_loaded, 2);
        assert_eq!(set.items()[1].rotation, 90.0);

        assert_eq!(set.remove_items(&[1, 99]), 1);
        assert_eq!(set.num_items_loaded, 1);
    }

    #[test]
    fn test_generate_title() {
        let mut set = MediaSet::new(BucketId(5), SetSource::Local);
        set.generate_title(true);
        assert_eq!(set.title, "Bucket 5");
        assert_eq!(set.subtitle, "0 items");

        set.name = "A folder with a rather long name, longer than the limit".to_string();
        set.set_num_expected_items(1);
        set.generate_title(true);
        assert_eq!(set.title.chars().count(), MAX_TITLE_CHARS);
        assert!(set.title.ends_with('…'));
        assert_eq!(set.subtitle, "1 item");
        assert!(set.title_generated);

        set.generate_title(false);
        assert_eq!(set.title, set.name);
    }
}
