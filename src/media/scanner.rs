/// Media scanner: walks a folder and imports media files into the store
use super::orientation::{exif_to_degrees, read_orientation};
use crate::bucket::bucket_id_for_file;
use crate::error::Result;
use crate::state::data::{MediaRow, Partition};
use crate::state::library::MediaStore;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Result of a folder scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub imported_count: usize,
    pub skipped_count: usize,
}

/// Partition and mime type for a file extension, `None` for non-media files
pub fn classify(path: &Path) -> Option<(Partition, &'static str)> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    let kind = match ext.as_str() {
        "jpg" | "jpeg" => (Partition::Images, "image/jpeg"),
        "png" => (Partition::Images, "image/png"),
        "gif" => (Partition::Images, "image/gif"),
        "webp" => (Partition::Images, "image/webp"),
        "heic" => (Partition::Images, "image/heic"),
        "tif" | "tiff" => (Partition::Images, "image/tiff"),
        "dng" => (Partition::Images, "image/x-adobe-dng"),
        "mp4" | "m4v" => (Partition::Videos, "video/mp4"),
        "3gp" => (Partition::Videos, "video/3gpp"),
        "mkv" => (Partition::Videos, "video/x-matroska"),
        "mov" => (Partition::Videos, "video/quicktime"),
        "webm" => (Partition::Videos, "video/webm"),
        _ => return None,
    };
    Some(kind)
}

/// Imports files into a media store, flagging the store as scanning meanwhile
pub struct MediaScanner {
    store: Arc<dyn MediaStore>,
}

/// Clears the scanning flag however the scan ends
struct ScanningGuard<'a>(&'a dyn MediaStore);

impl Drop for ScanningGuard<'_> {
    fn drop(&mut self) {
        self.0.set_scanning(false);
    }
}

impl MediaScanner {
    pub fn new(store: Arc<dyn MediaStore>) -> Self {
        Self { store }
    }

    /// Walk `folder` recursively and insert every media file not yet known
    pub fn scan(&self, folder: &Path) -> Result<ScanReport> {
        self.store.set_scanning(true);
        let _guard = ScanningGuard(self.store.as_ref());

        info!("🔍 Scanning folder: {}", folder.display());
        let mut report = ScanReport::default();

        // Walk the directory tree recursively
        for entry in WalkDir::new(folder)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some((partition, mime_type)) = classify(path) else {
                continue;
            };

            let row = Self::row_for(path, partition, mime_type);
            match self.store.insert(&row)? {
                Some(_) => {
                    report.imported_count += 1;
                    if report.imported_count % 100 == 0 {
                        info!("⏳ Imported {} files...", report.imported_count);
                    }
                }
                None => report.skipped_count += 1,
            }
        }

        info!(
            "✅ Scan complete: {} new, {} skipped",
            report.imported_count, report.skipped_count
        );
        Ok(report)
    }

    fn row_for(path: &Path, partition: Partition, mime_type: &str) -> MediaRow {
        let orientation = match partition {
            Partition::Images => match read_orientation(path) {
                Ok(code) => exif_to_degrees(code.unwrap_or(1)) as i32,
                Err(e) => {
                    warn!("⚠️  Could not read orientation of {}: {}", path.display(), e);
                    0
                }
            },
            Partition::Videos => 0,
        };

        MediaRow {
            id: 0,
            partition,
            bucket_id: bucket_id_for_file(path),
            bucket_display_name: path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_string_lossy().into_owned(),
            display_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            mime_type: mime_type.to_string(),
            orientation,
            date_added: Utc::now().timestamp(),
        }
    }
}

/// Scan a folder on the blocking thread pool
pub async fn scan_folder_async(store: Arc<dyn MediaStore>, folder: PathBuf) -> Result<ScanReport> {
    tokio::task::spawn_blocking(move || MediaScanner::new(store).scan(&folder))
        .await
        .map_err(std::io::Error::other)?
}
