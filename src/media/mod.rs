/// Media files on disk
///
/// - Orientation tags (orientation.rs)
/// - Importing folders into the store (scanner.rs)
/// - Thumbnail caches (thumbnail.rs)

pub mod orientation;
pub mod scanner;
pub mod thumbnail;
