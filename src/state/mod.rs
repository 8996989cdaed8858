/// State management module
///
/// This module handles all feed state, including:
/// - The media store and its change notifications (library.rs)
/// - Shared data structures (data.rs)
/// - The in-memory feed of media sets (feed.rs)

pub mod data;
pub mod feed;
pub mod library;
