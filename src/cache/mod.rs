/// Derived cache of the media store
pub mod service;
