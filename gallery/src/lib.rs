pub mod edges;
pub mod store;

pub use edges::{EdgeDetector, EdgeError};
pub use store::{GalleryEntry, GalleryError, GalleryPage, GalleryStore};
