pub mod document;
pub mod embedded;
pub mod tracker;

pub use document::{Document, DocumentHandle};
pub use embedded::{EmbeddedDocument, EmbeddedHandle, RootAndPath};
pub use tracker::ChangeTracker;
