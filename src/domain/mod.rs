//! Domain value objects.

pub mod document;

pub use document::{Document, Orientation};
