//! Application services layer.

pub mod engine;
pub mod error;
