//! Shared file formats.

pub mod scene;
