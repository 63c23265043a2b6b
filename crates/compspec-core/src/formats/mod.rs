//! # Formats
//!
//! Serialization formats for compspec data.

pub mod persistence;

pub use persistence::{GraphCache, cache_from_bytes, cache_to_bytes};
