//! Core module - Contains the fundamental data structures and utilities
//!
//! This module provides:
//! - The digest data model (FileRecord, DigestResult, GenerationProgress)
//! - Rendering functions for different output formats
//! - Path normalization utilities
//! - A bounded LRU cache shared by the engine caches
//! - Common utilities

pub mod lru;
pub mod model;
pub mod paths;
pub mod render;
pub mod util;
