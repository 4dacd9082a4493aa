//! High-level command flows composed from the engines

pub mod adapters;
pub mod explain;
pub mod generate;
