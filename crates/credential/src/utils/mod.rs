//! Utility modules

pub mod fs;

pub use fs::atomic_write;
