//! Logging configuration
//!
//! - `base`: [`Config`], [`Format`] and [`Level`]
//! - `writer`: where output goes and how it is decorated
//! - `env`: `ROTATOR_LOG*` overrides on top of a loaded configuration

mod base;
mod env;
mod writer;

pub use base::{Config, Format, Level};
pub use writer::{DisplayConfig, Rolling, WriterConfig};
