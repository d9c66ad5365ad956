//! Testing utilities for rotation code
//!
//! Scripted fakes for the remote service and password source, plus fixture
//! credentials with known secrets. Nothing here touches the network.

pub mod fixtures;
pub mod mocks;

pub use self::fixtures::*;
pub use self::mocks::*;
pub use crate::core::ManualClock;
