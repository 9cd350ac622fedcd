//! Contextfield Core - shared types, text helpers, and error handling

pub mod clock;
pub mod error;
pub mod text;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use types::*;
