//! DocReg Time Library
//!
//! Clock collaborators that stamp registrations.
//!
//! # Features
//! - Unix-second precision
//! - Monotonic floor on the system clock
//! - Manually driven clock for deterministic tests

pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};
