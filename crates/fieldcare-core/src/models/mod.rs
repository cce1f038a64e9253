//! Domain models for the fieldcare system.

mod patient;
mod visit;

pub use patient::*;
pub use visit::*;
