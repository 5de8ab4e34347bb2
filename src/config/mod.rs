//! Match configuration.
//!
//! Loads, validates, and assembles YAML match files into a ready-to-run
//! [`RoundControllerBuilder`](crate::round::RoundControllerBuilder).

pub mod assemble;
pub mod loader;
pub mod schema;
pub mod validation;

pub use assemble::assemble;
pub use loader::{ConfigLimits, ConfigLoader, LoadResult, LoadWarning};
pub use schema::*;
pub use validation::{ValidationResult, Validator};
