//! Core types shared across the Lissen dashboard crates

pub mod error_builder;
pub mod problemdetails;

pub use error_builder::*;
pub use problemdetails::{Problem, ProblemDetails};

// Re-export external dependencies
pub use chrono;
pub use serde;
pub use serde_json;
