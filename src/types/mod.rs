//! Shared types

mod error;

pub use error::{IbError, Result};
