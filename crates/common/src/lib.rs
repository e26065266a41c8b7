//! Todo Common Library
//!
//! Data model and REST client for the todo endpoint exercised by the
//! end-to-end runner.

pub mod client;
pub mod error;
pub mod types;

#[cfg(any(test, feature = "stub-server"))]
pub mod stub;

// Re-export commonly used types
pub use client::{item_path, TodoClient};
pub use error::{Error, Result};
pub use types::*;
