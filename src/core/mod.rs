//! Core domain models
//!
//! This module defines origin descriptors, repository definitions and the
//! errors raised while resolving them.

pub mod config;
pub mod error;
pub mod origin;
pub mod pipeline;

pub use error::{LocationError, ResolutionError};
pub use origin::*;
pub use pipeline::*;
