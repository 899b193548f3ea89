//! Domain models for errstore

mod error;

pub use error::*;
