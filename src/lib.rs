//! errstore - relational error store with rollup of duplicate exceptions

pub mod config;
pub mod db;
pub mod domain;
pub mod store;

pub use domain::ErrorRecord;
pub use store::{open_store, ErrorStore, StoreError, StoreOptions};
