//! Core domain for the door scanner.
//!
//! Everything here is synchronous and free of network I/O: the debounce
//! gate, classification of check-in responses, feedback directives, the
//! on-disk config and credential, and the redb-backed cache store.

pub mod cache;
pub mod config;
pub mod credential;
pub mod debounce;
pub mod error;
pub mod io;
pub mod paths;
pub mod types;
pub mod verdict;

pub use error::{DoorError, Result};
