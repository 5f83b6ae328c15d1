//! Object store collaborators.
//!
//! The gateway reads canonical sources from one store and reads/writes
//! materialized artifacts in another. Both sit behind [`ObjectStore`].
//!
//! # Available Backends
//!
//! - [`HttpObjectStore`]: public read URL plus optional `PUT` bucket URL
//! - [`LocalObjectStore`]: a local directory with atomic renames
//! - [`MemoryObjectStore`]: in-process map with call counters

mod http;
mod local;
mod memory;
mod traits;

pub use http::HttpObjectStore;
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use traits::{content_type_for, BoxFuture, ObjectStore, StoreError};
