//! Conversion engine collaborators.
//!
//! The gateway never parses vector formats itself. It hands a
//! [`ConversionRequest`] to a [`ConversionEngine`] and judges the result by
//! the reported status plus the size of what landed at the destination.
//!
//! - [`Ogr2OgrEngine`]: runs a local `ogr2ogr` process
//! - [`RemoteEngine`]: delegates to a remote conversion service

mod ogr2ogr;
mod remote;
mod traits;

pub use ogr2ogr::{Ogr2OgrEngine, DEFAULT_PROGRAM};
pub use remote::RemoteEngine;
pub use traits::{ConversionEngine, ConversionRequest, EngineError, SourceLocation};
