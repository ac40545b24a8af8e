//! Payload sources and record wrappers for file-level I/O.
//!
//! # Responsibility
//! - Enumerate upload sources (folders, tar archives).
//! - Wrap single records and ordered multi-record files for read/write.

pub mod multi_potcar_io;
pub mod potcar_io;
pub mod source;
