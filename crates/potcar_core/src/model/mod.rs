//! Domain model for stored pseudopotential records.
//!
//! # Responsibility
//! - Define the tagged record shape shared by full and shadow records.
//! - Parse the identifying attributes out of a POTCAR payload header.
//! - Describe family groupings.
//!
//! # Invariants
//! - The content hash is the only identity of a payload.
//! - Full and shadow records carry the same five attributes; only full
//!   records point at a payload.

pub mod family;
pub mod format;
pub mod potcar;
