//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own transaction boundaries; repositories never begin transactions.

pub mod error;
pub mod family_service;
pub mod potcar_service;

pub use error::{ServiceError, ServiceResult};
