//! Core domain and sync engine for the local CRM replica.
//!
//! Storage backends implement the repository traits in [`sync`]; the remote CRM client
//! implements [`sync::CrmRemoteTrait`].

pub mod entities;
pub mod errors;
pub mod sync;

pub use errors::{DatabaseError, Error, Result};
