//! REST client for the remote CRM.
//!
//! Implements [`crm_replica_core::sync::CrmRemoteTrait`] over the HubSpot-style CRM v3
//! objects/search endpoints and the v4 batch association endpoint.

mod client;
mod error;
mod types;

pub use client::*;
pub use error::*;
pub use types::*;
