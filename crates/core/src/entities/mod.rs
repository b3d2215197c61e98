//! CRM entity models and remote → local mapping.

mod mapping;
mod model;

pub use mapping::*;
pub use model::*;
