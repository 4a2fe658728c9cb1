//! Core types for the coaching engine.

mod message;
mod prediction;
mod profile;
mod query;
mod records;
mod template;

pub use message::*;
pub use prediction::*;
pub use profile::*;
pub use query::*;
pub use records::*;
pub use template::*;
