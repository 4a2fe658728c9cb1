//! Seams between the engine and its collaborators.

mod notifier;
mod predictor;
mod source;
mod store;

pub use notifier::*;
pub use predictor::*;
pub use source::*;
pub use store::*;
