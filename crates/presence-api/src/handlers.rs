//! Request handlers.

pub mod detect;
pub mod health;
pub mod index;

pub use detect::*;
pub use health::*;
pub use index::*;
