//! Credentials, signed-header capability auth, and per-request strategy selection.

pub mod credential;
pub mod secret;
pub mod signature;
pub mod strategy;

pub use credential::*;
pub use secret::*;
pub use signature::*;
pub use strategy::*;
