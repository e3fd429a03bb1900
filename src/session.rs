//! Session lifecycle services: backend auth calls, single-flight refresh, the session guard,
//! and the re-authentication signal.

pub mod backend;
pub mod guard;
pub mod navigator;
pub mod refresh;

pub use backend::*;
pub use guard::*;
pub use navigator::*;
pub use refresh::*;
