pub mod local;
pub mod traits;

pub use local::LocalRuntime;
pub use traits::{ExitEvent, ProcessRuntime};

#[cfg(test)]
pub(crate) mod mock;
