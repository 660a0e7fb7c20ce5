//! Command runtime for LEMPXpert
//!
//! Every interaction with the host (package manager, service supervisor,
//! config validators) goes through a [`CommandRunner`]. The only production
//! runner is [`NativeRunner`]; tests use scripted runners.

pub mod native;
pub mod types;

pub use native::NativeRunner;
pub use types::{
    CommandOutput, CommandRunner, CommandSpec, RuntimeError, RuntimeResult,
    DEFAULT_COMMAND_TIMEOUT,
};
