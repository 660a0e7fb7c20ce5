//! Service supervision.
//!
//! The [`Supervisor`] trait is the capability boundary: one implementation per
//! supervision mechanism (systemd, SysV init). The [`ServiceController`] sits
//! on top and owns the per-service state machine and config promotion.

pub mod controller;
pub mod factory;
pub mod systemd;
pub mod sysv;
pub mod types;

#[cfg(test)]
pub mod mock;

pub use controller::{ControlTimeouts, Promotion, ServiceController, BACKUP_SUFFIX};
pub use factory::{available_supervisors, create_supervisor, resolve_kind};
pub use systemd::SystemdSupervisor;
pub use sysv::SysvSupervisor;
pub use types::{ControlState, DesiredState, Supervisor, SupervisorError};
