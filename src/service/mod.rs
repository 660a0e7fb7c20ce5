//! Service data model: what is managed, in which order, and how far along it is.

pub mod defaults;
pub mod plan;
pub mod spec;
pub mod status;

pub use defaults::{default_params, lemp_services};
pub use plan::InstallPlan;
pub use spec::{PackageSpec, ServiceSpec, TemplateSource};
pub use status::{InvalidTransition, LifecycleState, ServiceStatus};
