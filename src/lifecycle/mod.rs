//! Hosted package lifecycle
//!
//! ```text
//! NotInstalled -> Installing -> Configured -> Starting -> Started
//!                      \______________\___________\_________\-> Stopping -> Uninstalled
//! ```
//!
//! `Uninstalled` is terminal and reached exactly once per package.

pub mod application;
pub mod driver;
pub mod entry;
pub mod hooks;
pub mod orchestrator;
pub mod readiness;
pub mod slot;

pub use application::{
    ConfigServices, ConfigurationInstance, HostedApplication, LaunchContext, LifecycleState,
};
pub use driver::{Driver, DriverFactory, DriverParams, DriverRegistry};
pub use entry::{
    current_context, with_context, ApplicationError, EntryPoint, EntryPointError, PackageContext,
    WithContext,
};
pub use hooks::ShutdownHooks;
pub use orchestrator::{HostOrchestrator, HostServices, HostingFramework, InstallHandle};
pub use readiness::{ReadinessGate, ReadySignal};
pub use slot::{ActiveInstanceSlot, SingleAssignment};
