//! Prefix-command framework: registry, argument parsing, checks,
//! dispatch, failure classification and help.

pub mod args;
pub mod checks;
pub mod classify;
pub mod context;
pub mod dispatch;
pub mod help;
pub mod registry;

pub use args::{ArgSpec, Args};
pub use checks::{Check, Viewer};
pub use classify::{classify, Action, EscalationReport, FailureContext};
pub use context::Invocation;
pub use dispatch::{dispatch, Outcome};
pub(crate) use registry::async_handler;
pub use registry::{Category, Command, CommandRegistry, Handler, RegistryError, Resolved};
