//! Sprint execution: dependency validation, hook/gate middleware, and the
//! orchestrating runner.

pub mod config;
pub mod dependencies;
pub mod gates;
pub mod hooks;
pub mod runner;

pub use config::RunConfig;
pub use hooks::{Hook, HookContext, HookPoint, HookRegistry};
pub use runner::SprintRunner;
