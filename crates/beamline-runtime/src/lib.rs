#[macro_use]
mod log_macros;

pub mod action;
pub mod control;
pub mod dispatch;
pub mod drivers;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod scheduler;
pub mod tracing_init;

pub use action::Action;
pub use error::{RuntimeError, RuntimeReason, RuntimeResult};
pub use lifecycle::Reactor;
pub use scheduler::Scheduler;
