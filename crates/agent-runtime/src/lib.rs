pub mod dispatcher;
pub mod handler;
pub mod placeholder;
pub mod scheduler;
pub mod supervisor;

pub use dispatcher::{Dispatcher, PollOutcome};
pub use handler::{HandlerContext, HandlerError, HandlerRegistry, TaskHandler};
pub use placeholder::noop_registry;
pub use scheduler::SchedulerSet;
pub use supervisor::Supervisor;
