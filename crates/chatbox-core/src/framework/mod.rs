//! Framework layer - the engine.
//!
//! - Command registry with ordered, multi-handler commands
//! - Background scheduler with catch-up over whole seconds
//! - Tick clock and wall-clock sources
//! - Inbound dispatcher routing events to the roster and the commands
//! - Startup registry bundling commands and jobs

pub mod clock;
pub mod command;
pub mod dispatcher;
pub mod registry;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock, TickClock};
pub use command::{BoxedCommandHandler, CommandHandler, CommandRegistry};
pub use dispatcher::Dispatcher;
pub use registry::{Registry, RegistryBuilder};
pub use scheduler::{BoxedJob, Job, ScheduledJob, Scheduler};
