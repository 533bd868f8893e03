//! The startup-time registry of commands and jobs.
//!
//! Everything a session dispatches to is collected into a [`Registry`] once,
//! before the first connection, and is immutable afterwards. Sessions share
//! it behind an `Arc`.

use std::sync::Arc;

use crate::error::SchedulerError;
use crate::framework::command::{CommandHandler, CommandRegistry};
use crate::framework::scheduler::{Job, Scheduler};

/// Frozen commands and jobs.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    commands: CommandRegistry,
    scheduler: Scheduler,
}

impl Registry {
    /// Starts building a registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registered commands.
    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Registered jobs.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

/// Builder for [`Registry`].
///
/// Registration errors are collected and reported by [`build`](Self::build),
/// so plugins can chain calls without handling each one.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    commands: CommandRegistry,
    scheduler: Scheduler,
    errors: Vec<SchedulerError>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command handler.
    pub fn command<H: CommandHandler>(mut self, name: impl Into<String>, handler: H) -> Self {
        self.commands.register(name, handler);
        self
    }

    /// Appends a job to the group for `interval` seconds.
    pub fn job<J: Job>(mut self, interval: u64, name: impl Into<String>, job: J) -> Self {
        if let Err(e) = self.scheduler.register(interval, name, job) {
            self.errors.push(e);
        }
        self
    }

    /// Mutable access for plugins that register in a loop.
    pub fn commands_mut(&mut self) -> &mut CommandRegistry {
        &mut self.commands
    }

    /// Mutable access for plugins that register in a loop.
    ///
    /// Errors from [`Scheduler::register`] are returned directly here.
    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Freezes the registry. Fails with the first registration error.
    pub fn build(self) -> Result<Arc<Registry>, SchedulerError> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }
        Ok(Arc::new(Registry {
            commands: self.commands,
            scheduler: self.scheduler,
        }))
    }
}
