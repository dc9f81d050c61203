//! Hook-wrapped execution of mutating operations.
//!
//! Every delete, write, rename and copy goes through [`Runner::run`]. The
//! runner fires `before_<action>` hooks, runs the operation exactly once, and
//! fires `after_<action>` hooks only if the operation succeeded. Hook failures
//! never replace the operation's own result; they are returned next to it.

use std::collections::HashMap;
use std::process::Command;
use std::sync::Arc;

use thiserror::Error;

use crate::error::Result;
use crate::users::User;

/// Hook stage relative to the wrapped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Before,
    After,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Before => "before",
            Trigger::After => "after",
        }
    }
}

/// Errors from running a hook.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HookError {
    /// The hook command could not be started.
    #[error("hook {event} could not start `{command}`: {reason}")]
    Spawn {
        event: String,
        command: String,
        reason: String,
    },

    /// The hook command exited unsuccessfully.
    #[error("hook {event} command `{command}` failed: {status}")]
    Failed {
        event: String,
        command: String,
        status: String,
    },
}

/// What a hook gets to see about the operation it surrounds.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    /// Operation name: `delete`, `upload`, `rename` or `copy`.
    pub action: &'a str,
    pub trigger: Trigger,
    /// Absolute source path.
    pub src: &'a str,
    /// Absolute destination path, empty when the operation has none.
    pub dst: &'a str,
    pub user: &'a User,
}

impl HookContext<'_> {
    /// Hook event name, e.g. `before_delete`.
    pub fn event(&self) -> String {
        format!("{}_{}", self.trigger.as_str(), self.action)
    }
}

/// Runs the hooks configured for an event.
pub trait HookExecutor: Send + Sync {
    /// Fire every hook for `ctx.event()`, stopping at the first failure.
    fn fire(&self, ctx: &HookContext<'_>) -> std::result::Result<(), HookError>;
}

/// No hooks at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl HookExecutor for NoHooks {
    fn fire(&self, _ctx: &HookContext<'_>) -> std::result::Result<(), HookError> {
        Ok(())
    }
}

/// Shell commands keyed by event name.
///
/// Each command runs through `<shell> -c <command>` with `FILE`,
/// `DESTINATION`, `SCOPE`, `TRIGGER` and `USERNAME` in its environment.
#[derive(Debug, Clone)]
pub struct CommandHooks {
    shell: String,
    commands: HashMap<String, Vec<String>>,
}

impl CommandHooks {
    pub fn new(shell: impl Into<String>, commands: HashMap<String, Vec<String>>) -> Self {
        Self {
            shell: shell.into(),
            commands,
        }
    }

    /// Commands configured for an event.
    pub fn commands_for(&self, event: &str) -> &[String] {
        self.commands.get(event).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl HookExecutor for CommandHooks {
    fn fire(&self, ctx: &HookContext<'_>) -> std::result::Result<(), HookError> {
        let event = ctx.event();

        for command in self.commands_for(&event) {
            tracing::debug!(event = %event, command = %command, "Running hook");

            let status = Command::new(&self.shell)
                .arg("-c")
                .arg(command)
                .env("FILE", ctx.src)
                .env("DESTINATION", ctx.dst)
                .env("SCOPE", &ctx.user.scope)
                .env("TRIGGER", ctx.trigger.as_str())
                .env("USERNAME", &ctx.user.username)
                .status()
                .map_err(|e| HookError::Spawn {
                    event: event.clone(),
                    command: command.clone(),
                    reason: e.to_string(),
                })?;

            if !status.success() {
                return Err(HookError::Failed {
                    event,
                    command: command.clone(),
                    status: status.to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Result of a hook-wrapped operation.
#[derive(Debug)]
pub struct RunOutcome<T> {
    /// The operation's own result.
    pub result: Result<T>,
    /// Failures from before/after hooks, in firing order.
    pub hook_errors: Vec<HookError>,
}

impl<T> RunOutcome<T> {
    /// Whether any hook failed.
    pub fn has_hook_errors(&self) -> bool {
        !self.hook_errors.is_empty()
    }

    /// Transform the success value, keeping hook errors.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RunOutcome<U> {
        RunOutcome {
            result: self.result.map(f),
            hook_errors: self.hook_errors,
        }
    }
}

/// Single choke point for mutating operations.
#[derive(Clone)]
pub struct Runner {
    hooks: Arc<dyn HookExecutor>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner").finish_non_exhaustive()
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(Arc::new(NoHooks))
    }
}

impl Runner {
    pub fn new(hooks: Arc<dyn HookExecutor>) -> Self {
        Self { hooks }
    }

    /// Run `op` between the hooks configured for `action`.
    ///
    /// `src` and `dst` are absolute paths handed to the hooks; pass an empty
    /// `dst` when the operation has no destination.
    pub fn run<T, F>(&self, action: &str, src: &str, dst: &str, user: &User, op: F) -> RunOutcome<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut hook_errors = Vec::new();
        let mut ctx = HookContext {
            action,
            trigger: Trigger::Before,
            src,
            dst,
            user,
        };

        if let Err(e) = self.hooks.fire(&ctx) {
            tracing::warn!(user = %user.username, action, error = %e, "Before hook failed");
            hook_errors.push(e);
        }

        let result = op();

        match &result {
            Ok(_) => {
                tracing::info!(user = %user.username, action, src, dst, "Operation completed");
                ctx.trigger = Trigger::After;
                if let Err(e) = self.hooks.fire(&ctx) {
                    tracing::warn!(user = %user.username, action, error = %e, "After hook failed");
                    hook_errors.push(e);
                }
            }
            Err(e) => {
                tracing::debug!(user = %user.username, action, error = %e, "Operation failed, skipping after hooks");
            }
        }

        RunOutcome {
            result,
            hook_errors,
        }
    }
}
