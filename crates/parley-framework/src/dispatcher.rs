//! The dispatch engine.
//!
//! [`DispatchEngine`] owns the command registry, the handler instance cache
//! and the continuation table, and decides what happens to each inbound
//! event:
//!
//! 1. If the event resumes one or more waiting conversations, it is handed to
//!    them and no command runs. Dispatch returns `false`.
//! 2. Otherwise the matching commands of the event's scope are tried, highest
//!    priority first. Candidates the sender lacks the role for are skipped.
//! 3. The first handler that succeeds decides the result: the event's
//!    propagation flag. A failing handler is logged, optionally answered with
//!    a failure notice, and the next candidate is tried.
//! 4. If nothing matched, or every candidate was skipped or failed, dispatch
//!    returns `true`.
//!
//! The returned flag tells the caller whether to run its generic event
//! pipeline for this event.
//!
//! ```rust,ignore
//! use parley_framework::{DispatchEngine, LinkedCatalog};
//!
//! let engine = Arc::new(DispatchEngine::new());
//! engine.scan_catalog(&LinkedCatalog);
//!
//! if engine.dispatch(event).await {
//!     // no command consumed the event
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{Instrument, debug, debug_span, error, info, trace, warn};

use crate::catalog::{CatalogEntry, CommandCatalog};
use crate::continuation::{ContinuationTable, PendingContinuation};
use crate::descriptor::{CommandDescriptor, CommandSpec};
use crate::error::{RegistrationResult, WaitResult};
use crate::handler::{CommandHandler, Instance};
use crate::instance::HandlerInstanceCache;
use crate::pattern::{MatchFlags, MatchMode};
use crate::registry::{CommandRegistry, RegisterOutcome};
use crate::scanner::{RegistrationScanner, ScanReport};
use parley_core::{BoxedBot, Dispatcher, InboundEvent, NormalizedMessage, Scope};

/// Switches for the dispatch engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// When `false`, scanning registers nothing and every event passes
    /// through untouched.
    pub enabled: bool,
    /// Reply to the sender when a described command fails.
    pub failure_notice: bool,
    /// First line of the failure notice; the command description follows.
    pub failure_notice_prefix: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_notice: true,
            failure_notice_prefix: "command execution failed".to_string(),
        }
    }
}

/// Routes inbound events to continuations and commands.
pub struct DispatchEngine {
    options: EngineOptions,
    registry: CommandRegistry,
    instances: HandlerInstanceCache,
    continuations: ContinuationTable,
    running: AtomicBool,
}

impl Default for DispatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchEngine {
    /// Creates an engine with default options.
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    /// Creates an engine with `options`.
    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            options,
            registry: CommandRegistry::new(),
            instances: HandlerInstanceCache::new(),
            continuations: ContinuationTable::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn instances(&self) -> &HandlerInstanceCache {
        &self.instances
    }

    /// Returns the continuation table. Clone it to wait from inside a
    /// handler.
    pub fn continuations(&self) -> &ContinuationTable {
        &self.continuations
    }

    /// Returns `true` once a catalog has been scanned, until shutdown.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Closes every waiting conversation and marks the engine stopped.
    pub fn shutdown(&self) {
        let closed = self.continuations.close_all();
        self.running.store(false, Ordering::Release);
        info!(closed, "Dispatch engine shut down");
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers every declaration of `catalog` and marks the engine running.
    pub fn scan_catalog(&self, catalog: &dyn CommandCatalog) -> ScanReport {
        if !self.options.enabled {
            debug!("Command engine disabled, catalog not scanned");
            return ScanReport::default();
        }

        let report = RegistrationScanner::new(&self.registry, &self.instances).scan(catalog);
        self.running.store(true, Ordering::Release);
        info!(
            registered = report.registered,
            duplicates = report.duplicates,
            skipped = report.skipped,
            "Command catalog scanned"
        );
        report
    }

    /// Registers a single declaration. A disabled engine registers nothing.
    pub fn register(&self, entry: CatalogEntry) -> RegistrationResult<RegisterOutcome> {
        let name = entry.spec.name.clone();
        if !self.options.enabled {
            debug!(command = %name, "Command engine disabled, command not registered");
            return Ok(RegisterOutcome::Disabled);
        }

        let outcome = RegistrationScanner::new(&self.registry, &self.instances).register_entry(entry)?;
        debug!(command = %name, ?outcome, "Registered command");
        Ok(outcome)
    }

    /// Registers a free-standing group command.
    pub fn register_group_command(
        &self,
        mut spec: CommandSpec,
        handler: CommandHandler,
    ) -> RegistrationResult<RegisterOutcome> {
        spec.scope = Scope::Group;
        self.register(CatalogEntry::free(spec, handler))
    }

    /// Registers a free-standing private command.
    pub fn register_private_command(
        &self,
        mut spec: CommandSpec,
        handler: CommandHandler,
    ) -> RegistrationResult<RegisterOutcome> {
        spec.scope = Scope::Private;
        self.register(CatalogEntry::free(spec, handler))
    }

    /// Returns the shared instance of owner type `T`, if one was created.
    pub fn instance<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.instances.get::<T>()
    }

    // ========================================================================
    // Continuations
    // ========================================================================

    /// Registers a wait for the next message from the sender of `event`.
    pub fn expect_reply<I, S>(
        &self,
        event: &InboundEvent,
        patterns: I,
        mode: MatchMode,
        flags: MatchFlags,
    ) -> WaitResult<PendingContinuation>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.continuations.expect_reply(event, patterns, mode, flags)
    }

    /// Waits for the next message from the sender of `event` that matches
    /// `patterns`.
    pub async fn wait_for_next<I, S>(
        &self,
        event: &InboundEvent,
        patterns: I,
        mode: MatchMode,
        flags: MatchFlags,
        timeout: Option<Duration>,
    ) -> WaitResult<Arc<InboundEvent>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.continuations
            .wait_for_next(event, patterns, mode, flags, timeout)
            .await
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Converts `message` and dispatches it.
    ///
    /// A message that cannot be converted is logged and passed through.
    pub async fn dispatch_normalized(&self, message: NormalizedMessage, bot: BoxedBot) -> bool {
        match message.into_event(bot) {
            Ok(event) => self.dispatch(Arc::new(event)).await,
            Err(e) => {
                error!(error = %e, "Cannot dispatch inbound message");
                true
            }
        }
    }

    /// Dispatches one event. Returns whether the caller should keep
    /// processing it.
    pub async fn dispatch(&self, event: Arc<InboundEvent>) -> bool {
        let span = debug_span!(
            "dispatch",
            scope = %event.scope(),
            connection = %event.connection(),
            user_id = event.user_id(),
        );
        self.dispatch_event(event).instrument(span).await
    }

    async fn dispatch_event(&self, event: Arc<InboundEvent>) -> bool {
        if !self.options.enabled {
            return true;
        }

        let resumed = self.continuations.resolve(&event);
        if resumed > 0 {
            debug!(resumed, "Event resumed waiting conversations");
            return false;
        }

        let candidates = self.registry.match_candidates(&event);
        if candidates.is_empty() {
            trace!("No command matched");
            return true;
        }

        for command in candidates {
            let role = event.sender_role().unwrap_or_default();
            if !command.permits(role) {
                warn!(
                    command = %command.name,
                    %role,
                    required = ?command.min_role,
                    "Sender lacks the role for command"
                );
                continue;
            }

            let Some(instance) = self.instance_for(&command) else {
                continue;
            };

            info!(command = %command.name, priority = command.priority, "Command triggered");
            match command.handler.invoke(instance, Arc::clone(&event)).await {
                Ok(()) => return event.is_propagating(),
                Err(e) => {
                    error!(command = %command.name, error = %e, "Command handler failed");
                    self.notify_failure(&command, &event);
                }
            }
        }

        true
    }

    /// `None` if the command is bound and its owner cannot be constructed.
    fn instance_for(&self, command: &CommandDescriptor) -> Option<Option<Instance>> {
        let Some(owner) = &command.owner else {
            return Some(None);
        };
        match self.instances.get_or_create(owner) {
            Ok(instance) => Some(Some(instance)),
            Err(e) => {
                warn!(
                    command = %command.name,
                    owner = owner.name(),
                    error = %e,
                    "Owner instance unavailable"
                );
                None
            }
        }
    }

    fn notify_failure(&self, command: &CommandDescriptor, event: &Arc<InboundEvent>) {
        if !self.options.failure_notice || command.description.is_empty() {
            return;
        }

        let message = format!(
            "{}\n{}",
            self.options.failure_notice_prefix, command.description
        );
        let event = Arc::clone(event);
        tokio::spawn(async move {
            if let Err(e) = event.reply(&message).await {
                warn!(error = %e, "Failed to send failure notice");
            }
        });
    }
}

#[async_trait]
impl Dispatcher for DispatchEngine {
    async fn dispatch(&self, event: Arc<InboundEvent>) -> bool {
        DispatchEngine::dispatch(self, event).await
    }
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("continuations", &self.continuations)
            .field("running", &self.is_running())
            .finish()
    }
}
