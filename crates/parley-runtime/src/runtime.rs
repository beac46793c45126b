//! Runtime orchestration.
//!
//! [`ParleyRuntime`] wires configuration, logging, the dispatch engine and the
//! attached connections together. Adapters feed it events; every event goes
//! through the engine first, and only events the engine passes through reach
//! the fallback listeners registered with [`ParleyRuntime::on_unhandled`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use parley_runtime::ParleyRuntime;
//!
//! // Auto-loads parley.toml from the current directory
//! let runtime = Arc::new(ParleyRuntime::new());
//! runtime.register_linked_catalog();
//!
//! runtime.attach_bot(bot).await?;
//! runtime.spawn_handle(event);
//!
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parley_core::{BoxedBot, ConnectionId, InboundEvent, NormalizedMessage, Scope};
use parley_framework::{CommandCatalog, DispatchEngine, LinkedCatalog, ScanReport};
use tokio::signal;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, ParleyConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::registry::{ConnectionRegistry, RuntimeStats};

/// A listener for events no command consumed.
pub type FallbackListener =
    Arc<dyn Fn(Arc<InboundEvent>) -> BoxFuture<'static, ()> + Send + Sync>;

/// The Parley runtime.
///
/// # Custom Configuration
///
/// ```rust,ignore
/// let runtime = ParleyRuntime::builder()
///     .config_file("config/parley.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct ParleyRuntime {
    config: ParleyConfig,
    engine: Arc<DispatchEngine>,
    connections: ConnectionRegistry,
    fallbacks: RwLock<Vec<FallbackListener>>,
    shutdown: CancellationToken,
}

impl ParleyRuntime {
    /// Creates a runtime from `parley.toml` in the current directory,
    /// falling back to defaults when it cannot be loaded.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                ParleyConfig::default()
            });

        Self::from_config(&config)
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration.
    ///
    /// Initializes logging unless a subscriber is already installed.
    pub fn from_config(config: &ParleyConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            commands_enabled = config.commands.enabled,
            failure_notice = config.commands.failure_notice,
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            engine: Arc::new(DispatchEngine::with_options(
                config.commands.to_engine_options(),
            )),
            connections: ConnectionRegistry::new(),
            fallbacks: RwLock::new(Vec::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    /// Returns the dispatch engine.
    ///
    /// Handlers that wait for follow-up messages hold a clone of it, or of
    /// its continuation table.
    pub fn engine(&self) -> &Arc<DispatchEngine> {
        &self.engine
    }

    /// Returns the connection registry.
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Returns whether a catalog has been scanned and the runtime has not
    /// been shut down.
    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers every command of `catalog`.
    pub fn register_catalog(&self, catalog: &dyn CommandCatalog) -> ScanReport {
        let report = self.engine.scan_catalog(catalog);
        info!(
            registered = report.registered,
            duplicates = report.duplicates,
            skipped = report.skipped,
            "Command catalog registered"
        );
        report
    }

    /// Registers every command collected in
    /// [`COMMAND_CATALOG`](parley_framework::COMMAND_CATALOG).
    pub fn register_linked_catalog(&self) -> ScanReport {
        self.register_catalog(&LinkedCatalog)
    }

    /// Adds a listener for events the dispatch engine passed through.
    ///
    /// Listeners run in registration order.
    pub async fn on_unhandled<F, Fut>(&self, listener: F)
    where
        F: Fn(Arc<InboundEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener: FallbackListener = Arc::new(move |event| listener(event).boxed());
        self.fallbacks.write().await.push(listener);
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Attaches a connection.
    pub async fn attach_bot(&self, bot: BoxedBot) -> RuntimeResult<ConnectionId> {
        self.connections.attach(bot).await
    }

    /// Detaches a connection and closes every conversation waiting on it.
    ///
    /// Returns the number of closed continuations.
    pub async fn detach_bot(&self, id: &ConnectionId) -> RuntimeResult<usize> {
        let bot = self.connections.detach(id).await?;
        let closed = self.engine.continuations().close_connection(id);
        if closed > 0 {
            debug!(connection = %id, closed, "Closed pending continuations");
        }
        bot.on_disconnect().await;
        Ok(closed)
    }

    // =========================================================================
    // Event handling
    // =========================================================================

    /// Dispatches `event`, then runs the fallback listeners if no command
    /// consumed it. Returns the dispatch result.
    pub async fn handle(&self, event: Arc<InboundEvent>) -> bool {
        let pass_through = self.engine.dispatch(Arc::clone(&event)).await;

        if pass_through {
            let listeners = self.fallbacks.read().await.clone();
            for listener in listeners {
                listener(Arc::clone(&event)).await;
            }
        }

        pass_through
    }

    /// Converts a flat record from an attached connection and handles it.
    ///
    /// Records that cannot be converted are logged and reported as passed
    /// through.
    pub async fn handle_normalized(&self, message: NormalizedMessage) -> RuntimeResult<bool> {
        let connection = ConnectionId::new(&message.connection);
        let bot = self
            .connections
            .get(&connection)
            .await
            .ok_or_else(|| RuntimeError::ConnectionNotFound(connection.to_string()))?;

        match message.into_event(bot) {
            Ok(event) => Ok(self.handle(Arc::new(event)).await),
            Err(e) => {
                error!(connection = %connection, error = %e, "Cannot dispatch inbound message");
                Ok(true)
            }
        }
    }

    /// Handles `event` on its own task.
    ///
    /// Adapters read loops use this so that a handler waiting for a
    /// follow-up message does not block delivery of that message.
    pub fn spawn_handle(self: &Arc<Self>, event: Arc<InboundEvent>) -> JoinHandle<bool> {
        let runtime = Arc::clone(self);
        tokio::spawn(async move { runtime.handle(event).await })
    }

    /// Returns current counts.
    pub async fn stats(&self) -> RuntimeStats {
        let registry = self.engine.registry();
        RuntimeStats {
            connections: self.connections.count().await,
            group_commands: registry.len(Scope::Group),
            private_commands: registry.len(Scope::Private),
            pending_continuations: self.engine.continuations().len(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Runs until Ctrl+C, SIGTERM or [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Parley runtime is now running. Press Ctrl+C to stop.");

        tokio::select! {
            _ = wait_for_signal() => {}
            _ = self.shutdown.cancelled() => {
                debug!("Shutdown requested");
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Runs until `shutdown` completes or [`shutdown`](Self::shutdown) is
    /// called.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {}
            _ = self.shutdown.cancelled() => {}
        }

        self.shutdown().await;
        Ok(())
    }

    /// Stops the engine, closes every pending continuation and detaches all
    /// connections. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.engine.shutdown();

        for (id, bot) in self.connections.drain().await {
            debug!(connection = %id, "Disconnecting");
            bot.on_disconnect().await;
        }

        info!("Runtime stopped");
    }

    /// Returns a token that is cancelled when the runtime shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

impl Default for ParleyRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for Ctrl+C or SIGTERM. Never completes if no handler can be
/// installed.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                if let Err(e) = signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                    futures::future::pending::<()>().await;
                }
                return;
            }
        };

        tokio::select! {
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Received Ctrl+C, shutting down"),
                    Err(e) => {
                        warn!(error = %e, "Failed to listen for Ctrl+C");
                        sigterm.recv().await;
                        info!("Received SIGTERM, shutting down");
                    }
                }
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                futures::future::pending::<()>().await;
            }
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`ParleyRuntime`] with custom configuration.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile.into());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: ParleyConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads and validates the configuration, then builds the runtime.
    pub fn build(self) -> RuntimeResult<ParleyRuntime> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(ParleyRuntime::from_config(&config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use parley_core::{ApiResult, Bot, GroupMessage, MemberRole, PrivateMessage};
    use parley_framework::{CommandHandler, CommandSpec, MatchFlags, MatchMode, WaitError};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct TestBot {
        id: &'static str,
        sent: Mutex<Vec<String>>,
        disconnected: AtomicBool,
    }

    impl TestBot {
        fn new(id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                sent: Mutex::new(Vec::new()),
                disconnected: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Bot for TestBot {
        fn id(&self) -> &str {
            self.id
        }

        async fn send(&self, _event: &InboundEvent, message: &str) -> ApiResult<String> {
            self.sent.lock().push(message.to_string());
            Ok("1".into())
        }

        async fn on_disconnect(&self) {
            self.disconnected.store(true, Ordering::SeqCst);
        }
    }

    fn runtime() -> Arc<ParleyRuntime> {
        Arc::new(
            ParleyRuntime::builder()
                .without_env()
                .search_path(std::env::temp_dir().join("parley-runtime-test-nonexistent"))
                .build()
                .unwrap(),
        )
    }

    fn private_event(bot: &Arc<TestBot>, text: &str) -> Arc<InboundEvent> {
        Arc::new(InboundEvent::private(
            PrivateMessage {
                connection: ConnectionId::new(bot.id),
                user_id: 42,
                text: text.into(),
            },
            Arc::clone(bot) as BoxedBot,
        ))
    }

    #[tokio::test]
    async fn test_fallback_runs_only_for_pass_through() {
        let runtime = runtime();
        runtime
            .engine()
            .register_private_command(
                CommandSpec::private("ping", ["ping"]),
                CommandHandler::from_fn(|event: &InboundEvent| {
                    event.stop_propagation();
                    Ok(())
                }),
            )
            .unwrap();

        let unhandled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&unhandled);
        runtime
            .on_unhandled(move |_event| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        let bot = TestBot::new("conn");
        assert!(!runtime.handle(private_event(&bot, "ping")).await);
        assert_eq!(unhandled.load(Ordering::SeqCst), 0);

        assert!(runtime.handle(private_event(&bot, "hello")).await);
        assert_eq!(unhandled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handle_normalized_requires_attached_connection() {
        let runtime = runtime();
        let message = NormalizedMessage {
            message_type: "group".into(),
            connection: "qq".into(),
            user_id: 1,
            group_id: Some(10),
            role: Some(MemberRole::Admin),
            text: "hi".into(),
        };

        assert!(matches!(
            runtime.handle_normalized(message.clone()).await,
            Err(RuntimeError::ConnectionNotFound(_))
        ));

        runtime.attach_bot(TestBot::new("qq")).await.unwrap();
        assert!(runtime.handle_normalized(message.clone()).await.unwrap());

        let bad = NormalizedMessage {
            message_type: "notice".into(),
            ..message
        };
        assert!(runtime.handle_normalized(bad).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_detach_closes_waiting_conversation() {
        let runtime = runtime();
        let bot = TestBot::new("conn");
        let id = runtime.attach_bot(Arc::clone(&bot) as BoxedBot).await.unwrap();

        let pending = runtime
            .engine()
            .expect_reply(&private_event(&bot, "start"), ["yes"], MatchMode::Full, MatchFlags::default())
            .unwrap();
        assert_eq!(runtime.stats().await.pending_continuations, 1);

        let waiter = tokio::spawn(pending.wait(Some(Duration::from_secs(5))));
        assert_eq!(runtime.detach_bot(&id).await.unwrap(), 1);

        assert!(matches!(waiter.await.unwrap(), Err(WaitError::Closed)));
        assert!(bot.disconnected.load(Ordering::SeqCst));
        assert_eq!(runtime.stats().await.connections, 0);
        assert_eq!(runtime.stats().await.pending_continuations, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawned_handler_resumed_by_next_message() {
        let runtime = runtime();
        let engine = Arc::clone(runtime.engine());
        runtime
            .engine()
            .register_group_command(
                CommandSpec::group("confirm", ["confirm"]),
                CommandHandler::from_async(move |event: Arc<InboundEvent>| {
                    let engine = Arc::clone(&engine);
                    async move {
                        event.reply("sure?").await?;
                        let answer = engine
                            .wait_for_next(
                                &event,
                                ["yes", "no"],
                                MatchMode::Full,
                                MatchFlags::default(),
                                Some(Duration::from_secs(5)),
                            )
                            .await?;
                        event.reply(&format!("got {}", answer.text())).await?;
                        Ok(())
                    }
                }),
            )
            .unwrap();

        let bot = TestBot::new("conn");
        let group_event = |text: &str| {
            Arc::new(InboundEvent::group(
                GroupMessage {
                    connection: ConnectionId::new("conn"),
                    group_id: 5,
                    user_id: 42,
                    role: None,
                    text: text.into(),
                },
                Arc::clone(&bot) as BoxedBot,
            ))
        };

        let first = runtime.spawn_handle(group_event("confirm"));
        for _ in 0..200 {
            if runtime.engine().continuations().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(!runtime.handle(group_event("yes")).await);
        first.await.unwrap();
        assert_eq!(*bot.sent.lock(), vec!["sure?".to_string(), "got yes".to_string()]);
    }

    #[tokio::test]
    async fn test_disabled_commands_pass_everything_through() {
        let runtime = ParleyRuntime::builder()
            .without_env()
            .search_path(std::env::temp_dir().join("parley-runtime-test-nonexistent"))
            .merge(ParleyConfig {
                commands: CommandConfig {
                    enabled: false,
                    ..Default::default()
                },
                ..Default::default()
            })
            .build()
            .unwrap();

        let report = runtime.register_catalog(&vec![parley_framework::CatalogEntry::free(
            CommandSpec::private("ping", ["ping"]),
            CommandHandler::from_fn(|_: &InboundEvent| Ok(())),
        )]);
        assert_eq!(report.registered, 0);
        assert!(!runtime.is_running());

        let bot = TestBot::new("conn");
        assert!(runtime.handle(private_event(&bot, "ping")).await);
    }

    #[tokio::test]
    async fn test_run_until_shuts_down() {
        let runtime = runtime();
        let bot = TestBot::new("conn");
        runtime.attach_bot(Arc::clone(&bot) as BoxedBot).await.unwrap();

        let token = runtime.shutdown_token();
        runtime.run_until(async {}).await.unwrap();

        assert!(token.is_cancelled());
        assert!(bot.disconnected.load(Ordering::SeqCst));
        assert_eq!(runtime.connections().count().await, 0);
    }
}
