//! Conversation continuations.
//!
//! A handler that needs the sender's next message registers a
//! [`ContinuationRequest`] and waits on the returned [`PendingContinuation`].
//! When a later event arrives on the same connection, from the same sender
//! (and, in groups, the same group) and matches the request's patterns, the
//! dispatch engine hands it to the waiter instead of running commands.
//!
//! # Lifecycle
//!
//! ```text
//!  waiter                         ContinuationTable                 engine
//!    │ register(request) ──────────▶ insert(id)
//!    │ wait(timeout) ...                 │
//!    │                                   │◀──────────── resolve(event)
//!    │                                   │  CAS slot, notify
//!    │◀──────────────────────── event ───┘
//!    │ drop(PendingContinuation) ──▶ remove(id)
//! ```
//!
//! The engine never removes entries. The waiter's guard does, whether the
//! wait ended with an event, a timeout, a close or a cancelled future.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{WaitError, WaitResult};
use crate::pattern::{MatchFlags, MatchMode, PatternSet};
use parley_core::{ConnectionId, InboundEvent, MessageSource, Scope};

#[derive(Default)]
struct Delivery {
    version: u64,
    event: Option<Arc<InboundEvent>>,
    closed: bool,
}

/// A request for the next correlated message.
pub struct ContinuationRequest {
    id: Uuid,
    connection: ConnectionId,
    source: MessageSource,
    patterns: PatternSet,
    slot: Mutex<Delivery>,
    signal: Notify,
}

impl ContinuationRequest {
    /// Creates a request for messages from `source` on `connection`.
    pub fn new(connection: ConnectionId, source: MessageSource, patterns: PatternSet) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection,
            source,
            patterns,
            slot: Mutex::new(Delivery::default()),
            signal: Notify::new(),
        }
    }

    /// Creates a request for the next message from the sender of `event`.
    pub fn for_event(event: &InboundEvent, patterns: PatternSet) -> Self {
        Self::new(event.connection().clone(), event.source(), patterns)
    }

    /// Returns the correlation id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the connection the request is bound to.
    pub fn connection(&self) -> &ConnectionId {
        &self.connection
    }

    /// Returns the sender identity the request is bound to.
    pub fn source(&self) -> MessageSource {
        self.source
    }

    /// Returns `true` if `event` should resume this request.
    ///
    /// Group events must come from the same group; private events are
    /// correlated on the sender alone.
    pub fn matches(&self, event: &InboundEvent) -> bool {
        if self.connection != *event.connection() || self.source.user_id != event.user_id() {
            return false;
        }
        if event.scope() == Scope::Group && self.source.group_id != event.group_id() {
            return false;
        }
        self.patterns.is_match(event.text())
    }

    /// Returns the current slot version.
    pub fn version(&self) -> u64 {
        self.slot.lock().version
    }

    /// Returns the last delivered event, if any.
    pub fn latest(&self) -> Option<Arc<InboundEvent>> {
        self.slot.lock().event.clone()
    }

    /// Returns `true` once the request has been closed.
    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    /// Stores `event` if the slot is still at version `expected`.
    ///
    /// Returns `false` if another delivery or a close got there first.
    fn compare_and_deliver(&self, expected: u64, event: Arc<InboundEvent>) -> bool {
        let mut slot = self.slot.lock();
        if slot.closed || slot.version != expected {
            return false;
        }
        slot.version += 1;
        slot.event = Some(event);
        true
    }

    fn release(&self) {
        self.signal.notify_one();
    }

    fn close(&self) {
        {
            let mut slot = self.slot.lock();
            slot.closed = true;
            slot.version += 1;
        }
        self.release();
    }
}

impl fmt::Debug for ContinuationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationRequest")
            .field("id", &self.id)
            .field("connection", &self.connection)
            .field("source", &self.source)
            .field("patterns", &self.patterns)
            .finish()
    }
}

// ============================================================================
// ContinuationTable
// ============================================================================

/// Outstanding continuation requests, keyed by correlation id.
#[derive(Clone, Default)]
pub struct ContinuationTable {
    entries: Arc<DashMap<Uuid, Arc<ContinuationRequest>>>,
}

impl ContinuationTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `request` and returns the guard the waiter holds.
    pub fn register(&self, request: ContinuationRequest) -> PendingContinuation {
        let request = Arc::new(request);
        trace!(id = %request.id, connection = %request.connection, "Continuation registered");
        self.entries.insert(request.id, Arc::clone(&request));
        PendingContinuation {
            entries: Arc::clone(&self.entries),
            request,
        }
    }

    /// Registers a request for the next message from the sender of `event`
    /// matching `patterns`.
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
        let patterns = PatternSet::compile(patterns, mode, flags)?;
        Ok(self.register(ContinuationRequest::for_event(event, patterns)))
    }

    /// Waits for the next message from the sender of `event` matching
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
        self.expect_reply(event, patterns, mode, flags)?
            .wait(timeout)
            .await
    }

    /// Hands `event` to every request it matches and wakes their waiters.
    ///
    /// Returns the number of matching requests. Closed requests are ignored.
    /// A request whose slot changed between matching and delivery is not
    /// updated, but is still counted and woken.
    pub fn resolve(&self, event: &Arc<InboundEvent>) -> usize {
        let matched: Vec<(Arc<ContinuationRequest>, u64)> = self
            .entries
            .iter()
            .filter(|entry| !entry.value().is_closed() && entry.value().matches(event))
            .map(|entry| {
                let request = Arc::clone(entry.value());
                let version = request.version();
                (request, version)
            })
            .collect();

        for (request, version) in &matched {
            if !request.compare_and_deliver(*version, Arc::clone(event)) {
                debug!(id = %request.id, "Continuation slot changed concurrently, delivery skipped");
            }
            request.release();
        }

        matched.len()
    }

    /// Closes every request bound to `connection`. Returns how many.
    pub fn close_connection(&self, connection: &ConnectionId) -> usize {
        let mut closed = 0;
        for entry in self.entries.iter() {
            if entry.value().connection == *connection {
                entry.value().close();
                closed += 1;
            }
        }
        if closed > 0 {
            debug!(connection = %connection, closed, "Closed continuations for connection");
        }
        closed
    }

    /// Closes every outstanding request.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for entry in self.entries.iter() {
            entry.value().close();
            closed += 1;
        }
        closed
    }

    /// Returns `true` if a request with `id` is outstanding.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns the number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no request is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ContinuationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationTable")
            .field("outstanding", &self.len())
            .finish()
    }
}

// ============================================================================
// PendingContinuation
// ============================================================================

/// The waiter's handle on a registered request.
///
/// Dropping it removes the request from the table.
pub struct PendingContinuation {
    entries: Arc<DashMap<Uuid, Arc<ContinuationRequest>>>,
    request: Arc<ContinuationRequest>,
}

impl PendingContinuation {
    /// Returns the correlation id.
    pub fn id(&self) -> Uuid {
        self.request.id
    }

    /// Returns the underlying request.
    pub fn request(&self) -> &ContinuationRequest {
        &self.request
    }

    /// Waits for a correlated event.
    ///
    /// With `timeout` set, gives up with [`WaitError::Timeout`] once it
    /// elapses. A closed request yields [`WaitError::Closed`].
    pub async fn wait(self, timeout: Option<Duration>) -> WaitResult<Arc<InboundEvent>> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            {
                let mut slot = self.request.slot.lock();
                if let Some(event) = slot.event.take() {
                    return Ok(event);
                }
                if slot.closed {
                    return Err(WaitError::Closed);
                }
            }

            // A permit stored by a release before this point is consumed here.
            let notified = self.request.signal.notified();
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, notified)
                    .await
                    .map_err(|_| WaitError::Timeout)?,
                None => notified.await,
            }
        }
    }

    /// Blocks the current thread until a correlated event arrives.
    ///
    /// For synchronous handlers, which run on Tokio's blocking pool. Fails
    /// with [`WaitError::NoRuntime`] outside a runtime.
    pub fn blocking_wait(self, timeout: Option<Duration>) -> WaitResult<Arc<InboundEvent>> {
        let handle = Handle::try_current().map_err(|_| WaitError::NoRuntime)?;
        handle.block_on(self.wait(timeout))
    }
}

impl Drop for PendingContinuation {
    fn drop(&mut self) {
        self.entries.remove(&self.request.id);
        trace!(id = %self.request.id, "Continuation removed");
    }
}

impl fmt::Debug for PendingContinuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PendingContinuation")
            .field(&self.request.id)
            .finish()
    }
}
