//! Registry of attached peer connections.
//!
//! Adapters attach a [`Bot`](parley_core::Bot) when a connection is
//! established and detach it when the connection drops. Detaching is what
//! lets the runtime close every continuation still waiting on that peer.

use std::collections::HashMap;
use std::sync::Arc;

use parley_core::{BoxedBot, ConnectionId};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{RuntimeError, RuntimeResult};

/// Map of connection id to the bot serving it.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    bots: Arc<RwLock<HashMap<ConnectionId, BoxedBot>>>,
}

impl ConnectionRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a bot under its own id.
    pub async fn attach(&self, bot: BoxedBot) -> RuntimeResult<ConnectionId> {
        let id = ConnectionId::new(bot.id());
        let mut bots = self.bots.write().await;

        if bots.contains_key(&id) {
            return Err(RuntimeError::ConnectionExists(id.to_string()));
        }

        info!(connection = %id, "Attached connection");
        bots.insert(id.clone(), bot);
        Ok(id)
    }

    /// Detaches a connection, returning its bot.
    pub async fn detach(&self, id: &ConnectionId) -> RuntimeResult<BoxedBot> {
        let mut bots = self.bots.write().await;
        match bots.remove(id) {
            Some(bot) => {
                info!(connection = %id, "Detached connection");
                Ok(bot)
            }
            None => Err(RuntimeError::ConnectionNotFound(id.to_string())),
        }
    }

    /// Removes every connection, returning their bots.
    pub async fn drain(&self) -> Vec<(ConnectionId, BoxedBot)> {
        let mut bots = self.bots.write().await;
        debug!("Draining {} connection(s)", bots.len());
        bots.drain().collect()
    }

    /// Gets the bot attached under `id`.
    pub async fn get(&self, id: &ConnectionId) -> Option<BoxedBot> {
        let bots = self.bots.read().await;
        bots.get(id).cloned()
    }

    /// Returns all attached connection ids, sorted.
    pub async fn ids(&self) -> Vec<ConnectionId> {
        let bots = self.bots.read().await;
        let mut ids: Vec<_> = bots.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of attached connections.
    pub async fn count(&self) -> usize {
        let bots = self.bots.read().await;
        bots.len()
    }
}

/// Point-in-time counts reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Attached connections.
    pub connections: usize,
    /// Registered group commands.
    pub group_commands: usize,
    /// Registered private commands.
    pub private_commands: usize,
    /// Continuations currently waiting.
    pub pending_continuations: usize,
}

impl std::fmt::Display for RuntimeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Connections: {}, commands: {} group / {} private, {} pending continuation(s)",
            self.connections, self.group_commands, self.private_commands, self.pending_continuations
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::{ApiResult, Bot, InboundEvent};

    struct NamedBot(&'static str);

    #[async_trait]
    impl Bot for NamedBot {
        fn id(&self) -> &str {
            self.0
        }

        async fn send(&self, _event: &InboundEvent, _message: &str) -> ApiResult<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_attach_and_detach() {
        let registry = ConnectionRegistry::new();
        let id = registry.attach(Arc::new(NamedBot("qq-1"))).await.unwrap();
        registry.attach(Arc::new(NamedBot("qq-2"))).await.unwrap();

        assert_eq!(registry.count().await, 2);
        assert_eq!(registry.ids().await, vec![ConnectionId::from("qq-1"), ConnectionId::from("qq-2")]);
        assert!(registry.get(&id).await.is_some());

        let bot = registry.detach(&id).await.unwrap();
        assert_eq!(bot.id(), "qq-1");
        assert!(registry.get(&id).await.is_none());
        assert!(matches!(
            registry.detach(&id).await,
            Err(RuntimeError::ConnectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_attach_rejected() {
        let registry = ConnectionRegistry::new();
        registry.attach(Arc::new(NamedBot("qq-1"))).await.unwrap();
        assert!(matches!(
            registry.attach(Arc::new(NamedBot("qq-1"))).await,
            Err(RuntimeError::ConnectionExists(id)) if id == "qq-1"
        ));
        assert_eq!(registry.count().await, 1);
    }

    #[test]
    fn test_stats_display() {
        let stats = RuntimeStats {
            connections: 1,
            group_commands: 3,
            private_commands: 2,
            pending_continuations: 0,
        };
        assert_eq!(
            stats.to_string(),
            "Connections: 1, commands: 3 group / 2 private, 0 pending continuation(s)"
        );
    }
}
