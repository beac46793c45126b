//! The command registry.
//!
//! Commands are kept in two independent collections, one per [`Scope`].
//! Each collection is an `Arc<Vec<_>>` behind a lock: registration replaces
//! it copy-on-write, while dispatch clones the `Arc` and matches against a
//! snapshot without holding the lock.

use std::cmp::Reverse;
use std::sync::Arc;

use parking_lot::RwLock;
use parley_core::{InboundEvent, Scope};

use crate::descriptor::CommandDescriptor;

type Commands = Arc<Vec<Arc<CommandDescriptor>>>;

/// Result of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The descriptor was appended.
    Registered,
    /// An identical descriptor was already present; nothing changed.
    Duplicate,
    /// The engine is disabled; nothing was registered.
    Disabled,
}

/// Scope-separated command storage.
#[derive(Default)]
pub struct CommandRegistry {
    group: RwLock<Commands>,
    private: RwLock<Commands>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, scope: Scope) -> &RwLock<Commands> {
        match scope {
            Scope::Group => &self.group,
            Scope::Private => &self.private,
        }
    }

    /// Appends `descriptor` to its scope, unless an identical one exists.
    pub fn register(&self, descriptor: CommandDescriptor) -> RegisterOutcome {
        let mut commands = self.slot(descriptor.scope).write();

        if commands.iter().any(|c| c.is_same_declaration(&descriptor)) {
            return RegisterOutcome::Duplicate;
        }

        Arc::make_mut(&mut *commands).push(Arc::new(descriptor));
        RegisterOutcome::Registered
    }

    /// Returns the commands of the event's scope whose patterns match its
    /// text, highest priority first. Equal priorities keep registration
    /// order.
    pub fn match_candidates(&self, event: &InboundEvent) -> Vec<Arc<CommandDescriptor>> {
        let snapshot = self.commands(event.scope());
        let text = event.text();

        let mut candidates: Vec<_> = snapshot
            .iter()
            .filter(|c| c.matches(text))
            .cloned()
            .collect();
        candidates.sort_by_key(|c| Reverse(c.priority));
        candidates
    }

    /// Returns a snapshot of the commands registered for `scope`.
    pub fn commands(&self, scope: Scope) -> Commands {
        Arc::clone(&*self.slot(scope).read())
    }

    /// Returns the number of commands registered for `scope`.
    pub fn len(&self, scope: Scope) -> usize {
        self.slot(scope).read().len()
    }

    /// Returns `true` if neither scope has commands.
    pub fn is_empty(&self) -> bool {
        self.group.read().is_empty() && self.private.read().is_empty()
    }

    /// Removes every command.
    pub fn clear(&self) {
        *self.group.write() = Commands::default();
        *self.private.write() = Commands::default();
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("group", &self.len(Scope::Group))
            .field("private", &self.len(Scope::Private))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::CommandSpec;
    use crate::handler::CommandHandler;
    use crate::pattern::MatchMode;
    use async_trait::async_trait;
    use parley_core::{ApiResult, Bot, ConnectionId, GroupMessage, PrivateMessage};

    struct NullBot;

    #[async_trait]
    impl Bot for NullBot {
        fn id(&self) -> &str {
            "null"
        }

        async fn send(&self, _event: &InboundEvent, _message: &str) -> ApiResult<String> {
            Ok(String::new())
        }
    }

    fn group_event(text: &str) -> InboundEvent {
        InboundEvent::group(
            GroupMessage {
                connection: ConnectionId::new("c"),
                group_id: 10,
                user_id: 1,
                role: None,
                text: text.into(),
            },
            Arc::new(NullBot),
        )
    }

    fn private_event(text: &str) -> InboundEvent {
        InboundEvent::private(
            PrivateMessage {
                connection: ConnectionId::new("c"),
                user_id: 1,
                text: text.into(),
            },
            Arc::new(NullBot),
        )
    }

    fn descriptor(spec: CommandSpec) -> CommandDescriptor {
        spec.compile(None, CommandHandler::from_fn(|_| Ok(())))
            .unwrap()
    }

    fn names(candidates: &[Arc<CommandDescriptor>]) -> Vec<&str> {
        candidates.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_candidates_sorted_by_priority_then_registration() {
        let registry = CommandRegistry::new();
        registry.register(descriptor(CommandSpec::group("low", ["x"]).priority(1)));
        registry.register(descriptor(CommandSpec::group("first", ["x"]).priority(5)));
        registry.register(descriptor(
            CommandSpec::group("any", ["."]).mode(MatchMode::Regex).priority(9),
        ));
        registry.register(descriptor(
            CommandSpec::group("second", ["x"]).description("2").priority(5),
        ));
        registry.register(descriptor(CommandSpec::group("other", ["y"]).priority(100)));

        let candidates = registry.match_candidates(&group_event("x"));
        assert_eq!(names(&candidates), vec!["any", "first", "second", "low"]);
        assert!(candidates.windows(2).all(|w| w[0].priority >= w[1].priority));
    }

    #[test]
    fn test_scopes_are_independent() {
        let registry = CommandRegistry::new();
        registry.register(descriptor(CommandSpec::group("g", ["hi"])));
        registry.register(descriptor(CommandSpec::private("p", ["hi"])));

        assert_eq!(names(&registry.match_candidates(&group_event("hi"))), vec!["g"]);
        assert_eq!(names(&registry.match_candidates(&private_event("hi"))), vec!["p"]);
        assert_eq!(registry.len(Scope::Group), 1);
        assert_eq!(registry.len(Scope::Private), 1);
    }

    #[test]
    fn test_duplicate_registration_is_noop() {
        let registry = CommandRegistry::new();
        let spec = CommandSpec::group("ping", ["ping"]).description("pong");

        assert_eq!(registry.register(descriptor(spec.clone())), RegisterOutcome::Registered);
        assert_eq!(registry.register(descriptor(spec)), RegisterOutcome::Duplicate);
        assert_eq!(registry.match_candidates(&group_event("ping")).len(), 1);
    }

    #[test]
    fn test_snapshot_survives_registration() {
        let registry = CommandRegistry::new();
        registry.register(descriptor(CommandSpec::group("a", ["a"])));

        let snapshot = registry.commands(Scope::Group);
        registry.register(descriptor(CommandSpec::group("b", ["b"])));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(Scope::Group), 2);
    }

    #[test]
    fn test_clear() {
        let registry = CommandRegistry::new();
        registry.register(descriptor(CommandSpec::private("a", ["a"])));
        assert!(!registry.is_empty());
        registry.clear();
        assert!(registry.is_empty());
    }
}
