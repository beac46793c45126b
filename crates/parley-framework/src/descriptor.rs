//! Command declarations and their compiled form.
//!
//! A [`CommandSpec`] is what a command author writes: raw patterns plus
//! metadata. Compiling it together with a handler yields the
//! [`CommandDescriptor`] stored by the registry.

use parley_core::{MemberRole, Scope};

use crate::error::PatternResult;
use crate::handler::CommandHandler;
use crate::instance::OwnerType;
use crate::pattern::{MatchFlags, MatchMode, PatternSet};

/// Metadata of a command declaration, before compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Handler name, used in logs.
    pub name: String,
    /// Human-readable description. An empty description suppresses the
    /// failure notice.
    pub description: String,
    /// Raw patterns, at least one.
    pub patterns: Vec<String>,
    /// How the raw patterns are expanded.
    pub mode: MatchMode,
    /// Regex options.
    pub flags: MatchFlags,
    /// Which conversations the command applies to.
    pub scope: Scope,
    /// Minimum sender role. Only meaningful for group commands.
    pub min_role: Option<MemberRole>,
    /// Higher runs first.
    pub priority: i32,
}

impl CommandSpec {
    /// A group command in [`MatchMode::Full`] with default priority.
    pub fn group<I, S>(name: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, patterns, Scope::Group)
    }

    /// A private command in [`MatchMode::Full`] with default priority.
    pub fn private<I, S>(name: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(name, patterns, Scope::Private)
    }

    fn new<I, S>(name: impl Into<String>, patterns: I, scope: Scope) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: String::new(),
            patterns: patterns.into_iter().map(Into::into).collect(),
            mode: MatchMode::default(),
            flags: MatchFlags::default(),
            scope,
            min_role: None,
            priority: 0,
        }
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the match mode.
    pub fn mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the regex options.
    pub fn flags(mut self, flags: MatchFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the minimum sender role.
    pub fn min_role(mut self, role: MemberRole) -> Self {
        self.min_role = Some(role);
        self
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Compiles the patterns and binds the handler.
    pub fn compile(
        &self,
        owner: Option<OwnerType>,
        handler: CommandHandler,
    ) -> PatternResult<CommandDescriptor> {
        let patterns = PatternSet::compile(&self.patterns, self.mode, self.flags)?;

        Ok(CommandDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            patterns,
            scope: self.scope,
            min_role: match self.scope {
                Scope::Group => self.min_role,
                Scope::Private => None,
            },
            priority: self.priority,
            owner,
            handler,
        })
    }
}

/// A compiled, registered command.
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    /// Handler name, used in logs.
    pub name: String,
    /// Human-readable description; may be empty.
    pub description: String,
    /// Compiled patterns; never empty.
    pub patterns: PatternSet,
    /// Which registry the command lives in.
    pub scope: Scope,
    /// Minimum sender role; always `None` for private commands.
    pub min_role: Option<MemberRole>,
    /// Higher runs first.
    pub priority: i32,
    /// Owner type of a bound handler.
    pub owner: Option<OwnerType>,
    /// The command logic.
    pub handler: CommandHandler,
}

impl CommandDescriptor {
    /// Returns `true` if `text` matches any pattern.
    pub fn matches(&self, text: &str) -> bool {
        self.patterns.is_match(text)
    }

    /// Returns `true` if `role` satisfies the threshold.
    ///
    /// A missing threshold admits everyone.
    pub fn permits(&self, role: MemberRole) -> bool {
        self.min_role.is_none_or(|min| role >= min)
    }

    /// Structural identity used to ignore repeated registrations.
    pub(crate) fn is_same_declaration(&self, other: &Self) -> bool {
        self.description == other.description
            && self.patterns == other.patterns
            && self.scope == other.scope
            && self.owner == other.owner
            && self.priority == other.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PatternError;

    fn noop() -> CommandHandler {
        CommandHandler::from_fn(|_| Ok(()))
    }

    #[test]
    fn test_builder_defaults() {
        let spec = CommandSpec::group("ping", ["ping"]);
        assert_eq!(spec.mode, MatchMode::Full);
        assert_eq!(spec.priority, 0);
        assert_eq!(spec.scope, Scope::Group);
        assert!(spec.description.is_empty());
        assert!(spec.min_role.is_none());
    }

    #[test]
    fn test_compile_rejects_empty_patterns() {
        let spec = CommandSpec::group("nothing", Vec::<String>::new());
        let err = spec.compile(None, noop()).unwrap_err();
        assert!(matches!(err, PatternError::Empty));
    }

    #[test]
    fn test_private_commands_drop_role_threshold() {
        let spec = CommandSpec::private("secret", ["s"]).min_role(MemberRole::Owner);
        let descriptor = spec.compile(None, noop()).unwrap();
        assert!(descriptor.min_role.is_none());
        assert!(descriptor.permits(MemberRole::Member));
    }

    #[test]
    fn test_role_threshold() {
        let descriptor = CommandSpec::group("ban", ["ban"])
            .min_role(MemberRole::Admin)
            .compile(None, noop())
            .unwrap();
        assert!(!descriptor.permits(MemberRole::Member));
        assert!(descriptor.permits(MemberRole::Admin));
        assert!(descriptor.permits(MemberRole::Owner));
    }

    #[test]
    fn test_same_declaration_ignores_handler_and_name() {
        let a = CommandSpec::group("a", ["x"])
            .description("d")
            .compile(None, noop())
            .unwrap();
        let b = CommandSpec::group("b", ["x"])
            .description("d")
            .compile(None, noop())
            .unwrap();
        let c = CommandSpec::group("a", ["x"])
            .description("d")
            .priority(1)
            .compile(None, noop())
            .unwrap();

        assert!(a.is_same_declaration(&b));
        assert!(!a.is_same_declaration(&c));
    }
}
