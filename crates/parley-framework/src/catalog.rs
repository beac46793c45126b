//! Command catalogs.
//!
//! A catalog is an opaque provider of command declarations: what the
//! command looks like ([`CommandSpec`]), which owner type it is bound to,
//! and the handler. The engine does not care how entries were discovered.
//!
//! Two providers come built in:
//! - any `Vec` or slice of [`CatalogEntry`],
//! - [`LinkedCatalog`], which collects entries contributed anywhere in the
//!   final binary through the [`COMMAND_CATALOG`] distributed slice.
//!
//! ```rust,ignore
//! use parley_framework::{CatalogEntry, CommandHandler, CommandSpec, COMMAND_CATALOG};
//! use parley_framework::linkme::distributed_slice;
//!
//! #[distributed_slice(COMMAND_CATALOG)]
//! #[linkme(crate = parley_framework::linkme)]
//! static PING: fn() -> CatalogEntry = || {
//!     CatalogEntry::free(
//!         CommandSpec::group("ping", ["ping"]).description("replies pong"),
//!         CommandHandler::from_async(|event| async move {
//!             event.reply("pong").await?;
//!             Ok(())
//!         }),
//!     )
//! };
//! ```

use linkme::distributed_slice;

use crate::descriptor::CommandSpec;
use crate::handler::CommandHandler;
use crate::instance::{CommandGroup, OwnerType};

/// One command declaration.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Declaration metadata.
    pub spec: CommandSpec,
    /// Owner type for bound handlers.
    pub owner: Option<OwnerType>,
    /// The command logic.
    pub handler: CommandHandler,
}

impl CatalogEntry {
    /// A free-standing command.
    pub fn free(spec: CommandSpec, handler: CommandHandler) -> Self {
        Self {
            spec,
            owner: None,
            handler,
        }
    }

    /// A command bound to the shared instance of `T`.
    pub fn bound<T: CommandGroup>(spec: CommandSpec, handler: CommandHandler) -> Self {
        Self {
            spec,
            owner: Some(OwnerType::of::<T>()),
            handler,
        }
    }

    /// A command bound to an explicitly described owner.
    pub fn with_owner(spec: CommandSpec, owner: OwnerType, handler: CommandHandler) -> Self {
        Self {
            spec,
            owner: Some(owner),
            handler,
        }
    }
}

/// A source of command declarations.
pub trait CommandCatalog {
    /// Returns every declaration, in the order they should be registered.
    fn entries(&self) -> Vec<CatalogEntry>;
}

impl CommandCatalog for [CatalogEntry] {
    fn entries(&self) -> Vec<CatalogEntry> {
        self.to_vec()
    }
}

impl CommandCatalog for Vec<CatalogEntry> {
    fn entries(&self) -> Vec<CatalogEntry> {
        self.clone()
    }
}

/// Declarations contributed at link time.
#[distributed_slice]
pub static COMMAND_CATALOG: [fn() -> CatalogEntry];

/// The catalog backed by [`COMMAND_CATALOG`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkedCatalog;

impl CommandCatalog for LinkedCatalog {
    fn entries(&self) -> Vec<CatalogEntry> {
        COMMAND_CATALOG.iter().map(|make| make()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[distributed_slice(COMMAND_CATALOG)]
    static LINKED_PING: fn() -> CatalogEntry = || {
        CatalogEntry::free(
            CommandSpec::private("linked_ping", ["ping"]),
            CommandHandler::from_fn(|_| Ok(())),
        )
    };

    struct Greeter;

    impl CommandGroup for Greeter {
        fn create() -> anyhow::Result<Self> {
            Ok(Greeter)
        }
    }

    #[test]
    fn test_linked_catalog_collects_entries() {
        let entries = LinkedCatalog.entries();
        assert!(entries.iter().any(|e| e.spec.name == "linked_ping"));
    }

    #[test]
    fn test_vec_catalog_preserves_order() {
        let catalog = vec![
            CatalogEntry::free(
                CommandSpec::group("a", ["a"]),
                CommandHandler::from_fn(|_| Ok(())),
            ),
            CatalogEntry::bound::<Greeter>(
                CommandSpec::group("b", ["b"]),
                CommandHandler::method(|_: &Greeter, _| Ok(())),
            ),
        ];

        let entries = catalog.entries();
        assert_eq!(entries[0].spec.name, "a");
        assert_eq!(entries[1].owner, Some(OwnerType::of::<Greeter>()));
        assert_eq!(catalog[..].entries().len(), 2);
    }
}
