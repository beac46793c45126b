//! Bulk registration from a [`CommandCatalog`].
//!
//! A bad declaration never aborts a scan: it is logged and skipped, and the
//! rest of the catalog is still registered.

use tracing::{debug, warn};

use crate::catalog::{CatalogEntry, CommandCatalog};
use crate::error::{RegistrationError, RegistrationResult};
use crate::instance::HandlerInstanceCache;
use crate::registry::{CommandRegistry, RegisterOutcome};

/// Counts from one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Newly registered commands.
    pub registered: usize,
    /// Declarations already present.
    pub duplicates: usize,
    /// Declarations rejected with an error.
    pub skipped: usize,
}

/// Registers catalog entries into a registry.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationScanner<'a> {
    registry: &'a CommandRegistry,
    instances: &'a HandlerInstanceCache,
}

impl<'a> RegistrationScanner<'a> {
    /// Creates a scanner over `registry`, constructing owner instances
    /// through `instances`.
    pub fn new(registry: &'a CommandRegistry, instances: &'a HandlerInstanceCache) -> Self {
        Self {
            registry,
            instances,
        }
    }

    /// Registers one entry.
    ///
    /// Owner-bound entries have their instance created eagerly, so a broken
    /// owner is reported here rather than on first dispatch.
    pub fn register_entry(&self, entry: CatalogEntry) -> RegistrationResult<RegisterOutcome> {
        let CatalogEntry {
            spec,
            owner,
            handler,
        } = entry;

        let descriptor =
            spec.compile(owner, handler)
                .map_err(|source| RegistrationError::Pattern {
                    command: spec.name.clone(),
                    source,
                })?;

        if let Some(owner) = &descriptor.owner {
            self.instances
                .get_or_create(owner)
                .map_err(|source| RegistrationError::Instance {
                    command: spec.name.clone(),
                    source,
                })?;
        }

        Ok(self.registry.register(descriptor))
    }

    /// Registers every entry of `catalog`.
    pub fn scan(&self, catalog: &dyn CommandCatalog) -> ScanReport {
        let mut report = ScanReport::default();

        for entry in catalog.entries() {
            let name = entry.spec.name.clone();
            let scope = entry.spec.scope;
            let priority = entry.spec.priority;

            match self.register_entry(entry) {
                Ok(RegisterOutcome::Registered) => {
                    debug!(command = %name, %scope, priority, "Registered command");
                    report.registered += 1;
                }
                Ok(RegisterOutcome::Disabled) => {
                    debug!(command = %name, "Command engine disabled");
                    report.skipped += 1;
                }
                Ok(RegisterOutcome::Duplicate) => {
                    debug!(command = %name, %scope, "Command already registered");
                    report.duplicates += 1;
                }
                Err(e) => {
                    warn!(command = %name, error = %e, "Skipping command declaration");
                    report.skipped += 1;
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::CommandSpec;
    use crate::handler::CommandHandler;
    use crate::instance::{CommandGroup, OwnerType};
    use crate::pattern::MatchMode;
    use parley_core::Scope;

    struct Broken;

    impl CommandGroup for Broken {
        fn create() -> anyhow::Result<Self> {
            anyhow::bail!("missing token")
        }
    }

    #[derive(Default)]
    struct Working;

    fn noop() -> CommandHandler {
        CommandHandler::from_fn(|_| Ok(()))
    }

    fn catalog() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry::free(CommandSpec::group("ok", ["ok"]), noop()),
            CatalogEntry::free(CommandSpec::group("empty", Vec::<String>::new()), noop()),
            CatalogEntry::free(
                CommandSpec::private("bad", ["("]).mode(MatchMode::Regex),
                noop(),
            ),
            CatalogEntry::bound::<Broken>(CommandSpec::group("broken", ["b"]), noop()),
            CatalogEntry::with_owner(
                CommandSpec::private("working", ["w"]),
                OwnerType::of_default::<Working>(),
                noop(),
            ),
        ]
    }

    #[test]
    fn test_scan_skips_bad_entries_and_continues() {
        let registry = CommandRegistry::new();
        let instances = HandlerInstanceCache::new();
        let report = RegistrationScanner::new(&registry, &instances).scan(&catalog());

        assert_eq!(
            report,
            ScanReport {
                registered: 2,
                duplicates: 0,
                skipped: 3,
            }
        );
        assert_eq!(registry.len(Scope::Group), 1);
        assert_eq!(registry.len(Scope::Private), 1);
        assert!(instances.get::<Working>().is_some());
    }

    #[test]
    fn test_rescan_is_idempotent() {
        let registry = CommandRegistry::new();
        let instances = HandlerInstanceCache::new();
        let scanner = RegistrationScanner::new(&registry, &instances);

        scanner.scan(&catalog());
        let again = scanner.scan(&catalog());

        assert_eq!(again.registered, 0);
        assert_eq!(again.duplicates, 2);
        assert_eq!(registry.len(Scope::Group), 1);
    }

    #[test]
    fn test_register_entry_reports_cause() {
        let registry = CommandRegistry::new();
        let instances = HandlerInstanceCache::new();
        let scanner = RegistrationScanner::new(&registry, &instances);

        let err = scanner
            .register_entry(CatalogEntry::bound::<Broken>(
                CommandSpec::group("broken", ["b"]),
                noop(),
            ))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Instance { command, .. } if command == "broken"));
        assert!(registry.is_empty());
    }
}
