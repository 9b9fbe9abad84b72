//! Process-wide registry mapping identifiers to live data.
//!
//! Containers register under their type name ("mag"); each of their
//! components is independently resolvable as `type.component`
//! ("mag.bx"); standalone series register under any bare or dotted
//! identifier. A later stash of the same identifier overwrites the
//! entry.
//!
//! When persistence is enabled, every stash also triggers a best-effort
//! flush through the [`PartitionStore`]. Flush failures are logged and
//! swallowed: registration in memory always succeeds, and the next
//! stash retries the write.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::warn;

use crate::container::DataContainer;
use crate::series::{SeriesHandle, TaggedSeries};
use crate::store::{LoadReport, LoadedEntry, PartitionStore};

/// Shared handle to a registered container.
pub type ContainerHandle = Rc<RefCell<dyn DataContainer>>;

/// A registered entry: a whole container or a single series.
#[derive(Debug, Clone)]
pub enum RegistryEntry {
    /// A container registered under its type name.
    Container(ContainerHandle),
    /// A series registered under a bare or dotted identifier.
    Series(SeriesHandle),
}

/// The registry itself.
#[derive(Debug, Default)]
pub struct VariableRegistry {
    entries: BTreeMap<String, RegistryEntry>,
    store: Option<PartitionStore>,
}

impl VariableRegistry {
    /// Empty registry with persistence disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a partition store is attached.
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// The attached partition store, if any.
    pub fn store(&self) -> Option<&PartitionStore> {
        self.store.as_ref()
    }

    /// Register a container under its data type.
    pub fn stash_container<C: DataContainer + 'static>(&mut self, container: C) -> ContainerHandle {
        let handle: ContainerHandle = Rc::new(RefCell::new(container));
        self.stash_container_handle(handle)
    }

    /// Register an already-shared container handle under its data type.
    ///
    /// The container is flushed best-effort when persistence is on, and
    /// every component is indexed under `type.component`.
    pub fn stash_container_handle(&mut self, handle: ContainerHandle) -> ContainerHandle {
        let ident = handle.borrow().data_type().to_owned();

        if let Some(store) = self.store.as_mut() {
            let container = handle.borrow();
            if let Err(err) = store.flush_container(&ident, &*container) {
                warn!("flush of {ident} failed; in-memory state unaffected: {err}");
            }
        }

        self.index_container(&ident, &handle);
        self.entries
            .insert(ident, RegistryEntry::Container(Rc::clone(&handle)));
        handle
    }

    /// Register a series under `ident`, renaming it to match.
    pub fn stash_series(&mut self, ident: &str, mut series: TaggedSeries) -> SeriesHandle {
        series.rename(ident);

        if let Some(store) = self.store.as_mut() {
            if let Err(err) = store.flush_series(ident, &series) {
                warn!("flush of {ident} failed; in-memory state unaffected: {err}");
            }
        }

        let handle = series.into_handle();
        self.entries
            .insert(ident.to_owned(), RegistryEntry::Series(Rc::clone(&handle)));
        handle
    }

    /// Register a series under `type.component`.
    pub fn stash_component(
        &mut self,
        data_type: &str,
        component: &str,
        series: TaggedSeries,
    ) -> SeriesHandle {
        self.stash_series(&format!("{data_type}.{component}"), series)
    }

    /// Look up any entry by exact identifier.
    pub fn grab(&self, ident: &str) -> Option<RegistryEntry> {
        self.entries.get(ident).cloned()
    }

    /// Look up a series entry; a container under the same identifier is
    /// `None`.
    pub fn grab_series(&self, ident: &str) -> Option<SeriesHandle> {
        match self.entries.get(ident) {
            Some(RegistryEntry::Series(series)) => Some(Rc::clone(series)),
            _ => None,
        }
    }

    /// Look up a container entry.
    pub fn grab_container(&self, ident: &str) -> Option<ContainerHandle> {
        match self.entries.get(ident) {
            Some(RegistryEntry::Container(container)) => Some(Rc::clone(container)),
            _ => None,
        }
    }

    /// Resolve a component through its container's own lookup.
    pub fn grab_component(&self, data_type: &str, component: &str) -> Option<SeriesHandle> {
        let container = self.grab_container(data_type)?;
        let series = container.borrow().get(component);
        series
    }

    /// All registered identifiers, sorted.
    pub fn idents(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Attach a partition store and load everything it has.
    ///
    /// Loaded entries are inserted directly (no re-flush); the store
    /// only becomes active for subsequent stashes. Load failures are
    /// reported in the [`LoadReport`], never raised.
    pub fn enable_persistence(&mut self, store: PartitionStore) -> LoadReport {
        let (loaded, report) = store.load();

        for (ident, entry) in loaded {
            match entry {
                LoadedEntry::Container(container) => {
                    let handle: ContainerHandle = Rc::new(RefCell::new(container));
                    self.index_container(&ident, &handle);
                    self.entries.insert(ident, RegistryEntry::Container(handle));
                }
                LoadedEntry::Series(series) => {
                    self.entries
                        .insert(ident, RegistryEntry::Series(series.into_handle()));
                }
            }
        }

        self.store = Some(store);
        report
    }

    fn index_container(&mut self, ident: &str, handle: &ContainerHandle) {
        let container = handle.borrow();
        for comp in container.component_names() {
            if let Some(series) = container.get(&comp) {
                self.entries
                    .insert(format!("{ident}.{comp}"), RegistryEntry::Series(series));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{BasicContainer, ComponentSpec, ImportedData};
    use crate::series::SeriesValues;

    fn series(name: &str, vals: Vec<f64>) -> TaggedSeries {
        let times = (0..vals.len()).map(|i| i as f64).collect();
        TaggedSeries::new(name, SeriesValues::OneDim(vals), times)
    }

    fn mag_container() -> BasicContainer {
        let mut c = BasicContainer::new("mag", vec![ComponentSpec::from_field("bx")]);
        c.update(&ImportedData {
            times: vec![0.0, 1.0],
            fields: [("bx".to_string(), vec![1.0, 2.0])].into_iter().collect(),
            source_files: Vec::new(),
        });
        c
    }

    #[test]
    fn stash_and_grab_share_one_handle() {
        let mut registry = VariableRegistry::new();
        let stashed = registry.stash_series("ratio", series("ratio", vec![1.0]));

        let grabbed = registry.grab_series("ratio").expect("ratio registered");
        assert!(Rc::ptr_eq(&stashed, &grabbed));
    }

    #[test]
    fn stash_renames_to_the_identifier() {
        let mut registry = VariableRegistry::new();
        let handle = registry.stash_series("renamed", series("original", vec![1.0]));
        assert_eq!(handle.borrow().name(), "renamed");
    }

    #[test]
    fn container_components_resolve_as_series() {
        let mut registry = VariableRegistry::new();
        registry.stash_container(mag_container());

        assert!(registry.grab_container("mag").is_some());
        let indexed = registry.grab_series("mag.bx").expect("indexed component");
        let delegated = registry
            .grab_component("mag", "bx")
            .expect("component via container");
        assert!(Rc::ptr_eq(&indexed, &delegated));
    }

    #[test]
    fn grab_component_misses_resolve_to_none() {
        let mut registry = VariableRegistry::new();
        registry.stash_container(mag_container());

        assert!(registry.grab_component("mag", "bz").is_none());
        assert!(registry.grab_component("plasma", "bx").is_none());
    }

    #[test]
    fn wrong_kind_lookups_are_none() {
        let mut registry = VariableRegistry::new();
        registry.stash_container(mag_container());
        registry.stash_series("ratio", series("ratio", vec![1.0]));

        assert!(registry.grab_series("mag").is_none());
        assert!(registry.grab_container("ratio").is_none());
    }

    #[test]
    fn later_stash_overwrites() {
        let mut registry = VariableRegistry::new();
        let first = registry.stash_series("ratio", series("ratio", vec![1.0]));
        let second = registry.stash_series("ratio", series("ratio", vec![2.0]));

        let grabbed = registry.grab_series("ratio").expect("ratio registered");
        assert!(!Rc::ptr_eq(&first, &grabbed));
        assert!(Rc::ptr_eq(&second, &grabbed));
    }

    #[test]
    fn idents_list_all_entries() {
        let mut registry = VariableRegistry::new();
        registry.stash_container(mag_container());
        registry.stash_series("ratio", series("ratio", vec![1.0]));

        assert_eq!(
            registry.idents(),
            vec!["mag".to_string(), "mag.bx".to_string(), "ratio".to_string()]
        );
    }
}
