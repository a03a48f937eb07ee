//! Operator registry.
//!
//! The registry maps each node identifier to a factory and its metadata, and
//! produces the two lookup tables the host reads at load time: identifier to
//! factory (`class_mapping`) and identifier to display name
//! (`display_name_mapping`). It is populated once at startup and only read
//! afterwards.

use crate::core::error::RegistryError;
use crate::core::node::{Category, FilterNode, NodeMetadata};
use indexmap::IndexMap;
use std::sync::Arc;

/// Factory function type for creating filter instances.
pub type FilterFactory = Arc<dyn Fn() -> Box<dyn FilterNode> + Send + Sync>;

/// Registry entry containing factory and cached metadata.
#[derive(Clone)]
pub struct RegistryEntry {
    pub factory: FilterFactory,
    pub metadata: NodeMetadata,
    /// Subpackage that registered the node, reported on collisions
    pub source: &'static str,
}

/// Registry of available operators, in registration order.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: IndexMap<String, RegistryEntry>,
    categories: IndexMap<Category, Vec<String>>,
}

impl FilterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in operator.
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        crate::filters::builtin::register_all(&mut registry)?;
        log::info!(
            "Registered {} operators ({})",
            registry.len(),
            Category::all()
                .iter()
                .map(|c| format!("{}: {}", c.display_name(), registry.filters_by_category(c).len()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(registry)
    }

    /// Register a node factory on behalf of `source`.
    ///
    /// A second registration of the same identifier is refused; the first
    /// entry stays in place.
    pub fn register<F>(&mut self, source: &'static str, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn FilterNode> + Send + Sync + 'static,
    {
        let instance = factory();
        let metadata = instance.metadata();
        let id = metadata.id.clone();

        if let Some(existing) = self.filters.get(&id) {
            return Err(RegistryError::DuplicateIdentifier {
                id,
                first: existing.source.to_string(),
                second: source.to_string(),
            });
        }

        self.categories
            .entry(metadata.category)
            .or_default()
            .push(id.clone());

        log::debug!("Registered {} from {}", id, source);
        self.filters.insert(
            id,
            RegistryEntry {
                factory: Arc::new(factory),
                metadata,
                source,
            },
        );
        Ok(())
    }

    /// Create a new instance of a node by identifier.
    pub fn create(&self, id: &str) -> Option<Box<dyn FilterNode>> {
        self.filters.get(id).map(|entry| (entry.factory)())
    }

    pub fn get_metadata(&self, id: &str) -> Option<&NodeMetadata> {
        self.filters.get(id).map(|e| &e.metadata)
    }

    pub fn get_entry(&self, id: &str) -> Option<&RegistryEntry> {
        self.filters.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.filters.contains_key(id)
    }

    /// All identifiers in registration order.
    pub fn filter_ids(&self) -> Vec<&str> {
        self.filters.keys().map(|s| s.as_str()).collect()
    }

    pub fn filters(&self) -> impl Iterator<Item = &NodeMetadata> {
        self.filters.values().map(|e| &e.metadata)
    }

    pub fn filters_by_category(&self, category: &Category) -> Vec<&str> {
        self.categories
            .get(category)
            .map(|ids| ids.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Categories that have at least one node.
    pub fn categories(&self) -> Vec<&Category> {
        self.categories.keys().collect()
    }

    /// Case-insensitive search over id, name, description and tags.
    pub fn search(&self, query: &str) -> Vec<&str> {
        let query = query.to_lowercase();
        self.filters
            .iter()
            .filter(|(_, entry)| {
                let m = &entry.metadata;
                m.id.to_lowercase().contains(&query)
                    || m.name.to_lowercase().contains(&query)
                    || m.description.to_lowercase().contains(&query)
                    || m.tags.iter().any(|t| t.to_lowercase().contains(&query))
            })
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Identifier to factory, as the host loads it.
    pub fn class_mapping(&self) -> IndexMap<&str, FilterFactory> {
        self.filters
            .iter()
            .map(|(id, e)| (id.as_str(), Arc::clone(&e.factory)))
            .collect()
    }

    /// Identifier to display name.
    pub fn display_name_mapping(&self) -> IndexMap<&str, &str> {
        self.filters
            .iter()
            .map(|(id, e)| (id.as_str(), e.metadata.name.as_str()))
            .collect()
    }

    /// Metadata grouped by category, each group sorted by display name.
    pub fn grouped_by_category(&self) -> IndexMap<Category, Vec<&NodeMetadata>> {
        let mut grouped: IndexMap<Category, Vec<&NodeMetadata>> = IndexMap::new();
        for entry in self.filters.values() {
            grouped.entry(entry.metadata.category).or_default().push(&entry.metadata);
        }
        for filters in grouped.values_mut() {
            filters.sort_by(|a, b| a.name.cmp(&b.name));
        }
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ExecutionContext;
    use crate::core::error::ExecutionError;

    #[derive(Debug, Clone)]
    struct Stub(&'static str);

    impl FilterNode for Stub {
        fn metadata(&self) -> NodeMetadata {
            NodeMetadata::builder(self.0, format!("{} (UTK)", self.0))
                .category(Category::Tools)
                .description("registry stub")
                .tags(["stub"])
                .build()
        }

        fn execute(&self, _ctx: &mut ExecutionContext) -> Result<(), ExecutionError> {
            Ok(())
        }

        fn clone_box(&self) -> Box<dyn FilterNode> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn test_register_and_create() {
        let mut registry = FilterRegistry::new();
        registry.register("tools", || Box::new(Stub("Stub_UTK"))).unwrap();

        assert!(registry.contains("Stub_UTK"));
        assert!(registry.create("Stub_UTK").is_some());
        assert!(registry.create("Missing_UTK").is_none());
        assert_eq!(registry.get_entry("Stub_UTK").unwrap().source, "tools");
    }

    #[test]
    fn test_duplicate_identifier_is_refused() {
        let mut registry = FilterRegistry::new();
        registry.register("image", || Box::new(Stub("Stub_UTK"))).unwrap();
        let err = registry.register("mask", || Box::new(Stub("Stub_UTK"))).unwrap_err();

        match err {
            RegistryError::DuplicateIdentifier { id, first, second } => {
                assert_eq!(id, "Stub_UTK");
                assert_eq!(first, "image");
                assert_eq!(second, "mask");
            }
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_mappings_follow_registration_order() {
        let mut registry = FilterRegistry::new();
        registry.register("tools", || Box::new(Stub("B_UTK"))).unwrap();
        registry.register("tools", || Box::new(Stub("A_UTK"))).unwrap();

        let names = registry.display_name_mapping();
        assert_eq!(names.keys().copied().collect::<Vec<_>>(), vec!["B_UTK", "A_UTK"]);
        assert_eq!(names["A_UTK"], "A_UTK (UTK)");

        let classes = registry.class_mapping();
        assert_eq!(classes.len(), 2);
        assert_eq!((classes["A_UTK"])().metadata().id, "A_UTK");
    }

    #[test]
    fn test_search() {
        let mut registry = FilterRegistry::new();
        registry.register("tools", || Box::new(Stub("Stub_UTK"))).unwrap();

        assert_eq!(registry.search("STUB"), vec!["Stub_UTK"]);
        assert!(registry.search("nonexistent").is_empty());
    }

    #[test]
    fn test_builtin_registry() {
        let registry = FilterRegistry::with_builtins().unwrap();

        for id in registry.filter_ids() {
            assert!(
                id.ends_with("_UTK") || id == "Video_Prompt_Helper" || id == "AudioCropProcessUTK",
                "unexpected identifier {}",
                id
            );
        }
        for category in Category::all() {
            assert!(!registry.filters_by_category(category).is_empty());
        }
        assert_eq!(registry.display_name_mapping().len(), registry.len());
        assert!(registry.contains("MaskAnd_UTK"));
        assert!(registry.contains("ImageBlendAdvance_UTK"));
        assert!(registry.contains("LoadAudioPlusFromPath_UTK"));
        assert!(registry.contains("TextTranslator_UTK"));
    }

    #[test]
    fn test_builtin_metadata_is_consistent() {
        let registry = FilterRegistry::with_builtins().unwrap();
        for meta in registry.filters() {
            assert!(!meta.outputs.is_empty(), "{} has no outputs", meta.id);
            let node = registry.create(&meta.id).unwrap();
            assert_eq!(node.metadata().id, meta.id);
            // defaults satisfy their own constraints
            for p in &meta.parameters {
                assert!(p.validate(&p.default_value).is_ok(), "{}.{}", meta.id, p.name);
            }
        }
    }
}
