//! Template Store
//!
//! Named message bodies kept in insertion order.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A named message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub body: String,
}

impl Template {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
        }
    }
}

/// In-memory template registry.
///
/// Persistence is handled by the engine, which writes through to its
/// `StateStore` after every mutation.
#[derive(Debug, Default)]
pub struct TemplateStore {
    entries: RwLock<Vec<Template>>,
}

impl TemplateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated from persisted templates
    pub fn from_templates(templates: Vec<Template>) -> Self {
        let store = Self::new();
        for template in templates {
            store.set(template.name, template.body);
        }
        store
    }

    /// Insert or overwrite a template.
    ///
    /// An overwrite keeps the template's original position. Returns `true`
    /// when the name was new.
    pub fn set(&self, name: impl Into<String>, body: impl Into<String>) -> bool {
        let name = name.into();
        let body = body.into();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.iter_mut().find(|t| t.name == name) {
            existing.body = body;
            false
        } else {
            entries.push(Template { name, body });
            true
        }
    }

    /// Get a template body by name
    pub fn get(&self, name: &str) -> Option<String> {
        self.entries
            .read()
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.body.clone())
    }

    /// Check if a template exists
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().iter().any(|t| t.name == name)
    }

    /// Remove a template. Returns `false` if it did not exist.
    pub fn delete(&self, name: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|t| t.name != name);
        entries.len() != before
    }

    /// All templates in insertion order
    pub fn list(&self) -> Vec<Template> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove every template
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_is_idempotent() {
        let store = TemplateStore::new();
        assert!(store.set("vacation", "Out until Monday"));
        assert!(!store.set("vacation", "Out until Monday"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let store = TemplateStore::new();
        store.set("a", "first");
        store.set("b", "second");
        store.set("a", "updated");

        let names: Vec<_> = store.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.get("a").as_deref(), Some("updated"));
    }

    #[test]
    fn test_delete() {
        let store = TemplateStore::new();
        store.set("a", "body");
        assert!(store.delete("a"));
        assert!(!store.delete("a"));
        assert!(store.get("a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_from_templates_preserves_order() {
        let store = TemplateStore::from_templates(vec![
            Template::new("z", "last letter"),
            Template::new("a", "first letter"),
        ]);
        let names: Vec<_> = store.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["z", "a"]);
        assert!(store.contains("z"));
    }
}
