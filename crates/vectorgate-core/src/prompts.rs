//! Prompt resolution (§4.5): consult the override cache first, fall back to
//! the compiled default. The prompt store itself does not interpret
//! `{placeholder}` substitution — that is the caller's job.

use std::collections::HashMap;

use crate::models::{PromptCategory, PromptTemplate, ResolvedPrompt};

/// A keyed store of compiled-in prompt templates plus a mutable override
/// layer. The override layer is a plain in-memory map here; the server
/// crate wraps this in a `Mutex` for concurrent access.
#[derive(Debug, Default)]
pub struct PromptStore {
    defaults: HashMap<String, PromptTemplate>,
    overrides: HashMap<String, String>,
}

impl PromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_default(&mut self, template: PromptTemplate) {
        self.defaults.insert(template.name.clone(), template);
    }

    /// Resolve a prompt by name: override text if present, else the
    /// compiled default. Returns `None` if no such prompt name is known.
    pub fn resolve(&self, name: &str) -> Option<ResolvedPrompt> {
        let template = self.defaults.get(name)?;
        let text = self
            .overrides
            .get(name)
            .cloned()
            .unwrap_or_else(|| template.default_text.clone());
        Some(ResolvedPrompt {
            name: template.name.clone(),
            role: template.role,
            text,
        })
    }

    /// Store an override's text. Administrative PATCH handler calls this.
    pub fn set_override(&mut self, name: &str, text: impl Into<String>) -> Result<(), String> {
        if !self.defaults.contains_key(name) {
            return Err(format!("unknown prompt: {name}"));
        }
        self.overrides.insert(name.to_string(), text.into());
        Ok(())
    }

    /// Clear every override in one operation.
    pub fn reset_all(&mut self) {
        self.overrides.clear();
    }

    pub fn names(&self) -> Vec<&str> {
        self.defaults.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_override(&self, name: &str) -> bool {
        self.overrides.contains_key(name)
    }

    /// Every template paired with its current override text, if any — the
    /// shape the HTTP/MCP prompt-listing endpoints surface.
    pub fn list_all(&self) -> Vec<(&PromptTemplate, Option<&str>)> {
        self.defaults
            .values()
            .map(|t| (t, self.overrides.get(&t.name).map(|s| s.as_str())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PromptRole;

    fn store_with_one() -> PromptStore {
        let mut s = PromptStore::new();
        s.register_default(PromptTemplate {
            name: "vs-no-tools".into(),
            category: PromptCategory::System,
            title: "No tools context".into(),
            description: None,
            role: PromptRole::System,
            default_text: "Answer from general knowledge.".into(),
            tags: vec![],
        });
        s
    }

    #[test]
    fn resolves_default_when_no_override() {
        let store = store_with_one();
        let resolved = store.resolve("vs-no-tools").unwrap();
        assert_eq!(resolved.text, "Answer from general knowledge.");
    }

    #[test]
    fn override_roundtrips() {
        let mut store = store_with_one();
        store.set_override("vs-no-tools", "Custom text").unwrap();
        assert_eq!(store.resolve("vs-no-tools").unwrap().text, "Custom text");
    }

    #[test]
    fn reset_all_restores_defaults() {
        let mut store = store_with_one();
        store.set_override("vs-no-tools", "Custom text").unwrap();
        store.reset_all();
        assert_eq!(store.resolve("vs-no-tools").unwrap().text, "Answer from general knowledge.");
        assert!(!store.has_override("vs-no-tools"));
    }

    #[test]
    fn unknown_prompt_override_errors() {
        let mut store = store_with_one();
        assert!(store.set_override("nope", "x").is_err());
    }
}
