//! Prompt Store wrapper: wires built-in default prompts (grounded on the
//! original implementation's `bootstrap/prompts.py` seed list) into the
//! core [`vectorgate_core::prompts::PromptStore`] behind a `Mutex`, and
//! applies any overrides loaded from the configuration file at boot.

use std::collections::HashMap;
use std::sync::Mutex;

use vectorgate_core::models::{PromptCategory, PromptRole, PromptTemplate};
use vectorgate_core::prompts::PromptStore;

pub struct PromptRegistry {
    inner: Mutex<PromptStore>,
}

impl PromptRegistry {
    pub fn with_builtin_defaults(overrides: &HashMap<String, String>) -> Self {
        let mut store = PromptStore::new();
        for template in builtin_prompts() {
            store.register_default(template);
        }
        for (name, text) in overrides {
            let _ = store.set_override(name, text.clone());
        }
        Self { inner: Mutex::new(store) }
    }

    pub fn resolve(&self, name: &str) -> Option<vectorgate_core::models::ResolvedPrompt> {
        self.inner.lock().expect("prompt registry lock poisoned").resolve(name)
    }

    pub fn set_override(&self, name: &str, text: impl Into<String>) -> Result<(), String> {
        self.inner.lock().expect("prompt registry lock poisoned").set_override(name, text)
    }

    pub fn reset_all(&self) {
        self.inner.lock().expect("prompt registry lock poisoned").reset_all();
    }

    pub fn names(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("prompt registry lock poisoned")
            .names()
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_override(&self, name: &str) -> bool {
        self.inner.lock().expect("prompt registry lock poisoned").has_override(name)
    }

    /// Every built-in prompt plus its current override text, for the
    /// `GET /v1/mcp/prompts` listing and MCP `list_prompts`.
    pub fn list_all(&self) -> Vec<PromptTemplate> {
        self.inner
            .lock()
            .expect("prompt registry lock poisoned")
            .list_all()
            .into_iter()
            .map(|(template, _)| template.clone())
            .collect()
    }

    /// As [`Self::list_all`], each paired with its resolved (override-or-
    /// default) text.
    pub fn list_resolved(&self) -> Vec<(PromptTemplate, String)> {
        let guard = self.inner.lock().expect("prompt registry lock poisoned");
        guard
            .list_all()
            .into_iter()
            .map(|(template, override_text)| {
                let text = override_text.map(|s| s.to_string()).unwrap_or_else(|| template.default_text.clone());
                (template.clone(), text)
            })
            .collect()
    }
}

fn builtin_prompts() -> Vec<PromptTemplate> {
    vec![
        PromptTemplate {
            name: "sys-basic-example".into(),
            category: PromptCategory::System,
            title: "Basic Example".into(),
            description: Some("Plain system prompt used when vector search is disabled.".into()),
            role: PromptRole::System,
            default_text: "You are a friendly, helpful assistant.".into(),
            tags: vec!["system".into()],
        },
        PromptTemplate {
            name: "sys-vector-search-example".into(),
            category: PromptCategory::System,
            title: "Vector Search Example".into(),
            description: Some("System prompt instructing the model to ground answers in retrieved documents.".into()),
            role: PromptRole::System,
            default_text: concat!(
                "You are an assistant for question-answering tasks, be concise. ",
                "Use the retrieved DOCUMENTS to answer the user input as accurately as possible. ",
                "Keep your answer grounded in the facts of the DOCUMENTS and reference the DOCUMENTS where possible. ",
                "If there ARE DOCUMENTS, you should be able to answer. ",
                "If there are NO DOCUMENTS, respond only with 'I am sorry, but cannot find relevant sources.'",
            )
            .into(),
            tags: vec!["system".into(), "vector-search".into()],
        },
        PromptTemplate {
            name: "ctx-basic-example".into(),
            category: PromptCategory::Context,
            title: "Basic Example".into(),
            description: Some("Rephrases the latest user turn into a standalone retrieval query.".into()),
            role: PromptRole::User,
            default_text: concat!(
                "Rephrase the latest user input into a standalone search query optimized for vector retrieval. ",
                "Use only the user's prior inputs for context, ignoring system responses. ",
                "Remove conversational elements like confirmations or clarifications, ",
                "focusing solely on the core topic and keywords.",
            )
            .into(),
            tags: vec!["rephrase".into()],
        },
        PromptTemplate {
            name: "grading-basic-example".into(),
            category: PromptCategory::Grading,
            title: "Basic Example".into(),
            description: Some("Asks the model whether any retrieved document is relevant to the question.".into()),
            role: PromptRole::User,
            default_text: concat!(
                "Given the user question and the retrieved documents, answer strictly 'yes' if at ",
                "least one document is relevant to the question, otherwise answer strictly 'no'.",
            )
            .into(),
            tags: vec!["grading".into()],
        },
        PromptTemplate {
            name: "discovery-basic-example".into(),
            category: PromptCategory::Discovery,
            title: "Basic Example".into(),
            description: Some("Picks which vector store tables are worth searching for a question.".into()),
            role: PromptRole::User,
            default_text: concat!(
                "Given the user question and the list of available vector store tables (with their ",
                "aliases and descriptions), return up to N table names most likely to contain a relevant answer.",
            )
            .into(),
            tags: vec!["discovery".into()],
        },
        PromptTemplate {
            name: "judge-basic-example".into(),
            category: PromptCategory::Judge,
            title: "Basic Example".into(),
            description: Some("Scores a testbed answer against its reference answer as correct or incorrect.".into()),
            role: PromptRole::User,
            default_text: concat!(
                "You are grading an answer against a reference answer. Respond strictly with JSON ",
                "{\"correctness\": true} or {\"correctness\": false, \"correctness_reason\": \"<why>\"}.",
            )
            .into(),
            tags: vec!["judge".into()],
        },
    ]
}
