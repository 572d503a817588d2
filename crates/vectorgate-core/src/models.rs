//! Core data models: the entities described in the data model section —
//! model descriptors, cloud auth profiles, database handles, vector stores,
//! chunks, prompt templates, per-client settings, testbeds, and chat graph
//! state.
//!
//! Every enum here corresponds to a finite, enumerable "recognised option"
//! (search type, distance metric, index type, authentication mode, prompt
//! category) represented as a tagged variant rather than a free-form string,
//! per the project's own design notes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// What a [`ModelDescriptor`] is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Language,
    Embedding,
}

/// The active credential mode for a [`CloudAuthProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    ApiKey,
    InstanceIdentity,
    WorkloadIdentity,
    SecurityToken,
}

/// Similarity function used by a vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Cosine,
    Dot,
    Euclidean,
}

impl DistanceMetric {
    /// Convert a raw distance `d` into a similarity in line with §4.1.a:
    /// cosine ⇒ `1 − d/2`, dot ⇒ `d` (already a similarity), euclidean ⇒
    /// `1 / (1 + d)`.
    pub fn similarity(&self, d: f64) -> f64 {
        match self {
            DistanceMetric::Cosine => 1.0 - d / 2.0,
            DistanceMetric::Dot => d,
            DistanceMetric::Euclidean => 1.0 / (1.0 + d),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Dot => "dot",
            DistanceMetric::Euclidean => "euclidean",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DistanceMetric {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(DistanceMetric::Cosine),
            "dot" => Ok(DistanceMetric::Dot),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            other => Err(format!("unknown distance metric: {other}")),
        }
    }
}

/// Vector index structure backing a [`VectorStore`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexType {
    Flat,
    Hnsw,
    Ivf,
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexType::Flat => "FLAT",
            IndexType::Hnsw => "HNSW",
            IndexType::Ivf => "IVF",
        };
        write!(f, "{s}")
    }
}

impl FromStr for IndexType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "FLAT" => Ok(IndexType::Flat),
            "HNSW" => Ok(IndexType::Hnsw),
            "IVF" => Ok(IndexType::Ivf),
            other => Err(format!("unknown index type: {other}")),
        }
    }
}

/// How an MCP / tool-driven vector search should be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    Similarity,
    SimilarityThreshold,
    Mmr,
}

/// Category of a [`PromptTemplate`], used for both default selection and
/// discovery filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PromptCategory {
    System,
    Context,
    Grading,
    Rephrase,
    Discovery,
    Judge,
}

/// Role attached to a resolved prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// The built-in tool names the chat graph's tool-calling branch knows
/// about. External custom tools are represented by their plain name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    VectorSearch,
    DatabaseQuery,
    Custom(String),
}

// ---------------------------------------------------------------------------
// ModelDescriptor
// ---------------------------------------------------------------------------

/// A model the gateway can dispatch to — language or embedding.
///
/// Identity is `(provider, id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub provider: String,
    pub kind: ModelKind,
    pub endpoint: String,
    pub credential: Option<String>,
    pub enabled: bool,
    pub max_input_tokens: Option<u32>,
    pub max_chunk_size: Option<u32>,
    pub temperature: Option<f32>,
    pub max_completion_tokens: Option<u32>,
}

impl ModelDescriptor {
    /// Identity tuple used for registry keying and identity-merge.
    pub fn identity(&self) -> (String, String) {
        (self.provider.clone(), self.id.clone())
    }
}

// ---------------------------------------------------------------------------
// CloudAuthProfile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudAuthProfile {
    pub profile_name: String,
    pub authentication: AuthMode,
    pub user: Option<String>,
    pub tenant: Option<String>,
    pub fingerprint: Option<String>,
    pub region: Option<String>,
    pub key_material_ref: Option<String>,
    pub service_endpoint_override: Option<String>,
}

impl CloudAuthProfile {
    pub fn identity(&self) -> &str {
        &self.profile_name
    }

    /// Validate that the fields required by the active `authentication`
    /// mode are all non-empty.
    pub fn validate(&self) -> Result<(), String> {
        let missing = match self.authentication {
            AuthMode::ApiKey => self.key_material_ref.is_none(),
            AuthMode::InstanceIdentity => false,
            AuthMode::WorkloadIdentity => self.tenant.is_none(),
            AuthMode::SecurityToken => self.key_material_ref.is_none(),
        };
        if missing {
            return Err(format!(
                "cloud auth profile '{}' is missing required fields for mode {:?}",
                self.profile_name, self.authentication
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DatabaseHandle (configuration side; the live connection lives server-side)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseHandleConfig {
    pub name: String,
    pub user: Option<String>,
    pub secret: Option<String>,
    pub dsn: String,
    pub wallet_ref: Option<String>,
    pub timeout_secs: u64,
}

impl DatabaseHandleConfig {
    pub fn identity(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// VectorStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreDescriptor {
    pub table_name: String,
    pub alias: String,
    pub description: Option<String>,
    pub embedding_model_id: String,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub distance_metric: DistanceMetric,
    pub index_type: IndexType,
}

impl VectorStoreDescriptor {
    /// Deterministic table name derived from the attributes that make up a
    /// store's identity. Mirrors the teacher's deterministic-id approach
    /// (content hashing in `ingest.rs`/`chunk.rs`) applied to the store's
    /// configuration tuple instead of chunk text.
    pub fn derive_table_name(
        alias: &str,
        embedding_model_id: &str,
        chunk_size: u32,
        chunk_overlap: u32,
        distance_metric: DistanceMetric,
        index_type: IndexType,
    ) -> String {
        use sha2::{Digest, Sha256};
        let key = format!(
            "{alias}|{embedding_model_id}|{chunk_size}|{chunk_overlap}|{distance_metric}|{index_type}"
        );
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        let short = hex::encode(&digest[..8]);
        let slug: String = alias
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        format!("vs_{slug}_{short}")
    }

    /// Serialize the structured metadata comment written on the live table
    /// after a merge (§4.2 step 8). This is the single source of truth for
    /// discovery (§4.2 "Discovery").
    pub fn to_comment_payload(&self) -> String {
        let payload = serde_json::json!({
            "alias": self.alias,
            "description": self.description,
            "embedding_model_id": self.embedding_model_id,
            "chunk_size": self.chunk_size,
            "chunk_overlap": self.chunk_overlap,
            "distance_metric": self.distance_metric,
            "index_type": self.index_type,
        });
        format!("GENAI: {payload}")
    }

    /// Parse a structured comment back into the recoverable subset of
    /// attributes. `table_name` itself is not recoverable from the comment
    /// and must be supplied by the caller (it is the table's own name).
    pub fn from_comment(table_name: &str, comment: &str) -> Result<Self, String> {
        let body = comment
            .strip_prefix("GENAI: ")
            .ok_or_else(|| format!("comment on '{table_name}' is not a vector-store sentinel"))?;
        let v: serde_json::Value =
            serde_json::from_str(body).map_err(|e| format!("malformed vector-store comment: {e}"))?;
        let alias = v["alias"].as_str().ok_or("comment missing alias")?.to_string();
        let embedding_model_id = v["embedding_model_id"]
            .as_str()
            .ok_or("comment missing embedding_model_id")?
            .to_string();
        let chunk_size = v["chunk_size"].as_u64().ok_or("comment missing chunk_size")? as u32;
        let chunk_overlap = v["chunk_overlap"].as_u64().ok_or("comment missing chunk_overlap")? as u32;
        let distance_metric: DistanceMetric = serde_json::from_value(v["distance_metric"].clone())
            .map_err(|e| format!("bad distance_metric: {e}"))?;
        let index_type: IndexType = serde_json::from_value(v["index_type"].clone())
            .map_err(|e| format!("bad index_type: {e}"))?;
        let description = v["description"].as_str().map(|s| s.to_string());
        Ok(VectorStoreDescriptor {
            table_name: table_name.to_string(),
            alias,
            description,
            embedding_model_id,
            chunk_size,
            chunk_overlap,
            distance_metric,
            index_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Chunk / VectorRow
// ---------------------------------------------------------------------------

/// A chunk's metadata, enriched per §4.2 step 3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub filename: String,
    pub source: String,
    pub etag: Option<String>,
    pub time_modified: Option<DateTime<Utc>>,
    pub size: Option<u64>,
    pub bucket_name: Option<String>,
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One chunk destined for a [`VectorStoreDescriptor`]'s table.
#[derive(Debug, Clone)]
pub struct VectorRow {
    /// Deterministic `"<basename>_<ordinal>"` id.
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Deterministic chunk id per §4.2 step 3: `"<basename>_<ordinal>"`.
pub fn deterministic_chunk_id(basename: &str, ordinal: usize) -> String {
    format!("{basename}_{ordinal}")
}

// ---------------------------------------------------------------------------
// PromptTemplate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub category: PromptCategory,
    pub title: String,
    pub description: Option<String>,
    pub role: PromptRole,
    pub default_text: String,
    pub tags: Vec<String>,
}

/// A prompt template plus any in-memory override — what a resolver hands
/// back to a caller.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPrompt {
    pub name: String,
    pub role: PromptRole,
    pub text: String,
}

// ---------------------------------------------------------------------------
// ClientSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_completion_tokens: u32,
    pub chat_history: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorSearchSettings {
    pub enabled: bool,
    pub discovery: bool,
    pub rephrase: bool,
    pub grade: bool,
    pub top_k: u32,
    pub score_threshold: f64,
    pub mmr_fetch_k: u32,
    pub mmr_lambda: f32,
    pub alias: Option<String>,
    pub model: String,
    pub chunk_size: u32,
    pub chunk_overlap: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectAiSettings {
    pub enabled: bool,
    pub profile: Option<String>,
    pub params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRefs {
    pub sys: String,
    pub ctx: String,
    pub grading: String,
    pub rephrase: String,
    pub discovery: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub client_id: String,
    pub language_model: LanguageModelSettings,
    pub vector_search: VectorSearchSettings,
    pub selectai: SelectAiSettings,
    pub auth_profile_name: Option<String>,
    pub prompt_refs: PromptRefs,
    pub tools_enabled: Vec<String>,
}

impl ClientSettings {
    /// A deep copy of `self` with a new `client_id` — used when seeding a
    /// brand-new client from `"default"` (§3 "a created client is a deep
    /// copy of `default` at creation time").
    pub fn fork(&self, new_client_id: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.client_id = new_client_id.into();
        copy
    }
}

// ---------------------------------------------------------------------------
// TestSet / EvaluationReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaItem {
    pub question: String,
    pub reference_answer: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSet {
    pub tid: String,
    pub name: String,
    pub created: DateTime<Utc>,
    pub qa_items: Vec<QaItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub eid: String,
    pub tid: String,
    pub evaluated_at: DateTime<Utc>,
    pub correctness: f64,
    pub client_settings_snapshot: serde_json::Value,
    pub report_blob: Vec<u8>,
}

// ---------------------------------------------------------------------------
// ChatGraphState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub message: ChatMessage,
    pub finish_reason: String,
    pub index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEnvelope {
    pub id: String,
    pub choices: Vec<CompletionChoice>,
    pub created: i64,
    pub model: String,
    pub object: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VsMetadata {
    pub searched_tables: Vec<String>,
    pub doc_count: usize,
}

/// One active chat thread, keyed by `client_id`.
#[derive(Debug, Clone)]
pub struct ChatGraphState {
    pub client_id: String,
    pub messages: Vec<ChatMessage>,
    pub cleaned_messages: Vec<ChatMessage>,
    pub context_input: String,
    pub documents: String,
    pub final_response: Option<CompletionEnvelope>,
    pub vs_metadata: VsMetadata,
}

impl ChatGraphState {
    pub fn new(client_id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            client_id: client_id.into(),
            messages,
            cleaned_messages: Vec::new(),
            context_input: String::new(),
            documents: String::new(),
            final_response: None,
            vs_metadata: VsMetadata::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_formula() {
        assert!((DistanceMetric::Cosine.similarity(0.0) - 1.0).abs() < 1e-9);
        assert!((DistanceMetric::Cosine.similarity(2.0) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn dot_is_passthrough() {
        assert_eq!(DistanceMetric::Dot.similarity(0.73), 0.73);
    }

    #[test]
    fn euclidean_formula() {
        assert!((DistanceMetric::Euclidean.similarity(1.0) - 0.5).abs() < 1e-9);
        assert!((DistanceMetric::Euclidean.similarity(0.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn table_name_is_deterministic() {
        let a = VectorStoreDescriptor::derive_table_name(
            "Docs", "text-embedding-3-small", 512, 50, DistanceMetric::Cosine, IndexType::Hnsw,
        );
        let b = VectorStoreDescriptor::derive_table_name(
            "Docs", "text-embedding-3-small", 512, 50, DistanceMetric::Cosine, IndexType::Hnsw,
        );
        assert_eq!(a, b);
        let c = VectorStoreDescriptor::derive_table_name(
            "Docs", "text-embedding-3-small", 256, 50, DistanceMetric::Cosine, IndexType::Hnsw,
        );
        assert_ne!(a, c);
    }

    #[test]
    fn comment_round_trips() {
        let vs = VectorStoreDescriptor {
            table_name: "vs_docs_abc".into(),
            alias: "Docs".into(),
            description: Some("internal docs".into()),
            embedding_model_id: "bge-small".into(),
            chunk_size: 512,
            chunk_overlap: 50,
            distance_metric: DistanceMetric::Cosine,
            index_type: IndexType::Hnsw,
        };
        let comment = vs.to_comment_payload();
        let parsed = VectorStoreDescriptor::from_comment(&vs.table_name, &comment).unwrap();
        assert_eq!(parsed.alias, vs.alias);
        assert_eq!(parsed.embedding_model_id, vs.embedding_model_id);
        assert_eq!(parsed.chunk_size, vs.chunk_size);
        assert_eq!(parsed.chunk_overlap, vs.chunk_overlap);
        assert_eq!(parsed.distance_metric, vs.distance_metric);
        assert_eq!(parsed.index_type, vs.index_type);
    }

    #[test]
    fn client_fork_deep_copies_with_new_id() {
        let default = ClientSettings {
            client_id: "default".into(),
            language_model: LanguageModelSettings {
                model: "gpt-4o-mini".into(),
                temperature: 0.1,
                max_completion_tokens: 1024,
                chat_history: true,
            },
            vector_search: VectorSearchSettings {
                enabled: true,
                discovery: false,
                rephrase: true,
                grade: true,
                top_k: 4,
                score_threshold: 0.0,
                mmr_fetch_k: 20,
                mmr_lambda: 0.5,
                alias: Some("Docs".into()),
                model: "bge-small".into(),
                chunk_size: 512,
                chunk_overlap: 50,
            },
            selectai: SelectAiSettings {
                enabled: false,
                profile: None,
                params: Default::default(),
            },
            auth_profile_name: None,
            prompt_refs: PromptRefs {
                sys: "Basic Example".into(),
                ctx: "Basic Example".into(),
                grading: "Basic Example".into(),
                rephrase: "Basic Example".into(),
                discovery: "Basic Example".into(),
            },
            tools_enabled: vec![],
        };
        let forked = default.fork("alice");
        assert_eq!(forked.client_id, "alice");
        assert_eq!(forked.language_model.model, default.language_model.model);
    }
}
