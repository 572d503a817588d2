//! Error kind taxonomy shared by every layer of vectorgate.
//!
//! The nine kinds below classify every error the gateway can surface; the
//! HTTP layer maps each kind to a status code (see `vectorgate-server`'s
//! `http::error` module). Keeping the taxonomy in the core crate lets the
//! graph, the vector store engine, and the testbed runner all raise the same
//! typed errors without depending on the HTTP stack.
//!
//! §7's "Availability" kind covers three situations spec.md's HTTP status
//! map gives three different codes: database/network unreachable (503),
//! upstream LLM/embedding provider unreachable (424), and model URL
//! unreachable at registration (422). [`GatewayError::Availability`] keeps
//! the first; [`GatewayError::UpstreamProvider`] and
//! [`GatewayError::ModelUnreachable`] split out the other two so the HTTP
//! layer can map each to its own status.

use thiserror::Error;

/// A classified gateway error.
///
/// Variants carry a single-line, user-safe detail string. Callers that need
/// richer context should wrap this with `anyhow::Context` at the call site;
/// the detail string here is what ultimately reaches the client.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unknown model / client / database / vector-store / prompt / testset.
    #[error("{0}")]
    Identity(String),

    /// Duplicate model or database name, prompt rename collision.
    #[error("{0}")]
    Conflict(String),

    /// Missing connection details, malformed JSON, threshold out of range,
    /// unsupported file extension, unsupported file type for web fetch.
    #[error("{0}")]
    Validation(String),

    /// Bad token, bad API key, bad DB credential.
    #[error("{0}")]
    Authentication(String),

    /// Database or outbound network fetch unreachable (§7, mapped to 503).
    #[error("{0}")]
    Availability(String),

    /// Upstream LLM or embedding provider unreachable/erroring on a live
    /// call (§7, mapped to 424).
    #[error("{0}")]
    UpstreamProvider(String),

    /// Model URL unreachable at registration time (§7, mapped to 422).
    #[error("{0}")]
    ModelUnreachable(String),

    /// Model lacks function-calling while tools are enabled.
    #[error("{0}")]
    Capability(String),

    /// Malformed vector-store comment, unparseable knowledge base, judge
    /// returned non-boolean.
    #[error("{0}")]
    Integrity(String),
}

impl GatewayError {
    pub fn identity(msg: impl Into<String>) -> Self {
        Self::Identity(msg.into())
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }
    pub fn availability(msg: impl Into<String>) -> Self {
        Self::Availability(msg.into())
    }
    pub fn upstream_provider(msg: impl Into<String>) -> Self {
        Self::UpstreamProvider(msg.into())
    }
    pub fn model_unreachable(msg: impl Into<String>) -> Self {
        Self::ModelUnreachable(msg.into())
    }
    pub fn capability(msg: impl Into<String>) -> Self {
        Self::Capability(msg.into())
    }
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    /// The detail string shown to clients (never a stack trace).
    pub fn detail(&self) -> String {
        self.to_string()
    }

    /// Short machine-readable kind tag, used for the HTTP status map and for
    /// structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Identity(_) => "identity",
            GatewayError::Conflict(_) => "conflict",
            GatewayError::Validation(_) => "validation",
            GatewayError::Authentication(_) => "authentication",
            GatewayError::Availability(_) => "availability",
            GatewayError::UpstreamProvider(_) => "upstream_provider",
            GatewayError::ModelUnreachable(_) => "model_unreachable",
            GatewayError::Capability(_) => "capability",
            GatewayError::Integrity(_) => "integrity",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_match_variant() {
        assert_eq!(GatewayError::identity("x").kind(), "identity");
        assert_eq!(GatewayError::conflict("x").kind(), "conflict");
        assert_eq!(GatewayError::validation("x").kind(), "validation");
        assert_eq!(GatewayError::authentication("x").kind(), "authentication");
        assert_eq!(GatewayError::availability("x").kind(), "availability");
        assert_eq!(GatewayError::upstream_provider("x").kind(), "upstream_provider");
        assert_eq!(GatewayError::model_unreachable("x").kind(), "model_unreachable");
        assert_eq!(GatewayError::capability("x").kind(), "capability");
        assert_eq!(GatewayError::integrity("x").kind(), "integrity");
    }

    #[test]
    fn detail_is_the_message() {
        let e = GatewayError::validation("threshold out of range");
        assert_eq!(e.detail(), "threshold out of range");
    }
}
