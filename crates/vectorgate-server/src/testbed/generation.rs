//! Testset generation (§4.4 "Testset generation"): load & split at the
//! testbed's default chunk size, embed every chunk into an in-memory
//! knowledge base, pick a diverse sample of passages, and ask the
//! configured language model for `questions` grounded question/answer
//! pairs per file.

use serde::Deserialize;
use vectorgate_core::chunk::{split_text, testbed_effective_overlap, TextChunk};
use vectorgate_core::embedding::{euclidean_distance, EmbeddingProvider};
use vectorgate_core::models::{ChatMessage, MessageRole, QaItem};
use vectorgate_core::GatewayError;

use crate::graph::NullSink;
use crate::providers::{LanguageModelProvider, StreamOrigin};

const DEFAULT_CHUNK_SIZE: u32 = 512;

#[derive(Deserialize)]
struct RawQa {
    question: String,
    answer: String,
}

/// Generate `questions` QA pairs grounded in `text` (one uploaded document,
/// `basename` for error messages and metadata). A model-side failure to
/// produce any usable questions is surfaced as a validation error so the
/// HTTP layer can answer with 400 rather than a generic 500.
pub async fn generate_testset(
    provider: &dyn LanguageModelProvider,
    embedder: &dyn EmbeddingProvider,
    basename: &str,
    text: &str,
    questions: usize,
) -> Result<Vec<QaItem>, GatewayError> {
    let overlap = testbed_effective_overlap(DEFAULT_CHUNK_SIZE);
    let chunks: Vec<TextChunk> = split_text(basename, text, DEFAULT_CHUNK_SIZE, overlap)
        .into_iter()
        .filter(|c| !c.text.trim().is_empty())
        .collect();
    if chunks.is_empty() {
        return Err(GatewayError::validation(format!("{basename}: could not generate any questions (no extractable text)")));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder.embed(&texts).await.map_err(|e| GatewayError::upstream_provider(e.to_string()))?;
    let sample = pick_diverse_chunks(&chunks, &embeddings, questions.max(1));

    let passages = sample
        .iter()
        .enumerate()
        .map(|(i, c)| format!("Passage {}:\n{}", i + 1, c.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    let prompt = format!(
        "Generate exactly {questions} question/answer pairs grounded only in the passages below, taken from \
         the document '{basename}'. Respond strictly as a JSON array of objects shaped \
         {{\"question\": string, \"answer\": string}}, with no surrounding text.\n\n{passages}"
    );

    let message = ChatMessage { role: MessageRole::User, content: prompt, tool_calls: vec![], tool_call_id: None };
    let mut sink = NullSink;
    let reply = provider
        .chat(&[message], &[], StreamOrigin::Internal, &mut sink)
        .await
        .map_err(|e| GatewayError::upstream_provider(e.to_string()))?;

    let parsed: Vec<RawQa> = serde_json::from_str(reply.content.trim())
        .map_err(|_| GatewayError::validation(format!("{basename}: could not generate any questions (model reply was not valid JSON)")))?;
    if parsed.is_empty() {
        return Err(GatewayError::validation(format!("{basename}: could not generate any questions")));
    }

    Ok(parsed
        .into_iter()
        .map(|raw| QaItem {
            question: raw.question,
            reference_answer: raw.answer,
            metadata: serde_json::json!({"source": basename}).as_object().cloned().unwrap_or_default(),
        })
        .collect())
}

/// Greedy farthest-point sampling over chunk embeddings: start from the
/// first chunk, repeatedly add whichever remaining chunk is furthest (by
/// minimum distance) from everything already picked. Keeps generated
/// questions from clustering on one repeated passage in a large document.
fn pick_diverse_chunks<'a>(chunks: &'a [TextChunk], embeddings: &[Vec<f32>], count: usize) -> Vec<&'a TextChunk> {
    if chunks.len() <= count {
        return chunks.iter().collect();
    }

    let mut picked = vec![0usize];
    while picked.len() < count {
        let next = (0..chunks.len())
            .filter(|i| !picked.contains(i))
            .max_by(|&a, &b| min_distance(a, &picked, embeddings).partial_cmp(&min_distance(b, &picked, embeddings)).unwrap());
        match next {
            Some(i) => picked.push(i),
            None => break,
        }
    }
    picked.sort_unstable();
    picked.into_iter().map(|i| &chunks[i]).collect()
}

fn min_distance(i: usize, picked: &[usize], embeddings: &[Vec<f32>]) -> f32 {
    picked.iter().map(|&p| euclidean_distance(&embeddings[i], &embeddings[p])).fold(f32::MAX, f32::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vectorgate_core::models::ToolCall;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().enumerate().map(|(i, _)| vec![i as f32, 0.0]).collect())
        }
    }

    struct FakeProvider {
        reply: String,
    }

    #[async_trait]
    impl LanguageModelProvider for FakeProvider {
        fn model_name(&self) -> &str {
            "fake"
        }
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _tools: &[serde_json::Value],
            _origin: StreamOrigin,
            _sink: &mut dyn crate::providers::TokenSink,
        ) -> anyhow::Result<ChatMessage> {
            Ok(ChatMessage { role: MessageRole::Assistant, content: self.reply.clone(), tool_calls: Vec::<ToolCall>::new(), tool_call_id: None })
        }
    }

    #[tokio::test]
    async fn generates_qa_items_from_valid_json_reply() {
        let provider = FakeProvider { reply: r#"[{"question": "Q1", "answer": "A1"}]"#.to_string() };
        let embedder = FakeEmbedder;
        let items = generate_testset(&provider, &embedder, "doc.txt", "hello world\n\nsecond paragraph", 1).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].question, "Q1");
    }

    #[tokio::test]
    async fn non_json_reply_is_a_validation_error() {
        let provider = FakeProvider { reply: "not json".to_string() };
        let embedder = FakeEmbedder;
        let err = generate_testset(&provider, &embedder, "doc.txt", "some text here", 1).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn empty_document_is_a_validation_error() {
        let provider = FakeProvider { reply: "[]".to_string() };
        let embedder = FakeEmbedder;
        let err = generate_testset(&provider, &embedder, "doc.txt", "", 1).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn diverse_sampling_returns_requested_count() {
        let chunks: Vec<TextChunk> = (0..10).map(|i| TextChunk { id: format!("c{i}"), ordinal: i, text: format!("chunk {i}") }).collect();
        let embeddings: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32, 0.0]).collect();
        let sample = pick_diverse_chunks(&chunks, &embeddings, 3);
        assert_eq!(sample.len(), 3);
    }
}
