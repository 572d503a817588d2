//! Testbed Evaluation Runner (§4.4): testset generation, answer collection,
//! LLM-as-judge scoring, and report persistence.

pub mod generation;
pub mod judge;
pub mod store;

use sqlx::SqlitePool;
use vectorgate_core::models::{ClientSettings, EvaluationReport, TestSet};
use vectorgate_core::GatewayError;

use crate::graph::GraphRunner;
use crate::providers;
use crate::registries::Registries;
use store::TestbedStore;

/// No per-client reference names the judge prompt (`ClientSettings` has no
/// `prompt_refs.judge` field); every evaluation judges against the one
/// built-in judge prompt, subject to the usual override cache (§4.4).
const JUDGE_PROMPT_NAME: &str = "judge-basic-example";

pub struct TestbedRunner {
    store: TestbedStore,
    registries: Registries,
}

impl TestbedRunner {
    pub fn new(pool: SqlitePool, registries: Registries) -> Self {
        Self { store: TestbedStore::new(pool), registries }
    }

    pub async fn ensure_tables(&self) -> Result<(), GatewayError> {
        self.store.ensure_tables().await
    }

    /// Generate a testset from `documents` (basename, full text pairs) and
    /// persist it, appending to `tid` if given. Returns the testset id.
    pub async fn generate(
        &self,
        name: &str,
        tid: Option<&str>,
        documents: &[(String, String)],
        questions_per_file: usize,
        settings: &ClientSettings,
    ) -> Result<String, GatewayError> {
        let provider = providers::resolve_language_model(&self.registries, &settings.language_model.model)?;
        let embedder = providers::resolve_embedding_model(&self.registries, &settings.vector_search.model)?;

        let mut all_items = Vec::new();
        for (basename, text) in documents {
            let items = generation::generate_testset(provider.as_ref(), embedder.as_ref(), basename, text, questions_per_file).await?;
            all_items.extend(items);
        }
        if all_items.is_empty() {
            return Err(GatewayError::validation("could not generate any questions"));
        }
        self.store.upsert_qa(name, tid, &all_items).await
    }

    /// Collect an answer per question (via an ephemeral, history-and-
    /// grading-disabled chat turn), judge each against its reference
    /// answer, and persist the resulting report.
    pub async fn evaluate(&self, tid: &str, graph: &GraphRunner, settings: &ClientSettings) -> Result<EvaluationReport, GatewayError> {
        let testset = self.store.get_testset(tid).await?.ok_or_else(|| GatewayError::identity(format!("unknown testset: {tid}")))?;

        let judge_provider = providers::resolve_language_model(&self.registries, &settings.language_model.model)?;
        let judge_prompt = self
            .registries
            .prompts
            .resolve(JUDGE_PROMPT_NAME)
            .ok_or_else(|| GatewayError::identity(format!("unknown prompt: {JUDGE_PROMPT_NAME}")))?;

        let mut items = Vec::with_capacity(testset.qa_items.len());
        let mut correct_count = 0usize;
        for qa in &testset.qa_items {
            let envelope = graph.run_turn_ephemeral(settings, &qa.question).await?;
            let answer = envelope.choices.first().map(|c| c.message.content.clone()).unwrap_or_default();
            let conversation = format!("User: {}\nAssistant: {}", qa.question, answer);

            let (correct, reason) = judge::judge_one(
                judge_provider.as_ref(),
                &judge_prompt.text,
                "Evaluate whether the assistant's answer matches the reference answer.",
                &conversation,
                &answer,
                &qa.reference_answer,
            )
            .await?;
            if correct {
                correct_count += 1;
            }
            items.push(serde_json::json!({
                "question": qa.question,
                "answer": answer,
                "reference_answer": qa.reference_answer,
                "correct": correct,
                "correctness_reason": reason,
            }));
        }

        let correctness = if testset.qa_items.is_empty() { 0.0 } else { correct_count as f64 / testset.qa_items.len() as f64 };
        let report_blob =
            serde_json::to_vec(&serde_json::json!({"items": items})).map_err(|e| GatewayError::integrity(e.to_string()))?;
        let client_settings_snapshot = serde_json::to_value(settings).map_err(|e| GatewayError::integrity(e.to_string()))?;

        let report = EvaluationReport {
            eid: format!("eval-{}", uuid::Uuid::new_v4()),
            tid: tid.to_string(),
            evaluated_at: chrono::Utc::now(),
            correctness,
            client_settings_snapshot,
            report_blob,
        };
        self.store.save_evaluation(&report).await?;
        Ok(report)
    }

    pub async fn list_testsets(&self) -> Result<Vec<(String, String)>, GatewayError> {
        self.store.list_testsets().await
    }

    pub async fn get_testset(&self, tid: &str) -> Result<Option<TestSet>, GatewayError> {
        self.store.get_testset(tid).await
    }

    pub async fn delete_testset(&self, tid: &str) -> Result<(), GatewayError> {
        self.store.delete_testset(tid).await
    }

    pub async fn get_evaluation(&self, eid: &str) -> Result<Option<EvaluationReport>, GatewayError> {
        self.store.get_evaluation(eid).await
    }

    pub async fn list_evaluations(&self, tid: &str) -> Result<Vec<(String, chrono::DateTime<chrono::Utc>, f64)>, GatewayError> {
        self.store.list_evaluations(tid).await
    }
}
