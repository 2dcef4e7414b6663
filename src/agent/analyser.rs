//! Code analyser stage.
//!
//! Sends the rendered analyser prompt to the model with the analysis JSON
//! schema attached, then parses and validates the answer.

use crate::agent::prompt::{render_analyser_prompt, AnalysisOptions};
use crate::error::{Result, Stage, TutorError};
use crate::llm::{LlmProvider, LlmRequest};
use crate::models::{AnalysisResult, LearningImpact};
use std::sync::Arc;
use tracing::{debug, info};

/// Produces a validated [`AnalysisResult`] from code and a question.
pub struct CodeAnalyser {
    provider: Arc<dyn LlmProvider>,
    options: AnalysisOptions,
}

impl CodeAnalyser {
    pub fn new(provider: Arc<dyn LlmProvider>, options: AnalysisOptions) -> Self {
        Self { provider, options }
    }

    /// Analyse one submission. No retries: a failed call or an invalid
    /// answer is returned to the caller as is.
    pub async fn analyze(
        &self,
        session_id: &str,
        code: &str,
        question: &str,
    ) -> Result<AnalysisResult> {
        let prompt = render_analyser_prompt(&self.options, code, question);
        let request =
            LlmRequest::new(session_id, prompt).with_schema(AnalysisResult::json_schema());

        debug!(
            "Calling analyser model {} for session {}",
            self.provider.name(),
            session_id
        );

        let raw = self
            .provider
            .complete(request.clone())
            .await
            .map_err(|e| TutorError::upstream(Stage::Analyser, format!("{:#}", e)))?;

        let analysis = AnalysisResult::from_json(strip_code_fences(&raw))?;
        // Rejected answers never become conversation context.
        self.provider.commit(&request, &raw);

        info!(
            "Analysis for session {}: level {}, score {}, {} errors ({} high impact)",
            session_id,
            analysis.general.student_level,
            analysis.general.overall_score,
            analysis.error_diagnosis.total_errors,
            analysis
                .error_diagnosis
                .errors_by_category
                .count_at_least(LearningImpact::High)
        );

        if analysis.error_diagnosis.errors_by_category.is_empty() {
            debug!("No errors found for session {}", session_id);
        }

        Ok(analysis)
    }
}

/// Remove a surrounding markdown code fence and whitespace from model output.
pub fn strip_code_fences(text: &str) -> &str {
    let mut text = text.trim();

    if let Some(rest) = text.strip_prefix("```") {
        text = rest.strip_prefix("json").unwrap_or(rest);
        text = text.strip_suffix("```").unwrap_or(text);
    }

    text.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{Script, ScriptedProvider};
    use crate::models::tests::sample_analysis;

    fn analyser(scripts: Vec<Script>) -> (CodeAnalyser, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(scripts));
        let analyser = CodeAnalyser::new(provider.clone(), AnalysisOptions::default());
        (analyser, provider)
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1}\n"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_analyze_accepts_valid_output() {
        let json = serde_json::to_string(&sample_analysis()).unwrap();
        let (analyser, provider) = analyser(vec![Script::Text(format!("```json\n{}\n```", json))]);

        let result = analyser
            .analyze("session-1", "def f(x): return x+1", "why is this wrong?")
            .await
            .unwrap();
        assert_eq!(result, sample_analysis());

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].session_id, "session-1");
        assert!(calls[0].prompt.contains("why is this wrong?"));
        assert!(calls[0].output_schema.is_some());
        assert_eq!(provider.commits().len(), 1);
        assert_eq!(provider.commits()[0].0, "session-1");
    }

    #[tokio::test]
    async fn test_analyze_rejects_contract_violation() {
        let mut bad = sample_analysis();
        bad.error_diagnosis.total_errors = 5;
        let json = serde_json::to_string(&bad).unwrap();
        let (analyser, provider) = analyser(vec![Script::Text(json)]);

        let err = analyser.analyze("s", "code", "q").await.unwrap_err();
        assert!(matches!(err, TutorError::SchemaValidation(_)));
        assert!(provider.commits().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_rejects_non_json() {
        let (analyser, _) = analyser(vec![Script::Text("I think your code is fine".to_string())]);
        let err = analyser.analyze("s", "code", "q").await.unwrap_err();
        assert!(matches!(err, TutorError::SchemaValidation(_)));
    }

    #[tokio::test]
    async fn test_analyze_reports_upstream_failure() {
        let (analyser, _) = analyser(vec![Script::Fail("rate limited".to_string())]);
        let err = analyser.analyze("s", "code", "q").await.unwrap_err();
        match err {
            TutorError::Upstream { stage, message } => {
                assert_eq!(stage, Stage::Analyser);
                assert!(message.contains("rate limited"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
