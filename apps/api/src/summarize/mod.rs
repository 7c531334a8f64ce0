// AI Summarizer: one synchronous generation call per explicit request.
// Never fails outward; provider problems turn into a fallback sentence.

pub mod prompts;

use std::sync::Arc;

use tracing::{info, warn};

use crate::llm_client::{GenerationLimits, TextGenerator};
use prompts::{summary_prompt, SUMMARY_SYSTEM};

/// Returned for memos with nothing to summarize; the provider is not called.
pub const NO_CONTENT_SUMMARY: &str = "No content to summarize.";
/// Returned when the provider is unavailable or answers with garbage.
pub const FALLBACK_SUMMARY: &str = "The summary could not be generated.";

const SUMMARY_LIMITS: GenerationLimits = GenerationLimits {
    max_tokens: 300,
    temperature: 0.3,
};

#[derive(Clone)]
pub struct Summarizer {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl Summarizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// A summarizer with no provider behind it; every request gets the fallback.
    pub fn disabled() -> Self {
        Self { generator: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn summarize(&self, content: &str) -> String {
        let content = content.trim();
        if content.is_empty() {
            return NO_CONTENT_SUMMARY.to_string();
        }
        let Some(generator) = &self.generator else {
            warn!("Summarize requested but no LLM provider is configured");
            return FALLBACK_SUMMARY.to_string();
        };

        match generator
            .generate(&summary_prompt(content), SUMMARY_SYSTEM, SUMMARY_LIMITS)
            .await
        {
            Ok(summary) => {
                info!("Generated summary ({} chars)", summary.chars().count());
                summary
            }
            Err(e) => {
                warn!("Summary generation failed: {e}");
                FALLBACK_SUMMARY.to_string()
            }
        }
    }
}
