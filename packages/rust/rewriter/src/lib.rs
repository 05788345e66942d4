//! Headline to yes/no question rewriting.
//!
//! This crate provides:
//! - [`TextGenerator`]: the seam for remote text generation
//! - [`GeminiClient`]: the Gemini implementation of that seam
//! - [`Rewriter`]: remote call with a deterministic local fallback
//! - [`fit_question`]: the fallback and length guard

pub mod fit;
pub mod gemini;
pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use enquete_shared::Result;

pub use fit::fit_question;
pub use gemini::GeminiClient;
pub use prompt::build_prompt;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Remote text generation: one prompt in, raw answer text out.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate an answer. Failures are `EnqueteError::Rewrite`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Rewriter
// ---------------------------------------------------------------------------

/// Where a question came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewriteOrigin {
    /// The remote generator answered.
    Generated,
    /// The generator failed or was not configured; the headline was fitted locally.
    Fallback { reason: String },
}

/// A rewritten question and its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    pub question: String,
    pub origin: RewriteOrigin,
}

/// Turns headlines into bounded-length questions.
#[derive(Clone)]
pub struct Rewriter {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl Rewriter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    /// A rewriter that always uses the local fallback.
    pub fn offline() -> Self {
        Self { generator: None }
    }

    /// Rewrite `text` into a question of at most `max_chars` characters.
    ///
    /// Recoverable generator failures fall back to [`fit_question`] on the
    /// headline. The returned question always satisfies the
    /// [`fit_question`] contract, generated or not.
    #[instrument(skip_all, fields(max_chars = max_chars))]
    pub async fn rewrite(&self, text: &str, max_chars: usize) -> Result<Rewrite> {
        let Some(generator) = &self.generator else {
            return Ok(fallback(text, max_chars, "no text generator configured".into()));
        };

        match generator.generate(&build_prompt(text, max_chars)).await {
            Ok(answer) => {
                let question = fit_question(&answer, max_chars);
                info!(chars = question.chars().count(), "question generated");
                Ok(Rewrite {
                    question,
                    origin: RewriteOrigin::Generated,
                })
            }
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "rewrite failed, using fallback");
                Ok(fallback(text, max_chars, e.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

fn fallback(text: &str, max_chars: usize, reason: String) -> Rewrite {
    Rewrite {
        question: fit_question(text, max_chars),
        origin: RewriteOrigin::Fallback { reason },
    }
}

impl std::fmt::Debug for Rewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rewriter")
            .field("remote", &self.generator.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enquete_shared::EnqueteError;

    const PROCON: &str = "Procon Recife promove Semana das Crianças com oficinas sobre consumo consciente na Rede Compaz";

    struct Fixed(String);

    #[async_trait]
    impl TextGenerator for Fixed {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct Failing(fn() -> EnqueteError);

    #[async_trait]
    impl TextGenerator for Failing {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err((self.0)())
        }
    }

    #[tokio::test]
    async fn generated_answer_is_used() {
        let rewriter = Rewriter::new(Arc::new(Fixed("Você concorda com a iniciativa?".into())));
        let rewrite = rewriter.rewrite(PROCON, 96).await.unwrap();
        assert_eq!(rewrite.question, "Você concorda com a iniciativa?");
        assert_eq!(rewrite.origin, RewriteOrigin::Generated);
    }

    #[tokio::test]
    async fn overlong_generated_answer_is_fitted() {
        let long = "Você concorda que a prefeitura deveria ampliar as oficinas de consumo consciente para todas as unidades da Rede Compaz da cidade";
        let rewriter = Rewriter::new(Arc::new(Fixed(long.into())));
        let rewrite = rewriter.rewrite(PROCON, 96).await.unwrap();
        assert!(rewrite.question.chars().count() <= 96);
        assert!(rewrite.question.ends_with('?'));
        assert!(rewrite.question.starts_with("Você concorda"));
        assert_eq!(rewrite.origin, RewriteOrigin::Generated);
    }

    #[tokio::test]
    async fn timeout_falls_back_to_headline() {
        let rewriter = Rewriter::new(Arc::new(Failing(|| EnqueteError::Rewrite("operation timed out".into()))));
        let rewrite = rewriter.rewrite(PROCON, 96).await.unwrap();

        assert!(rewrite.question.chars().count() <= 96);
        assert!(rewrite.question.ends_with('?'));
        assert_eq!(rewrite.question, format!("{PROCON}?"));
        match rewrite.origin {
            RewriteOrigin::Fallback { reason } => assert!(reason.contains("timed out")),
            other => panic!("unexpected origin {other:?}"),
        }
    }

    #[tokio::test]
    async fn fallback_respects_small_budgets() {
        let rewriter = Rewriter::new(Arc::new(Failing(|| EnqueteError::Rewrite("boom".into()))));
        for max in [1, 5, 20, 40] {
            let rewrite = rewriter.rewrite(PROCON, max).await.unwrap();
            assert!(rewrite.question.chars().count() <= max);
            assert!(rewrite.question.ends_with('?'));
        }
    }

    #[tokio::test]
    async fn fallback_reason_never_carries_the_api_key() {
        let config = enquete_shared::GeminiConfig {
            endpoint: "http://127.0.0.1:9/v1beta".into(),
            ..Default::default()
        };
        let client = GeminiClient::new(&config, Some("SUPER-SECRET-KEY".into())).unwrap();

        let rewrite = Rewriter::new(Arc::new(client)).rewrite(PROCON, 96).await.unwrap();
        match rewrite.origin {
            RewriteOrigin::Fallback { reason } => {
                assert!(reason.contains("gemini request failed"));
                assert!(!reason.contains("SUPER-SECRET-KEY"));
            }
            other => panic!("unexpected origin {other:?}"),
        }
    }

    #[tokio::test]
    async fn offline_rewriter_uses_fallback() {
        let rewrite = Rewriter::offline().rewrite("Câmara aprova orçamento.", 96).await.unwrap();
        assert_eq!(rewrite.question, "Câmara aprova orçamento?");
        assert!(matches!(rewrite.origin, RewriteOrigin::Fallback { .. }));
    }

    #[tokio::test]
    async fn unrecoverable_error_propagates() {
        let rewriter = Rewriter::new(Arc::new(Failing(|| EnqueteError::Storage("disk".into()))));
        let err = rewriter.rewrite(PROCON, 96).await.unwrap_err();
        assert!(matches!(err, EnqueteError::Storage(_)));
    }

    #[test]
    fn origin_serializes_with_kind_tag() {
        let json = serde_json::to_value(RewriteOrigin::Fallback {
            reason: "x".into(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "fallback", "reason": "x" }));
    }
}
