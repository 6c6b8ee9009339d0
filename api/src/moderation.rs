use reframe_core::coaching::SafetyCategory;

use crate::provider::{LanguageModel, ModerationOutcome};
use crate::runner::{ModelRunner, RunContext};

/// Ask the provider's moderation classifier about `text`.
///
/// Runs only when a provider is configured. Any failure (timeout, transport,
/// bad status) is logged and treated as "not flagged"; the heuristic screen
/// has already run by the time this is called.
pub async fn optional_moderation_check(
    runner: &ModelRunner,
    provider: Option<&dyn LanguageModel>,
    text: &str,
) -> Option<SafetyCategory> {
    let provider = provider?;
    if text.trim().is_empty() {
        return None;
    }

    match runner
        .run_once(RunContext::new("moderation", None), || provider.moderate(text))
        .await
    {
        Ok(outcome) => category_for(&outcome),
        Err(err) => {
            tracing::warn!(error = %err, "moderation check failed, continuing without it");
            None
        }
    }
}

fn category_for(outcome: &ModerationOutcome) -> Option<SafetyCategory> {
    if !outcome.flagged {
        return None;
    }
    let has = |prefix: &str| outcome.categories.iter().any(|c| c.starts_with(prefix));
    if has("self-harm") || has("self_harm") {
        Some(SafetyCategory::SelfHarmRisk)
    } else if has("violence") {
        Some(SafetyCategory::ViolenceRisk)
    } else {
        Some(SafetyCategory::Other)
    }
}
