//! Rescue prompt for ideas that fail the gate.

use super::{language_section, StagePrompt};

const RESCUE_SYSTEM_PROMPT: &str = r#"You are a pragmatic startup advisor. The idea below scored too low to pursue as stated.

Propose exactly two ways forward:
- IMPROVE: keep the core idea but fix its weakest dimensions.
- PIVOT: reuse the insight for a different audience, market or model.

Each option needs a short `title`, a `description` of 2-3 sentences, and an `ai_suggested_prompt`: a 5-10 word rewritten idea the user can resubmit.

## OUTPUT FORMAT

{
  "improve": {"title": "...", "description": "...", "ai_suggested_prompt": "..."},
  "pivot": {"title": "...", "description": "...", "ai_suggested_prompt": "..."}
}"#;

/// Builds the rescue prompt from the score and the weakest dimensions.
pub fn build_rescue_prompt(
    idea: &str,
    score: u8,
    weakest: &[(String, f64)],
    language: &str,
) -> StagePrompt {
    let weaknesses = if weakest.is_empty() {
        "- No dimension breakdown available".to_string()
    } else {
        weakest
            .iter()
            .map(|(name, value)| format!("- {}: {}/10", name, value))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let system = format!("{}\n\n{}", RESCUE_SYSTEM_PROMPT, language_section(language));
    let user = format!(
        "Idea: {}\n\nOpportunity score: {}/100\n\nWeakest dimensions:\n{}",
        idea.trim(),
        score,
        weaknesses
    );
    StagePrompt::new(system, user)
}
