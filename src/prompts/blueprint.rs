//! Blueprint prompt: MVP architecture and user flow.

use super::{language_section, StagePrompt};

const BLUEPRINT_SYSTEM_PROMPT: &str = r#"You are a senior software architect planning the minimum viable product for a solo founder.

## TASKS

1. Tech stack grouped in categories (frontend, backend, data, infrastructure, AI...). Every category lists at least one concrete technology.
2. The core user flow as numbered steps, from first visit to the moment the user gets value.
3. Third-party integrations the MVP needs, each with a category and a one-line justification.
4. MVP milestones with a duration in weeks.
5. The main technical risks with a mitigation each.

Prefer boring, well-documented technology a single developer can ship in weeks.

## OUTPUT FORMAT

{
  "tech_stack": [
    {"name": "Frontend", "technologies": ["..."]}
  ],
  "user_flow": [
    {"step": 1, "action": "..."}
  ],
  "integrations": [
    {"name": "...", "category": "...", "justification": "..."}
  ],
  "milestones": [
    {"title": "...", "duration_weeks": 2, "deliverables": ["..."]}
  ],
  "tech_risks": [
    {"risk": "...", "mitigation": "..."}
  ],
  "summary": "one-paragraph build verdict"
}"#;

/// Builds the blueprint prompt.
pub fn build_blueprint_prompt(idea: &str, language: &str) -> StagePrompt {
    let system = format!("{}\n\n{}", BLUEPRINT_SYSTEM_PROMPT, language_section(language));
    let user = format!("Design the MVP blueprint for:\n\n{}", idea.trim());
    StagePrompt::new(system, user)
}
