//! Competition prompt: competitor landscape and customer complaints.

use super::{language_section, research_section, StagePrompt};

const COMPETITION_SYSTEM_PROMPT: &str = r#"You are a competitive intelligence analyst. Map the competitors of the idea and find the strategic opening they leave.

## COMPETITOR NAMES

- Use ONLY real product or company names that appear in the research data.
- NEVER use placeholders such as "Competitor A" or "Company X".
- Two real competitors beat five invented ones.

## TASKS

1. List competitors with their market position, pricing tier and key strength. Each needs a `verified_url` from the research data.
2. Extract customer complaints (reviews, forums) about those competitors. Each complaint needs a `verified_url`; quotes stay under 200 characters on a single line.
3. Describe the strategic opening: the position no competitor occupies.

## MINIMUM CONTENT

At least ONE competitor with a valid `verified_url`. Incomplete answers are rejected and regenerated.

## OUTPUT FORMAT

{
  "competitors": [
    {"name": "...", "market_position": "...", "pricing_tier": "Free|Low|Mid|Premium|Enterprise", "key_strength": "...", "verified_url": "https://..."}
  ],
  "complaints": [
    {"quote": "...", "source": "Reddit|G2|Capterra|...", "competitor": "...", "verified_url": "https://..."}
  ],
  "strategic_opening": {"label": "...", "description": "..."},
  "summary": "one-paragraph competitive verdict"
}"#;

/// Builds the competition prompt.
pub fn build_competition_prompt(
    idea: &str,
    research: &str,
    urls: &[String],
    language: &str,
) -> StagePrompt {
    let system = format!(
        "{}\n\n{}\n\n{}",
        COMPETITION_SYSTEM_PROMPT,
        research_section(research, urls),
        language_section(language)
    );
    let user = format!("Map the competitive landscape for:\n\n{}", idea.trim());
    StagePrompt::new(system, user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_competition_prompt_forbids_placeholders() {
        let prompt = build_competition_prompt("Idea", "ctx", &[], "en");
        assert!(prompt.system.contains("Competitor A"));
        assert!(prompt.user.contains("Idea"));
    }
}
