//! Prompt builders for the generating stages.
//!
//! Every stage sends one system prompt (role, grounding rules, output
//! contract) and one user prompt (the idea plus stage-specific context).
//! Research-grounded stages embed the rendered `[SOURCE n]` blocks and the
//! list of URLs the model is allowed to cite.
//!
//! # Usage
//!
//! ```no_run
//! use verdict_forge::prompts::build_gate_prompt;
//!
//! let prompt = build_gate_prompt("Invoice OCR for plumbers", "[SOURCE 1] ...", &[], "en");
//! assert!(prompt.system.contains("VERIFIED_URL"));
//! ```

pub mod blueprint;
pub mod competition;
pub mod finance;
pub mod gate;
pub mod rescue;

pub use blueprint::build_blueprint_prompt;
pub use competition::build_competition_prompt;
pub use finance::build_finance_prompt;
pub use gate::build_gate_prompt;
pub use rescue::build_rescue_prompt;

/// A system/user prompt pair for one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePrompt {
    /// System prompt establishing the role and output contract.
    pub system: String,
    /// User prompt carrying the idea and context.
    pub user: String,
}

impl StagePrompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Output language rules shared by every stage.
pub(crate) fn language_section(language: &str) -> String {
    format!(
        "## LANGUAGE\n\n\
         Write every textual value in **{language}**. Keep JSON keys in English. \
         Keep standard industry terms (TAM, SAM, CAGR, CAC, LTV, MVP, B2B, B2C) \
         untranslated."
    )
}

/// Research block plus the whitelist of citable URLs.
pub(crate) fn research_section(context: &str, urls: &[String]) -> String {
    let context = if context.trim().is_empty() {
        "No research data available."
    } else {
        context
    };
    let urls = if urls.is_empty() {
        "No URLs available".to_string()
    } else {
        urls.iter()
            .map(|url| format!("- {url}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "## RESEARCH DATA\n\n{context}\n\n\
         ## CITABLE URLS\n\n{urls}\n\n\
         Every `verified_url` you output MUST be copied verbatim from a \
         VERIFIED_URL line above. Omit any item you cannot back with one of \
         these URLs; fewer verified items beat many unverified ones."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_research_section_lists_urls() {
        let section = research_section(
            "[SOURCE 1]\nTitle: A\nVERIFIED_URL: https://a.example",
            &["https://a.example".to_string()],
        );
        assert!(section.contains("- https://a.example"));
        assert!(section.contains("VERIFIED_URL"));
    }

    #[test]
    fn test_research_section_without_data() {
        let section = research_section("  ", &[]);
        assert!(section.contains("No research data available."));
        assert!(section.contains("No URLs available"));
    }

    #[test]
    fn test_language_section() {
        assert!(language_section("fr").contains("**fr**"));
    }
}
