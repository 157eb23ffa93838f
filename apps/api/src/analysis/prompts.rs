use crate::llm_client::prompts::JSON_ONLY_INSTRUCTION;

pub const RADAR_PROMPT_TEMPLATE: &str = r#"You are a technology career advisor. Scan current market signals and recommend the skills and technologies this candidate should learn next.

Respond with a single JSON object in exactly this structure:
{
  "run_date": "ISO 8601 date",
  "current_profile_summary": "string",
  "recommended_technologies": [
    {
      "technology_name": "string",
      "category": "AI Analytics|BI|Data Engineering|Governance|Cloud|Orchestration|Data Quality|Semantic Layer",
      "short_description": "string",
      "why_relevant_for_me": "string",
      "priority": "High|Medium|Low",
      "learning_difficulty": "Easy|Medium|Hard",
      "market_signal": "High|Medium|Low",
      "project_idea": "string",
      "sources": ["https://example.com"]
    }
  ],
  "top_5_next_skills": ["string"]
}

Rules:
- Recommend 6 to 8 technologies.
- Sort technologies by priority: High first, then Medium, then Low.
- Prioritize practical enterprise adoption.
- Tailor every recommendation to the CV and the target role.
- Include real source URLs.
- {json_only}"#;

/// Builds the radar prompt for one job.
pub fn build_radar_prompt(cv_content: &str, target_role: &str) -> String {
    // User text is appended, never substituted, so it cannot inject placeholders.
    let instructions = RADAR_PROMPT_TEMPLATE.replace("{json_only}", JSON_ONLY_INSTRUCTION);
    format!(
        "{instructions}\n\nCV:\n{}\n\nTarget Role:\n{}",
        cv_content.trim(),
        target_role.trim()
    )
}
