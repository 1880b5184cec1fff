//! Prompt templates.

use askama::Template;

use cartwise_core::Country;

/// Maximum products the model is asked to pick in the top-picks step.
const MAX_TOP_PICKS: usize = 4;

/// System prompt for every model call.
#[derive(Template)]
#[template(path = "prompts/system.txt")]
pub struct SystemPromptTemplate<'a> {
    pub country: &'a str,
    pub country_name: &'a str,
}

/// Nudge appended after the accumulated search results.
#[derive(Template)]
#[template(path = "prompts/top_picks.txt")]
pub struct TopPicksTemplate<'a> {
    pub keywords: &'a str,
    pub max_picks: usize,
}

/// Render the system prompt for a session country.
///
/// # Errors
///
/// Returns `askama::Error` if rendering fails.
pub fn system_prompt(country: &Country) -> Result<String, askama::Error> {
    SystemPromptTemplate {
        country: country.as_str(),
        country_name: country_name(country),
    }
    .render()
}

/// Render the top-picks nudge for a keyword set.
///
/// # Errors
///
/// Returns `askama::Error` if rendering fails.
pub fn top_picks_prompt(keywords: &[String]) -> Result<String, askama::Error> {
    TopPicksTemplate {
        keywords: &keywords.join(" "),
        max_picks: MAX_TOP_PICKS,
    }
    .render()
}

fn country_name(country: &Country) -> &'static str {
    match country.as_str() {
        "ae" => "the United Arab Emirates",
        "sa" => "Saudi Arabia",
        "eg" => "Egypt",
        "us" => "the United States",
        "gb" | "uk" => "the United Kingdom",
        _ => "your country",
    }
}
