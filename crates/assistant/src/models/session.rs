//! Chat session model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cartwise_core::{Country, SessionId, UserId};

/// Title given to every new session until the first search renames it.
pub const DEFAULT_SESSION_TITLE: &str = "New Shopping Session";

/// Maximum characters of joined keywords kept in a generated title.
const MAX_TITLE_CHARS: usize = 20;

/// A shopping conversation owned by a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub title: String,
    /// Marketplace locale, fixed at creation.
    pub country: Country,
    pub created_at: DateTime<Utc>,
    pub is_disabled: bool,
}

impl Session {
    /// Whether the title has never been replaced.
    #[must_use]
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_SESSION_TITLE
    }
}

/// Build a session title from search keywords.
///
/// Keywords are joined with spaces; titles longer than 20 characters are cut
/// at 20 and suffixed with `" ..."`.
#[must_use]
pub fn title_from_keywords(keywords: &[String]) -> String {
    let joined = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if joined.chars().count() <= MAX_TITLE_CHARS {
        joined
    } else {
        let truncated: String = joined.chars().take(MAX_TITLE_CHARS).collect();
        format!("{truncated} ...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_title_short_keywords() {
        assert_eq!(title_from_keywords(&keywords(&["blue", "hoodie"])), "blue hoodie");
    }

    #[test]
    fn test_title_truncates_long_keywords() {
        let title = title_from_keywords(&keywords(&["waterproof", "hiking", "boots", "women"]));
        assert_eq!(title, "waterproof hiking bo ...");
    }

    #[test]
    fn test_title_exactly_twenty_chars_is_kept() {
        let title = title_from_keywords(&keywords(&["abcdefghij", "klmnopqrs"]));
        assert_eq!(title.chars().count(), 20);
        assert!(!title.ends_with("..."));
    }

    #[test]
    fn test_title_multibyte_safe() {
        let title = title_from_keywords(&keywords(&["ساعة", "ذكية", "رياضية", "للرجال"]));
        assert!(title.ends_with(" ..."));
    }

    #[test]
    fn test_default_title_detection() {
        let session = Session {
            id: SessionId::generate(),
            user_id: UserId::generate(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            country: Country::parse("ae").expect("country"),
            created_at: Utc::now(),
            is_disabled: false,
        };
        assert!(session.has_default_title());
    }
}
