use chrono::{DateTime, Duration, Utc};

use crate::error::ParseError;

/// Longest question or choice text accepted for storage
pub const MAX_TEXT_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub id: i64,
    pub question_text: String,
    /// Date published. The question stays hidden from the public pages until then.
    pub pub_date: DateTime<Utc>,
}

impl Question {
    /// Whether the question was published within the 24 hours before `now`:
    /// `now - 1 day < pub_date <= now`.
    pub fn was_published_recently_at(&self, now: DateTime<Utc>) -> bool {
        let one_day_ago = now - Duration::days(1);
        one_day_ago < self.pub_date && self.pub_date <= now
    }

    /// Shown in the admin question list as "Published recently"
    pub fn was_published_recently(&self) -> bool {
        self.was_published_recently_at(Utc::now())
    }

    /// Whether the public pages may show the question at `now`
    pub fn is_published_at(&self, now: DateTime<Utc>) -> bool {
        self.pub_date <= now
    }
}

impl std::fmt::Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.question_text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub id: i64,
    pub question_id: i64,
    pub choice_text: String,
    pub votes: i64,
}

impl std::fmt::Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.choice_text)
    }
}

/// Checks a question or choice text against the storage limit
pub fn check_text(text: &str) -> Result<&str, ParseError> {
    let len = text.chars().count();
    if len > MAX_TEXT_LEN {
        return Err(ParseError::TooLong {
            max: MAX_TEXT_LEN,
            len,
        });
    }
    Ok(text)
}
