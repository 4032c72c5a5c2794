use regex::Regex;

use crate::error::{MeetError, MeetResult};

pub const MEET_HOST: &str = "meet.google.com";

/// A validated Google Meet link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetUrl {
    pub url: String,
    pub code: String,
}

impl MeetUrl {
    pub fn from_code(code: &str) -> Self {
        Self {
            url: format!("https://{}/{}", MEET_HOST, code),
            code: code.to_string(),
        }
    }
}

/// Compiled patterns for recognising Meet links in URLs and free text.
#[derive(Debug, Clone)]
pub struct MeetUrlParser {
    full_url: Regex,
    embedded_url: Regex,
    code_in_url: Regex,
    meeting_code: Regex,
}

impl MeetUrlParser {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            full_url: Regex::new(r"^https?://meet\.google\.com/([\w-]+)(?:/[\w-]+)?(?:\?\S*)?$")?,
            embedded_url: Regex::new(r"https?://meet\.google\.com/[\w-]+(?:/[\w-]+)?(?:\?\S*)*")?,
            code_in_url: Regex::new(r"meet\.google\.com/([\w-]+)")?,
            meeting_code: Regex::new(r"(?i)\b[a-z]{3}-[a-z]{4}-[a-z]{3}\b")?,
        })
    }

    /// Validate a Meet URL. Rejects anything that is not a meet.google.com
    /// link with a code of at least three characters.
    pub fn parse(&self, url: &str) -> MeetResult<MeetUrl> {
        let trimmed = url.trim();
        let code = self
            .full_url
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|code| code.len() >= 3)
            .ok_or_else(|| MeetError::InvalidMeetUrl(trimmed.to_string()))?;

        Ok(MeetUrl {
            url: trimmed.to_string(),
            code: code.to_string(),
        })
    }

    /// First Meet URL found in free text, validated.
    pub fn extract(&self, text: &str) -> MeetResult<MeetUrl> {
        let found = self
            .embedded_url
            .find(text)
            .map(|m| m.as_str())
            .ok_or_else(|| MeetError::InvalidMeetUrl(text.trim().to_string()))?;
        self.parse(found)
    }

    pub fn contains_url(&self, text: &str) -> bool {
        self.code_in_url.is_match(text)
    }

    /// Meeting code embedded in any string mentioning meet.google.com.
    pub fn code_of(&self, url: &str) -> Option<String> {
        self.code_in_url
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_ascii_lowercase())
    }

    /// A bare `abc-defg-hij` style code mentioned in text.
    pub fn find_meeting_code(&self, text: &str) -> Option<String> {
        self.meeting_code
            .find(text)
            .map(|m| m.as_str().to_ascii_lowercase())
    }
}
