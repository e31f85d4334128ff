//! Display-name policy for new sessions.

use crate::SessionError;

/// Placeholder used when a session is created without a usable name.
pub const DEFAULT_SESSION_NAME: &str = "New Session";

/// Longest accepted name, in characters.
pub const MAX_NAME_LEN: usize = 256;

/// Turns the optional, caller-supplied name into the stored one.
///
/// Absent or whitespace-only names fall back to `default_name`. Other
/// names are trimmed and must fit in `max_len` characters.
#[derive(Debug, Clone)]
pub struct NamePolicy {
    pub default_name: String,
    pub max_len: usize,
}

impl Default for NamePolicy {
    fn default() -> Self {
        Self {
            default_name: DEFAULT_SESSION_NAME.to_owned(),
            max_len: MAX_NAME_LEN,
        }
    }
}

impl NamePolicy {
    pub fn apply(&self, raw: Option<&str>) -> Result<String, SessionError> {
        let trimmed = raw.map(str::trim).unwrap_or_default();
        if trimmed.is_empty() {
            return Ok(self.default_name.clone());
        }
        let len = trimmed.chars().count();
        if len > self.max_len {
            return Err(SessionError::Validation(format!(
                "session name is {len} characters, limit is {}",
                self.max_len
            )));
        }
        Ok(trimmed.to_owned())
    }
}
