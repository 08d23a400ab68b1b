//! Content screening: reject threads that carry script-injection markers.
//!
//! The screen is all-or-nothing.  Content is never rewritten.

use once_cell::sync::Lazy;
use regex::RegexSet;

use crate::error::AppError;
use crate::ThreadMessage;

static SUSPICIOUS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"(?i)script\s*:",
        r"(?i)javascript\s*:",
        r"(?i)data\s*:",
        r"(?i)<\s*script",
        r"(?i)on\w+\s*=",
    ])
    .unwrap()
});

pub fn is_suspicious(text: &str) -> bool {
    SUSPICIOUS.is_match(text)
}

/// Fails on the first message whose sender or text matches a pattern.
pub fn screen_thread(thread: &[ThreadMessage]) -> Result<(), AppError> {
    match thread
        .iter()
        .position(|m| is_suspicious(&m.sender) || is_suspicious(&m.text))
    {
        Some(message_index) => {
            tracing::warn!(message_index, "suspicious content detected in thread");
            Err(AppError::SuspiciousContent { message_index })
        }
        None => Ok(()),
    }
}
