//! Response patterns for request correlation

use crate::traits::{Frame, Result, SessionError};
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// A regular expression tested against the text of every incoming frame
///
/// Frames are matched on their lossy UTF-8 rendering, so binary replies
/// can still be matched with byte escapes such as `\x06`.
#[derive(Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile a regular expression
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|e| SessionError::InvalidPattern(e.to_string()))
    }

    /// Match `text` literally, with no regex metacharacters
    pub fn literal(text: &str) -> Result<Self> {
        Self::new(&regex::escape(text))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Test `text` (the rendering of `frame`) and capture the match
    pub(crate) fn capture(&self, text: &str, frame: &Frame) -> Option<ResponseMatch> {
        let caps = self.0.captures(text)?;
        let captures = caps
            .iter()
            .skip(1)
            .map(|group| group.map(|m| m.as_str().to_string()))
            .collect();

        Some(ResponseMatch {
            matched: caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default(),
            captures,
            frame: frame.clone(),
        })
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.0.as_str()).finish()
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Self(regex)
    }
}

impl FromStr for Pattern {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Pattern {
    type Error = SessionError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// The part of a frame that satisfied a request pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMatch {
    /// Text of the whole match
    pub matched: String,
    /// Capture groups 1..n, `None` where a group did not participate
    pub captures: Vec<Option<String>>,
    /// The frame the match was found in
    pub frame: Frame,
}

impl ResponseMatch {
    pub fn as_str(&self) -> &str {
        &self.matched
    }

    /// Group `index`; 0 is the whole match
    pub fn get(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return Some(&self.matched);
        }
        self.captures.get(index - 1)?.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(pattern: &Pattern, text: &'static str) -> Option<ResponseMatch> {
        pattern.capture(text, &Frame::from(text))
    }

    #[test]
    fn test_capture_groups() {
        let pattern = Pattern::new(r"ERR (\d+)(?: (\w+))?").unwrap();
        let m = check(&pattern, "ERR 3\n").unwrap();
        assert_eq!(m.as_str(), "ERR 3");
        assert_eq!(m.get(1), Some("3"));
        assert_eq!(m.get(2), None);
        assert_eq!(m.get(3), None);
        assert_eq!(m.frame, Frame::from("ERR 3\n"));
    }

    #[test]
    fn test_no_match() {
        let pattern = Pattern::new("^OK$").unwrap();
        assert!(check(&pattern, "NOK").is_none());
    }

    #[test]
    fn test_literal_escapes_metacharacters() {
        let pattern = Pattern::literal("VOL?").unwrap();
        assert!(check(&pattern, "VOL?").is_some());
        assert!(check(&pattern, "VO").is_none());
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            Pattern::new("(unclosed"),
            Err(SessionError::InvalidPattern(_))
        ));
        assert!("[ok".parse::<Pattern>().is_err());
    }
}
