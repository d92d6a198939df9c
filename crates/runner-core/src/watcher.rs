use regex::Regex;

use crate::error::WatcherError;

/// Inspects accumulated output and optionally emits text to write back to
/// the child's stdin.
///
/// `submit` receives the *entire* text seen on the watched stream so far,
/// not just the newest chunk — implementations that only care about new
/// matches are expected to track their own read position (see
/// [`Responder`]).
pub trait StreamWatcher: Send {
    fn submit(&mut self, accumulated_text: &str) -> Result<Vec<String>, WatcherError>;
}

/// Responds to a literal substring with a fixed reply, once per
/// non-overlapping occurrence.
///
/// Tracks how much of the accumulated text it has already scanned so a
/// pattern seen once isn't answered twice, and so a response isn't searched
/// for matches against its own trigger.
#[derive(Debug, Clone)]
pub struct Responder {
    pattern: String,
    response: String,
    index: usize,
}

impl Responder {
    pub fn new(pattern: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            response: response.into(),
            index: 0,
        }
    }
}

impl StreamWatcher for Responder {
    fn submit(&mut self, accumulated_text: &str) -> Result<Vec<String>, WatcherError> {
        if self.pattern.is_empty() {
            return Ok(Vec::new());
        }
        let mut responses = Vec::new();
        let mut search_from = self.index;
        while let Some(found_at) = accumulated_text[search_from..].find(&self.pattern) {
            let match_start = search_from + found_at;
            let match_end = match_start + self.pattern.len();
            responses.push(self.response.clone());
            self.index = match_end;
            search_from = match_end;
        }
        Ok(responses)
    }
}

/// As [`Responder`], but matches via regex and supports `\N`-style
/// backreferences (rendered here as `{0}`, `{1}`, ... capture-group
/// placeholders) in the response template.
pub struct RegexResponder {
    pattern: Regex,
    response: String,
    index: usize,
}

impl RegexResponder {
    pub fn new(pattern: &str, response: impl Into<String>) -> Result<Self, WatcherError> {
        let pattern = Regex::new(pattern).map_err(|e| WatcherError::new(e.to_string()))?;
        Ok(Self {
            pattern,
            response: response.into(),
            index: 0,
        })
    }

    fn render(&self, caps: &regex::Captures) -> String {
        let mut out = String::new();
        let bytes = self.response.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' {
                if let Some(end) = self.response[i..].find('}') {
                    let end = i + end;
                    if let Ok(group) = self.response[i + 1..end].parse::<usize>() {
                        if let Some(m) = caps.get(group) {
                            out.push_str(m.as_str());
                        }
                        i = end + 1;
                        continue;
                    }
                }
            }
            let ch = self.response[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
        out
    }
}

impl StreamWatcher for RegexResponder {
    fn submit(&mut self, accumulated_text: &str) -> Result<Vec<String>, WatcherError> {
        let mut responses = Vec::new();
        let mut search_from = self.index;
        while let Some(caps) = self.pattern.captures(&accumulated_text[search_from..]) {
            let whole = caps.get(0).unwrap();
            let match_start = search_from + whole.start();
            let match_end = search_from + whole.end();
            responses.push(self.render(&caps));
            self.index = match_end;
            search_from = if match_end > match_start {
                match_end
            } else {
                match_end + 1
            };
            if search_from > accumulated_text.len() {
                break;
            }
        }
        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responder_fires_once_per_non_overlapping_occurrence() {
        let mut responder = Responder::new("jump", "how high?");
        let out = responder.submit("please jump now").unwrap();
        assert_eq!(out, vec!["how high?".to_string()]);

        let out = responder.submit("please jump now").unwrap();
        assert!(out.is_empty(), "already-seen match must not re-fire");

        let out = responder.submit("please jump now, jump again").unwrap();
        assert_eq!(out, vec!["how high?".to_string()]);
    }

    #[test]
    fn responder_fires_for_every_new_occurrence_in_one_call() {
        let mut responder = Responder::new("go", "going");
        let out = responder.submit("go go go").unwrap();
        assert_eq!(out, vec!["going", "going", "going"]);
    }

    #[test]
    fn raising_watcher_propagates_error() {
        struct Raising;
        impl StreamWatcher for Raising {
            fn submit(&mut self, _: &str) -> Result<Vec<String>, WatcherError> {
                Err(WatcherError::new("meh"))
            }
        }
        let mut watcher = Raising;
        let err = watcher.submit("anything").unwrap_err();
        assert_eq!(err.0, "meh");
    }

    #[test]
    fn regex_responder_matches_and_advances_index() {
        let mut responder = RegexResponder::new(r"value=(\d+)", "got {1}").unwrap();
        let out = responder.submit("value=42 value=43").unwrap();
        assert_eq!(out, vec!["got 42".to_string(), "got 43".to_string()]);

        let out = responder.submit("value=42 value=43").unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn regex_responder_rejects_invalid_pattern() {
        assert!(RegexResponder::new("(", "x").is_err());
    }
}
