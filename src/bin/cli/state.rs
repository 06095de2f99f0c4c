use chrono::{DateTime, Local};
use std::collections::HashSet;

/// Upper bound on remembered lines for `--dedupe`
pub const MAX_SEEN: usize = 100_000;

/// Per-session counters and the line filter
pub struct SessionState {
    /// Session start time
    pub start_time: DateTime<Local>,

    /// Connection info
    pub url: String,
    pub filter: String,

    pub notifications: u64,
    pub lines_printed: u64,
    pub errors: u64,
    pub reconnects: u64,
    pub connections: u64,

    /// Only lines containing this text are printed
    contains: Option<String>,
    /// Dedupe on the digits after `<key>=` instead of the whole line
    dedupe_key: Option<String>,
    /// Previously printed lines (or key values), when deduplicating
    seen: Option<HashSet<String>>,
}

impl SessionState {
    pub fn new(url: String, filter: String, contains: Option<String>) -> Self {
        Self {
            start_time: Local::now(),
            url,
            filter,
            notifications: 0,
            lines_printed: 0,
            errors: 0,
            reconnects: 0,
            connections: 0,
            contains,
            dedupe_key: None,
            seen: None,
        }
    }

    /// Enable deduplication, on whole lines or on a `key=<digits>` value.
    pub fn dedupe(mut self, lines: bool, key: Option<String>) -> Self {
        self.seen = (lines || key.is_some()).then(HashSet::new);
        self.dedupe_key = key;
        self
    }

    /// Decide whether a log line should be printed, and remember it if so.
    pub fn accept_line(&mut self, line: &str) -> bool {
        if let Some(needle) = &self.contains {
            if !line.contains(needle.as_str()) {
                return false;
            }
        }
        let identity = match &self.dedupe_key {
            Some(key) => match key_value(line, key) {
                Some(value) => value,
                None => return false,
            },
            None => line,
        };
        if let Some(seen) = &mut self.seen {
            if seen.contains(identity) {
                return false;
            }
            if seen.len() >= MAX_SEEN {
                seen.clear();
            }
            seen.insert(identity.to_string());
        }
        self.lines_printed += 1;
        true
    }

    pub fn record_connected(&mut self) {
        if self.connections > 0 {
            self.reconnects += 1;
        }
        self.connections += 1;
    }

    /// Generate session summary text
    pub fn generate_summary(&self) -> String {
        let end_time = Local::now();
        let duration = end_time.signed_duration_since(self.start_time);
        let total_secs = duration.num_seconds();
        let mins = total_secs / 60;
        let secs = total_secs % 60;

        let rule = "═".repeat(60);
        let mut lines = Vec::new();
        lines.push(rule.clone());
        lines.push("  logsub Session Report".to_string());
        lines.push(rule.clone());
        lines.push(format!("  Endpoint:       {}", self.url));
        lines.push(format!("  Filter:         {}", self.filter));
        lines.push(format!("  Started:        {}", self.start_time.format("%Y-%m-%d %H:%M:%S")));
        lines.push(format!("  Ended:          {}", end_time.format("%Y-%m-%d %H:%M:%S")));
        lines.push(format!("  Duration:       {}m {}s", mins, secs));
        lines.push(String::new());
        lines.push(format!("  Notifications:  {}", self.notifications));
        lines.push(format!("  Lines printed:  {}", self.lines_printed));
        lines.push(format!("  Reconnects:     {}", self.reconnects));
        lines.push(format!("  Errors:         {}", self.errors));
        lines.push(rule);
        lines.join("\n")
    }
}

/// Digits following the first `key=` in `line` that has any.
fn key_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("{}=", key);
    line.match_indices(pattern.as_str()).find_map(|(at, _)| {
        let rest = &line[at + pattern.len()..];
        let end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        (end > 0).then(|| &rest[..end])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_filter() {
        let mut s = SessionState::new("ws://x".into(), "all".into(), Some("PrimeFound".into()));
        assert!(s.accept_line("Program log: PrimeFound number_to_test=7"));
        assert!(!s.accept_line("Program log: nothing here"));
        assert!(s.accept_line("Program log: PrimeFound number_to_test=7"));
        assert_eq!(s.lines_printed, 2);
    }

    #[test]
    fn dedupe_suppresses_repeats() {
        let mut s = SessionState::new("ws://x".into(), "all".into(), None).dedupe(true, None);
        assert!(s.accept_line("a"));
        assert!(!s.accept_line("a"));
        assert!(s.accept_line("b"));
    }

    #[test]
    fn reconnects_counted_after_first_connection() {
        let mut s = SessionState::new("ws://x".into(), "all".into(), None);
        s.record_connected();
        s.record_connected();
        assert_eq!(s.connections, 2);
        assert_eq!(s.reconnects, 1);
        assert!(s.generate_summary().contains("Reconnects:     1"));
    }

    #[test]
    fn dedupe_key_matches_number_across_transactions() {
        let mut s = SessionState::new("ws://x".into(), "all".into(), Some("PrimeFound".into()))
            .dedupe(false, Some("number_to_test".into()));
        // Same prime reported by two different transactions.
        assert!(s.accept_line("Program log: PrimeFound number_to_test=104729 slot=10"));
        assert!(!s.accept_line("Program log: PrimeFound number_to_test=104729 slot=11"));
        assert!(s.accept_line("Program log: PrimeFound number_to_test=7919"));
        // No number to key on.
        assert!(!s.accept_line("Program log: PrimeFound number_to_test=abc"));
        assert!(!s.accept_line("Program log: PrimeFound"));
        assert_eq!(s.lines_printed, 2);
    }

    #[test]
    fn key_value_extraction() {
        assert_eq!(key_value("a number_to_test=42, b", "number_to_test"), Some("42"));
        assert_eq!(key_value("n=x n=5", "n"), Some("5"));
        assert_eq!(key_value("nothing", "n"), None);
    }
}
