use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use shiftscope_types::{LogEntry, LogLevel, SourceKind};

/// A raw line split into its structured parts
#[derive(Debug, PartialEq)]
pub struct ParsedLine<'a> {
    pub timestamp: Option<DateTime<Utc>>,
    /// Line content with any timestamp prefix removed
    pub content: &'a str,
    pub level: LogLevel,
    /// Level field exactly as a JSON logger wrote it
    pub raw_severity: Option<String>,
}

/// Log parser for extracting structure from raw log lines
pub struct LogParser;

impl LogParser {
    /// Parse a raw log line
    pub fn parse_line(raw: &str) -> ParsedLine<'_> {
        // Kubernetes timestamp prefix (format: 2024-01-15T10:30:00.123456789Z)
        let (mut timestamp, content) = Self::extract_k8s_timestamp(raw);

        let (level, raw_severity) = match Self::try_parse_json(content) {
            Some(fields) => {
                if timestamp.is_none() {
                    timestamp = Self::extract_time_from_json(&fields);
                }
                Self::extract_level_from_json(&fields)
            }
            None => (Self::level_from_text(content), None),
        };

        ParsedLine {
            timestamp,
            content,
            level,
            raw_severity,
        }
    }

    /// Parse a whole log text into entries, oldest first.
    ///
    /// Lines without a timestamp inherit the previous line's; leading ones
    /// take `observed_at`. Blank lines are dropped.
    pub fn parse_stream(
        text: &str,
        kind: SourceKind,
        source_id: &str,
        observed_at: DateTime<Utc>,
    ) -> Vec<LogEntry> {
        let mut last = observed_at;
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let parsed = Self::parse_line(line);
                let timestamp = parsed.timestamp.unwrap_or(last);
                last = timestamp;

                let mut entry = LogEntry::new(timestamp, kind, source_id, parsed.content);
                entry.level = parsed.level;
                entry.raw_severity = parsed.raw_severity;
                entry
            })
            .collect()
    }

    /// Extract Kubernetes timestamp from the beginning of a log line
    fn extract_k8s_timestamp(raw: &str) -> (Option<DateTime<Utc>>, &str) {
        // K8s timestamp format: 2024-01-15T10:30:00.123456789Z (30 chars)
        // Sometimes shorter: 2024-01-15T10:30:00Z (20 chars)
        if raw.len() >= 20 {
            // Use get() to safely handle UTF-8 multi-byte chars at boundaries
            let search_end = Self::floor_char_boundary(raw, 35.min(raw.len()));
            if let Some(z_pos) = raw.get(..search_end).and_then(|s| s.find('Z')) {
                let ts_str = &raw[..=z_pos];
                if let Ok(ts) = DateTime::parse_from_rfc3339(ts_str) {
                    let remaining = raw[z_pos + 1..].trim_start();
                    return (Some(ts.with_timezone(&Utc)), remaining);
                }
            }
        }
        (None, raw)
    }

    /// Find the largest valid char boundary <= the given byte index
    fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
        if idx >= s.len() {
            return s.len();
        }
        while idx > 0 && !s.is_char_boundary(idx) {
            idx -= 1;
        }
        idx
    }

    fn try_parse_json(content: &str) -> Option<Map<String, Value>> {
        let trimmed = content.trim();
        if !trimmed.starts_with('{') {
            return None;
        }
        match serde_json::from_str(trimmed).ok()? {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    fn extract_time_from_json(fields: &Map<String, Value>) -> Option<DateTime<Utc>> {
        ["time", "ts", "timestamp", "@timestamp"]
            .iter()
            .filter_map(|key| fields.get(*key)?.as_str())
            .find_map(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Extract log level from JSON fields
    fn extract_level_from_json(fields: &Map<String, Value>) -> (LogLevel, Option<String>) {
        let level_fields = [
            "level",
            "lvl",
            "severity",
            "log.level",
            "loglevel",
            "log_level",
            "Level",
            "LEVEL",
        ];

        for field in level_fields {
            match fields.get(field) {
                Some(Value::String(s)) => return (LogLevel::from_str(s), Some(s.clone())),
                Some(Value::Number(n)) => {
                    // Some loggers use numeric levels
                    if let Some(num) = n.as_u64() {
                        let level = match num {
                            0..=10 => LogLevel::Trace,
                            11..=20 => LogLevel::Debug,
                            21..=30 => LogLevel::Info,
                            31..=40 => LogLevel::Warn,
                            41..=50 => LogLevel::Error,
                            _ => LogLevel::Fatal,
                        };
                        return (level, Some(num.to_string()));
                    }
                }
                _ => {}
            }
        }

        (LogLevel::Unknown, None)
    }

    /// Extract log level from plain text patterns
    pub fn level_from_text(content: &str) -> LogLevel {
        let upper = content.to_uppercase();

        // Bracketed patterns first: [ERROR], [WARN], etc.
        let bracket_patterns = [
            ("[FATAL]", LogLevel::Fatal),
            ("[PANIC]", LogLevel::Fatal),
            ("[CRITICAL]", LogLevel::Fatal),
            ("[ERROR]", LogLevel::Error),
            ("[ERR]", LogLevel::Error),
            ("[WARN]", LogLevel::Warn),
            ("[WARNING]", LogLevel::Warn),
            ("[INFO]", LogLevel::Info),
            ("[DEBUG]", LogLevel::Debug),
            ("[TRACE]", LogLevel::Trace),
        ];
        for (pattern, level) in bracket_patterns {
            if upper.contains(pattern) {
                return level;
            }
        }

        // logfmt: level=error
        if let Some(rest) = upper
            .split_whitespace()
            .find_map(|token| token.strip_prefix("LEVEL="))
        {
            let level = LogLevel::from_str(rest.trim_matches('"'));
            if level != LogLevel::Unknown {
                return level;
            }
        }

        let colon_patterns = [
            ("FATAL:", LogLevel::Fatal),
            ("PANIC:", LogLevel::Fatal),
            ("ERROR:", LogLevel::Error),
            ("ERR:", LogLevel::Error),
            ("WARNING:", LogLevel::Warn),
            ("WARN:", LogLevel::Warn),
            ("INFO:", LogLevel::Info),
            ("DEBUG:", LogLevel::Debug),
            ("TRACE:", LogLevel::Trace),
        ];
        for (pattern, level) in colon_patterns {
            if upper.contains(pattern) {
                return level;
            }
        }

        let spaced_patterns = [
            (" FATAL ", LogLevel::Fatal),
            (" PANIC ", LogLevel::Fatal),
            (" ERROR ", LogLevel::Error),
            (" WARN ", LogLevel::Warn),
            (" WARNING ", LogLevel::Warn),
            (" INFO ", LogLevel::Info),
            (" DEBUG ", LogLevel::Debug),
            (" TRACE ", LogLevel::Trace),
        ];
        for (pattern, level) in spaced_patterns {
            if upper.contains(pattern) {
                return level;
            }
        }

        // klog header: E0115 10:30:00.123456 ...
        if let Some(level) = Self::klog_level(&upper) {
            return level;
        }

        let start_patterns = [
            ("FATAL", LogLevel::Fatal),
            ("PANIC", LogLevel::Fatal),
            ("ERROR", LogLevel::Error),
            ("ERR", LogLevel::Error),
            ("WARN", LogLevel::Warn),
            ("INFO", LogLevel::Info),
            ("DEBUG", LogLevel::Debug),
            ("TRACE", LogLevel::Trace),
        ];
        let trimmed_upper = upper.trim_start();
        for (pattern, level) in start_patterns {
            if trimmed_upper.starts_with(pattern) {
                return level;
            }
        }

        LogLevel::Unknown
    }

    fn klog_level(upper: &str) -> Option<LogLevel> {
        let bytes = upper.trim_start().as_bytes();
        if bytes.len() < 6 || !bytes[1..5].iter().all(u8::is_ascii_digit) || bytes[5] != b' ' {
            return None;
        }
        match bytes[0] {
            b'I' => Some(LogLevel::Info),
            b'W' => Some(LogLevel::Warn),
            b'E' => Some(LogLevel::Error),
            b'F' => Some(LogLevel::Fatal),
            _ => None,
        }
    }
}
