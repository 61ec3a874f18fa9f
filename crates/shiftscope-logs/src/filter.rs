use regex::Regex;

use shiftscope_types::{LogEntry, LogLevel, QueryError};

/// How the query string is interpreted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueryMode {
    /// Case-insensitive substring
    #[default]
    Substring,
    /// Case-insensitive regular expression
    Regex,
}

/// Compiled filter for log entries
#[derive(Clone)]
pub struct CompiledFilter {
    /// `None` matches every line
    regex: Option<Regex>,

    /// Original pattern string
    pattern: String,

    /// Entries below this level are dropped; unknown ranks as info
    min_level: Option<LogLevel>,
}

impl CompiledFilter {
    /// Compile a query. Substring queries are escaped, so only regex mode
    /// can fail.
    pub fn new(query: &str, mode: QueryMode) -> Result<Self, QueryError> {
        let regex = if query.is_empty() {
            None
        } else {
            let source = match mode {
                QueryMode::Substring => regex::escape(query),
                QueryMode::Regex => query.to_string(),
            };
            // Prepend (?i) for case insensitive matching
            let compiled = Regex::new(&format!("(?i){source}"))
                .map_err(|e| QueryError::InvalidQuery(e.to_string()))?;
            Some(compiled)
        };

        Ok(Self {
            regex,
            pattern: query.to_string(),
            min_level: None,
        })
    }

    /// Filter that keeps everything
    pub fn match_all() -> Self {
        Self {
            regex: None,
            pattern: String::new(),
            min_level: None,
        }
    }

    /// Drop entries below `level`
    pub fn with_min_level(mut self, level: Option<LogLevel>) -> Self {
        self.min_level = level;
        self
    }

    /// Check if a log entry matches this filter
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(min) = self.min_level
            && entry.level.severity() < min.severity()
        {
            return false;
        }

        match &self.regex {
            Some(re) => re.is_match(&entry.text),
            None => true,
        }
    }
}

impl std::fmt::Debug for CompiledFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFilter")
            .field("pattern", &self.pattern)
            .field("min_level", &self.min_level)
            .finish()
    }
}
