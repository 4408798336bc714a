//! Time-sliced index names, e.g. `logs-{0:yyyy.MM.dd}` -> `logs-2024.01.15`.
//!
//! The template is a composite format string with a single argument, the
//! event timestamp. Placeholders take a .NET-style date pattern which is
//! translated once into a `chrono` strftime pattern at construction.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Utc};
use std::fmt::Write;

use crate::error::{ConfigError, FormatError};

/// Default index template: one index per UTC day.
pub const DEFAULT_INDEX_FORMAT: &str = "logs-{0:yyyy.MM.dd}";

/// Pattern used for a bare `{0}` placeholder.
const DEFAULT_DATE_PATTERN: &str = "%Y.%m.%d";

/// Parsed and validated index-name template.
#[derive(Debug, Clone)]
pub struct IndexTemplate {
    source: String,
    pattern: String,
}

impl IndexTemplate {
    /// Parse `format` and dry-run it against the current time.
    pub fn parse(format: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidIndexFormat {
            format: format.to_string(),
            reason,
        };

        let pattern = translate_template(format).map_err(invalid)?;
        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(invalid(format!("unsupported date pattern {:?}", pattern)));
        }

        let template = IndexTemplate { source: format.to_string(), pattern };
        let sample = template
            .format(&Utc::now().into())
            .map_err(|e| invalid(e.to_string()))?;
        if sample.trim().is_empty() {
            return Err(invalid("template produces an empty index name".to_string()));
        }

        Ok(template)
    }

    /// Index name for an event stamped `timestamp`.
    pub fn format(&self, timestamp: &DateTime<FixedOffset>) -> Result<String, FormatError> {
        let mut name = String::with_capacity(self.source.len() + 8);
        write!(name, "{}", timestamp.format(&self.pattern)).map_err(|_| {
            FormatError::IndexName(format!(
                "cannot apply {:?} to {}",
                self.source,
                timestamp.to_rfc3339()
            ))
        })?;
        Ok(name)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Translate the composite template into a single strftime pattern.
fn translate_template(format: &str) -> Result<String, String> {
    let mut out = String::with_capacity(format.len() + 8);
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err("unbalanced '}'".to_string()),
            '{' => {
                let mut hole = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => hole.push(c),
                        None => return Err("unterminated placeholder".to_string()),
                    }
                }
                let (arg, pattern) = match hole.split_once(':') {
                    Some((arg, pattern)) => (arg, Some(pattern)),
                    None => (hole.as_str(), None),
                };
                if arg.trim() != "0" {
                    return Err(format!("placeholder {{{}}} must refer to argument 0", hole));
                }
                match pattern {
                    Some(p) if !p.is_empty() => out.push_str(&translate_date_pattern(p)?),
                    _ => out.push_str(DEFAULT_DATE_PATTERN),
                }
            }
            other => push_literal(&mut out, other),
        }
    }

    Ok(out)
}

/// Translate a .NET custom date pattern (`yyyy.MM.dd`) to strftime.
fn translate_date_pattern(pattern: &str) -> Result<String, String> {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            'y' | 'M' | 'd' | 'H' | 'h' | 'm' | 's' | 'f' | 't' | 'z' => {
                let mut run = 1;
                while chars.peek() == Some(&c) {
                    chars.next();
                    run += 1;
                }
                out.push_str(date_specifier(c, run)?);
            }
            '\'' | '"' => {
                let mut closed = false;
                for q in chars.by_ref() {
                    if q == c {
                        closed = true;
                        break;
                    }
                    push_literal(&mut out, q);
                }
                if !closed {
                    return Err(format!("unterminated quoted literal in {:?}", pattern));
                }
            }
            '\\' => match chars.next() {
                Some(escaped) => push_literal(&mut out, escaped),
                None => return Err(format!("dangling escape in {:?}", pattern)),
            },
            '%' => {}
            other => push_literal(&mut out, other),
        }
    }

    Ok(out)
}

fn date_specifier(c: char, run: usize) -> Result<&'static str, String> {
    let spec = match (c, run) {
        ('y', 1) => "%-y",
        ('y', 2) => "%y",
        ('y', _) => "%Y",
        ('M', 1) => "%-m",
        ('M', 2) => "%m",
        ('M', 3) => "%b",
        ('M', _) => "%B",
        ('d', 1) => "%-d",
        ('d', 2) => "%d",
        ('d', 3) => "%a",
        ('d', _) => "%A",
        ('H', 1) => "%-H",
        ('H', _) => "%H",
        ('h', 1) => "%-I",
        ('h', _) => "%I",
        ('m', 1) => "%-M",
        ('m', _) => "%M",
        ('s', 1) => "%-S",
        ('s', _) => "%S",
        ('f', 3) => "%3f",
        ('f', 6) => "%6f",
        ('f', 9) => "%9f",
        // Single `t`, `z` and `zz` have no strftime equivalent (`A`, `+0`, `+00`).
        ('t', 2) => "%p",
        ('z', 3) => "%:z",
        (c, run) => {
            return Err(format!("unsupported date specifier {}", c.to_string().repeat(run)));
        }
    };
    Ok(spec)
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}
