//! Java-style `.properties` data source.
//!
//! `key=value` and `key: value` lines, `#` and `!` comments, trailing
//! backslash continuations. Dotted keys nest: `customer.name=ACME` loads as
//! `{"customer": {"name": "ACME"}}`. Values stay strings.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{DataError, Result};
use crate::sources::DataSource;

/// Properties file data source
#[derive(Debug, Clone)]
pub struct PropertiesSource {
    path: PathBuf,
}

impl PropertiesSource {
    /// Create a new properties source from a file path
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::FileNotFound(path.display().to_string()));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Parse properties text into a nested object
    pub fn parse(text: &str) -> Result<Value> {
        let mut root = Map::new();
        for (line, entry) in logical_lines(text) {
            let (key, value) = split_entry(&entry);
            if key.is_empty() {
                return Err(DataError::Properties {
                    line,
                    message: "empty key".into(),
                });
            }
            insert_dotted(&mut root, &key, Value::String(value), line)?;
        }
        Ok(Value::Object(root))
    }
}

impl DataSource for PropertiesSource {
    fn load(&self) -> Result<Value> {
        let text = fs::read_to_string(&self.path)?;
        Self::parse(&text)
    }

    fn describe(&self) -> String {
        format!("properties:{}", self.path.display())
    }
}

/// Non-comment entries with continuations joined, tagged by starting line
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut entries = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (index, raw) in text.lines().enumerate() {
        let trimmed = raw.trim_start();
        let (start, mut entry) = match pending.take() {
            Some((start, entry)) => (start, entry),
            None => {
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                (index + 1, String::new())
            }
        };

        if ends_with_continuation(trimmed) {
            entry.push_str(&trimmed[..trimmed.len() - 1]);
            pending = Some((start, entry));
        } else {
            entry.push_str(trimmed);
            entries.push((start, entry));
        }
    }
    if let Some(entry) = pending {
        entries.push(entry);
    }
    entries
}

/// An odd number of trailing backslashes continues the line
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|&c| c == '\\').count() % 2 == 1
}

fn split_entry(entry: &str) -> (String, String) {
    let mut key = String::new();
    let mut chars = entry.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    key.push(unescape(escaped));
                }
            }
            '=' | ':' => break,
            c if c.is_whitespace() => {
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                if chars.peek().is_some_and(|&c| c == '=' || c == ':') {
                    chars.next();
                }
                break;
            }
            c => key.push(c),
        }
    }

    let rest: String = chars.collect();
    let mut value = String::new();
    let mut chars = rest.trim_start().chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                value.push(unescape(escaped));
            }
        } else {
            value.push(c);
        }
    }
    (key, value)
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        other => other,
    }
}

/// Insert under a dotted key; a nested object wins over a plain value
fn insert_dotted(
    root: &mut Map<String, Value>,
    key: &str,
    value: Value,
    line: usize,
) -> Result<()> {
    let mut segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(DataError::Properties {
            line,
            message: format!("invalid key '{}'", key),
        });
    }
    let Some(last) = segments.pop() else {
        return Ok(());
    };

    let mut current = root;
    for segment in segments {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = slot.as_object_mut().ok_or_else(|| DataError::Properties {
            line,
            message: format!("cannot nest under '{}'", segment),
        })?;
    }

    match current.get(last) {
        Some(Value::Object(_)) => {}
        _ => {
            current.insert(last.to_string(), value);
        }
    }
    Ok(())
}
