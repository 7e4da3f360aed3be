//! `key=value` configuration payloads
//!
//! Sources accept a configuration string in `initialize`. Besides a bare
//! path, the payload may be a list of `key=value` pairs separated by `;` or
//! newlines, e.g. `path=data.csv;delimiter=tab;header=true;skip=2`.

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while parsing a configuration payload
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Malformed entry (expected key=value): {0}")]
    MalformedEntry(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Unknown key: {0}")]
    UnknownKey(String),

    #[error("Invalid JSON config: {0}")]
    Json(String),
}

/// Parsed `key=value` pairs; keys are trimmed and lower-cased
pub type ConfigPairs = BTreeMap<String, String>;

/// True when the payload looks like `key=value` pairs rather than a bare path
pub fn is_pairs_payload(config: &str) -> bool {
    config
        .split([';', '\n'])
        .any(|entry| entry.split_once('=').is_some())
}

/// Split a payload into pairs
///
/// # Example
/// ```
/// use sampleflow_core::config::parse_pairs;
///
/// let pairs = parse_pairs("rate=100; Mode = SineWave").unwrap();
/// assert_eq!(pairs["rate"], "100");
/// assert_eq!(pairs["mode"], "SineWave");
/// ```
pub fn parse_pairs(config: &str) -> Result<ConfigPairs, ConfigError> {
    let mut pairs = ConfigPairs::new();
    for entry in config.split([';', '\n']) {
        let entry = entry.trim();
        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedEntry(entry.to_string()))?;
        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(ConfigError::MalformedEntry(entry.to_string()));
        }
        pairs.insert(key, value.trim().to_string());
    }
    Ok(pairs)
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Parse a boolean (`true/false`, `yes/no`, `on/off`, `1/0`)
pub fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

/// Parse a single character, accepting names for awkward ones
pub fn parse_char(key: &str, value: &str) -> Result<char, ConfigError> {
    match value {
        "\\t" | "tab" => return Ok('\t'),
        "space" | " " => return Ok(' '),
        "comma" => return Ok(','),
        "semicolon" => return Ok(';'),
        "pipe" => return Ok('|'),
        "hash" => return Ok('#'),
        _ => {}
    }
    let mut chars = value.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(invalid(key, value)),
    }
}

/// Parse a number
pub fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

pub fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

/// Parse a column mapping such as `0:x,1:y,3:z`
pub fn parse_column_mapping(key: &str, value: &str) -> Result<BTreeMap<usize, String>, ConfigError> {
    let mut mapping = BTreeMap::new();
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (index, name) = item.split_once(':').ok_or_else(|| invalid(key, value))?;
        let index = parse_usize(key, index)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid(key, value));
        }
        mapping.insert(index, name.to_string());
    }
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pairs_skips_blank_and_comments() {
        let pairs = parse_pairs("a=1;;\n# note\n b = two ").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs["b"], "two");
    }

    #[test]
    fn test_parse_pairs_rejects_missing_equals() {
        let err = parse_pairs("a=1;oops").unwrap_err();
        assert_eq!(err, ConfigError::MalformedEntry("oops".into()));
    }

    #[test]
    fn test_is_pairs_payload() {
        assert!(is_pairs_payload("path=/tmp/a.csv"));
        assert!(!is_pairs_payload("/tmp/a.csv"));
    }

    #[test]
    fn test_parse_char_aliases() {
        assert_eq!(parse_char("d", "tab").unwrap(), '\t');
        assert_eq!(parse_char("d", "\\t").unwrap(), '\t');
        assert_eq!(parse_char("d", "|").unwrap(), '|');
        assert!(parse_char("d", "ab").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("h", "Yes").unwrap());
        assert!(!parse_bool("h", "0").unwrap());
        assert!(parse_bool("h", "maybe").is_err());
    }

    #[test]
    fn test_parse_column_mapping() {
        let mapping = parse_column_mapping("columns", "0:x, 2:z").unwrap();
        assert_eq!(mapping[&0], "x");
        assert_eq!(mapping[&2], "z");
        assert!(parse_column_mapping("columns", "0x").is_err());
        assert!(parse_column_mapping("columns", "a:x").is_err());
    }
}
