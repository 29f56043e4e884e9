//! Plain-text and JSON identifier lists.

use serde_json::Value;
use std::io::{BufRead, Read};

use crate::io::traits::io_error;
use crate::{Error, Result};

/// Reads one identifier per line; blank lines and `#` comments are skipped.
///
/// # Errors
///
/// Returns an error on I/O failure.
pub fn read_text_identifiers<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut identifiers = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| io_error("read_identifiers", e))?;
        let line = line.split('#').next().unwrap_or_default().trim();
        if !line.is_empty() {
            identifiers.push(line.to_string());
        }
    }
    Ok(identifiers)
}

/// Reads a JSON array of identifier strings.
///
/// # Errors
///
/// Returns [`Error::InvalidItemType`] if the document is not an array or an
/// element is not a string.
pub fn read_json_identifiers<R: Read>(reader: R, source_name: &str) -> Result<Vec<String>> {
    let document: Value =
        serde_json::from_reader(reader).map_err(|e| io_error("read_identifiers", e))?;
    identifiers_from_value(&document, source_name)
}

/// Validates an in-memory list of identifiers.
///
/// # Errors
///
/// Returns [`Error::InvalidItemType`] for anything but an array of strings.
pub fn identifiers_from_value(value: &Value, source_name: &str) -> Result<Vec<String>> {
    let invalid = |detail: String| Error::InvalidItemType {
        source_name: source_name.to_string(),
        detail,
    };
    let Value::Array(items) = value else {
        return Err(invalid("expected an array of identifiers".to_string()));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(format!("item {i} is not a string: {item}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_list() {
        let input = "# lab publications\n10.1/a\n\n  10.1/b  # preprint\n";
        let ids = read_text_identifiers(input.as_bytes()).unwrap();
        assert_eq!(ids, vec!["10.1/a", "10.1/b"]);
    }

    #[test]
    fn test_json_list() {
        let ids = read_json_identifiers(r#"["10.1/a", "10.1/b"]"#.as_bytes(), "dois").unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_non_string_item_is_rejected() {
        let err = identifiers_from_value(&json!(["10.1/a", 42]), "dois").unwrap_err();
        assert!(matches!(err, Error::InvalidItemType { .. }));
        assert!(identifiers_from_value(&json!({"doi": "x"}), "dois").is_err());
    }
}
