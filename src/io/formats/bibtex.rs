//! BibTeX adapter.
//!
//! A small, forgiving parser for `@type{key, field = value, ...}` entries.
//! Values may be braced, quoted, numeric or bare macro names, joined with
//! `#`. `@comment`, `@string` and `@preamble` blocks are skipped. A broken
//! entry yields a [`Error::ParseFailure`] for that entry only.
//!
//! Entries are converted to CSL-JSON so they flow through the same record
//! model as everything else.

use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::io::BufRead;

use crate::io::traits::{ImportSource, io_error};
use crate::models::{Name, Record};
use crate::{Error, Result};

/// A parsed BibTeX entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibtexEntry {
    /// Lowercased entry type (`article`, `inproceedings`, ...).
    pub kind: String,
    /// Citation key.
    pub key: String,
    /// Fields in source order, names lowercased, values with braces removed.
    pub fields: Vec<(String, String)>,
}

impl BibtexEntry {
    /// Returns a field by (lowercase) name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Converts the entry to a CSL-JSON object.
    #[must_use]
    pub fn to_csl(&self) -> Value {
        let mut csl = Map::new();
        csl.insert("id".to_string(), json!(self.key));
        csl.insert("citation-key".to_string(), json!(self.key));
        csl.insert("type".to_string(), json!(csl_type(&self.kind)));

        let mut year: Option<Value> = None;
        let mut month: Option<Value> = None;
        for (name, value) in &self.fields {
            match name.as_str() {
                "author" | "editor" => {
                    let names: Vec<Name> = split_names(value).map(Name::parse).collect();
                    csl.insert(name.clone(), json!(names));
                },
                "year" => {
                    year = Some(
                        value
                            .trim()
                            .parse::<i64>()
                            .map_or_else(|_| json!(value), |y| json!(y)),
                    );
                },
                "month" => month = month_number(value).map(|m| json!(m)),
                "journal" | "booktitle" => {
                    csl.insert("container-title".to_string(), json!(value));
                },
                "number" => {
                    csl.insert("issue".to_string(), json!(value));
                },
                "pages" => {
                    csl.insert("page".to_string(), json!(value.replace("--", "-")));
                },
                "school" | "institution" | "organization" => {
                    csl.entry("publisher".to_string()).or_insert(json!(value));
                },
                "address" => {
                    csl.insert("publisher-place".to_string(), json!(value));
                },
                "doi" | "url" | "isbn" | "issn" => {
                    csl.insert(name.to_uppercase(), json!(value));
                },
                other => {
                    csl.insert(other.to_string(), json!(value));
                },
            }
        }
        if let Some(year) = year {
            let parts = month.map_or_else(|| vec![year.clone()], |m| vec![year.clone(), m]);
            csl.insert("issued".to_string(), json!({ "date-parts": [parts] }));
        }
        Value::Object(csl)
    }
}

/// Parses a BibTeX document. One result per entry, in source order.
#[must_use]
pub fn parse_bibtex(text: &str, origin: &str) -> Vec<Result<BibtexEntry>> {
    Parser::new(text, origin).entries()
}

/// Parses BibTeX straight into CSL-JSON values.
#[must_use]
pub fn parse_bibtex_to_csl(text: &str, origin: &str) -> Vec<Result<Value>> {
    parse_bibtex(text, origin)
        .into_iter()
        .map(|entry| entry.map(|e| e.to_csl()))
        .collect()
}

/// BibTeX import source.
pub struct BibtexImportSource {
    entries: VecDeque<Result<Value>>,
    len: usize,
}

impl BibtexImportSource {
    /// Reads and parses a whole BibTeX document.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn new<R: BufRead>(mut reader: R, origin: &str) -> Result<Self> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| io_error("read_bibtex", e))?;
        let entries: VecDeque<_> = parse_bibtex_to_csl(&text, origin).into();
        Ok(Self {
            len: entries.len(),
            entries,
        })
    }
}

impl ImportSource for BibtexImportSource {
    fn next(&mut self) -> Result<Option<Value>> {
        self.entries.pop_front().transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.len)
    }
}

/// Renders a record as a BibTeX entry.
#[must_use]
pub fn to_bibtex(record: &Record) -> String {
    let kind = bibtex_type(record.kind.as_deref().unwrap_or("document"));
    let key = record
        .citation_key
        .clone()
        .unwrap_or_else(|| citation_key_for(record));

    let mut fields: Vec<(&str, String)> = Vec::new();
    if !record.author.is_empty() {
        let authors = record
            .author
            .iter()
            .map(|n| match (&n.family, &n.given) {
                (Some(family), Some(given)) => format!("{family}, {given}"),
                _ => format!("{{{}}}", n.sort_name()),
            })
            .collect::<Vec<_>>()
            .join(" and ");
        fields.push(("author", authors));
    }
    if let Some(title) = &record.title {
        fields.push(("title", format!("{{{title}}}")));
    }
    if let Some(container) = &record.container_title {
        let name = if kind == "article" { "journal" } else { "booktitle" };
        fields.push((name, container.clone()));
    }
    if let Some(year) = record.year() {
        fields.push(("year", year.to_string()));
    }
    for (csl, bib) in [
        ("volume", "volume"),
        ("issue", "number"),
        ("page", "pages"),
        ("publisher", "publisher"),
    ] {
        if let Some(value) = record.extra.get(csl).and_then(crate::models::scalar_to_string) {
            let value = if bib == "pages" {
                value.replace('-', "--")
            } else {
                value
            };
            fields.push((bib, value));
        }
    }
    if let Some(doi) = &record.doi {
        fields.push(("doi", doi.clone()));
    }
    if let Some(url) = &record.url {
        fields.push(("url", url.clone()));
    }

    let body = fields
        .iter()
        .map(|(name, value)| format!("  {name} = {{{value}}}"))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("@{kind}{{{key},\n{body}\n}}\n")
}

fn citation_key_for(record: &Record) -> String {
    let family = record
        .author
        .first()
        .map(|n| n.sort_name().to_lowercase())
        .unwrap_or_default();
    let family: String = family.chars().filter(char::is_ascii_alphanumeric).collect();
    match (family.is_empty(), record.year()) {
        (false, Some(year)) => format!("{family}{year}"),
        _ => record
            .id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'))
            .collect(),
    }
}

fn csl_type(kind: &str) -> &'static str {
    match kind {
        "article" => "article-journal",
        "inproceedings" | "conference" => "paper-conference",
        "incollection" | "inbook" => "chapter",
        "book" => "book",
        "phdthesis" | "mastersthesis" => "thesis",
        "techreport" => "report",
        "unpublished" => "manuscript",
        "online" | "electronic" => "webpage",
        _ => "document",
    }
}

fn bibtex_type(csl: &str) -> &'static str {
    match csl {
        "article-journal" | "article" | "article-magazine" | "article-newspaper" => "article",
        "paper-conference" => "inproceedings",
        "chapter" => "incollection",
        "book" => "book",
        "thesis" => "phdthesis",
        "report" => "techreport",
        "manuscript" => "unpublished",
        _ => "misc",
    }
}

fn split_names(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(" and ")
        .map(str::trim)
        .filter(|n| !n.is_empty())
}

fn month_number(value: &str) -> Option<u32> {
    let lower = value.trim().to_lowercase();
    if let Ok(n) = lower.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix: String = lower.chars().take(3).collect();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .and_then(|i| u32::try_from(i + 1).ok())
}

/// Removes grouping braces and simple escapes.
fn clean_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' | '}' => {},
            '\\' => match chars.peek() {
                Some(&next) if "&%$#_{}".contains(next) => {
                    out.push(next);
                    chars.next();
                },
                _ => out.push(c),
            },
            '\n' | '\r' | '\t' => out.push(' '),
            _ => out.push(c),
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    origin: &'a str,
    strings: Map<String, Value>,
}

impl<'a> Parser<'a> {
    fn new(text: &str, origin: &'a str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            origin,
            strings: Map::new(),
        }
    }

    fn failure(&self, detail: impl Into<String>) -> Error {
        Error::ParseFailure {
            origin: self.origin.to_string(),
            detail: detail.into(),
        }
    }

    fn entries(mut self) -> Vec<Result<BibtexEntry>> {
        let mut out = Vec::new();
        while let Some(at) = self.chars[self.pos..].iter().position(|c| *c == '@') {
            self.pos += at + 1;
            let start = self.pos;
            let kind = self.identifier().to_lowercase();
            self.skip_whitespace();
            let Some(open) = self.peek().filter(|c| matches!(c, '{' | '(')) else {
                if !kind.is_empty() {
                    out.push(Err(self.failure(format!("entry '@{kind}' has no body"))));
                }
                continue;
            };
            let close = if open == '{' { '}' } else { ')' };
            let Some(end) = self.matching_close(self.pos, open, close) else {
                out.push(Err(self.failure(format!(
                    "unterminated entry '@{kind}' at character {start}"
                ))));
                break;
            };
            self.pos += 1;
            match kind.as_str() {
                "comment" | "preamble" => {},
                "string" => self.string_definition(end),
                _ => out.push(self.entry(kind, end)),
            }
            self.pos = end + 1;
        }
        out
    }

    fn entry(&mut self, kind: String, end: usize) -> Result<BibtexEntry> {
        self.skip_whitespace();
        let key_start = self.pos;
        while self.pos < end && !matches!(self.chars[self.pos], ',') {
            self.pos += 1;
        }
        let key: String = self.chars[key_start..self.pos].iter().collect();
        let key = key.trim().to_string();
        if key.is_empty() || key.contains(char::is_whitespace) || key.contains('=') {
            return Err(self.failure(format!("entry '@{kind}' has no citation key")));
        }

        let mut fields = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(',') {
                self.pos += 1;
                continue;
            }
            if self.pos >= end {
                break;
            }
            let name = self.identifier().to_lowercase();
            if name.is_empty() {
                return Err(self.failure(format!("{key}: expected a field name")));
            }
            self.skip_whitespace();
            if self.peek() != Some('=') {
                return Err(self.failure(format!("{key}: expected '=' after '{name}'")));
            }
            self.pos += 1;
            let value = self.value(end).map_err(|detail| {
                self.failure(format!("{key}: field '{name}': {detail}"))
            })?;
            fields.push((name, clean_value(&value)));
        }
        Ok(BibtexEntry { kind, key, fields })
    }

    fn string_definition(&mut self, end: usize) {
        self.skip_whitespace();
        let name = self.identifier().to_lowercase();
        self.skip_whitespace();
        if name.is_empty() || self.peek() != Some('=') {
            return;
        }
        self.pos += 1;
        if let Ok(value) = self.value(end) {
            self.strings.insert(name, Value::String(value));
        }
    }

    /// Reads a `#`-concatenated value, leaving `pos` after it.
    fn value(&mut self, end: usize) -> std::result::Result<String, String> {
        let mut value = String::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('{') => {
                    let close = self
                        .matching_close(self.pos, '{', '}')
                        .filter(|c| *c <= end)
                        .ok_or("unbalanced braces")?;
                    value.extend(&self.chars[self.pos + 1..close]);
                    self.pos = close + 1;
                },
                Some('"') => {
                    let close = self.closing_quote(self.pos + 1, end).ok_or("unterminated quote")?;
                    value.extend(&self.chars[self.pos + 1..close]);
                    self.pos = close + 1;
                },
                Some(c) if c.is_alphanumeric() => {
                    let word = self.identifier();
                    let resolved = self
                        .strings
                        .get(&word.to_lowercase())
                        .and_then(Value::as_str)
                        .map_or(word, str::to_string);
                    value.push_str(&resolved);
                },
                _ => return Err("expected a value".to_string()),
            }
            self.skip_whitespace();
            if self.peek() == Some('#') {
                self.pos += 1;
            } else {
                return Ok(value);
            }
        }
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '+' | '/'))
        {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn matching_close(&self, open_at: usize, open: char, close: char) -> Option<usize> {
        let mut depth = 0usize;
        for (offset, c) in self.chars[open_at..].iter().enumerate() {
            if *c == open {
                depth += 1;
            } else if *c == close {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open_at + offset);
                }
            }
        }
        None
    }

    fn closing_quote(&self, from: usize, end: usize) -> Option<usize> {
        let mut depth = 0usize;
        for i in from..end {
            match self.chars[i] {
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                '"' if depth == 0 && self.chars.get(i.wrapping_sub(1)) != Some(&'\\') => {
                    return Some(i);
                },
                _ => {},
            }
        }
        None
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
@comment{ exported by a reference manager }
@string{naacl = "Proceedings of NAACL"}

@inproceedings{gulordava2018,
  title = {Colorless Green Recurrent Networks Dream {H}ierarchically},
  author = {Gulordava, Kristina and Bojanowski, Piotr and Grave, Edouard},
  booktitle = naacl,
  year = 2018,
  month = jun,
  pages = {1195--1205},
  doi = {10.18653/v1/N18-1108}
}

@article{broken2020,
  title = {Missing closing brace,
  year = 2020
}
"#;

    #[test]
    fn test_parse_entries() {
        let entries = parse_bibtex(SAMPLE, "refs.bib");
        let first = entries[0].as_ref().unwrap();
        assert_eq!(first.kind, "inproceedings");
        assert_eq!(first.key, "gulordava2018");
        assert_eq!(
            first.field("title"),
            Some("Colorless Green Recurrent Networks Dream Hierarchically")
        );
        assert_eq!(first.field("booktitle"), Some("Proceedings of NAACL"));
        assert_eq!(first.field("pages"), Some("1195--1205"));
    }

    #[test]
    fn test_broken_entry_is_a_parse_failure() {
        let entries = parse_bibtex(SAMPLE, "refs.bib");
        assert!(entries.iter().any(|e| matches!(e, Err(Error::ParseFailure { .. }))));
    }

    #[test]
    fn test_to_csl() {
        let entries = parse_bibtex(SAMPLE, "refs.bib");
        let csl = entries[0].as_ref().unwrap().to_csl();
        assert_eq!(csl["type"], "paper-conference");
        assert_eq!(csl["citation-key"], "gulordava2018");
        assert_eq!(csl["container-title"], "Proceedings of NAACL");
        assert_eq!(csl["issued"]["date-parts"][0][0], 2018);
        assert_eq!(csl["issued"]["date-parts"][0][1], 6);
        assert_eq!(csl["author"][1]["family"], "Bojanowski");
        assert_eq!(csl["DOI"], "10.18653/v1/N18-1108");
        assert_eq!(csl["page"], "1195-1205");

        let record = Record::from_value(csl, "refs.bib").unwrap();
        assert_eq!(record.identity_key(), "doi:10.18653/v1/n18-1108");
    }

    #[test]
    fn test_quoted_values_and_concatenation() {
        let text = r#"@misc{k, title = "A " # {Title}, note = "with {"}quotes{"}" }"#;
        let entries = parse_bibtex(text, "x");
        let entry = entries[0].as_ref().unwrap();
        assert_eq!(entry.field("title"), Some("A Title"));
        assert_eq!(entry.kind, "misc");
    }

    #[test]
    fn test_missing_key() {
        let entries = parse_bibtex("@article{title = {x}}", "x");
        assert!(entries[0].is_err());
    }

    #[test]
    fn test_to_bibtex() {
        let record = Record::new("r")
            .with_kind("article-journal")
            .with_title("Some Title")
            .with_author(Name::new("Smith", "Jane"))
            .with_container_title("Journal of Things")
            .with_year(2020)
            .with_doi("10.1/x");
        let bib = to_bibtex(&record);
        assert!(bib.starts_with("@article{smith2020,"));
        assert!(bib.contains("author = {Smith, Jane}"));
        assert!(bib.contains("journal = {Journal of Things}"));

        let reparsed = parse_bibtex(&bib, "roundtrip");
        assert_eq!(reparsed[0].as_ref().unwrap().field("doi"), Some("10.1/x"));
    }

    #[test]
    fn test_import_source_yields_errors_in_place() {
        let mut source = BibtexImportSource::new(SAMPLE.as_bytes(), "refs.bib").unwrap();
        assert_eq!(source.size_hint(), Some(2));
        assert!(source.next().unwrap().is_some());
        assert!(source.next().is_err());
        assert!(source.next().unwrap().is_none());
    }
}
