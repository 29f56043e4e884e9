//! Bibliographic record model.
//!
//! Records use the CSL-JSON vocabulary on the wire so that data coming from
//! DOI content negotiation, Crossref and hand-written files can be read with
//! a single type. Fields the crate does not interpret are preserved in
//! [`Record::extra`] and written back out unchanged.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

use super::identity::{derive_identity, normalize_doi};
use crate::{Error, Result};

static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").unwrap_or_else(|_| unreachable!()));

/// Read access to named descriptive fields.
///
/// Implemented by [`Record`] and by source items so that exclusion rules can
/// be evaluated against either.
pub trait FieldAccess {
    /// Returns the string value of a CSL field (`"DOI"`, `"title"`, ...).
    fn field(&self, name: &str) -> Option<String>;

    /// Returns the publication year, if one can be parsed.
    fn year(&self) -> Option<i32>;
}

/// A person name in CSL form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Name {
    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    /// Given names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    /// Unparsed name (institutions, single-field names).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
    /// Any other name attributes (ORCID, affiliation, sequence).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Name {
    /// Creates a name from family and given parts.
    #[must_use]
    pub fn new(family: impl Into<String>, given: impl Into<String>) -> Self {
        Self {
            family: Some(family.into()),
            given: Some(given.into()),
            ..Self::default()
        }
    }

    /// Creates a literal (unsplit) name.
    #[must_use]
    pub fn literal(name: impl Into<String>) -> Self {
        Self {
            literal: Some(name.into()),
            ..Self::default()
        }
    }

    /// Parses `"Family, Given"` or `"Given Family"` into a name.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some((family, given)) = raw.split_once(',') {
            return Self::new(family.trim(), given.trim());
        }
        match raw.rsplit_once(' ') {
            Some((given, family)) => Self::new(family.trim(), given.trim()),
            None => Self::literal(raw),
        }
    }

    /// Returns the name used for sorting and short citations.
    #[must_use]
    pub fn sort_name(&self) -> &str {
        self.family
            .as_deref()
            .or(self.literal.as_deref())
            .unwrap_or_default()
    }

    /// Returns initials of the given names (`"J. R."`).
    #[must_use]
    pub fn initials(&self) -> String {
        self.given
            .as_deref()
            .unwrap_or_default()
            .split(|c: char| c.is_whitespace() || c == '-')
            .filter_map(|part| part.chars().next())
            .map(|c| format!("{c}."))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// CSL date value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issued {
    /// `[[year, month, day]]`; parts may be numbers or numeric strings.
    #[serde(rename = "date-parts", default, skip_serializing_if = "Vec::is_empty")]
    pub date_parts: Vec<Vec<Value>>,
    /// Free-form date string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Literal date text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
}

impl Issued {
    /// Creates a year-only date.
    #[must_use]
    pub fn year(year: i32) -> Self {
        Self {
            date_parts: vec![vec![Value::from(year)]],
            ..Self::default()
        }
    }

    /// Returns the first year found in the date.
    #[must_use]
    pub fn first_year(&self) -> Option<i32> {
        let from_parts = self
            .date_parts
            .first()
            .and_then(|parts| parts.first())
            .and_then(|part| match part {
                Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            });
        from_parts.or_else(|| {
            self.raw
                .as_deref()
                .or(self.literal.as_deref())
                .and_then(|text| YEAR_PATTERN.captures(text))
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        })
    }
}

/// A bibliographic record.
///
/// `sources` and `normalized_doi` are bookkeeping fields maintained by the
/// reference manager; they are never read from or written to CSL-JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier, unique within a batch.
    #[serde(default, deserialize_with = "scalar_id")]
    pub id: String,
    /// CSL item type (`article-journal`, `book`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Title.
    #[serde(default, deserialize_with = "first_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Authors in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<Name>,
    /// Publication date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<Issued>,
    /// Journal, proceedings or book title.
    #[serde(
        rename = "container-title",
        default,
        deserialize_with = "first_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub container_title: Option<String>,
    /// DOI as given by the origin.
    #[serde(
        rename = "DOI",
        default,
        deserialize_with = "first_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub doi: Option<String>,
    /// Landing page URL.
    #[serde(
        rename = "URL",
        default,
        deserialize_with = "first_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub url: Option<String>,
    /// BibTeX citation key.
    #[serde(
        rename = "citation-key",
        default,
        deserialize_with = "first_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub citation_key: Option<String>,
    /// Every other CSL field, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Names of the origins this record came from, in first-seen order.
    #[serde(skip)]
    pub sources: Vec<String>,
    /// Cached normalized DOI used by comparators.
    #[serde(skip)]
    pub normalized_doi: Option<String>,
}

impl Record {
    /// Creates an empty record with the given id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Parses a CSL-JSON object into a record.
    ///
    /// Records without an `id` receive their citation key or a generated
    /// UUID. The normalized DOI cache is filled in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ParseFailure`] if the value is not an object or has
    /// fields of the wrong shape.
    pub fn from_value(value: Value, origin: &str) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::ParseFailure {
                origin: origin.to_string(),
                detail: format!("expected a CSL-JSON object, found {}", json_kind(&value)),
            });
        }
        let mut record: Self = serde_json::from_value(value).map_err(|e| Error::ParseFailure {
            origin: origin.to_string(),
            detail: e.to_string(),
        })?;
        if record.id.is_empty() {
            record.id = record
                .citation_key
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        }
        record.refresh_normalized_doi();
        Ok(record)
    }

    /// Converts the record back into CSL-JSON.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Recomputes the normalized DOI cache from `doi`.
    pub fn refresh_normalized_doi(&mut self) {
        self.normalized_doi = self.doi.as_deref().and_then(normalize_doi);
    }

    /// Returns the normalized DOI, using the cache when present.
    #[must_use]
    pub fn comparable_doi(&self) -> Option<String> {
        self.normalized_doi
            .clone()
            .or_else(|| self.doi.as_deref().and_then(normalize_doi))
    }

    /// Returns the publication year.
    #[must_use]
    pub fn year(&self) -> Option<i32> {
        self.issued.as_ref().and_then(Issued::first_year)
    }

    /// Returns the identity key of this record.
    ///
    /// DOI first, then title and year, then citation key, then the record id.
    #[must_use]
    pub fn identity_key(&self) -> String {
        derive_identity(
            self.comparable_doi().as_deref(),
            self.title.as_deref(),
            self.year(),
            || match &self.citation_key {
                Some(key) => format!("key:{key}"),
                None => format!("id:{}", self.id),
            },
        )
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the DOI and refreshes the normalized cache.
    #[must_use]
    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self.refresh_normalized_doi();
        self
    }

    /// Sets a year-only publication date.
    #[must_use]
    pub fn with_year(mut self, year: i32) -> Self {
        self.issued = Some(Issued::year(year));
        self
    }

    /// Appends an author.
    #[must_use]
    pub fn with_author(mut self, name: Name) -> Self {
        self.author.push(name);
        self
    }

    /// Sets the CSL type.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Sets the container title.
    #[must_use]
    pub fn with_container_title(mut self, container: impl Into<String>) -> Self {
        self.container_title = Some(container.into());
        self
    }

    /// Sets the origin list.
    #[must_use]
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }
}

impl FieldAccess for Record {
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.clone()),
            "type" => self.kind.clone(),
            "title" => self.title.clone(),
            "container-title" => self.container_title.clone(),
            "DOI" => self.doi.clone(),
            "URL" => self.url.clone(),
            "citation-key" => self.citation_key.clone(),
            other => self.extra.get(other).and_then(scalar_to_string),
        }
    }

    fn year(&self) -> Option<i32> {
        Self::year(self)
    }
}

/// Renders scalar JSON values as strings; arrays yield their first scalar.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => items.iter().find_map(scalar_to_string),
        Value::Null | Value::Object(_) => None,
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Accepts a string, a list of strings (Crossref titles) or a number.
fn first_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(scalar_to_string))
}

/// CSL ids may be strings or numbers; both become strings.
fn scalar_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(first_string(deserializer)?.unwrap_or_default())
}
