//! Built-in bibliography layouts.
//!
//! | Style | Ordering | Citation |
//! |-------|----------|----------|
//! | `apa` | first author, year, title | `(Smith & Doe, 2020)` |
//! | `harvard1` | first author, year, title | `(Smith and Doe 2020)` |
//! | `vancouver` | input order | `[1]` |
//!
//! Registered CSL templates are rendered with the `apa` layout.

use super::styles::{StyleRegistry, Terms, check_locale};
use super::{FormattedEntry, Formatter};
use crate::io::formats::bibtex::to_bibtex;
use crate::models::{Name, Record, scalar_to_string};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    AuthorDate,
    Harvard,
    Numbered,
}

/// Formatter for the built-in styles.
#[derive(Debug, Clone, Default)]
pub struct BasicFormatter {
    registry: StyleRegistry,
}

impl BasicFormatter {
    /// Creates a formatter that also accepts the styles of `registry`.
    #[must_use]
    pub const fn new(registry: StyleRegistry) -> Self {
        Self { registry }
    }

    /// Returns the style registry.
    #[must_use]
    pub const fn registry(&self) -> &StyleRegistry {
        &self.registry
    }

    fn layout(&self, style: &str) -> Result<Layout> {
        match style {
            "apa" => Ok(Layout::AuthorDate),
            "harvard1" => Ok(Layout::Harvard),
            "vancouver" => Ok(Layout::Numbered),
            other if self.registry.is_known(other) => {
                tracing::debug!(style = other, "Rendering registered template with APA layout");
                Ok(Layout::AuthorDate)
            },
            other => Err(Error::InvalidInput(format!(
                "Citation style '{other}' is not registered"
            ))),
        }
    }
}

impl Formatter for BasicFormatter {
    fn format(
        &self,
        records: &[Record],
        style: &str,
        locale: &str,
    ) -> Result<Vec<FormattedEntry>> {
        check_locale(locale)?;
        let layout = self.layout(style)?;
        let terms = Terms::for_locale(locale);

        let mut order: Vec<usize> = (0..records.len()).collect();
        if layout != Layout::Numbered {
            order.sort_by_cached_key(|&i| (sort_key(&records[i]), i));
        }

        Ok(order
            .into_iter()
            .enumerate()
            .map(|(position, index)| {
                let record = &records[index];
                let line = match layout {
                    Layout::AuthorDate => author_date(record, &terms),
                    Layout::Harvard => harvard(record, &terms),
                    Layout::Numbered => numbered(record, position + 1),
                };
                FormattedEntry {
                    index,
                    id: record.id.clone(),
                    text: line.text,
                    html: format!("<div class=\"csl-entry\">{}</div>", line.html),
                    citation: citation(record, layout, &terms, position + 1),
                    bibtex: to_bibtex(record),
                }
            })
            .collect())
    }
}

/// Escapes text for inclusion in HTML.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn sort_key(record: &Record) -> (String, i32, String) {
    let title = record.title.clone().unwrap_or_default().to_lowercase();
    let lead = record
        .author
        .first()
        .map_or_else(|| title.clone(), |n| n.sort_name().to_lowercase());
    (lead, record.year().unwrap_or(i32::MAX), title)
}

/// Text and HTML renderings built side by side.
#[derive(Debug, Default)]
struct Line {
    text: String,
    html: String,
}

impl Line {
    fn plain(&mut self, s: &str) -> &mut Self {
        self.text.push_str(s);
        self.html.push_str(&escape_html(s));
        self
    }

    fn italic(&mut self, s: &str) -> &mut Self {
        self.text.push_str(s);
        self.html.push_str("<i>");
        self.html.push_str(&escape_html(s));
        self.html.push_str("</i>");
        self
    }

    fn link(&mut self, url: &str) -> &mut Self {
        self.text.push_str(url);
        let escaped = escape_html(url);
        self.html
            .push_str(&format!("<a href=\"{escaped}\">{escaped}</a>"));
        self
    }

    /// Appends `s` followed by a period unless it already ends a sentence.
    fn sentence(&mut self, s: &str) -> &mut Self {
        self.plain(s);
        if !s.ends_with(['.', '?', '!']) {
            self.plain(".");
        }
        self
    }
}

fn field(record: &Record, name: &str) -> Option<String> {
    record
        .extra
        .get(name)
        .and_then(scalar_to_string)
        .filter(|v| !v.is_empty())
}

fn year_text(record: &Record, terms: &Terms) -> String {
    record
        .year()
        .map_or_else(|| terms.no_date.to_string(), |y| y.to_string())
}

fn join_names(names: &[String], and: &str, serial_comma: bool) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => {
            let comma = if serial_comma { "," } else { "" };
            format!("{}{comma} {and} {last}", init.join(", "))
        },
    }
}

fn inverted(name: &Name, spaced: bool) -> String {
    match &name.family {
        Some(family) => {
            let initials = name.initials();
            let initials = if spaced {
                initials
            } else {
                initials.replace(' ', "")
            };
            if initials.is_empty() {
                family.clone()
            } else {
                format!("{family}, {initials}")
            }
        },
        None => name.sort_name().to_string(),
    }
}

fn doi_url(doi: &str) -> String {
    format!("https://doi.org/{doi}")
}

fn author_date(record: &Record, terms: &Terms) -> Line {
    let mut line = Line::default();
    let authors: Vec<String> = record.author.iter().map(|n| inverted(n, true)).collect();
    let year = year_text(record, terms);

    if authors.is_empty() {
        if let Some(title) = &record.title {
            line.sentence(title);
            line.plain(" ");
        }
        line.plain(&format!("({year})."));
    } else {
        line.plain(&join_names(&authors, terms.and, true));
        line.plain(&format!(" ({year})."));
        if let Some(title) = &record.title {
            line.plain(" ").sentence(title);
        }
    }

    if let Some(container) = &record.container_title {
        line.plain(" ").italic(container);
        if let Some(volume) = field(record, "volume") {
            line.plain(", ").italic(&volume);
        }
        if let Some(issue) = field(record, "issue") {
            line.plain(&format!("({issue})"));
        }
        if let Some(page) = field(record, "page") {
            line.plain(&format!(", {page}"));
        }
        line.plain(".");
    }
    if let Some(doi) = &record.doi {
        line.plain(" ").link(&doi_url(doi));
    } else if let Some(url) = &record.url {
        line.plain(" ").link(url);
    }
    line
}

fn harvard(record: &Record, terms: &Terms) -> Line {
    let mut line = Line::default();
    let and = if terms.and == "&" { "and" } else { terms.and };
    let authors: Vec<String> = record.author.iter().map(|n| inverted(n, false)).collect();

    if !authors.is_empty() {
        line.plain(&join_names(&authors, and, false));
        line.plain(" ");
    }
    line.plain(&format!("({})", year_text(record, terms)));
    if let Some(title) = &record.title {
        line.plain(&format!(" '{title}'"));
    }
    if let Some(container) = &record.container_title {
        line.plain(", ").italic(container);
        if let Some(volume) = field(record, "volume") {
            line.plain(&format!(", {volume}"));
        }
        if let Some(issue) = field(record, "issue") {
            line.plain(&format!("({issue})"));
        }
        if let Some(page) = field(record, "page") {
            line.plain(&format!(", pp. {page}"));
        }
    }
    line.plain(".");
    if let Some(doi) = &record.doi {
        line.plain(&format!(" doi:{doi}."));
    }
    line
}

fn numbered(record: &Record, number: usize) -> Line {
    const MAX_LISTED: usize = 6;
    let mut line = Line::default();
    line.plain(&format!("{number}. "));

    let mut authors: Vec<String> = record
        .author
        .iter()
        .take(MAX_LISTED)
        .map(|n| match &n.family {
            Some(family) => format!("{family} {}", n.initials().replace(['.', ' '], "")),
            None => n.sort_name().to_string(),
        })
        .collect();
    if record.author.len() > MAX_LISTED {
        authors.push("et al".to_string());
    }
    if !authors.is_empty() {
        line.sentence(authors.join(", ").trim_end());
        line.plain(" ");
    }
    if let Some(title) = &record.title {
        line.sentence(title);
    }
    if let Some(container) = &record.container_title {
        line.plain(" ").sentence(container);
    }
    if let Some(year) = record.year() {
        line.plain(&format!(" {year}"));
        if let Some(volume) = field(record, "volume") {
            line.plain(&format!(";{volume}"));
        }
        if let Some(issue) = field(record, "issue") {
            line.plain(&format!("({issue})"));
        }
        if let Some(page) = field(record, "page") {
            line.plain(&format!(":{page}"));
        }
        line.plain(".");
    }
    if let Some(doi) = &record.doi {
        line.plain(&format!(" doi:{doi}"));
    }
    line
}

fn citation(record: &Record, layout: Layout, terms: &Terms, number: usize) -> String {
    if layout == Layout::Numbered {
        return format!("[{number}]");
    }
    let names: Vec<&str> = record.author.iter().map(Name::sort_name).collect();
    let and = match layout {
        Layout::Harvard if terms.and == "&" => "and",
        _ => terms.and,
    };
    let who = match names.as_slice() {
        [] => format!(
            "\u{201c}{}\u{201d}",
            record.title.as_deref().unwrap_or_default()
        ),
        [one] => (*one).to_string(),
        [a, b] => format!("{a} {and} {b}"),
        [first, ..] => format!("{first} {}", terms.et_al),
    };
    let year = year_text(record, terms);
    let body = match layout {
        Layout::Harvard => format!("{who} {year}"),
        _ => format!("{who}, {year}"),
    };
    format!("({})", escape_html(&body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<Record> {
        vec![
            Record::new("z")
                .with_title("Zebra stripes")
                .with_author(Name::new("Young", "Zoe"))
                .with_year(2019),
            Record::new("g")
                .with_title("Colorless Green Recurrent Networks Dream Hierarchically")
                .with_author(Name::new("Gulordava", "Kristina"))
                .with_author(Name::new("Bojanowski", "Piotr"))
                .with_container_title("Proceedings of NAACL")
                .with_year(2018)
                .with_doi("10.18653/v1/N18-1108"),
            Record::new("a")
                .with_title("Attention & more")
                .with_author(Name::new("Adams", "Ann"))
                .with_author(Name::new("Baker", "Bob"))
                .with_author(Name::new("Clark", "Cy")),
        ]
    }

    #[test]
    fn test_apa_sorts_by_author() {
        let out = BasicFormatter::default()
            .format(&records(), "apa", "en-US")
            .unwrap();
        let order: Vec<usize> = out.iter().map(|e| e.index).collect();
        assert_eq!(order, vec![2, 1, 0]);

        let gulordava = &out[1];
        assert_eq!(
            gulordava.text,
            "Gulordava, K., & Bojanowski, P. (2018). Colorless Green Recurrent Networks \
             Dream Hierarchically. Proceedings of NAACL. https://doi.org/10.18653/v1/N18-1108"
        );
        assert!(gulordava.html.contains("<i>Proceedings of NAACL</i>"));
        assert_eq!(gulordava.citation, "(Gulordava &amp; Bojanowski, 2018)");
        assert!(gulordava.bibtex.starts_with("@misc{"));
    }

    #[test]
    fn test_apa_no_date_and_escaping() {
        let out = BasicFormatter::default()
            .format(&records(), "apa", "en-US")
            .unwrap();
        assert!(out[0].text.contains("(n.d.)"));
        assert!(out[0].html.contains("Attention &amp; more"));
        assert_eq!(out[0].citation, "(Adams et al., n.d.)");
    }

    #[test]
    fn test_vancouver_keeps_input_order() {
        let out = BasicFormatter::default()
            .format(&records(), "vancouver", "en-US")
            .unwrap();
        let order: Vec<usize> = out.iter().map(|e| e.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(out[1].citation, "[2]");
        assert!(out[1].text.starts_with("2. Gulordava K, Bojanowski P. Colorless"));
    }

    #[test]
    fn test_harvard_locale_terms() {
        let out = BasicFormatter::default()
            .format(&records(), "harvard1", "de-DE")
            .unwrap();
        assert_eq!(out[1].citation, "(Gulordava und Bojanowski 2018)");
        assert!(out[0].text.contains("(o. J.)"));
    }

    #[test]
    fn test_unknown_style_and_locale() {
        let formatter = BasicFormatter::default();
        assert!(formatter.format(&records(), "chicago", "en-US").is_err());
        assert!(formatter.format(&records(), "apa", "pt-BR").is_err());
    }

    #[test]
    fn test_registered_template_uses_author_date() {
        let mut registry = StyleRegistry::new();
        let style = registry.resolve(None, Some("<?xml version=\"1.0\"?><style/>"));
        let out = BasicFormatter::new(registry)
            .format(&records(), &style, "en-US")
            .unwrap();
        assert_eq!(out[0].index, 2);
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a & 'b'>"), "&lt;a &amp; &#39;b&#39;&gt;");
    }
}
