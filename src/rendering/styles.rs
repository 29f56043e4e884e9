//! Citation style and locale selection.
//!
//! Style registration is an explicit configuration step: build a
//! [`StyleRegistry`], resolve the configured style once, then hand the
//! registry to a formatter.

use std::collections::HashMap;

use crate::{Error, Result};

/// Styles every formatter understands.
pub const BUILTIN_STYLES: [&str; 3] = ["apa", "vancouver", "harvard1"];

/// Locales accepted for rendering.
pub const SUPPORTED_LOCALES: [&str; 5] = ["en-US", "es-ES", "de-DE", "fr-FR", "nl-NL"];

/// Default style.
pub const DEFAULT_STYLE: &str = "apa";

/// Default locale.
pub const DEFAULT_LOCALE: &str = "en-US";

/// Name given to a template registered without its own style name.
pub const CUSTOM_STYLE: &str = "custom";

/// Known citation styles: the built-ins plus registered CSL templates.
#[derive(Debug, Clone, Default)]
pub struct StyleRegistry {
    templates: HashMap<String, String>,
}

impl StyleRegistry {
    /// Creates a registry with only the built-in styles.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for built-in and registered styles.
    #[must_use]
    pub fn is_known(&self, style: &str) -> bool {
        BUILTIN_STYLES.contains(&style) || self.templates.contains_key(style)
    }

    /// Returns the CSL template registered under `style`.
    #[must_use]
    pub fn template(&self, style: &str) -> Option<&str> {
        self.templates.get(style).map(String::as_str)
    }

    /// Picks the style to render with, registering `template` if given.
    ///
    /// - neither style nor template: `apa`
    /// - a template without a style name, or named like an existing style:
    ///   registered as `custom`
    /// - an unknown style without a template: warns, `apa`
    /// - a template that is not CSL XML: warns, `apa`
    ///
    /// `template` is the template text; fetching remote templates is the
    /// caller's job.
    pub fn resolve(&mut self, style: Option<&str>, template: Option<&str>) -> String {
        let style = style.map(str::trim).filter(|s| !s.is_empty());
        let template = template.map(str::trim).filter(|t| !t.is_empty());

        match (style, template) {
            (None, None) => DEFAULT_STYLE.to_string(),
            (Some(style), None) if self.is_known(style) => style.to_string(),
            (Some(style), None) => {
                tracing::warn!(style, "Invalid citation style, rolling back to APA");
                DEFAULT_STYLE.to_string()
            },
            (name, Some(template)) => {
                if !template.starts_with("<?xml") {
                    tracing::warn!("Invalid CSL template, rolling back to APA style");
                    return DEFAULT_STYLE.to_string();
                }
                let name = match name {
                    Some(name) if !self.is_known(name) => name,
                    _ => CUSTOM_STYLE,
                };
                self.templates
                    .insert(name.to_string(), template.to_string());
                tracing::debug!(style = name, "Registered CSL template");
                name.to_string()
            },
        }
    }
}

/// Rejects locales outside [`SUPPORTED_LOCALES`].
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for unsupported locales.
pub fn check_locale(locale: &str) -> Result<()> {
    if SUPPORTED_LOCALES.contains(&locale) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "Locale '{locale}' is not supported (expected one of {})",
            SUPPORTED_LOCALES.join(", ")
        )))
    }
}

/// Locale-dependent terms used by the built-in layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terms {
    /// Joins the last two names.
    pub and: &'static str,
    /// Abbreviation for "no date".
    pub no_date: &'static str,
    /// Abbreviation for "and others".
    pub et_al: &'static str,
}

impl Terms {
    /// Returns the terms for a supported locale (English otherwise).
    #[must_use]
    pub fn for_locale(locale: &str) -> Self {
        match locale {
            "es-ES" => Self {
                and: "y",
                no_date: "s.f.",
                et_al: "et al.",
            },
            "de-DE" => Self {
                and: "und",
                no_date: "o. J.",
                et_al: "u. a.",
            },
            "fr-FR" => Self {
                and: "et",
                no_date: "s. d.",
                et_al: "et al.",
            },
            "nl-NL" => Self {
                and: "en",
                no_date: "z.d.",
                et_al: "e.a.",
            },
            _ => Self {
                and: "&",
                no_date: "n.d.",
                et_al: "et al.",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = "<?xml version=\"1.0\"?><style/>";

    #[test]
    fn test_resolve_defaults_to_apa() {
        assert_eq!(StyleRegistry::new().resolve(None, None), "apa");
    }

    #[test]
    fn test_resolve_builtin_style() {
        assert_eq!(
            StyleRegistry::new().resolve(Some("vancouver"), None),
            "vancouver"
        );
    }

    #[test]
    fn test_unknown_style_falls_back() {
        assert_eq!(StyleRegistry::new().resolve(Some("chicago"), None), "apa");
    }

    #[test]
    fn test_template_registration() {
        let mut registry = StyleRegistry::new();
        assert_eq!(registry.resolve(None, Some(XML)), "custom");
        assert!(registry.is_known("custom"));

        assert_eq!(registry.resolve(Some("apa"), Some(XML)), "custom");
        assert_eq!(registry.resolve(Some("my-lab"), Some(XML)), "my-lab");
        assert_eq!(registry.template("my-lab"), Some(XML));
    }

    #[test]
    fn test_non_xml_template_falls_back() {
        let mut registry = StyleRegistry::new();
        assert_eq!(registry.resolve(Some("x"), Some("not xml")), "apa");
        assert!(!registry.is_known("x"));
    }

    #[test]
    fn test_locales() {
        assert!(check_locale("nl-NL").is_ok());
        assert!(matches!(check_locale("xx-XX"), Err(Error::InvalidInput(_))));
        assert_eq!(Terms::for_locale("de-DE").and, "und");
    }
}
