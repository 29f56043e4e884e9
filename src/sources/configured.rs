//! Loaders for `[[sources]]` configuration entries.

use std::sync::Arc;

use super::{SourceLoader, SourceOptions, load_bibliography_file, load_identifiers, load_registry};
use crate::Result;
use crate::config::{SourceConfig, SourceKind};
use crate::fetch::RecordFetcher;
use crate::io::read_identifier_file;
use crate::services::compile_rules;

/// Builds the loader for one configured source.
///
/// Exclusion rules become the source's item filter; they only see the
/// fields the item summary carries.
///
/// # Errors
///
/// Returns an error if the entry is incomplete or an exclusion rule is
/// invalid.
pub fn source_loader(config: &SourceConfig, fetcher: Arc<dyn RecordFetcher>) -> Result<SourceLoader> {
    config.validate()?;
    let options = SourceOptions::default()
        .with_priority(config.priority)
        .excluding(compile_rules(&config.exclude)?);
    let name = config.name.clone();

    let loader = match config.kind {
        SourceKind::File => {
            let path = config.path.clone().unwrap_or_default();
            SourceLoader::new(name.clone(), move || {
                load_bibliography_file(&name, &path, options)
            })
        },
        SourceKind::Identifiers => {
            let path = config.path.clone();
            let inline = config.ids.clone();
            SourceLoader::new(name.clone(), move || {
                let mut ids = match path {
                    Some(path) => read_identifier_file(&path, &name)?,
                    None => Vec::new(),
                };
                ids.extend(inline);
                load_identifiers(&name, ids.as_slice(), options)
            })
        },
        SourceKind::Registry => {
            let registry_id = config.id.clone().unwrap_or_default();
            SourceLoader::new(name.clone(), move || {
                load_registry(&name, &registry_id, fetcher.as_ref(), options)
            })
        },
    };
    Ok(loader)
}

/// Builds loaders for every configured source, in order.
///
/// # Errors
///
/// Returns the first configuration error.
pub fn source_loaders(
    configs: &[SourceConfig],
    fetcher: &Arc<dyn RecordFetcher>,
) -> Result<Vec<SourceLoader>> {
    configs
        .iter()
        .map(|config| source_loader(config, Arc::clone(fetcher)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::OfflineFetcher;
    use crate::services::ExclusionConfig;
    use crate::sources::load_all;
    use std::io::Write;
    use tempfile::TempDir;

    fn config(name: &str, kind: SourceKind) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            kind,
            path: None,
            ids: Vec::new(),
            id: None,
            priority: 0,
            exclude: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_configured_sources_load() {
        let dir = TempDir::new().unwrap();
        let bib = dir.path().join("lab.bib");
        let mut file = std::fs::File::create(&bib).unwrap();
        writeln!(file, "@article{{a, title = {{Kept}}, year = 2019}}").unwrap();
        writeln!(file, "@article{{b, title = {{Too new}}, year = 2024}}").unwrap();

        let list = dir.path().join("dois.txt");
        std::fs::write(&list, "10.1/a\n# comment\n10.1/b\n").unwrap();

        let mut lab = config("lab", SourceKind::File);
        lab.path = Some(bib);
        lab.priority = 2;
        lab.exclude = vec![ExclusionConfig::YearRange {
            before: None,
            after: Some(2020),
        }];
        let mut dois = config("dois", SourceKind::Identifiers);
        dois.path = Some(list);
        dois.ids = vec!["10.1/c".to_string()];

        let fetcher: Arc<dyn RecordFetcher> = Arc::new(OfflineFetcher);
        let loaders = source_loaders(&[lab, dois], &fetcher).unwrap();
        let outcomes = load_all(loaders).await;

        let lab = outcomes[0].result.as_ref().unwrap();
        assert_eq!(lab.len(), 1);
        assert_eq!(lab.priority(), 2);
        assert_eq!(outcomes[1].result.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn test_incomplete_entry_is_rejected() {
        let fetcher: Arc<dyn RecordFetcher> = Arc::new(OfflineFetcher);
        assert!(source_loader(&config("orcid", SourceKind::Registry), fetcher).is_err());
    }

    #[tokio::test]
    async fn test_missing_file_fails_only_its_outcome() {
        let mut missing = config("missing", SourceKind::File);
        missing.path = Some("/nonexistent/refs.bib".into());
        let mut inline = config("inline", SourceKind::Identifiers);
        inline.ids = vec!["10.1/a".to_string()];

        let fetcher: Arc<dyn RecordFetcher> = Arc::new(OfflineFetcher);
        let outcomes = load_all(source_loaders(&[missing, inline], &fetcher).unwrap()).await;
        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.is_ok());
    }
}
