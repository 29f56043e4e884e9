//! Integration tests for file formats feeding the merge pipeline.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs::File;
use std::path::Path;

use citemerge::io::{Format, formats, read_identifier_file, read_record_file};
use citemerge::models::PublicationEntry;
use citemerge::rendering::BasicFormatter;
use citemerge::services::{AddOptions, GroupingOptions, OutputOptions, ReferenceManager};
use citemerge::sources::{SourceOptions, load_bibliography_file};
use tempfile::TempDir;

const BIBTEX: &str = r#"
@comment{exported from the lab wiki}
@string{jml = "Journal of Memory and Language"}

@article{gulordava2018,
  author = {Gulordava, Kristina and Bojanowski, Piotr},
  title = {Colorless Green Recurrent Networks Dream Hierarchically},
  journal = {Proceedings of NAACL},
  year = 2018,
  doi = {10.18653/v1/N18-1108},
}

@inproceedings{broken,
  title = {Unbalanced {braces,
  year = 2019

@book{linzen2016,
  author = "Linzen, Tal",
  title = "Assessing the ability of LSTMs",
  year = "2016",
}
"#;

const YAML: &str = r#"
references:
  - id: crossref-1
    type: article-journal
    title: Colorless green recurrent networks dream hierarchically
    DOI: 10.18653/V1/N18-1108
    issued:
      date-parts: [[2018]]
  - id: crossref-2
    type: article-journal
    title: A completely unrelated paper
    issued:
      date-parts: [[2021]]
"#;

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_bibtex_file_skips_only_broken_entry() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "lab.bib", BIBTEX);

    let batch = read_record_file(&path).unwrap();
    let keys: Vec<&str> = batch
        .iter()
        .map(|v| v["citation-key"].as_str().unwrap())
        .collect();
    assert!(keys.contains(&"gulordava2018"));
    assert!(!keys.contains(&"broken"));

    let source = load_bibliography_file("lab", &path, SourceOptions::default()).unwrap();
    assert!(source.get("doi:10.18653/v1/n18-1108").is_some());
}

#[test]
fn test_identifier_lists() {
    let dir = TempDir::new().unwrap();
    let text = write(dir.path(), "dois.txt", "# reading list\n10.1/a\n\n  10.1/b  \n");
    let csv = write(dir.path(), "dois.csv", "title,doi\nFirst,10.1/a\nSecond,10.1/c\n");
    let json = write(dir.path(), "dois.json", r#"["10.1/a", 42]"#);

    assert_eq!(read_identifier_file(&text, "list").unwrap(), vec!["10.1/a", "10.1/b"]);
    assert_eq!(read_identifier_file(&csv, "list").unwrap(), vec!["10.1/a", "10.1/c"]);
    assert!(matches!(
        read_identifier_file(&json, "list"),
        Err(citemerge::Error::InvalidItemType { .. })
    ));
}

#[test]
fn test_merge_files_and_export_json() {
    let dir = TempDir::new().unwrap();
    let bib = write(dir.path(), "lab.bib", BIBTEX);
    let yaml = write(dir.path(), "crossref.yaml", YAML);

    let mut manager = ReferenceManager::new();
    manager
        .add(
            read_record_file(&bib).unwrap(),
            AddOptions::named("lab").with_priority(1),
        )
        .unwrap();
    manager
        .add(read_record_file(&yaml).unwrap(), AddOptions::named("crossref"))
        .unwrap();
    let report = manager.deduplicate(&GroupingOptions::default()).unwrap();
    assert_eq!(report.removed(), 1);

    let entries = manager
        .output(&BasicFormatter::default(), &OutputOptions::default())
        .unwrap();
    let merged = entries
        .iter()
        .find(|e| e.id == "doi:10.18653/v1/n18-1108")
        .unwrap();
    assert_eq!(merged.sources, vec!["lab", "crossref"]);
    assert_eq!(merged.props["citation-key"], "gulordava2018");
    assert!(merged.bibtex.starts_with('@'));

    let out = dir.path().join("out.json");
    let mut sink =
        formats::create_export_sink(File::create(&out).unwrap(), Format::CslJson).unwrap();
    for entry in &entries {
        sink.write(entry).unwrap();
    }
    sink.finalize().unwrap();

    let written: Vec<PublicationEntry> =
        serde_json::from_reader(File::open(&out).unwrap()).unwrap();
    assert_eq!(written, entries);
}

#[test]
fn test_yaml_export_lists_every_entry() {
    let dir = TempDir::new().unwrap();
    let yaml = write(dir.path(), "crossref.yaml", YAML);

    let mut manager = ReferenceManager::new();
    manager
        .add(read_record_file(&yaml).unwrap(), AddOptions::named("crossref"))
        .unwrap();
    let entries = manager
        .output(&BasicFormatter::default(), &OutputOptions::default())
        .unwrap();

    let out = dir.path().join("out.yaml");
    let mut sink = formats::create_export_sink(File::create(&out).unwrap(), Format::Yaml).unwrap();
    for entry in &entries {
        sink.write(entry).unwrap();
    }
    sink.finalize().unwrap();

    let written: Vec<PublicationEntry> =
        serde_yaml_ng::from_reader(File::open(&out).unwrap()).unwrap();
    assert_eq!(written.len(), 2);
    assert_eq!(written[0].sources, vec!["crossref"]);
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "refs.docx", "");
    assert!(read_record_file(&path).is_err());
    assert!(formats::create_export_sink(Vec::new(), Format::Bibtex).is_err());
}
