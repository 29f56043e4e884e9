//! Integration tests for the reference manager.
//!
//! Drives add, deduplicate and output end to end through the public API.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use citemerge::rendering::BasicFormatter;
use citemerge::services::{
    AddOptions, ExclusionConfig, ExclusionRule, GroupingOptions, OutputOptions, ReferenceManager,
    compile_rules,
};
use serde_json::{Map, Value, json};

fn three_sources() -> ReferenceManager {
    let source1 = vec![
        json!({"DOI": "DOI1", "title": "title 1 (source 1)"}),
        json!({"DOI": "DOI2", "title": "title 2 (from source 1)"}),
    ];
    let source2 = vec![
        json!({"DOI": "DOI1", "title": "title 1 (source 2)"}),
        json!({"title": "title 2 (from source 2)"}),
        json!({"title": "A very different title"}),
    ];
    let source3 = vec![
        json!({"DOI": "DOI1", "title": "title 1 (source 3)"}),
        json!({"title": "A very different title"}),
        json!({"DOI": "bla"}),
    ];

    let mut manager = ReferenceManager::new();
    manager.add(source1, AddOptions::named("source1")).unwrap();
    manager
        .add(source2, AddOptions::named("source2").with_priority(2))
        .unwrap();
    manager
        .add(source3, AddOptions::named("source3").with_priority(1))
        .unwrap();
    manager
}

fn dated_dois() -> Vec<Value> {
    vec![
        json!({"DOI": "10.31234/osf.io/qjfpe", "issued": {"date-parts": [[2022]]}}),
        json!({"DOI": "10.1177/10298649221149109", "issued": {"date-parts": [[2023]]}}),
        json!({"DOI": "10.1007/s10071-023-01763-4", "issued": {"date-parts": [[2023]]}}),
        json!({"DOI": "10.1016/j.ijpsycho.2015.02.024", "issued": {"date-parts": [[2015]]}}),
    ]
}

#[test]
fn test_deduplicate_resolves_by_priority() {
    let mut manager = three_sources();
    assert_eq!(manager.len(), 8);

    let report = manager.deduplicate(&GroupingOptions::default()).unwrap();
    assert_eq!(report.before, 8);
    assert_eq!(report.after, 4);
    assert_eq!(report.removed(), 4);

    let refs = manager.records();
    assert_eq!(refs[0].doi.as_deref(), Some("DOI1"));
    assert_eq!(refs[0].title.as_deref(), Some("title 1 (source 2)"));
    assert_eq!(refs[0].sources, vec!["source1", "source2", "source3"]);

    assert_eq!(refs[1].title.as_deref(), Some("title 2 (from source 2)"));
    assert_eq!(refs[1].sources, vec!["source1", "source2"]);

    assert_eq!(refs[2].title.as_deref(), Some("A very different title"));
    assert_eq!(refs[2].sources, vec!["source2", "source3"]);

    assert_eq!(refs[3].doi.as_deref(), Some("bla"));
    assert_eq!(refs[3].sources, vec!["source3"]);
}

#[test]
fn test_deduplicate_twice_is_stable() {
    let mut manager = three_sources();
    manager.deduplicate(&GroupingOptions::default()).unwrap();
    let first: Vec<_> = manager.records().to_vec();
    let report = manager.deduplicate(&GroupingOptions::default()).unwrap();
    assert_eq!(report.removed(), 0);
    assert_eq!(manager.records(), first.as_slice());
}

#[test]
fn test_exclude_field_values_and_patterns() {
    let rules = compile_rules(&[
        ExclusionConfig::FieldValues {
            field: "DOI".to_string(),
            values: vec!["10.31234/osf.io/qjfpe".to_string()],
        },
        ExclusionConfig::FieldPattern {
            field: "DOI".to_string(),
            regexp: "10.1007/*".to_string(),
        },
    ])
    .unwrap();
    let options = rules
        .into_iter()
        .fold(AddOptions::default(), AddOptions::with_exclusion);

    let mut manager = ReferenceManager::new();
    let report = manager.add(dated_dois(), options).unwrap();
    assert_eq!(report.excluded, 2);
    assert_eq!(manager.len(), 2);
    assert_eq!(report.source, "source_0");
}

#[test]
fn test_exclude_by_year() {
    let mut manager = ReferenceManager::new();
    manager
        .add(
            dated_dois(),
            AddOptions::default().with_exclusion(ExclusionRule::year_range(None, Some(2020))),
        )
        .unwrap();
    assert_eq!(manager.len(), 1);
    assert_eq!(
        manager.records()[0].doi.as_deref(),
        Some("10.1016/j.ijpsycho.2015.02.024")
    );
}

#[test]
fn test_exclude_with_predicate() {
    let mut manager = ReferenceManager::new();
    manager
        .add(
            dated_dois(),
            AddOptions::default().with_exclusion(ExclusionRule::predicate(|item| {
                item.year().is_some_and(|year| year % 2 == 1)
            })),
        )
        .unwrap();
    assert_eq!(manager.len(), 2);
}

#[test]
fn test_output_in_order_with_hooks() {
    let mut manager = ReferenceManager::new();
    manager
        .add(
            vec![
                json!({"title": "Zebra stripes", "author": [{"family": "Young"}], "issued": {"date-parts": [[2001]]}}),
                json!({"title": "Apple trees", "author": [{"family": "Adams"}], "issued": {"date-parts": [[1999]]}}),
                json!({"title": "Mango groves", "author": [{"family": "Moore"}]}),
            ],
            AddOptions::named("lab"),
        )
        .unwrap();

    let options = OutputOptions::default()
        .with_custom_fields(|record| {
            let mut fields = Map::new();
            fields.insert("foo".to_string(), json!("bar"));
            fields.insert("has_title".to_string(), json!(record.title.is_some()));
            fields
        })
        .with_transform(|mut entry| {
            entry.html = "bla".to_string();
            entry
        });
    let items = manager.output(&BasicFormatter::default(), &options).unwrap();

    assert_eq!(items.len(), 3);
    for (position, item) in items.iter().enumerate() {
        assert_eq!(item.order, position);
        assert_eq!(item.html, "bla");
        assert_eq!(item.custom_field("foo"), Some(&json!("bar")));
        assert_eq!(item.sources, vec!["lab"]);
    }
    assert!(items[0].text.starts_with("Adams"));
    assert_eq!(items[0].year, Some(1999));
    assert!(items[2].text.starts_with("Young"));
}

#[test]
fn test_numbered_style_keeps_input_order() {
    let mut manager = ReferenceManager::new();
    manager
        .add(
            vec![
                json!({"title": "Zebra", "author": [{"family": "Young"}]}),
                json!({"title": "Apple", "author": [{"family": "Adams"}]}),
            ],
            AddOptions::default(),
        )
        .unwrap();
    let items = manager
        .output(
            &BasicFormatter::default(),
            &OutputOptions::default().with_style("vancouver"),
        )
        .unwrap();
    assert!(items[0].text.contains("Young"));
    assert_eq!(items[1].citation, "[2]");
}

#[test]
fn test_source_bookkeeping() {
    let manager = three_sources();
    let source2 = manager.source("source2").unwrap();
    assert_eq!(source2.priority, 2);
    assert_eq!(source2.record_ids.len(), 3);
    assert!(!source2.auto_named);
    assert_eq!(manager.sources().len(), 3);
}
