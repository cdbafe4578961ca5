// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for loading the cache configuration from serialized form.

use std::time::Duration;

use cachetree::testing::MemoryGraph;
use cachetree::{CacheSpecConfig, PrefetchConfig, RegistryConfig, Settings, SpecRegistry};

const CONFIG: &str = r#"{
    "Parent": {
        "prefetch": { "children": { "toys": {} } },
        "ttl": 300
    },
    "Author": {
        "lookups": ["id", ["first_name", "last_name"]]
    }
}"#;

fn graph() -> MemoryGraph {
    MemoryGraph::builder()
        .entity("Parent", "id", ["name"])
        .entity("Child", "id", ["parent_id"])
        .entity("Toy", "id", ["child_id"])
        .entity("Author", "id", ["first_name", "last_name"])
        .foreign_key("Child", "parent_id", "parent", "Parent", "children")
        .foreign_key("Toy", "child_id", "child", "Child", "toys")
        .build()
}

#[test]
fn json_matches_builder() {
    let parsed: RegistryConfig = serde_json::from_str(CONFIG).unwrap();
    let built = RegistryConfig::new()
        .cache_with("Parent", |spec| {
            spec.prefetch(PrefetchConfig::new().relation("children", PrefetchConfig::new().leaf("toys")))
                .ttl(Duration::from_secs(300))
        })
        .cache_with("Author", |spec| spec.lookup("id").lookup(["first_name", "last_name"]));

    assert_eq!(parsed, built);
}

#[test]
fn json_config_resolves() {
    let config: RegistryConfig = serde_json::from_str(CONFIG).unwrap();
    let registry = SpecRegistry::build(&config, &graph()).unwrap();

    let parent = registry.spec(&"Parent".into()).unwrap();
    assert_eq!(parent.ttl(), Some(Duration::from_secs(300)));
    assert_eq!(parent.prefetch_depth(), 2);
    assert!(registry.paths().contains(&"Toy".into()));

    let author = registry.spec(&"Author".into()).unwrap();
    let mut lookups: Vec<Vec<&str>> = author.lookups().iter().map(|fields| fields.iter().collect()).collect();
    lookups.sort();
    assert_eq!(lookups, [vec!["first_name", "last_name"], vec!["id"]]);
}

#[test]
fn unknown_keys_are_rejected() {
    let error = serde_json::from_str::<RegistryConfig>(r#"{ "Parent": { "prefetch_related": {} } }"#).unwrap_err();
    assert!(error.to_string().contains("prefetch_related"), "unexpected error: {error}");
}

#[test]
fn spec_serializes_without_absent_ttl() {
    let json = serde_json::to_value(CacheSpecConfig::new().lookup("id")).unwrap();
    assert_eq!(json, serde_json::json!({ "lookups": ["id"], "prefetch": {} }));
}

#[test]
fn settings_fill_in_defaults() {
    let settings: Settings = serde_json::from_str(r#"{ "invalidation": false, "collection_prefix": "cached_" }"#).unwrap();
    assert_eq!(settings, Settings::default().invalidation(false).collection_prefix("cached_"));
    assert!(!settings.is_disabled());

    assert!(serde_json::from_str::<Settings>(r#"{ "enabled": true }"#).is_err());
}
