//! End-to-end behavior of the stack-then-resolve pipeline through the
//! public API.

use pretty_assertions::assert_eq;
use stratum::{
    conf, resolve, ConfigError, ConfigValue, EnvResolver, RenderOptions, ResolveOptions,
    ResolveStatus,
};

fn resolved(merged: &ConfigValue) -> ConfigValue {
    resolve(merged, &ResolveOptions::default()).unwrap()
}

#[test]
fn overrides_and_references_interact() {
    // first document is the highest priority layer
    let merged = conf! {
        "server.port = 9090",
        r#"
        server {
            host = localhost
            port = 8080
            url = "http://"${server.host}":"${server.port}
        }
        "#
    };

    let root = resolved(&merged);
    assert_eq!(root.get("server.port").unwrap().unwrap().as_i64().unwrap(), 9090);
    assert_eq!(
        root.get("server.url").unwrap().unwrap().as_str().unwrap(),
        "http://localhost:9090"
    );
}

#[test]
fn defaults_pattern_with_self_reference() {
    let merged = conf! {
        "timeouts = ${timeouts} { write = 2 }",
        "timeouts = { read = 1, write = 10 }"
    };

    let root = resolved(&merged);
    assert_eq!(root.get("timeouts.read").unwrap().unwrap().as_i64().unwrap(), 1);
    assert_eq!(root.get("timeouts.write").unwrap().unwrap().as_i64().unwrap(), 2);
}

#[test]
fn append_builds_lists_across_layers() {
    let merged = conf! {
        "plugins += extra",
        "plugins = [core]\nplugins += auth"
    };

    let root = resolved(&merged);
    let plugins: Vec<&str> = root
        .get("plugins")
        .unwrap()
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(plugins, vec!["core", "auth", "extra"]);
}

#[test]
fn unresolved_reads_fail_loudly() {
    let merged = conf! { "a = ${b}\nb = 1" };
    let err = merged.get("a.x").unwrap_err();
    assert!(matches!(err, ConfigError::NotResolved { .. }));
}

#[test]
fn partial_resolution_then_final_layer() {
    let base = conf! { "db = { host = ${env.db_host}, pool = ${pool.size} }\npool.size = 5" };
    let partial = resolve(&base, &ResolveOptions::partial()).unwrap();

    // the known half is done, the unknown half survived untouched
    assert_eq!(partial.get("db.pool").unwrap().unwrap().as_i64().unwrap(), 5);
    assert_eq!(partial.resolve_status(), ResolveStatus::Unresolved);

    let merged = conf! { "env.db_host = prod" }.with_fallback(&partial);
    let root = resolved(&merged);
    assert_eq!(root.get("db.host").unwrap().unwrap().as_str().unwrap(), "prod");
    assert_eq!(root.resolve_status(), ResolveStatus::Resolved);
}

#[test]
fn environment_fallback() {
    std::env::set_var("STRATUM_TEST_STACKING_HOME", "/srv/app");

    let merged = conf! { "home = ${STRATUM_TEST_STACKING_HOME}" };
    let options = ResolveOptions::default().with_resolver(EnvResolver);
    let root = resolve(&merged, &options).unwrap();

    assert_eq!(root.get("home").unwrap().unwrap().as_str().unwrap(), "/srv/app");
}

#[test]
fn merged_trees_round_trip_through_rendering() {
    let merged = conf! {
        "a = ${ref}\nlist += 2",
        "a = { x = 1 }\nlist = [1]\nref = { y = 2 }"
    };

    let rendered = stratum::render(&merged, &RenderOptions::defaults()).unwrap();
    let back = stratum::parse_str(&rendered).unwrap();
    assert_eq!(back, merged, "rendered:\n{rendered}");

    // and both resolve to the same tree
    assert_eq!(resolved(&back), resolved(&merged));
}

#[test]
fn resolved_tree_serializes() {
    let root = resolved(&conf! { "a = 1\nb = { c = [true, null] }" });
    let json = serde_json::to_string(&root).unwrap();
    assert_eq!(json, r#"{"a":1,"b":{"c":[true,null]}}"#);
}

#[test]
fn unresolved_tree_refuses_to_serialize() {
    let merged = conf! { "a = ${b}" };
    assert!(serde_json::to_string(&merged).is_err());
}
