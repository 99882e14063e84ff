use super::persist::render_env;
use super::*;
use crate::loader::StaticLoader;
use crate::ErrorKind;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn store_with(schema: Value, env: &[(&str, &str)]) -> ConfigStore {
    ConfigStore::new(StoreOptions::new(schema).with_env(env.iter().copied().collect()))
        .expect("store")
}

fn layer(name: &str, values: Value) -> Arc<dyn AsyncLoader> {
    Arc::new(StaticLoader::from_value(name, values).expect("object layer"))
}

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write config file");
    path
}

fn database_schema() -> Value {
    json!({
        "database": {
            "host": { "format": "string", "env": "DB_HOST", "default": "localhost" },
            "port": { "format": "number", "default": 5432 }
        },
        "debug": { "format": "boolean", "default": false }
    })
}

struct Broken;

#[async_trait]
impl AsyncLoader for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        Err(ConfigError::Loader {
            loader: "broken".to_string(),
            message: "backend unreachable".to_string(),
        })
    }
}

#[test]
fn default_is_used_and_env_overrides_with_conversion() {
    let schema = json!({ "port": { "format": "number", "env": "PORT", "default": 3000 } });

    let store = store_with(schema.clone(), &[]);
    assert_eq!(store.get("port").expect("port"), json!(3000));
    assert_eq!(store.origin("port"), Some(Origin::Default));

    let store = store_with(schema, &[("PORT", "8080")]);
    assert_eq!(store.get("port").expect("port"), json!(8080));
    assert_eq!(store.origin("port"), Some(Origin::Env("PORT".to_string())));
}

#[test]
fn missing_required_property_fails_construction() {
    let err = ConfigStore::new(
        StoreOptions::new(json!({ "a": { "format": "boolean", "env": "A" } }))
            .with_env(EnvSource::empty()),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let msg = err.to_string();
    assert!(msg.contains("'a'"), "{msg}");
    assert!(msg.contains("Required property"), "{msg}");
    assert!(msg.contains("'A'"), "{msg}");
}

#[test]
fn several_failures_at_construction_are_aggregated() {
    let schema = json!({
        "port": { "format": "number", "env": "PORT" },
        "debug": { "format": "boolean", "env": "DEBUG" }
    });
    let err = ConfigStore::new(
        StoreOptions::new(schema).with_env([("DEBUG", "maybe")].into_iter().collect()),
    )
    .unwrap_err();
    assert_eq!(err.errors().len(), 2);
    assert!(err.to_string().contains("failed with 2 errors"));
}

#[test]
fn env_boolean_and_pattern_rules_apply() {
    let schema = json!({
        "enabled": { "format": "boolean", "env": "ENABLED" },
        "region": { "format": { "pattern": "^[a-z]+-[0-9]$" }, "env": "REGION" }
    });
    let store = store_with(schema.clone(), &[("ENABLED", "1"), ("REGION", "eu-1")]);
    assert_eq!(store.get("enabled").expect("enabled"), json!(true));
    assert_eq!(store.get("region").expect("region"), json!("eu-1"));

    let err = ConfigStore::new(
        StoreOptions::new(schema)
            .with_env([("ENABLED", "true"), ("REGION", "EU")].into_iter().collect()),
    )
    .unwrap_err();
    assert_eq!(err.property_path(), Some("region"));
    assert!(err.to_string().contains("EU"));
}

#[test]
fn file_sits_between_defaults_and_env() {
    let temp = TempDir::new().expect("tmp");
    let file = write_file(
        &temp,
        "app.json",
        r#"{ "database": { "host": "file-host", "port": 6543 } }"#,
    );
    let store = ConfigStore::new(
        StoreOptions::new(database_schema())
            .with_file(&file)
            .with_env([("DB_HOST", "env-host")].into_iter().collect()),
    )
    .expect("store");

    assert_eq!(store.get("database.host").expect("host"), json!("env-host"));
    assert_eq!(store.get("database.port").expect("port"), json!(6543));
    assert_eq!(store.origin("database.port"), Some(Origin::File(file)));
}

#[tokio::test]
async fn env_wins_over_runtime_layers() {
    let store = store_with(database_schema(), &[("DB_HOST", "env-host")]);
    store
        .async_load(&[layer(
            "overrides",
            json!({ "database": { "host": "remote", "port": "7000" } }),
        )])
        .await
        .expect("async load");

    assert_eq!(store.get("database.host").expect("host"), json!("env-host"));
    assert_eq!(store.get("database.port").expect("port"), json!(7000));
    assert_eq!(
        store.origin("database.port"),
        Some(Origin::Runtime("overrides".to_string()))
    );
}

#[tokio::test]
async fn later_loaders_in_one_call_win() {
    let store = store_with(database_schema(), &[]);
    store
        .async_load(&[
            layer("first", json!({ "database": { "port": 1 }, "debug": true })),
            layer("second", json!({ "database.port": 2 })),
        ])
        .await
        .expect("async load");
    assert_eq!(store.get("database.port").expect("port"), json!(2));
    assert_eq!(store.get("debug").expect("debug"), json!(true));
}

#[tokio::test]
async fn nested_and_dotted_layers_are_equivalent() {
    let nested = store_with(database_schema(), &[]);
    nested
        .async_load(&[layer("nested", json!({ "database": { "host": "h" } }))])
        .await
        .expect("nested");
    let dotted = store_with(database_schema(), &[]);
    dotted
        .async_load(&[layer("dotted", json!({ "database.host": "h" }))])
        .await
        .expect("dotted");
    assert_eq!(nested.get_all(), dotted.get_all());
}

#[test]
fn group_reads_synthesize_nested_objects() {
    let store = store_with(database_schema(), &[]);
    assert_eq!(
        store.get("database").expect("group"),
        json!({ "host": "localhost", "port": 5432 })
    );
    assert_eq!(
        store.get_all(),
        json!({
            "database": { "host": "localhost", "port": 5432 },
            "debug": false
        })
    );
}

#[test]
fn cached_views_are_dropped_after_a_load() {
    let temp = TempDir::new().expect("tmp");
    let store = store_with(database_schema(), &[]);
    assert_eq!(store.get("database.port").expect("port"), json!(5432));
    let _ = store.get("database").expect("warm cache");
    let _ = store.get_all();

    let file = write_file(&temp, "next.json", r#"{ "database": { "port": 1234 } }"#);
    store.load(&file).expect("load");
    assert_eq!(store.get("database").expect("group")["port"], json!(1234));
    assert_eq!(store.get_all()["database"]["port"], json!(1234));
}

#[test]
fn failed_load_leaves_state_untouched() {
    let temp = TempDir::new().expect("tmp");
    let store = store_with(database_schema(), &[]);
    let before = store.get_all();

    let file = write_file(
        &temp,
        "bad.json",
        r#"{ "database": { "host": "other", "port": "not-a-port" } }"#,
    );
    let err = store.load(&file).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conversion);
    assert_eq!(err.property_path(), Some("database.port"));
    assert_eq!(store.get_all(), before);

    let err = store.load(temp.path().join("absent.json")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::File);
    assert_eq!(store.get_all(), before);
}

#[tokio::test]
async fn failing_loader_aborts_the_whole_call() {
    let store = store_with(database_schema(), &[]);
    let before = store.get_all();
    let err = store
        .async_load(&[
            layer("ok", json!({ "database": { "host": "changed" } })),
            Arc::new(Broken),
        ])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Loader);
    assert_eq!(store.get_all(), before);
}

#[tokio::test]
async fn invalid_runtime_value_is_rejected_without_partial_commit() {
    let store = store_with(database_schema(), &[]);
    let err = store
        .async_load(&[layer(
            "remote",
            json!({ "database": { "host": "changed", "port": "x" } }),
        )])
        .await
        .unwrap_err();
    assert_eq!(err.property_path(), Some("database.port"));
    assert_eq!(store.get("database.host").expect("host"), json!("localhost"));
}

#[test]
fn unknown_keys_are_kept_unless_strict() {
    let temp = TempDir::new().expect("tmp");
    let file = write_file(&temp, "extra.json", r#"{ "feature": { "beta": true } }"#);

    let lenient = store_with(database_schema(), &[]);
    lenient.load(&file).expect("lenient load");
    assert_eq!(lenient.get("feature.beta").expect("extra"), json!(true));

    let strict = ConfigStore::new(
        StoreOptions::new(database_schema())
            .with_env(EnvSource::empty())
            .with_strict_keys(true),
    )
    .expect("strict store");
    let err = strict.load(&file).unwrap_err();
    assert!(
        err.to_string()
            .contains("Unknown property 'feature.beta' is not declared in the schema")
    );
    assert!(!strict.contains("feature.beta"));
}

#[test]
fn get_many_reports_every_failing_key() {
    let store = store_with(database_schema(), &[]);
    let values = store
        .get_many(&["database.host", "debug"])
        .expect("get many");
    assert_eq!(
        Value::Object(values),
        json!({ "database.host": "localhost", "debug": false })
    );

    let err = store
        .get_many(&["database.host", "nope", "also.nope", "nope"])
        .unwrap_err();
    assert_eq!(err.errors().len(), 2);
    assert_eq!(err.keys().len(), 4);
    let msg = err.to_string();
    assert!(msg.contains("Failed to resolve 2 of 3 requested keys"), "{msg}");
    assert!(msg.contains("also.nope"), "{msg}");
}

#[test]
fn try_get_uses_the_fallback_only_when_needed() {
    let store = store_with(database_schema(), &[]);
    assert_eq!(
        store.try_get("database.port", "debug").expect("primary"),
        json!(5432)
    );
    assert_eq!(
        store.try_get("cache.port", "database.port").expect("fallback"),
        json!(5432)
    );

    let err = store.try_get("cache.port", "cache.size").unwrap_err();
    assert_eq!(err.errors().len(), 2);
    assert!(
        err.to_string()
            .contains("Neither 'cache.port' nor fallback 'cache.size' could be resolved")
    );
}

#[test]
fn not_defined_errors_suggest_close_keys() {
    let store = store_with(database_schema(), &[]);
    let err = store.get("Database.HOST.x").unwrap_err();
    assert!(err.is_not_defined());

    let err = store.get("host").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Property 'host' is not defined."), "{msg}");
    assert!(msg.contains("Did you mean: database.host?"), "{msg}");
    assert!(
        msg.contains("Known properties: database.host, database.port, debug"),
        "{msg}"
    );

    let empty = store_with(json!({}), &[]);
    let msg = empty.get("anything").unwrap_err().to_string();
    assert!(msg.contains("No properties are defined."), "{msg}");
}

#[test]
fn json_defaults_survive_revalidation() {
    let temp = TempDir::new().expect("tmp");
    let schema = json!({
        "features": { "format": "json", "default": { "flags": ["a", "b"], "limit": 3 } },
        "routes": { "format": "json", "default": "{\"home\":\"/\"}" },
        "name": { "format": "string", "default": "svc" }
    });
    let store = store_with(schema, &[]);
    let features = json!({ "flags": ["a", "b"], "limit": 3 });
    assert_eq!(store.get("features").expect("features"), features);
    assert_eq!(store.get("routes").expect("routes"), json!({ "home": "/" }));

    let file = write_file(&temp, "name.json", r#"{ "name": "renamed" }"#);
    store.load(&file).expect("load");
    assert_eq!(store.get("features").expect("features"), features);
    assert_eq!(store.get("routes").expect("routes"), json!({ "home": "/" }));
}

#[test]
fn json_value_from_a_source_must_be_text() {
    let schema = json!({ "features": { "format": "json", "env": "FEATURES", "default": {} } });
    let store = store_with(schema.clone(), &[("FEATURES", r#"{"beta":true}"#)]);
    assert_eq!(store.get("features").expect("env json"), json!({ "beta": true }));

    let err = ConfigStore::new(
        StoreOptions::new(schema).with_env([("FEATURES", "{oops")].into_iter().collect()),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conversion);
    assert!(err.to_string().contains("Invalid JSON"));
}

#[test]
fn paths_walk_into_stored_structured_values() {
    let schema = json!({
        "servers": { "format": "json", "default": { "list": [{ "name": "a" }, { "name": "b" }] } }
    });
    let store = store_with(schema, &[]);
    assert_eq!(store.get("servers.list.1.name").expect("walk"), json!("b"));
    assert!(store.get("servers.list.7").unwrap_err().is_not_defined());
    assert!(store.get("servers.list.1.name.deeper").unwrap_err().is_not_defined());
}

#[test]
fn null_default_is_present() {
    let store = store_with(
        json!({ "proxy": { "format": "string", "default": null } }),
        &[],
    );
    assert_eq!(store.get("proxy").expect("proxy"), Value::Null);
    assert!(store.contains("proxy"));
    assert_eq!(store.keys(), vec!["proxy".to_string()]);
}

#[test]
fn revalidation_is_idempotent() {
    let temp = TempDir::new().expect("tmp");
    let schema = json!({
        "version": { "format": "string", "default": 1.5 },
        "ratio": { "format": "number", "default": "0.25" },
        "on": { "format": "boolean", "default": "true" }
    });
    let store = store_with(schema, &[]);
    let first = store.get_all();
    assert_eq!(first, json!({ "version": "1.5", "ratio": 0.25, "on": true }));

    let file = write_file(&temp, "empty.json", "{}");
    store.load(&file).expect("first reload");
    store.load(&file).expect("second reload");
    assert_eq!(store.get_all(), first);
}

#[test]
fn typed_reads_deserialize_groups() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Database {
        host: String,
        port: u16,
    }

    let store = store_with(database_schema(), &[("DB_HOST", "db.internal")]);
    let database: Database = store.get_as("database").expect("typed");
    assert_eq!(
        database,
        Database {
            host: "db.internal".to_string(),
            port: 5432
        }
    );

    let err = store.get_as::<u16>("database.host").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conversion);
}

#[test]
fn env_rendering_quotes_and_flattens() {
    let rendered = render_env(
        &json!({
            "database": { "host": "it is \"quoted\"", "port": 5432 },
            "debug": false,
            "proxy": null,
            "tags": ["a", "b"]
        }),
        None,
    );
    assert_eq!(
        rendered,
        "DATABASE_HOST=\"it is \\\"quoted\\\"\"\n\
         DATABASE_PORT=5432\n\
         DEBUG=false\n\
         PROXY=\n\
         TAGS=[\"a\",\"b\"]\n"
    );
    assert_eq!(
        render_env(&json!("x y"), Some("log.level")),
        "LOG_LEVEL=\"x y\"\n"
    );
}

#[tokio::test]
async fn async_write_persists_json_and_env() {
    let temp = TempDir::new().expect("tmp");
    let store = store_with(database_schema(), &[("DB_HOST", "it is \"quoted\"")]);

    let path = store
        .async_write(WriteOptions::new(temp.path(), "all.json"))
        .await
        .expect("write json");
    assert!(path.is_absolute());
    let written: Value =
        serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
    assert_eq!(written, store.get_all());
    assert!(fs::read_to_string(&path).expect("read").ends_with('\n'));

    let path = store
        .async_write(
            WriteOptions::new(temp.path().join("nested"), "db.env")
                .with_format(OutputFormat::Env)
                .with_select("database"),
        )
        .await
        .expect("write env");
    let contents = fs::read_to_string(&path).expect("read env");
    assert!(contents.contains("HOST=\"it is \\\"quoted\\\"\"\n"), "{contents}");
    assert!(contents.contains("PORT=5432\n"), "{contents}");

    let leftovers: Vec<_> = fs::read_dir(temp.path())
        .expect("list")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn env_rendering_escapes_backslashes_and_newlines() {
    let rendered = render_env(
        &json!({ "path": "C:\\tmp dir", "banner": "line one\nline \"two\"" }),
        None,
    );
    assert_eq!(
        rendered,
        "BANNER=\"line one\\nline \\\"two\\\"\"\n\
         PATH=\"C:\\\\tmp dir\"\n"
    );
    assert_eq!(
        render_env(&json!("a\\b"), Some("share")),
        "SHARE=\"a\\\\b\"\n"
    );
}

#[tokio::test]
async fn runtime_values_nested_deeply_convert_to_strings() {
    let store = store_with(json!({ "blob": { "format": "string", "default": "" } }), &[]);
    let mut nested = json!("leaf");
    for _ in 0..130 {
        nested = json!([nested]);
    }
    store
        .async_load(&[layer("deep", json!({ "blob": nested }))])
        .await
        .expect("deep value");
    let text = store.get("blob").expect("blob");
    let expected = format!("{}\"leaf\"{}", "[".repeat(130), "]".repeat(130));
    assert_eq!(text, Value::String(expected));
}

#[test]
fn destinations_are_normalized_lexically() {
    assert_eq!(
        persist::normalize(Path::new("/srv/app/./sub/../config.json")),
        PathBuf::from("/srv/app/config.json")
    );
    assert_eq!(
        persist::normalize(Path::new("/srv/../../etc")),
        PathBuf::from("/etc")
    );
}

#[tokio::test]
async fn writes_through_different_spellings_share_a_queue() {
    let temp = TempDir::new().expect("tmp");
    let store = store_with(database_schema(), &[]);
    let first = store
        .async_write(WriteOptions::new(temp.path(), "f.json"))
        .await
        .expect("first write");

    let queue = store.write_queue(&first);
    let guard = queue.lock().await;
    let pending = store.async_write(WriteOptions::new(temp.path().join("sub").join(".."), "f.json"));
    tokio::pin!(pending);
    assert!(
        tokio::time::timeout(Duration::from_millis(100), &mut pending)
            .await
            .is_err(),
        "write through another spelling must wait for the held queue"
    );

    drop(guard);
    store.release_write_queue(&first, queue);
    let second = pending.await.expect("second write");
    assert_eq!(second, first);
    assert!(store.write_queues.lock().is_empty());
}

#[tokio::test]
async fn async_write_selection_falls_back() {
    let temp = TempDir::new().expect("tmp");
    let store = store_with(database_schema(), &[]);

    let path = store
        .async_write(
            WriteOptions::new(temp.path(), "port.env")
                .with_format(OutputFormat::Env)
                .with_select("cache.port")
                .with_fallback("database.port"),
        )
        .await
        .expect("fallback write");
    assert_eq!(
        fs::read_to_string(&path).expect("read"),
        "DATABASE_PORT=5432\n"
    );

    let err = store
        .async_write(WriteOptions::new(temp.path(), "none.json").with_select("cache"))
        .await
        .unwrap_err();
    assert!(err.is_not_defined());
    assert!(!temp.path().join("none.json").exists());
    assert!(store.write_queues.lock().is_empty());
}
