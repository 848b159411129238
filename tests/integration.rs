use clihub::config::{load_config, Config};
use clihub::hub::Hub;
use clihub::index_cmd::sync_index;
use clihub::server;
use clihub_core::store::ProfileStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

const REGISTRY: &str = r#"{
  "entries": [
    {"slug": "vercel", "name": "vercel", "description": "Frontend cloud platform",
     "categories": ["hosting"], "trust_score": 70, "publisher_verified": true,
     "commands": [{"command": "vercel deploy --prod", "description": "Deploy to production"}]},
    {"slug": "supabase", "name": "supabase", "description": "Postgres development platform",
     "categories": ["database"], "trust_score": 70, "publisher_verified": true},
    {"slug": "stripe", "name": "stripe", "description": "Online payments",
     "categories": ["payments"], "trust_score": 70, "publisher_verified": true},
    {"slug": "clerk", "name": "clerk", "description": "User management and authentication",
     "categories": ["auth"], "trust_score": 70, "publisher_verified": true},
    {"slug": "jq", "name": "jq", "description": "Command-line JSON processor",
     "categories": ["json"], "trust_score": 70, "publisher_verified": true}
  ],
  "workflows": [
    {"slug": "saas-launch", "title": "Launch a SaaS",
     "description": "Ship a product with billing and login", "tags": ["saas"],
     "steps": [
       {"step_number": 1, "cli_slug": "vercel"},
       {"step_number": 2, "cli_slug": "supabase"},
       {"step_number": 3, "cli_slug": "stripe"},
       {"step_number": 4, "cli_slug": "clerk", "auth_prerequisite": true}
     ]}
  ]
}"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("registry.json"), REGISTRY).unwrap();

    let config_content = format!(
        r#"[registry]
path = "{root}/registry.json"

[db]
path = "{root}/data/clihub.sqlite"

[embedding]
provider = "local"
dims = 128
cache_capacity = 256

[retrieval]
final_limit = 5
"#,
        root = root.display()
    );

    let config_path = config_dir.join("clihub.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn config(path: &Path) -> Config {
    load_config(path).unwrap()
}

fn slugs(resp: &clihub_core::models::SearchResponse) -> Vec<&str> {
    resp.results.iter().map(|c| c.slug.as_str()).collect()
}

#[tokio::test]
async fn test_hub_search_ranks_direct_mention_first() {
    let (_tmp, config_path) = setup_test_env();
    let hub = Hub::open(&config(&config_path)).await.unwrap();

    let resp = hub.search("vercel", 5, false).await.unwrap();
    assert_eq!(slugs(&resp)[0], "vercel");
    assert!(resp.unmet.is_none());
    assert_eq!(resp.results[0].top_commands, vec!["vercel deploy --prod"]);

    hub.close().await;
}

#[tokio::test]
async fn test_hub_full_stack_query_covers_every_layer() {
    let (_tmp, config_path) = setup_test_env();
    let hub = Hub::open(&config(&config_path)).await.unwrap();

    let resp = hub.search("full stack saas", 4, true).await.unwrap();
    let got = slugs(&resp);
    for slug in ["vercel", "supabase", "stripe", "clerk"] {
        assert!(got.contains(&slug), "{} missing from {:?}", slug, got);
    }

    hub.close().await;
}

#[tokio::test]
async fn test_empty_results_are_logged_as_misses() {
    let (_tmp, config_path) = setup_test_env();
    let hub = Hub::open(&config(&config_path)).await.unwrap();

    let resp = hub.search("zzzxqv19283", 5, false).await.unwrap();
    assert!(resp.results.is_empty());
    hub.discover("zzzxqv19283", 5, false).await.unwrap();
    // blank queries are not misses
    hub.search("   ", 5, false).await.unwrap();

    assert_eq!(hub.misses.count().await.unwrap(), 2);
    let top = hub.misses.top(10).await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].query, "zzzxqv19283");
    assert_eq!(top[0].count, 2);

    hub.close().await;
}

#[tokio::test]
async fn test_index_then_discover() {
    let (_tmp, config_path) = setup_test_env();
    let hub = Hub::open(&config(&config_path)).await.unwrap();
    let index = hub.index.clone().expect("vector index enabled by default");
    let entries = hub.store.list_entries().await.unwrap();

    let report = sync_index(index.as_ref(), hub.engine.embeddings(), &entries, false, false)
        .await
        .unwrap();
    assert_eq!(report.total, 5);
    assert_eq!(report.embedded, 5);

    let again = sync_index(index.as_ref(), hub.engine.embeddings(), &entries, false, true)
        .await
        .unwrap();
    assert_eq!(again.pending, 0);

    let resp = hub.discover("stripe online payments", 3, false).await.unwrap();
    assert_eq!(slugs(&resp)[0], "stripe");

    hub.close().await;
}

#[tokio::test]
async fn test_workflow_search_through_hub() {
    let (_tmp, config_path) = setup_test_env();
    let hub = Hub::open(&config(&config_path)).await.unwrap();

    let found = hub
        .engine
        .search_workflows("saas with billing and login", 3)
        .await
        .unwrap();
    assert_eq!(found[0].workflow.slug, "saas-launch");
    assert!(found[0].workflow.steps[3].auth_prerequisite);

    hub.close().await;
}

// ============ HTTP API ============

async fn spawn_server(config_path: &Path) -> String {
    let hub = Arc::new(Hub::open(&config(config_path)).await.unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server::router(hub)).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_server_health() {
    let (_tmp, config_path) = setup_test_env();
    let base = spawn_server(&config_path).await;

    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["entries"], 5);
    assert_eq!(body["workflows"], 1);
}

#[tokio::test]
async fn test_server_search_and_errors() {
    let (_tmp, config_path) = setup_test_env();
    let base = spawn_server(&config_path).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/search", base))
        .json(&serde_json::json!({ "query": "vercel", "limit": 3, "explain": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["results"][0]["slug"], "vercel");
    assert!(body["results"][0]["signals"].is_object());

    let resp = client
        .post(format!("{}/search", base))
        .json(&serde_json::json!({ "query": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = client
        .post(format!("{}/discover", base))
        .json(&serde_json::json!({ "query": "vercel", "limit": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_server_entries_and_workflows() {
    let (_tmp, config_path) = setup_test_env();
    let base = spawn_server(&config_path).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/entries/jq", base)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["slug"], "jq");

    let resp = client.get(format!("{}/entries/nope", base)).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    let resp = client
        .post(format!("{}/workflows/search", base))
        .json(&serde_json::json!({ "query": "saas with billing and login" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["results"][0]["workflow"]["slug"], "saas-launch");
}

// ============ Binary ============

fn run_clihub(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_clihub"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .expect("failed to run clihub binary");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_cli_init_search_show_misses() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, ok) = run_clihub(&config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));

    let (stdout, stderr, ok) = run_clihub(&config_path, &["search", "vercel", "--json"]);
    assert!(ok, "search failed: {}", stderr);
    let body: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(body["results"][0]["slug"], "vercel");

    let (stdout, _, ok) = run_clihub(&config_path, &["show", "stripe"]);
    assert!(ok);
    assert!(stdout.contains("Online payments"));

    let (_, _, ok) = run_clihub(&config_path, &["show", "nope"]);
    assert!(!ok);

    let (stdout, _, ok) = run_clihub(&config_path, &["search", "zzzxqv19283"]);
    assert!(ok);
    assert!(stdout.contains("No results."));

    let (stdout, _, ok) = run_clihub(&config_path, &["misses"]);
    assert!(ok);
    assert!(stdout.contains("zzzxqv19283"));
}

#[test]
fn test_cli_index_pending() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, ok) = run_clihub(&config_path, &["index", "pending", "--dry-run"]);
    assert!(ok, "index failed: {}", stderr);
    assert!(stdout.contains("entries needing embeddings: 5"));

    let (stdout, _, ok) = run_clihub(&config_path, &["index", "pending"]);
    assert!(ok);
    assert!(stdout.contains("embedded: 5"));

    let (stdout, _, ok) = run_clihub(&config_path, &["index", "pending"]);
    assert!(ok);
    assert!(stdout.contains("all entries up to date"));
}

#[test]
fn test_cli_completions_need_no_config() {
    let output = Command::new(env!("CARGO_BIN_EXE_clihub"))
        .args(["--config", "/nonexistent/clihub.toml", "completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("clihub"));
}
