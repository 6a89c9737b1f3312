use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use server::{build_app, spawn_rebuild_scheduler, AppState, ServerConfig};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tower::ServiceExt;

fn write_corpus(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("0.txt"), "cat sat on the mat").unwrap();
    fs::write(dir.join("1.txt"), "dog sat on the rug").unwrap();
    fs::write(dir.join("2.txt"), "cat and dog played together").unwrap();
}

fn config(root: &Path, admin_token: Option<&str>) -> ServerConfig {
    ServerConfig {
        index_dir: root.join("index"),
        corpus_dir: root.join("documents"),
        admin_token: admin_token.map(str::to_string),
    }
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
}

fn post_search(query: &str) -> Request<Body> {
    Request::post("/search")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "query": query }).to_string()))
        .unwrap()
}

fn doc_ids(json: &Value) -> Vec<u64> {
    json["results"].as_array().unwrap().iter().map(|h| h["doc_id"].as_u64().unwrap()).collect()
}

#[tokio::test]
async fn search_returns_ranked_results() {
    let dir = tempdir().unwrap();
    write_corpus(&dir.path().join("documents"));
    let state = AppState::bootstrap(config(dir.path(), None)).unwrap();
    assert!(dir.path().join("index/index.json").is_file());

    let (status, json) = call(build_app(state.clone()), post_search("cat")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 2);
    assert_eq!(doc_ids(&json), vec![0, 2]);
    assert_eq!(json["results"][0]["title"], "0");
    assert!(json["results"][0]["snippet"].as_str().unwrap().contains("<em>cat</em>"));

    let req = Request::get("/search?q=cat&k=1").body(Body::empty()).unwrap();
    let (status, json) = call(build_app(state), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 2);
    assert_eq!(doc_ids(&json), vec![0]);
}

#[tokio::test]
async fn unmatched_query_is_empty_not_an_error() {
    let dir = tempdir().unwrap();
    write_corpus(&dir.path().join("documents"));
    let state = AppState::bootstrap(config(dir.path(), None)).unwrap();

    let (status, json) = call(build_app(state), post_search("zeppelin")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 0);
    assert!(json["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn blank_query_is_rejected() {
    let dir = tempdir().unwrap();
    write_corpus(&dir.path().join("documents"));
    let state = AppState::bootstrap(config(dir.path(), None)).unwrap();
    let (status, _) = call(build_app(state), post_search("   ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn serves_persisted_index_without_corpus() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("documents");
    write_corpus(&corpus);
    AppState::bootstrap(config(dir.path(), None)).unwrap();

    fs::remove_dir_all(&corpus).unwrap();
    let state = AppState::bootstrap(config(dir.path(), None)).unwrap();
    let (status, json) = call(build_app(state), post_search("dog")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc_ids(&json), vec![1, 2]);
}

#[tokio::test]
async fn corrupt_snapshot_triggers_rebuild() {
    let dir = tempdir().unwrap();
    write_corpus(&dir.path().join("documents"));
    AppState::bootstrap(config(dir.path(), None)).unwrap();
    fs::write(dir.path().join("index/index.json"), "{ truncated").unwrap();

    let state = AppState::bootstrap(config(dir.path(), None)).unwrap();
    let (status, json) = call(build_app(state), post_search("cat")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc_ids(&json), vec![0, 2]);
    let reparsed: Value = serde_json::from_str(&fs::read_to_string(dir.path().join("index/index.json")).unwrap()).unwrap();
    assert_eq!(reparsed["corpus_size"], 3);
}

#[tokio::test]
async fn empty_state_reports_unavailable() {
    let dir = tempdir().unwrap();
    let state = AppState::new(config(dir.path(), None));

    let (status, _) = call(build_app(state.clone()), post_search("cat")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let req = Request::get("/status").body(Body::empty()).unwrap();
    let (status, json) = call(build_app(state), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "empty");
}

#[tokio::test]
async fn admin_rebuild_installs_new_documents() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("documents");
    write_corpus(&corpus);
    let state = AppState::bootstrap(config(dir.path(), Some("secret"))).unwrap();

    let (status, json) = call(build_app(state.clone()), post_search("parrot")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_hits"], 0);

    fs::write(corpus.join("3.txt"), "a parrot talked").unwrap();

    let denied = Request::post("/index/rebuild").body(Body::empty()).unwrap();
    let (status, _) = call(build_app(state.clone()), denied).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::post("/index/rebuild").header("X-ADMIN-TOKEN", "secret").body(Body::empty()).unwrap();
    let (status, json) = call(build_app(state.clone()), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "installed");

    let (_, json) = call(build_app(state.clone()), post_search("parrot")).await;
    assert_eq!(doc_ids(&json), vec![3]);

    let req = Request::get("/doc/3").body(Body::empty()).unwrap();
    let (status, json) = call(build_app(state), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["external_id"], "3.txt");
}

const PERIOD: Duration = Duration::from_secs(60);

fn indexed_docs(state: &AppState) -> usize {
    state.catalog.snapshot().map(|c| c.index.corpus_size()).unwrap_or(0)
}

// Rebuilds run on the blocking pool, which holds the paused clock still
// while they work; a short sleep is enough to let one finish.
async fn wait_for_docs(state: &AppState, expected: usize) {
    for _ in 0..100 {
        if indexed_docs(state) == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("index never reached {expected} documents, has {}", indexed_docs(state));
}

#[tokio::test(start_paused = true)]
async fn scheduled_rebuild_picks_up_new_documents() {
    let dir = tempdir().unwrap();
    write_corpus(&dir.path().join("documents"));
    let state = AppState::bootstrap(config(dir.path(), None)).unwrap();
    let scheduler = spawn_rebuild_scheduler(state.clone(), PERIOD);
    fs::write(dir.path().join("documents/3.txt"), "a parrot talked").unwrap();

    // no rebuild at start
    tokio::time::sleep(PERIOD / 2).await;
    let (_, json) = call(build_app(state.clone()), post_search("parrot")).await;
    assert!(doc_ids(&json).is_empty());

    tokio::time::sleep(PERIOD).await;
    wait_for_docs(&state, 4).await;
    let (status, json) = call(build_app(state.clone()), post_search("parrot")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc_ids(&json), vec![3]);
    assert!(dir.path().join("index/meta.json").is_file());
    scheduler.abort();
}

#[tokio::test(start_paused = true)]
async fn failed_scheduled_rebuild_keeps_serving_previous_index() {
    let dir = tempdir().unwrap();
    let corpus = dir.path().join("documents");
    write_corpus(&corpus);
    let state = AppState::bootstrap(config(dir.path(), None)).unwrap();
    let before = state.catalog.snapshot().unwrap();
    let scheduler = spawn_rebuild_scheduler(state.clone(), PERIOD);

    fs::remove_dir_all(&corpus).unwrap();
    tokio::time::sleep(PERIOD * 2 + PERIOD / 2).await;
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(Arc::ptr_eq(&before, &state.catalog.snapshot().unwrap()));
    let (status, json) = call(build_app(state.clone()), post_search("cat")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc_ids(&json), vec![0, 2]);
    let (_, status_json) = call(
        build_app(state.clone()),
        Request::get("/status").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status_json["state"], "ready");

    // the scheduler survives the failures and recovers once the corpus is back
    write_corpus(&corpus);
    fs::write(corpus.join("3.txt"), "a parrot talked").unwrap();
    tokio::time::sleep(PERIOD).await;
    wait_for_docs(&state, 4).await;
    scheduler.abort();
}
