//! End-to-end tests of the HTTP API against a real store, artifact root and
//! dataset chunk inside a temp directory.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, web, App};
use serde_json::{json, Value};
use tempfile::TempDir;

use seismic_workbench::artifacts::ArtifactStore;
use seismic_workbench::core::error::ModelError;
use seismic_workbench::core::model::{EvalReport, Operation, OptParams, SeismicModel, Situation};
use seismic_workbench::core::registry::ModelRegistry;
use seismic_workbench::data::DatasetLoader;
use seismic_workbench::models::{register_builtins, DEFAULT_MODELS};
use seismic_workbench::runner::CodeRunner;
use seismic_workbench::store::ModelStore;
use seismic_workbench::web::server::{routes, AppState};

const CSV_HEADER: &str = "p_arrival_sample,s_arrival_sample,source_depth_km,\
     source_distance_km,snr_db,source_magnitude,source_latitude,source_longitude";

struct TestEnv {
    state: web::Data<AppState>,
    _dir: TempDir,
}

fn write_chunk(root: &Path, chunk: &str, rows: usize) {
    let dir = root.join(chunk);
    fs::create_dir_all(&dir).unwrap();
    let mut content = String::from(CSV_HEADER);
    content.push('\n');
    for i in 0..rows {
        let dist = 10.0 + i as f64;
        let depth = 5.0 + (i % 7) as f64;
        let snr = 30.0 - (i % 11) as f64;
        let mag = 0.02 * dist + 0.01 * depth - 0.005 * snr + 1.0;
        writeln!(
            content,
            "{},{},{},{},{},{},{},{}",
            100 + i,
            200 + i,
            depth,
            dist,
            snr,
            mag,
            30.0 + (i % 10) as f64,
            -120.0 + (i % 5) as f64
        )
        .unwrap();
    }
    fs::write(dir.join(format!("{}.csv", chunk)), content).unwrap();
}

fn env_with_chunk() -> TestEnv {
    let dir = TempDir::new().unwrap();
    write_chunk(&dir.path().join("data"), "chunk2", 40);

    let store = ModelStore::open_in_memory().unwrap();
    let registry = Arc::new(ModelRegistry::new());
    let artifacts = ArtifactStore::new(dir.path().join("results"));
    let loader = DatasetLoader::new(dir.path().join("data"));
    register_builtins(&store, &registry, &artifacts, &loader).unwrap();
    store.upsert_user("admin", "secret").unwrap();

    // `echo` stands in for the interpreter so code runs finish instantly
    let runner = CodeRunner::new("echo", dir.path().join("run"), Duration::from_secs(10));

    let state = web::Data::new(AppState {
        store,
        registry,
        artifacts,
        loader,
        runner,
    });
    TestEnv { state, _dir: dir }
}

fn train_body(epochs: usize) -> Value {
    json!({
        "sm_scale": "ml",
        "chunk_name": "chunk2",
        "data_size": 40,
        "train_ratio": 0.8,
        "epochs": epochs,
        "learning_rate": 0.05,
    })
}

fn result_query() -> &'static str {
    "train_ratio=0.8&data_size=40&sm_scale=ml&chunk_name=chunk2"
}

macro_rules! app {
    ($env:expr) => {
        test::init_service(
            App::new()
                .app_data($env.state.clone())
                .configure(routes),
        )
        .await
    };
}

#[actix_web::test]
async fn create_duplicate_model_conflicts() {
    let env = env_with_chunk();
    let app = app!(env);

    let req = test::TestRequest::post()
        .uri("/api/models")
        .set_json(json!({ "name": "MyNet" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    // Default imports are merged into the new model's library
    assert!(body["library"].as_str().unwrap().contains("import numpy as np"));

    let req = test::TestRequest::post()
        .uri("/api/models")
        .set_json(json!({ "name": "MyNet" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    // Built-in names are seeded, so they conflict too
    let req = test::TestRequest::post()
        .uri("/api/models")
        .set_json(json!({ "name": "MagNet" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);
}

#[actix_web::test]
async fn list_and_detail() {
    let env = env_with_chunk();
    let app = app!(env);

    let req = test::TestRequest::get().uri("/api/models").to_request();
    let models: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(models.as_array().unwrap().len(), DEFAULT_MODELS.len());

    let req = test::TestRequest::get()
        .uri("/api/models/by-name/MagNet")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/api/models/by-name/Nope")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn train_while_testing_conflicts_and_keeps_state() {
    let env = env_with_chunk();
    let app = app!(env);

    // Another request holds the slot for testing
    assert!(env
        .state
        .store
        .claim_situation("MagNet", Operation::Test)
        .unwrap());

    let req = test::TestRequest::post()
        .uri("/api/models/MagNet/train")
        .set_json(train_body(10))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    // The losing request must not have touched the slot
    assert_eq!(
        env.state.store.get_situation("MagNet").unwrap(),
        Some(Situation::Testing)
    );
}

#[actix_web::test]
async fn train_and_test_release_the_slot() {
    let env = env_with_chunk();
    let app = app!(env);

    let req = test::TestRequest::post()
        .uri("/api/models/MagNet/train")
        .set_json(train_body(200))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let report: Value = test::read_body_json(resp).await;
    assert!(report["r2"].as_f64().unwrap() > 0.5);
    assert_eq!(
        env.state.store.get_situation("MagNet").unwrap(),
        Some(Situation::Free)
    );

    let req = test::TestRequest::post()
        .uri("/api/models/MagNet/test")
        .set_json(train_body(200))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        env.state.store.get_situation("MagNet").unwrap(),
        Some(Situation::Free)
    );

    // The progress log filled up during both runs
    let req = test::TestRequest::get()
        .uri("/api/models/MagNet/process")
        .to_request();
    let log: String = test::call_and_read_body_json(&app, req).await;
    assert!(log.contains("training done"));
    assert!(log.contains("testing done"));

    let req = test::TestRequest::put()
        .uri("/api/models/MagNet/process")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let req = test::TestRequest::get()
        .uri("/api/models/MagNet/process")
        .to_request();
    let log: String = test::call_and_read_body_json(&app, req).await;
    assert!(log.is_empty());
}

#[actix_web::test]
async fn bad_train_ratio_is_rejected() {
    let env = env_with_chunk();
    let app = app!(env);

    let mut body = train_body(10);
    body["train_ratio"] = json!(1.5);
    let req = test::TestRequest::post()
        .uri("/api/models/MagNet/train")
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    // Rejected before the slot was ever claimed
    assert_eq!(
        env.state.store.get_situation("MagNet").unwrap(),
        Some(Situation::Free)
    );

    // Result queries carry the same parameters and get the same check
    let req = test::TestRequest::get()
        .uri("/api/models/MagNet/train/record?train_ratio=1.5&data_size=40&sm_scale=ml&chunk_name=chunk2")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::get()
        .uri("/api/models/MagNet/train/compare?train_ratio=0&data_size=40&sm_scale=ml&chunk_name=chunk2")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[derive(Debug)]
struct SlowModel;

#[async_trait::async_trait]
impl SeismicModel for SlowModel {
    fn name(&self) -> &str {
        "SlowNet"
    }

    async fn training(&self, _params: &OptParams) -> Result<EvalReport, ModelError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(EvalReport {
            r2: 1.0,
            rmse: 0.0,
            e_mean: 0.0,
            e_std: 0.0,
        })
    }

    async fn testing(&self, params: &OptParams) -> Result<EvalReport, ModelError> {
        self.training(params).await
    }
}

#[actix_web::test]
async fn abandoned_request_still_releases_the_slot() {
    let env = env_with_chunk();
    let id = env
        .state
        .store
        .create_model("SlowNet", "", "", "", "", "")
        .unwrap();
    env.state.registry.register(id, Arc::new(SlowModel));
    let app = app!(env);

    let req = test::TestRequest::post()
        .uri("/api/models/SlowNet/train")
        .set_json(train_body(10))
        .to_request();
    // The client goes away while the job is still running
    let aborted =
        tokio::time::timeout(Duration::from_millis(50), test::call_service(&app, req)).await;
    assert!(aborted.is_err());
    assert_eq!(
        env.state.store.get_situation("SlowNet").unwrap(),
        Some(Situation::Training)
    );

    // The detached job finishes and gives the slot back
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        env.state.store.get_situation("SlowNet").unwrap(),
        Some(Situation::Free)
    );
}

#[actix_web::test]
async fn failed_test_releases_the_slot() {
    let env = env_with_chunk();
    let app = app!(env);

    // No trained weights yet, so testing fails with 404
    let req = test::TestRequest::post()
        .uri("/api/models/CREIME/test")
        .set_json(train_body(10))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(
        env.state.store.get_situation("CREIME").unwrap(),
        Some(Situation::Free)
    );
}

#[actix_web::test]
async fn user_model_without_backing_gets_bad_request() {
    let env = env_with_chunk();
    let app = app!(env);

    let req = test::TestRequest::post()
        .uri("/api/models")
        .set_json(json!({ "name": "MyNet" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let req = test::TestRequest::post()
        .uri("/api/models/MyNet/train")
        .set_json(train_body(10))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(
        env.state.store.get_situation("MyNet").unwrap(),
        Some(Situation::Free)
    );
}

#[actix_web::test]
async fn record_lifecycle() {
    let env = env_with_chunk();
    let app = app!(env);

    let uri = format!("/api/models/MagNet/train/record?{}", result_query());
    let req = test::TestRequest::get().uri(&uri).to_request();
    let exists: bool = test::call_and_read_body_json(&app, req).await;
    assert!(!exists);

    let req = test::TestRequest::post()
        .uri("/api/models/MagNet/train")
        .set_json(train_body(50))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get().uri(&uri).to_request();
    let exists: bool = test::call_and_read_body_json(&app, req).await;
    assert!(exists);

    // Testing has not run yet, so its record is still absent
    let test_uri = format!("/api/models/MagNet/test/record?{}", result_query());
    let req = test::TestRequest::get().uri(&test_uri).to_request();
    let exists: bool = test::call_and_read_body_json(&app, req).await;
    assert!(!exists);

    // The scan endpoint sees the new train record
    let req = test::TestRequest::get()
        .uri("/api/models/MagNet/train")
        .to_request();
    let records: Value = test::call_and_read_body_json(&app, req).await;
    let magnet = records
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["model_name"] == "MagNet")
        .unwrap();
    assert_eq!(magnet["record"][0]["chunk_name"], "chunk2");
    assert_eq!(magnet["record"][0]["train_ratio"], "0.8");

    let req = test::TestRequest::delete().uri(&uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    let req = test::TestRequest::get().uri(&uri).to_request();
    let exists: bool = test::call_and_read_body_json(&app, req).await;
    assert!(!exists);

    // Deleting again is a 404
    let req = test::TestRequest::delete().uri(&uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn compare_and_loss_after_training() {
    let env = env_with_chunk();
    let app = app!(env);

    let req = test::TestRequest::post()
        .uri("/api/models/MagNet/train")
        .set_json(train_body(60))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let uri = format!("/api/models/MagNet/train/compare?{}", result_query());
    let req = test::TestRequest::get().uri(&uri).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(!body["points"].as_array().unwrap().is_empty());
    assert!(body["r2"].is_string());

    let uri = format!("/api/models/MagNet/train/loss?{}", result_query());
    let req = test::TestRequest::get().uri(&uri).to_request();
    let points: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(points.as_array().unwrap().len(), 60);

    // Unknown operation segment
    let uri = format!("/api/models/MagNet/validate/loss?{}", result_query());
    let req = test::TestRequest::get().uri(&uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // Missing artifacts
    let uri = format!("/api/models/CREIME/train/compare?{}", result_query());
    let req = test::TestRequest::get().uri(&uri).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn protected_model_delete_is_forbidden() {
    let env = env_with_chunk();
    let app = app!(env);

    let magnet = env.state.store.get_model_by_name("MagNet").unwrap().unwrap();
    let req = test::TestRequest::delete()
        .uri(&format!("/api/models/{}", magnet.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    assert!(env.state.store.name_exists("MagNet").unwrap());
}

#[actix_web::test]
async fn user_model_delete_cleans_up() {
    let env = env_with_chunk();
    let app = app!(env);

    let req = test::TestRequest::post()
        .uri("/api/models")
        .set_json(json!({ "name": "Scratch" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let created: Value = test::read_body_json(resp).await;
    let pk = created["id"].as_i64().unwrap();

    let req = test::TestRequest::delete()
        .uri(&format!("/api/models/{}", pk))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
    assert!(!env.state.store.name_exists("Scratch").unwrap());
    assert!(env.state.store.get_process("Scratch").unwrap().is_none());
    assert!(env.state.registry.get(pk).is_none());

    let req = test::TestRequest::delete()
        .uri(&format!("/api/models/{}", pk))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn edit_and_upload() {
    let env = env_with_chunk();
    let app = app!(env);

    let req = test::TestRequest::post()
        .uri("/api/models")
        .set_json(json!({ "name": "EditMe" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let created: Value = test::read_body_json(resp).await;
    let pk = created["id"].as_i64().unwrap();

    // Edit library: user lines are deduped against the defaults
    let req = test::TestRequest::put()
        .uri(&format!("/api/models/{}", pk))
        .set_json(json!({
            "style": "edit",
            "key": "library",
            "value": { "library": ["import numpy as np", "import scipy"] },
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
    let model = env.state.store.get_model_by_pk(pk).unwrap().unwrap();
    assert_eq!(
        model.library.matches("import numpy as np").count(),
        1
    );
    assert!(model.library.contains("import scipy"));

    // Rename: the status row follows
    let req = test::TestRequest::put()
        .uri(&format!("/api/models/{}", pk))
        .set_json(json!({
            "style": "edit",
            "key": "name",
            "value": { "name": "Renamed" },
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
    assert!(env.state.store.get_process("Renamed").unwrap().is_some());
    assert!(env.state.store.get_process("EditMe").unwrap().is_none());

    // Upload splits source into imports and body
    let source = "import json\n\ndef train():\n    return json.dumps({})\n";
    let req = test::TestRequest::put()
        .uri(&format!("/api/models/{}", pk))
        .set_json(json!({
            "style": "upload",
            "key": "code_train",
            "content": source,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let model = env.state.store.get_model_by_pk(pk).unwrap().unwrap();
    assert!(model.code_train.contains("def train():"));
    assert!(!model.code_train.contains("import json"));

    // Unknown style is invalid input
    let req = test::TestRequest::put()
        .uri(&format!("/api/models/{}", pk))
        .set_json(json!({ "style": "merge", "key": "library" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn feature_endpoints() {
    let env = env_with_chunk();
    for (name, label, unit, description) in seismic_workbench::data::FEATURE_CATALOG {
        env.state
            .store
            .insert_feature(name, label, unit, description)
            .unwrap();
    }
    let app = app!(env);

    let req = test::TestRequest::get().uri("/api/features").to_request();
    let features: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(features.as_array().unwrap().len(), 8);

    let req = test::TestRequest::get()
        .uri("/api/features/dist?feature=source_magnitude&bins=5&chunk_name=chunk2&data_size=40")
        .to_request();
    let points: Value = test::call_and_read_body_json(&app, req).await;
    let points = points.as_array().unwrap();
    assert_eq!(points.len(), 5);
    let total: f64 = points.iter().map(|p| p["y"].as_f64().unwrap()).sum();
    assert_eq!(total, 40.0);

    let req = test::TestRequest::get()
        .uri("/api/features/locate?chunk_name=chunk2&lo_min=-121&lo_max=-118&la_min=29&la_max=40")
        .to_request();
    let sources: Value = test::call_and_read_body_json(&app, req).await;
    assert!(!sources.as_array().unwrap().is_empty());
    assert!(sources[0]["Longitude"].is_number());

    // Unknown chunk
    let req = test::TestRequest::get()
        .uri("/api/features/dist?feature=snr_db&bins=5&chunk_name=ghost&data_size=40")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn run_code_endpoint() {
    let env = env_with_chunk();
    let app = app!(env);

    let req = test::TestRequest::post()
        .uri("/api/run")
        .set_json(json!({ "name": "MagNet", "depends": ["library", "code_train"] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::post()
        .uri("/api/run")
        .set_json(json!({ "name": "MagNet", "depends": ["code_secret"] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::post()
        .uri("/api/run")
        .set_json(json!({ "name": "Ghost", "depends": ["library"] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    let req = test::TestRequest::post()
        .uri("/api/run")
        .set_json(json!({ "name": "", "depends": [] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn login_check() {
    let env = env_with_chunk();
    let app = app!(env);

    let req = test::TestRequest::get()
        .uri("/api/login?username=admin&password=secret")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri("/api/login?username=admin&password=wrong")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/api/login?username=ghost&password=x")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}
