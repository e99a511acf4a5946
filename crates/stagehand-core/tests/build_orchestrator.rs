mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::{project, Reply, ScriptedCaller};
use serde_json::json;
use stagehand_core::{
    ArtifactStore, BuildCoordinator, BuildOrchestrator, BuildSpec, Document, OrchestratorError,
    SharedDirs,
};
use stagehand_engine::ChainEntry;
use stagehand_store::fakes::MemoryArtifactStore;

fn spec(name: &str) -> BuildSpec {
    BuildSpec {
        name: name.to_string(),
        src: format!("./cmd/{name}"),
        dest: "./build/bin".to_string(),
        engine: "go://example.com/engines/build-go".parse().unwrap(),
        spec: Document::new(),
    }
}

fn builder(path: &str) -> ChainEntry {
    ChainEntry::new(path.parse().unwrap())
}

fn dirs() -> SharedDirs {
    SharedDirs {
        root_dir: PathBuf::from("/repo"),
        build_dir: PathBuf::from("/repo/build"),
        tmp_dir: PathBuf::from("/tmp/stagehand"),
    }
}

fn artifact(name: &str) -> serde_json::Value {
    json!({"name": name, "type": "binary", "location": format!("build/bin/{name}")})
}

#[tokio::test]
async fn second_builder_failure_discards_all_artifacts() {
    let caller = ScriptedCaller::new();
    caller.reply(
        "build-go",
        "buildBatch",
        Reply::Structured(json!({"artifacts": [artifact("a"), artifact("b"), artifact("c")]})),
    );
    caller.reply("sign", "buildBatch", Reply::Fail("signing key missing"));
    let orchestrator = BuildOrchestrator::new(caller.clone());

    let builders = [builder("go://x/build-go"), builder("go://x/sign")];
    let specs = [spec("a"), spec("b"), spec("c")];
    let err = orchestrator
        .orchestrate(&builders, &specs, &dirs())
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Step { index: 1, .. }));
    assert!(matches!(err.root_cause(), OrchestratorError::Engine { .. }));
    assert_eq!(caller.trace(), vec!["build-go:buildBatch", "sign:buildBatch"]);

    let batch = caller.calls()[0].arguments.get("specs").cloned().unwrap();
    let batch = batch.as_array().unwrap();
    assert_eq!(batch.len(), 3);
    assert_eq!(batch[2]["name"], "c");
    assert_eq!(batch[0]["buildDir"], "/repo/build");
}

#[tokio::test]
async fn single_spec_uses_build_and_artifacts_accumulate_in_order() {
    let caller = ScriptedCaller::new();
    caller.reply("build-go", "build", Reply::Structured(artifact("api")));
    caller.reply(
        "package",
        "build",
        Reply::Structured(json!({"artifacts": [artifact("api.tar"), artifact("api.sha256")]})),
    );
    let orchestrator = BuildOrchestrator::new(caller.clone());

    let artifacts = orchestrator
        .orchestrate(
            &[builder("go://x/build-go"), builder("go://x/package")],
            &[spec("api")],
            &dirs(),
        )
        .await
        .unwrap();

    let names: Vec<_> = artifacts.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["api", "api.tar", "api.sha256"]);
    let args = &caller.calls()[0].arguments;
    assert_eq!(args.get_str("name"), Some("api"));
    assert_eq!(args.get_str("rootDir"), Some("/repo"));
    assert_eq!(args.get_str("tmpDir"), Some("/tmp/stagehand"));
}

#[tokio::test]
async fn unparseable_result_is_a_protocol_error() {
    let caller = ScriptedCaller::new();
    caller.reply("build-go", "build", Reply::Structured(json!({"status": 1})));
    let orchestrator = BuildOrchestrator::new(caller.clone());

    let err = orchestrator
        .orchestrate(&[builder("go://x/build-go")], &[spec("api")], &dirs())
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), OrchestratorError::Protocol(_)));
}

#[tokio::test]
async fn empty_inputs_are_rejected() {
    let caller = ScriptedCaller::new();
    let orchestrator = BuildOrchestrator::new(caller.clone());

    assert!(matches!(
        orchestrator.orchestrate(&[], &[spec("api")], &dirs()).await,
        Err(OrchestratorError::InvalidArgument(_))
    ));
    assert!(matches!(
        orchestrator
            .orchestrate(&[builder("go://x/build-go")], &[], &dirs())
            .await,
        Err(OrchestratorError::InvalidArgument(_))
    ));
    assert!(caller.calls().is_empty());
}

#[tokio::test]
async fn coordinator_groups_by_engine_and_writes_once() {
    let tmp = tempfile::tempdir().unwrap();
    let caller = ScriptedCaller::new();
    caller.reply(
        "build-go",
        "buildBatch",
        Reply::Structured(json!([artifact("api"), artifact("worker")])),
    );
    caller.reply("build-container", "build", Reply::Structured(artifact("image")));
    caller.reply("push-container", "build", Reply::Structured(json!({"artifacts": []})));
    let store = Arc::new(MemoryArtifactStore::new());
    let coordinator = BuildCoordinator::new(&project(tmp.path()), caller.clone(), store.clone());

    let artifacts = coordinator.build(None).await.unwrap();

    assert_eq!(artifacts.len(), 3);
    assert_eq!(
        caller.trace(),
        vec![
            "build-go:buildBatch",
            "build-container:build",
            "push-container:build"
        ]
    );
    let container_args = &caller.calls()[1].arguments;
    assert_eq!(
        container_args.get_doc("spec").unwrap().get_str("command"),
        Some("docker")
    );
    assert_eq!(store.write_count(), 1);
    assert_eq!(store.list_artifacts().await.unwrap(), artifacts);
}

#[tokio::test]
async fn coordinator_builds_one_named_spec() {
    let tmp = tempfile::tempdir().unwrap();
    let caller = ScriptedCaller::new();
    caller.reply("build-go", "build", Reply::Structured(artifact("worker")));
    let store = Arc::new(MemoryArtifactStore::new());
    let coordinator = BuildCoordinator::new(&project(tmp.path()), caller.clone(), store.clone());

    let artifacts = coordinator.build(Some("worker")).await.unwrap();
    assert_eq!(artifacts[0].name, "worker");
    assert_eq!(caller.trace(), vec!["build-go:build"]);

    assert!(matches!(
        coordinator.build(Some("missing")).await,
        Err(OrchestratorError::NotFound(_))
    ));
}

#[tokio::test]
async fn coordinator_failure_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let caller = ScriptedCaller::new();
    caller.reply("build-go", "buildBatch", Reply::Structured(json!([artifact("api")])));
    caller.reply("push-container", "build", Reply::Fail("registry unreachable"));
    let store = Arc::new(MemoryArtifactStore::new());
    let coordinator = BuildCoordinator::new(&project(tmp.path()), caller.clone(), store.clone());

    // build-container has no scripted reply, so its result has no artifacts
    let err = coordinator.build(None).await.unwrap_err();
    assert!(matches!(err.root_cause(), OrchestratorError::Protocol(_)));
    assert_eq!(store.write_count(), 0);
}
