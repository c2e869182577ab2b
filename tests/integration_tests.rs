use httpmock::prelude::*;
use kintsugi::core::pipeline::SUGGESTIONS_FILE;
use kintsugi::core::report;
use kintsugi::core::store::FIXES_FILE;
use kintsugi::domain::model::{ErrorType, FailureStatus, FixRecord, FixStatus, SuggestionSource};
use kintsugi::domain::ports::{ConfigProvider, FixStore};
use kintsugi::utils::validation::Validate;
use kintsugi::{
    AnalysisPipeline, GeminiFixerAgent, JsonFixStore, KintsugiConfig, LocalStorage,
    RemediationEngine, ReviewService,
};
use tempfile::TempDir;

fn write_failures(dir: &TempDir) -> String {
    let failures = serde_json::json!([
        {
            "id": "f-1",
            "repository": "acme/web",
            "branch": "main",
            "workflow_name": "CI",
            "job_name": "build",
            "error_log": "npm ERR! code MODULE_NOT_FOUND\nError: Cannot find module 'lodash'"
        },
        {
            "id": "f-2",
            "repository": "acme/api",
            "branch": "develop",
            "error_log": "FAILED tests/test_orders.py::test_total - AssertionError: assert 3 == 4"
        },
        {
            "id": "f-3",
            "repository": "acme/api",
            "branch": "develop",
            "error_log": "old failure",
            "status": "resolved"
        }
    ]);
    let path = dir.path().join("failures.json");
    std::fs::write(&path, serde_json::to_vec(&failures).unwrap()).unwrap();
    path.to_str().unwrap().to_string()
}

fn config_for(dir: &TempDir, source: &str, auto_approve: bool) -> KintsugiConfig {
    let toml_content = format!(
        r#"
[service]
name = "kintsugi-it"
failure_source = "{}"

[storage]
data_dir = "{}"

[review]
auto_approve_low_risk = {}
"#,
        source,
        dir.path().join("data").to_str().unwrap(),
        auto_approve
    );
    let config = KintsugiConfig::from_toml_str(&toml_content).unwrap();
    config.validate().unwrap();
    config
}

fn review_for(config: &KintsugiConfig) -> ReviewService<JsonFixStore<LocalStorage>> {
    let storage = LocalStorage::new(config.data_dir().to_string());
    ReviewService::new(JsonFixStore::new(storage), config.auto_approve_low_risk())
}

#[tokio::test]
async fn test_end_to_end_run_with_heuristic_agent() {
    let temp_dir = TempDir::new().unwrap();
    let source = write_failures(&temp_dir);
    let config = config_for(&temp_dir, &source, true);

    let pipeline = AnalysisPipeline::new(
        LocalStorage::new(config.data_dir().to_string()),
        config.clone(),
        Box::new(GeminiFixerAgent::heuristic_only()),
        review_for(&config),
    );
    let engine = RemediationEngine::new(pipeline);

    let (run_report, records) = engine.run().await.unwrap();

    // The resolved failure is skipped
    assert_eq!(run_report.collected, 2);
    assert_eq!(run_report.proposed, 2);
    assert_eq!(run_report.ai_suggestions, 0);
    // Heuristic suggestions carry no file changes, so nothing is auto-approved
    assert_eq!(run_report.auto_approved, 0);
    assert!(records.iter().all(|r| r.status == FixStatus::Pending));

    let by_failure = |id: &str| records.iter().find(|r| r.failure_id == id).unwrap();
    assert_eq!(by_failure("f-1").suggestion.error_type, ErrorType::Dependency);
    assert!(by_failure("f-1")
        .suggestion
        .suggested_steps
        .iter()
        .any(|s| s.contains("lodash")));
    assert_eq!(by_failure("f-2").suggestion.error_type, ErrorType::TestFailure);
    assert_eq!(by_failure("f-2").base_branch, "develop");

    let data_dir = temp_dir.path().join("data");
    let fixes: Vec<FixRecord> =
        serde_json::from_slice(&std::fs::read(data_dir.join(FIXES_FILE)).unwrap()).unwrap();
    assert_eq!(fixes.len(), 2);
    let suggestions: Vec<FixRecord> =
        serde_json::from_slice(&std::fs::read(data_dir.join(SUGGESTIONS_FILE)).unwrap()).unwrap();
    assert_eq!(suggestions.len(), 2);

    // Dashboard numbers after a review
    let review = engine.pipeline().review();
    review
        .approve(&by_failure("f-1").id, "alice", None)
        .await
        .unwrap();
    review
        .reject(&by_failure("f-2").id, "bob", Some("flaky test".to_string()))
        .await
        .unwrap();

    let all_fixes = review.list(None).await.unwrap();
    let mut failures = engine.pipeline().load_all_failures().await.unwrap();
    for failure in failures.iter_mut() {
        report::reconcile_failure_status(failure, &all_fixes);
    }
    assert_eq!(failures[0].status, FailureStatus::FixSuggested);

    let summary = report::summarize(&failures, &all_fixes);
    assert_eq!(summary.total_failures, 3);
    assert_eq!(summary.total_fixes, 2);
    assert_eq!(summary.fixes_by_status.get("approved"), Some(&1));
    assert_eq!(summary.fixes_by_status.get("rejected"), Some(&1));
    assert!((summary.approval_rate - 0.5).abs() < 1e-9);

    let csv = report::export_fixes_csv(&all_fixes).unwrap();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.contains("alice"));
}

#[tokio::test]
async fn test_collect_from_backend_api() {
    let temp_dir = TempDir::new().unwrap();
    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(GET).path("/api/failures");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(serde_json::json!({
                "failures": [{
                    "id": "f-10",
                    "repository": "acme/infra",
                    "branch": "main",
                    "error_log": "Error: EACCES: permission denied, open '/var/run/docker.sock'"
                }]
            }));
    });

    let config = config_for(&temp_dir, &server.url("/api/failures"), false);
    let pipeline = AnalysisPipeline::new(
        LocalStorage::new(config.data_dir().to_string()),
        config.clone(),
        Box::new(GeminiFixerAgent::heuristic_only()),
        review_for(&config),
    );
    let (run_report, records) = RemediationEngine::new(pipeline).run().await.unwrap();

    api_mock.assert();
    assert_eq!(run_report.collected, 1);
    assert_eq!(records[0].suggestion.error_type, ErrorType::Permission);
}

#[tokio::test]
async fn test_missing_failure_file_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("nope.json");
    let config = config_for(&temp_dir, missing.to_str().unwrap(), false);
    let pipeline = AnalysisPipeline::new(
        LocalStorage::new(config.data_dir().to_string()),
        config.clone(),
        Box::new(GeminiFixerAgent::heuristic_only()),
        review_for(&config),
    );

    let err = RemediationEngine::new(pipeline).run().await.unwrap_err();
    assert!(matches!(err, kintsugi::KintsugiError::IoError(_)));

    // Nothing was proposed
    let store = JsonFixStore::new(LocalStorage::new(config.data_dir().to_string()));
    assert!(store.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_records_survive_a_new_service_instance() {
    let temp_dir = TempDir::new().unwrap();
    let source = write_failures(&temp_dir);
    let config = config_for(&temp_dir, &source, false);

    let pipeline = AnalysisPipeline::new(
        LocalStorage::new(config.data_dir().to_string()),
        config.clone(),
        Box::new(GeminiFixerAgent::heuristic_only()),
        review_for(&config),
    );
    let (_, records) = RemediationEngine::new(pipeline).run().await.unwrap();

    let fresh = review_for(&config);
    let fix = fresh.get(&records[0].id).await.unwrap();
    assert_eq!(fix.suggestion.source, SuggestionSource::Heuristic);
    assert_eq!(fresh.list(Some(FixStatus::Pending)).await.unwrap().len(), 2);
    assert!(fresh.list(Some(FixStatus::Applied)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_second_run_does_not_duplicate_fixes() {
    let temp_dir = TempDir::new().unwrap();
    let source = write_failures(&temp_dir);
    let config = config_for(&temp_dir, &source, false);

    let pipeline = AnalysisPipeline::new(
        LocalStorage::new(config.data_dir().to_string()),
        config.clone(),
        Box::new(GeminiFixerAgent::heuristic_only()),
        review_for(&config),
    );
    let engine = RemediationEngine::new(pipeline);

    let (first, _) = engine.run().await.unwrap();
    assert_eq!(first.proposed, 2);

    let (second, records) = engine.run().await.unwrap();
    assert_eq!(second.collected, 0);
    assert_eq!(second.proposed, 0);
    assert!(records.is_empty());

    let fixes = review_for(&config).list(None).await.unwrap();
    assert_eq!(fixes.len(), 2);
    assert_eq!(fixes.iter().filter(|f| f.failure_id == "f-1").count(), 1);

    let summary = report::summarize(&[], &fixes);
    assert_eq!(summary.total_fixes, 2);
}
