//! Upload → analysis pipeline integration tests

mod helpers;

use helpers::*;
use std::sync::Arc;
use std::time::Duration;
use weasel_ai::pipeline::{Pipeline, PipelineError};
use weasel_ai::services::{AnthropicClient, ComplianceAnalyzer, LlmError};
use weasel_ai::storage::{ContainerKind, StorageClient};
use weasel_common::metadata::{FileMetadata, FileStatus};
use weasel_common::CallLogSummary;

async fn seed(storage: &StorageClient, filename: &str, content: &str) {
    let summary = serde_json::from_str(content)
        .map(|v| CallLogSummary::from_value(&v))
        .unwrap_or_default();
    let metadata = FileMetadata::for_upload(filename, content.len() as u64, "application/json", &summary);
    storage
        .upload_file(content.as_bytes(), filename, &metadata, ContainerKind::Raw)
        .await
        .unwrap();
}

async fn metadata(storage: &StorageClient, filename: &str) -> FileMetadata {
    storage
        .get_file_metadata(filename, ContainerKind::Raw)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_successful_run_records_analysis() {
    let storage = test_storage().await;
    let model = ScriptedModel::standard();
    let pipeline = test_pipeline(&storage, model.clone());
    seed(&storage, "a.json", STANDARD_CALL).await;

    let outcome = pipeline.run("a.json").await.unwrap();
    assert_eq!(outcome.status, FileStatus::Analyzed);
    assert_eq!(outcome.risk_score, Some(4.5));
    assert_eq!(outcome.error_message, None);

    let meta = metadata(&storage, "a.json").await;
    assert_eq!(meta.status, FileStatus::Analyzed);
    assert_eq!(meta.risk_score, Some(4.5));
    assert!(meta.processing_started_at.is_some());
    assert!(meta.processing_completed_at.is_some());
    assert_eq!(meta.error_message, None);
    assert_eq!(meta.call_id.as_deref(), Some("CLG-2025-10-001"));

    let analysis = storage.download_analysis_result("a.json").await.unwrap().unwrap();
    assert_eq!(analysis.fdcpa_score, 6.8);
    assert_eq!(analysis.violations.len(), 1);
    assert_eq!(model.calls(), 1);
}

#[tokio::test]
async fn test_exhausted_analysis_marks_error() {
    let storage = test_storage().await;
    let model = ScriptedModel::scripted(vec![
        Ok("I cannot help with that.".into()),
        Err(LlmError::Api(529, "overloaded".into())),
        Ok("{\"riskScore\": 3}".into()),
    ]);
    let pipeline = test_pipeline(&storage, model.clone());
    seed(&storage, "a.json", STANDARD_CALL).await;

    let outcome = pipeline.run("a.json").await.unwrap();
    assert_eq!(outcome.status, FileStatus::Error);
    assert_eq!(model.calls(), 3);

    let meta = metadata(&storage, "a.json").await;
    assert_eq!(meta.status, FileStatus::Error);
    assert!(meta.error_message.unwrap().contains("after 3 attempts"));
    assert_eq!(meta.risk_score, None);
    assert!(storage.download_analysis_result("a.json").await.unwrap().is_none());
}

#[tokio::test]
async fn test_call_log_without_transcript_fails_without_model_call() {
    let storage = test_storage().await;
    let model = ScriptedModel::standard();
    let pipeline = test_pipeline(&storage, model.clone());
    seed(&storage, "a.json", r#"{"callId": "C-1"}"#).await;

    let outcome = pipeline.run("a.json").await.unwrap();
    assert_eq!(outcome.status, FileStatus::Error);
    assert!(outcome.error_message.unwrap().contains("missing transcript"));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_failed_record_can_be_reanalyzed() {
    let storage = test_storage().await;
    let model = ScriptedModel::scripted(vec![Ok("nope".into())]);
    let analyzer = ComplianceAnalyzer::new(model.clone()).with_backoff(Duration::from_millis(1), Duration::from_millis(1));
    let pipeline = Pipeline::new(storage.clone(), analyzer).with_max_attempts(1);
    seed(&storage, "a.json", STANDARD_CALL).await;

    assert_eq!(pipeline.run("a.json").await.unwrap().status, FileStatus::Error);

    let outcome = pipeline.run("a.json").await.unwrap();
    assert_eq!(outcome.status, FileStatus::Analyzed);

    let meta = metadata(&storage, "a.json").await;
    assert_eq!(meta.status, FileStatus::Analyzed);
    assert_eq!(meta.error_message, None);
    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_missing_api_key_marks_error() {
    let storage = test_storage().await;
    let client = AnthropicClient::new(None, "claude-3-haiku-20240307".into(), "http://127.0.0.1:9".into()).unwrap();
    let analyzer = ComplianceAnalyzer::new(Arc::new(client)).with_backoff(Duration::from_millis(1), Duration::from_millis(1));
    let pipeline = Pipeline::new(storage.clone(), analyzer);
    seed(&storage, "a.json", STANDARD_CALL).await;

    let outcome = pipeline.run("a.json").await.unwrap();
    assert_eq!(outcome.status, FileStatus::Error);
    assert!(outcome.error_message.unwrap().contains("ANTHROPIC_API_KEY"));
}

#[tokio::test]
async fn test_run_on_missing_file_is_not_found() {
    let storage = test_storage().await;
    let pipeline = test_pipeline(&storage, ScriptedModel::standard());

    assert!(matches!(
        pipeline.run("ghost.json").await,
        Err(PipelineError::NotFound(_))
    ));
    assert!(!pipeline.is_active("ghost.json"));
}

#[tokio::test]
async fn test_guard_rejects_concurrent_runs() {
    let storage = test_storage().await;
    let pipeline = test_pipeline(&storage, ScriptedModel::with_delay(Duration::from_millis(200)));
    seed(&storage, "a.json", STANDARD_CALL).await;

    pipeline.trigger("a.json").unwrap();
    assert!(pipeline.is_active("a.json"));
    assert!(matches!(
        pipeline.run("a.json").await,
        Err(PipelineError::AlreadyRunning(_))
    ));

    for _ in 0..100 {
        if !pipeline.is_active("a.json") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!pipeline.is_active("a.json"));
    assert_eq!(metadata(&storage, "a.json").await.status, FileStatus::Analyzed);
}

#[tokio::test]
async fn test_recover_pending_requeues_unfinished_records() {
    let storage = test_storage().await;
    let model = ScriptedModel::standard();
    let pipeline = test_pipeline(&storage, model.clone());

    seed(&storage, "uploaded.json", STANDARD_CALL).await;
    seed(&storage, "stuck.json", STANDARD_CALL).await;
    seed(&storage, "done.json", STANDARD_CALL).await;
    pipeline.run("done.json").await.unwrap();
    storage
        .update_metadata(
            "stuck.json",
            &weasel_common::MetadataPatch {
                status: Some(FileStatus::Processing),
                ..Default::default()
            },
            ContainerKind::Raw,
        )
        .await
        .unwrap();

    let recovered = pipeline.recover_pending().await.unwrap();
    assert_eq!(recovered, 2);

    for _ in 0..200 {
        let uploaded = metadata(&storage, "uploaded.json").await.status;
        let stuck = metadata(&storage, "stuck.json").await.status;
        if uploaded.is_terminal() && stuck.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(metadata(&storage, "uploaded.json").await.status, FileStatus::Analyzed);
    assert_eq!(metadata(&storage, "stuck.json").await.status, FileStatus::Analyzed);
    assert_eq!(model.calls(), 3);
}
