//! End-to-end pipeline tests driven by the mock provider.
//!
//! These run the whole service (instructions → generator → validator → band →
//! ledger) against scripted generator replies, including failures.

use std::sync::Arc;
use std::time::Duration;

use bandwise_core::error::{AssessmentError, ProviderError};
use bandwise_core::model::{Band, Profile, PromptDraft, Role, Subtype, TaskType};
use bandwise_core::service::{AssessmentService, GradingSubmission, PromptRef, ServiceConfig};
use bandwise_core::store::{ListOrder, MemoryStore, ProfileStore, SubmissionLedger};
use bandwise_providers::mock::MockProvider;

fn make_service(
    provider: Arc<MockProvider>,
    timeout: Duration,
) -> (AssessmentService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let mut config = ServiceConfig::default();
    config.generation.timeout = timeout;
    let service = AssessmentService::with_store(store.clone(), provider, config);
    (service, store)
}

fn band(value: f64) -> Band {
    Band::from_f64(value).unwrap()
}

fn examiner_reply() -> String {
    serde_json::json!({
        "taskType": "task2",
        "wordCount": 250,
        "criteriaScores": {
            "TR": {"band": 6, "feedback": "Position is clear but underdeveloped."},
            "CC": {"band": 6.5, "feedback": "Logical paragraphs."},
            "LR": {"band": 7, "feedback": "Good range of topic vocabulary."},
            "GRA": {"band": 6, "feedback": "Frequent article errors."}
        },
        "overallBand": 6.5,
        "examinerSummary": "A competent response held back by thin support.",
        "priorityImprovements": ["Extend each main idea with an example."],
        "modelParagraph": "Homework, when set with care, extends learning beyond the classroom."
    })
    .to_string()
}

fn essay_for(student: &str) -> GradingSubmission {
    GradingSubmission {
        student_id: student.into(),
        essay: "Homework is useful because it builds discipline. ".repeat(30),
        prompt: PromptRef::Inline {
            text: "Is homework useful? To what extent do you agree?".into(),
            subtype: Some(Subtype::AgreeDisagree),
            visual_data: None,
        },
        task_type: TaskType::Task2,
    }
}

#[tokio::test]
async fn e2e_grading_records_submission() {
    let provider = Arc::new(MockProvider::with_fixed_response(&examiner_reply()));
    let (service, store) = make_service(provider.clone(), Duration::from_secs(5));

    let graded = service.submit_for_grading(essay_for("s1")).await.unwrap();
    assert_eq!(graded.assessment.overall_band, band(6.5));
    assert!(graded.band_discrepancy.is_none());
    assert!(graded.persistence_failure.is_none());

    let listed = store
        .list_submissions("s1", 10, ListOrder::MostRecentFirst)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(Some(listed[0].id), graded.submission.map(|s| s.id));

    assert_eq!(provider.call_count(), 1);
    let request = provider.last_request().unwrap();
    assert!(request.prompt.contains("builds discipline"));
    assert!(request.prompt.contains("Is homework useful?"));
    assert!(!request.system_prompt.is_empty());
}

#[tokio::test]
async fn e2e_rate_limit_surfaces_retry_advice() {
    let provider = Arc::new(MockProvider::with_fixed_response(&examiner_reply()));
    provider.push_reply(Err(ProviderError::RateLimited {
        retry_after_ms: 1500,
    }));
    let (service, store) = make_service(provider.clone(), Duration::from_secs(5));

    let err = service.submit_for_grading(essay_for("s1")).await.unwrap_err();
    assert!(matches!(err, AssessmentError::Transport { provider: Some(_), .. }));
    assert!(err.is_retryable());
    assert_eq!(err.retry_after_ms(), Some(1500));
    assert_eq!(store.submission_count().await, 0);

    // The caller retries and the next reply succeeds.
    service.submit_for_grading(essay_for("s1")).await.unwrap();
    assert_eq!(provider.call_count(), 2);
    assert_eq!(store.submission_count().await, 1);
}

#[tokio::test]
async fn e2e_rejected_key_is_not_retryable() {
    let provider = Arc::new(MockProvider::with_fixed_response(&examiner_reply()));
    provider.push_reply(Err(ProviderError::AuthenticationFailed(
        "invalid x-api-key".into(),
    )));
    let (service, _store) = make_service(provider, Duration::from_secs(5));

    let err = service.submit_for_grading(essay_for("s1")).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(err.retry_after_ms(), None);
}

#[tokio::test(start_paused = true)]
async fn e2e_slow_generator_times_out_without_ledger_entry() {
    let provider = Arc::new(
        MockProvider::with_fixed_response(&examiner_reply()).with_delay(Duration::from_secs(30)),
    );
    let (service, store) = make_service(provider, Duration::from_secs(2));

    let err = service.submit_for_grading(essay_for("s1")).await.unwrap_err();
    assert!(matches!(err, AssessmentError::Transport { provider: None, .. }));
    assert_eq!(store.submission_count().await, 0);
}

#[tokio::test]
async fn e2e_malformed_reply_is_a_parse_error() {
    let provider = Arc::new(MockProvider::with_fixed_response("I would give this a 6."));
    let (service, store) = make_service(provider, Duration::from_secs(5));

    let err = service.submit_for_grading(essay_for("s1")).await.unwrap_err();
    assert!(matches!(err, AssessmentError::Parse(_)));
    assert_eq!(store.submission_count().await, 0);
}

#[tokio::test]
async fn e2e_candidates_use_bank_as_examples() {
    let provider = Arc::new(MockProvider::with_fixed_response("[]"));
    provider.push_reply(Ok(r#"{"questions": [
        {"prompt_text": "Some say cities should ban private cars. To what extent do you agree?",
         "difficulty": 2, "topic_tags": ["transport"]}
    ]}"#
    .to_string()));
    let (service, store) = make_service(provider.clone(), Duration::from_secs(5));
    store
        .upsert_profile(Profile::new("t1", "Teacher", band(8.0), band(8.5), Role::Teacher).unwrap())
        .await
        .unwrap();

    service
        .add_prompt(
            "t1",
            PromptDraft {
                task: TaskType::Task2,
                subtype: Some(Subtype::AgreeDisagree),
                text: "Some people say working from home benefits everyone. Do you agree?".into(),
                difficulty: 2,
                topic_tags: Default::default(),
                visual_description: None,
                visual_metadata: None,
            },
        )
        .await
        .unwrap();

    let candidates = service
        .generate_candidate_questions("t1", TaskType::Task2, Some(Subtype::AgreeDisagree), 1)
        .await
        .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].task, TaskType::Task2);
    assert_eq!(candidates[0].subtype, Some(Subtype::AgreeDisagree));

    let request = provider.last_request().unwrap();
    assert!(request.prompt.contains("working from home benefits everyone"));
}
