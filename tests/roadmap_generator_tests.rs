use async_trait::async_trait;
use roadmap_planner::llm_providers::{CompletionProvider, LLMRequestError};
use roadmap_planner::{
    RetryPolicy, RoadmapGenerator, RoadmapSection, RoadmapStructure, RoadmapSubtopic, SkillLevel,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const BLUEPRINT: &str = r#"```json
{
  "levels": [
    {
      "id": "level-1",
      "title": "Foundations",
      "estimatedHours": 10,
      "sections": [
        {
          "id": "section-1-1",
          "title": "Ownership",
          "estimatedHours": 4,
          "subtopics": [
            { "id": "subtopic-1-1-1", "title": "Moves", "estimatedHours": 2 },
            { "id": "subtopic-1-1-2", "title": "Borrows", "estimatedHours": 3 }
          ]
        }
      ]
    }
  ]
}
```"#;

enum Reply {
    Text(&'static str),
    RateLimited,
    Unauthorized,
    Hang,
}

/// Replays a fixed script, one entry per call; the last entry repeats.
struct ScriptedProvider {
    script: Vec<Reply>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(script: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, _system_message: Option<&str>, _prompt: &str) -> anyhow::Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = &self.script[call.min(self.script.len() - 1)];

        match reply {
            Reply::Text(text) => Ok(text.to_string()),
            Reply::RateLimited => Err(LLMRequestError::RateLimited {
                provider: "Stub",
                body: "slow down".to_string(),
            }
            .into()),
            Reply::Unauthorized => Err(LLMRequestError::Api {
                provider: "Stub",
                status: reqwest::StatusCode::UNAUTHORIZED,
                body: "bad key".to_string(),
            }
            .into()),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(String::new())
            }
        }
    }

    fn provider_name(&self) -> &'static str {
        "Stub"
    }

    fn model_name(&self) -> &str {
        "stub-model"
    }
}

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        timeout: Duration::from_millis(200),
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

fn generator(provider: &Arc<ScriptedProvider>, max_retries: u32) -> RoadmapGenerator {
    RoadmapGenerator::from_provider(provider.clone()).with_retry_policy(fast_policy(max_retries))
}

#[tokio::test]
async fn test_blueprint_parses_fenced_json_and_computes_metadata() {
    let provider = ScriptedProvider::new(vec![Reply::Text(BLUEPRINT)]);
    let structure = generator(&provider, 2)
        .generate_blueprint("Rust", SkillLevel::Beginner)
        .await
        .unwrap();

    assert_eq!(structure.levels.len(), 1);
    assert_eq!(structure.subtopic_count(), 2);

    let metadata = structure.metadata.unwrap();
    assert_eq!(metadata.total_estimated_hours, Some(14.0));
    assert_eq!(metadata.total_topics, Some(2));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_blueprint_without_levels_fails() {
    let provider = ScriptedProvider::new(vec![Reply::Text(r#"{"levels": []}"#)]);
    let result = generator(&provider, 2)
        .generate_blueprint("Rust", SkillLevel::Pro)
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_rate_limits_are_retried() {
    let provider = ScriptedProvider::new(vec![
        Reply::RateLimited,
        Reply::RateLimited,
        Reply::Text(BLUEPRINT),
    ]);
    let structure = generator(&provider, 2)
        .generate_blueprint("Rust", SkillLevel::Intermediate)
        .await
        .unwrap();

    assert_eq!(structure.subtopic_count(), 2);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_retries_stop_after_max_retries() {
    let provider = ScriptedProvider::new(vec![Reply::RateLimited]);
    let result = generator(&provider, 2)
        .generate_blueprint("Rust", SkillLevel::Beginner)
        .await;

    assert!(result.is_err());
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_non_retryable_errors_fail_immediately() {
    let provider = ScriptedProvider::new(vec![Reply::Unauthorized, Reply::Text(BLUEPRINT)]);
    let result = generator(&provider, 2)
        .generate_blueprint("Rust", SkillLevel::Beginner)
        .await;

    let error = result.unwrap_err();
    assert!(matches!(
        error.downcast_ref::<LLMRequestError>(),
        Some(LLMRequestError::Api { .. })
    ));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_each_attempt_is_bounded_by_timeout() {
    let provider = ScriptedProvider::new(vec![Reply::Hang]);
    let result = generator(&provider, 1)
        .generate_blueprint("Rust", SkillLevel::Beginner)
        .await;

    let error = result.unwrap_err();
    assert!(matches!(
        error.downcast_ref::<LLMRequestError>(),
        Some(LLMRequestError::Timeout(_))
    ));
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_personalize_keeps_input_on_failure() {
    let original: RoadmapStructure = serde_json::from_str(
        roadmap_planner::JsonResponseParser::extract_json_from_response(BLUEPRINT).as_str(),
    )
    .unwrap();

    let garbage = ScriptedProvider::new(vec![Reply::Text("I cannot help with that")]);
    let kept = generator(&garbage, 0)
        .personalize(original.clone(), SkillLevel::Beginner)
        .await;
    assert_eq!(kept, original);

    let empty = ScriptedProvider::new(vec![Reply::Text(r#"{"levels": []}"#)]);
    let kept = generator(&empty, 0)
        .personalize(original.clone(), SkillLevel::Pro)
        .await;
    assert_eq!(kept, original);

    let failing = ScriptedProvider::new(vec![Reply::Unauthorized]);
    let kept = generator(&failing, 0)
        .personalize(original.clone(), SkillLevel::Pro)
        .await;
    assert_eq!(kept, original);
}

#[tokio::test]
async fn test_analyze_prerequisites_fills_missing_topic_ids() {
    let structure: RoadmapStructure = serde_json::from_str(
        roadmap_planner::JsonResponseParser::extract_json_from_response(BLUEPRINT).as_str(),
    )
    .unwrap();

    let provider = ScriptedProvider::new(vec![Reply::Text(
        r#"{"prerequisites": {"subtopic-1-1-2": {"requiredTopics": ["subtopic-1-1-1"]}}}"#,
    )]);
    let prerequisites = generator(&provider, 0).analyze_prerequisites(&structure).await;

    let entry = &prerequisites["subtopic-1-1-2"];
    assert_eq!(entry.topic_id, "subtopic-1-1-2");
    assert_eq!(entry.required_topics, vec!["subtopic-1-1-1".to_string()]);
    assert_eq!(entry.skill_checks, None);
}

#[tokio::test]
async fn test_analyze_prerequisites_falls_back_to_empty() {
    let provider = ScriptedProvider::new(vec![Reply::Text("not json at all")]);
    let prerequisites = generator(&provider, 0)
        .analyze_prerequisites(&RoadmapStructure::default())
        .await;

    assert!(prerequisites.is_empty());
}

fn subtopic() -> RoadmapSubtopic {
    RoadmapSubtopic {
        id: "borrows".to_string(),
        title: "Borrows".to_string(),
        description: Some("Shared and mutable references".to_string()),
        estimated_hours: Some(3.0),
    }
}

#[tokio::test]
async fn test_quiz_unwraps_envelope_and_retries() {
    let provider = ScriptedProvider::new(vec![
        Reply::RateLimited,
        Reply::Text(r#"{"quiz": {"title": "Borrowing", "questions": []}}"#),
    ]);
    let quiz = generator(&provider, 2)
        .generate_quiz(&subtopic(), "easy", 3)
        .await
        .unwrap();

    assert_eq!(quiz["title"], "Borrowing");
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_study_material_without_envelope_is_used_as_is() {
    let provider = ScriptedProvider::new(vec![Reply::Text(r#"{"books": [{"title": "The Book"}]}"#)]);
    let resources = generator(&provider, 0).curate_resources(&subtopic()).await.unwrap();
    assert_eq!(resources["books"][0]["title"], "The Book");

    let provider = ScriptedProvider::new(vec![Reply::Text(r#"[{"title": "Borrow checker kata"}]"#)]);
    let section = RoadmapSection {
        id: "section-1-1".to_string(),
        title: "Ownership".to_string(),
        description: None,
        subtopics: vec![subtopic()],
        prerequisites: None,
        estimated_hours: None,
    };
    let projects = generator(&provider, 0).design_projects(&section).await.unwrap();
    assert_eq!(projects[0]["title"], "Borrow checker kata");
}

#[tokio::test]
async fn test_explanation_errors_are_not_swallowed() {
    let provider = ScriptedProvider::new(vec![Reply::Text("I cannot help with that.")]);
    assert!(generator(&provider, 2).explain_topic(&subtopic()).await.is_err());
    assert_eq!(provider.calls(), 1);

    let provider = ScriptedProvider::new(vec![Reply::Unauthorized]);
    assert!(generator(&provider, 2).explain_topic(&subtopic()).await.is_err());
    assert_eq!(provider.calls(), 1);
}
