use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use roadmap_planner::api::{create_router, AppState};
use roadmap_planner::llm_providers::CompletionProvider;
use roadmap_planner::{Database, RetryPolicy, RoadmapGenerator, RoadmapService};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Answers each generation stage from its system prompt.
struct StageProvider {
    offline: bool,
}

#[async_trait]
impl CompletionProvider for StageProvider {
    async fn complete(&self, system_message: Option<&str>, prompt: &str) -> anyhow::Result<String> {
        if self.offline {
            return Err(anyhow::anyhow!("upstream unavailable"));
        }
        let system = system_message.unwrap_or_default();

        if system.contains("roadmap generator") {
            return Ok(json!({
                "levels": [{
                    "id": "level-1",
                    "title": "Foundations",
                    "sections": [{
                        "id": "section-1",
                        "title": "Basics",
                        "subtopics": [
                            { "id": "intro", "title": "Intro", "estimatedHours": 8 },
                            { "id": "syntax", "title": "Syntax", "estimatedHours": 8 },
                            { "id": "tooling", "title": "Tooling", "estimatedHours": 8 }
                        ]
                    }]
                }]
            })
            .to_string());
        }

        if system.contains("personalize") {
            return Ok("no changes needed".to_string());
        }

        if system.contains("expert educator") {
            return Ok(json!({
                "explanations": { "beginner": { "title": "Simple", "content": prompt } },
                "quickTips": ["Practice daily"]
            })
            .to_string());
        }

        if system.contains("assessment designer") {
            return Ok(format!(
                "```json\n{}\n```",
                json!({
                    "quiz": {
                        "title": "Check",
                        "totalQuestions": 1,
                        "passingScore": 70,
                        "questions": [{ "id": 1, "question": prompt, "correctAnswer": "B" }]
                    }
                })
            ));
        }

        if system.contains("resource curator") {
            return Ok(json!({
                "resources": { "books": [{ "title": "The Book", "author": "Someone" }] }
            })
            .to_string());
        }

        if system.contains("curriculum designer") {
            // Bare list without the `projects` wrapper.
            return Ok(json!([{ "title": "Build a CLI", "difficulty": "beginner", "brief": prompt }]).to_string());
        }

        Ok(json!({
            "prerequisites": {
                "intro": { "topicId": "intro", "requiredTopics": ["tooling"] }
            }
        })
        .to_string())
    }

    fn provider_name(&self) -> &'static str {
        "Stub"
    }

    fn model_name(&self) -> &str {
        "stub-model"
    }
}

async fn create_test_server_with(offline: bool) -> TestServer {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let generator = RoadmapGenerator::from_provider(Arc::new(StageProvider { offline }))
        .with_retry_policy(RetryPolicy {
            max_retries: 0,
            timeout: Duration::from_secs(5),
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        });
    let app_state = AppState {
        roadmap_service: RoadmapService::new(db, generator),
    };

    TestServer::new(create_router(app_state)).unwrap()
}

async fn create_test_server() -> TestServer {
    create_test_server_with(false).await
}

fn sample_import() -> Value {
    json!({
        "topic": "Rust",
        "skillLevel": "beginner",
        "createdBy": "user-1",
        "structure": {
            "levels": [{
                "id": "l1",
                "title": "Level 1",
                "sections": [{
                    "id": "s1",
                    "title": "Section 1",
                    "subtopics": [
                        { "id": "a", "title": "A", "estimatedHours": 8 },
                        { "id": "b", "title": "B", "estimatedHours": 8 },
                        { "id": "c", "title": "C", "estimatedHours": 8 }
                    ]
                }]
            }]
        },
        "prerequisites": {
            "a": { "topicId": "a", "requiredTopics": ["c"] }
        }
    })
}

async fn import(server: &TestServer) -> String {
    let response = server.post("/api/roadmaps").json(&sample_import()).await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    body["data"]["roadmapId"].as_str().unwrap().to_string()
}

fn ids(week: &Value) -> Vec<&str> {
    week["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server().await;
    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_import_and_get_roadmap() {
    let server = create_test_server().await;
    let roadmap_id = import(&server).await;

    let response = server.get(&format!("/api/roadmaps/{}", roadmap_id)).await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["topic"], "Rust");
    assert_eq!(body["data"]["skillLevel"], "beginner");
    assert_eq!(body["data"]["structure"]["metadata"]["totalTopics"], 3);
    assert_eq!(body["data"]["prerequisites"]["a"]["requiredTopics"][0], "c");
}

#[tokio::test]
async fn test_import_rejects_invalid_skill_level() {
    let server = create_test_server().await;
    let mut request = sample_import();
    request["skillLevel"] = json!("expert");

    let response = server.post("/api/roadmaps").json(&request).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("skillLevel"));
}

#[tokio::test]
async fn test_get_missing_roadmap_returns_404() {
    let server = create_test_server().await;
    let response = server.get("/api/roadmaps/does-not-exist").await;

    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_list_roadmaps_requires_creator() {
    let server = create_test_server().await;
    import(&server).await;
    import(&server).await;

    let response = server.get("/api/roadmaps").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .get("/api/roadmaps")
        .add_query_param("createdBy", "user-1")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let response = server
        .get("/api/roadmaps")
        .add_query_param("createdBy", "someone-else")
        .await;
    let body: Value = response.json();
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_timeline_orders_prerequisites_first() {
    let server = create_test_server().await;
    let roadmap_id = import(&server).await;

    let response = server
        .get(&format!("/api/roadmaps/{}/timeline", roadmap_id))
        .add_query_param("startDate", "2024-01-01")
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let weeks = body["data"].as_array().unwrap();
    assert_eq!(weeks.len(), 2);
    assert_eq!(ids(&weeks[0]), vec!["c", "a"]);
    assert_eq!(ids(&weeks[1]), vec!["b"]);
    assert_eq!(weeks[0]["weekNumber"], 1);
    assert_eq!(weeks[0]["startDate"], "2024-01-01");
    assert_eq!(weeks[0]["endDate"], "2024-01-07");
    assert_eq!(weeks[1]["startDate"], "2024-01-08");
    assert_eq!(weeks[0]["items"][0]["type"], "subtopic");
}

#[tokio::test]
async fn test_timeline_without_start_date_has_no_dates() {
    let server = create_test_server().await;
    let roadmap_id = import(&server).await;

    let response = server
        .get(&format!("/api/roadmaps/{}/timeline", roadmap_id))
        .add_query_param("hoursPerWeek", "8")
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let weeks = body["data"].as_array().unwrap();
    assert_eq!(weeks.len(), 3);
    assert!(weeks.iter().all(|week| week.get("startDate").is_none()));
}

#[tokio::test]
async fn test_timeline_rejects_bad_parameters() {
    let server = create_test_server().await;
    let roadmap_id = import(&server).await;
    let path = format!("/api/roadmaps/{}/timeline", roadmap_id);

    let response = server.get(&path).add_query_param("startDate", "01/02/2024").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get(&path).add_query_param("hoursPerWeek", "0").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get("/api/roadmaps/missing/timeline").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duration_estimate() {
    let server = create_test_server().await;
    let roadmap_id = import(&server).await;

    let response = server
        .get(&format!("/api/roadmaps/{}/duration", roadmap_id))
        .add_query_param("hoursPerWeek", "10")
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["data"]["totalHours"], 24.0);
    assert_eq!(body["data"]["totalWeeks"], 3);
    assert!(body["data"]["estimatedCompletionDate"].is_string());
}

#[tokio::test]
async fn test_progress_flow_and_stats() {
    let server = create_test_server().await;
    let roadmap_id = import(&server).await;
    let progress_path = format!("/api/roadmaps/{}/progress", roadmap_id);

    let response = server
        .post(&progress_path)
        .json(&json!({ "userId": "learner", "topicId": "a", "completed": true }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["completed"], true);
    assert!(body["data"]["completedAt"].is_string());

    let response = server
        .post(&progress_path)
        .json(&json!({ "userId": "learner", "topicId": "b", "completed": true }))
        .await;
    response.assert_status_ok();

    // Unmarking clears the completion timestamp
    let response = server
        .post(&progress_path)
        .json(&json!({ "userId": "learner", "topicId": "b", "completed": false }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["data"]["completed"], false);
    assert!(body["data"]["completedAt"].is_null());
    assert!(body["data"]["updatedAt"].is_string());

    let response = server
        .get(&progress_path)
        .add_query_param("userId", "learner")
        .await;
    let body: Value = response.json();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let response = server
        .get(&format!("{}/stats", progress_path))
        .add_query_param("userId", "learner")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["totalTopics"], 3);
    assert_eq!(body["data"]["completedTopics"], 1);
    assert_eq!(body["data"]["remainingTopics"], 2);
    assert_eq!(body["data"]["percentageComplete"], 33);
    assert_eq!(body["data"]["completedHours"], 8.0);
    assert_eq!(body["data"]["remainingHours"], 16.0);
}

#[tokio::test]
async fn test_progress_requires_topic_id() {
    let server = create_test_server().await;
    let roadmap_id = import(&server).await;

    let response = server
        .post(&format!("/api/roadmaps/{}/progress", roadmap_id))
        .json(&json!({ "userId": "learner", "topicId": "", "completed": true }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/roadmaps/missing/progress")
        .json(&json!({ "userId": "learner", "topicId": "a", "completed": true }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_graph_marks_completed_subtopics() {
    let server = create_test_server().await;
    let roadmap_id = import(&server).await;

    server
        .post(&format!("/api/roadmaps/{}/progress", roadmap_id))
        .json(&json!({ "userId": "learner", "topicId": "c", "completed": true }))
        .await
        .assert_status_ok();

    let response = server
        .get(&format!("/api/roadmaps/{}/graph", roadmap_id))
        .add_query_param("userId", "learner")
        .add_query_param("direction", "LR")
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["data"]["direction"], "LR");

    let nodes = body["data"]["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 5);
    let node_c = nodes.iter().find(|n| n["id"] == "c").unwrap();
    assert_eq!(node_c["completed"], true);
    assert_eq!(node_c["width"], 190.0);

    let edges = body["data"]["edges"].as_array().unwrap();
    assert!(edges
        .iter()
        .any(|e| e["source"] == "c" && e["target"] == "a" && e["type"] == "prerequisite"));

    let response = server
        .get(&format!("/api/roadmaps/{}/graph", roadmap_id))
        .add_query_param("direction", "diagonal")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_and_delete_roadmap() {
    let server = create_test_server().await;
    let roadmap_id = import(&server).await;
    let path = format!("/api/roadmaps/{}", roadmap_id);

    let response = server.put(&path).json(&json!({})).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .put(&path)
        .json(&json!({ "prerequisites": {} }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["prerequisites"], json!({}));
    assert!(body["data"]["updatedAt"].is_string());

    // Without prerequisites the timeline falls back to document order
    let response = server.get(&format!("{}/timeline", path)).await;
    let body: Value = response.json();
    assert_eq!(ids(&body["data"][0]), vec!["a", "b"]);

    server.delete(&path).await.assert_status_ok();
    server.get(&path).await.assert_status(StatusCode::NOT_FOUND);
    server.delete(&path).await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generate_roadmap_runs_pipeline() {
    let server = create_test_server().await;

    let response = server
        .post("/api/roadmaps/generate")
        .json(&json!({ "topic": "Rust", "skillLevel": "intermediate", "createdBy": "user-1" }))
        .await;
    response.assert_status(StatusCode::CREATED);

    let body: Value = response.json();
    assert_eq!(body["data"]["skillLevel"], "intermediate");
    assert_eq!(body["data"]["structure"]["levels"][0]["id"], "level-1");
    assert_eq!(body["data"]["prerequisites"]["intro"]["requiredTopics"][0], "tooling");

    let roadmap_id = body["data"]["roadmapId"].as_str().unwrap();
    let response = server
        .get(&format!("/api/roadmaps/{}/timeline", roadmap_id))
        .await;
    let body: Value = response.json();
    let weeks = body["data"].as_array().unwrap();
    assert_eq!(ids(&weeks[0]), vec!["tooling", "intro"]);
    assert_eq!(ids(&weeks[1]), vec!["syntax"]);
}

#[tokio::test]
async fn test_generate_roadmap_validation_and_llm_failure() {
    let server = create_test_server().await;
    let response = server
        .post("/api/roadmaps/generate")
        .json(&json!({ "topic": "Rust", "skillLevel": "guru", "createdBy": "user-1" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let server = create_test_server_with(true).await;
    let response = server
        .post("/api/roadmaps/generate")
        .json(&json!({ "topic": "Rust", "skillLevel": "pro", "createdBy": "user-1" }))
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = response.json();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_explain_topic() {
    let server = create_test_server().await;
    let roadmap_id = import(&server).await;

    let response = server
        .post(&format!("/api/roadmaps/{}/explain/b", roadmap_id))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["data"]["topic"]["id"], "b");
    assert_eq!(body["data"]["topic"]["title"], "B");
    assert_eq!(body["data"]["explanation"]["quickTips"][0], "Practice daily");
    let content = body["data"]["explanation"]["explanations"]["beginner"]["content"]
        .as_str()
        .unwrap();
    assert!(content.contains("Topic Title: B"));
    assert!(content.contains("No description provided"));
}

#[tokio::test]
async fn test_quiz_uses_defaults_and_request_options() {
    let server = create_test_server().await;
    let roadmap_id = import(&server).await;
    let path = format!("/api/roadmaps/{}/quiz/a", roadmap_id);

    let response = server.post(&path).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["topic"]["id"], "a");
    assert_eq!(body["data"]["quiz"]["title"], "Check");
    let question = body["data"]["quiz"]["questions"][0]["question"].as_str().unwrap();
    assert!(question.contains("Difficulty Level: intermediate"));
    assert!(question.contains("Number of Questions: 5"));

    let response = server
        .post(&path)
        .json(&json!({ "difficulty": "advanced", "questionCount": 8 }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    let question = body["data"]["quiz"]["questions"][0]["question"].as_str().unwrap();
    assert!(question.contains("Difficulty Level: advanced"));
    assert!(question.contains("Number of Questions: 8"));

    server
        .post(&path)
        .json(&json!({ "questionCount": 0 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .post(&path)
        .json(&json!({ "difficulty": "  " }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_study_material_rejects_unknown_ids() {
    let server = create_test_server().await;
    let roadmap_id = import(&server).await;

    // Section IDs are not subtopics.
    for route in ["explain", "quiz", "resources"] {
        let response = server
            .post(&format!("/api/roadmaps/{}/{}/s1", roadmap_id, route))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["success"], false);
    }

    server
        .post(&format!("/api/roadmaps/{}/projects/a", roadmap_id))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .post("/api/roadmaps/missing/explain/a")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resources_and_projects() {
    let server = create_test_server().await;
    let roadmap_id = import(&server).await;

    let response = server
        .post(&format!("/api/roadmaps/{}/resources/c", roadmap_id))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["topic"]["id"], "c");
    assert_eq!(body["data"]["resources"]["books"][0]["title"], "The Book");

    let response = server
        .post(&format!("/api/roadmaps/{}/projects/s1", roadmap_id))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"]["section"]["id"], "s1");
    assert_eq!(body["data"]["section"]["title"], "Section 1");
    assert_eq!(body["data"]["projects"][0]["title"], "Build a CLI");
    let brief = body["data"]["projects"][0]["brief"].as_str().unwrap();
    assert!(brief.contains("Topics Covered: A, B, C"));
}

#[tokio::test]
async fn test_study_material_llm_failure_is_503() {
    let server = create_test_server_with(true).await;
    let roadmap_id = import(&server).await;

    for path in ["explain/a", "quiz/a", "resources/a", "projects/s1"] {
        let response = server
            .post(&format!("/api/roadmaps/{}/{}", roadmap_id, path))
            .await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }
}
