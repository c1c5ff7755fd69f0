use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    api_error,
    errors::ErrorResponse,
    models::*,
    roadmap_graph::{GraphLayout, LayoutDirection},
    roadmap_service::RoadmapService,
};

// Import logging macros
use crate::{log_api_error, log_api_start, log_api_success, log_api_warn};

#[derive(Clone)]
pub struct AppState {
    pub roadmap_service: RoadmapService,
}

#[derive(Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ErrorResponse>;
type CreatedResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ErrorResponse>;

/// Import body; the skill level stays a string so a bad value is a 400.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRoadmapRequest {
    pub topic: String,
    pub skill_level: String,
    pub created_by: String,
    pub structure: RoadmapStructure,
    #[serde(default)]
    pub prerequisites: PrerequisitesMap,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub created_by: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineParams {
    pub start_date: Option<String>,
    pub hours_per_week: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationParams {
    pub hours_per_week: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphParams {
    pub user_id: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserParams {
    pub user_id: Option<String>,
}

fn required<'a>(value: &'a Option<String>, name: &str, operation: &str) -> Result<&'a str, ErrorResponse> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(api_error!(validation, operation, "roadmap", format!("{} is required", name))),
    }
}

fn parse_skill_level(value: &str, operation: &str) -> Result<SkillLevel, ErrorResponse> {
    value
        .parse::<SkillLevel>()
        .map_err(|e| api_error!(validation, operation, "roadmap", e))
}

fn validate_hours(hours_per_week: Option<f64>, operation: &str) -> Result<Option<f64>, ErrorResponse> {
    match hours_per_week {
        Some(hours) if !(hours.is_finite() && hours > 0.0) => Err(api_error!(
            validation,
            operation,
            "timeline",
            "hoursPerWeek must be a positive number"
        )),
        other => Ok(other),
    }
}

// Roadmap endpoints
pub async fn generate_roadmap(
    State(state): State<AppState>,
    Json(request): Json<GenerateRoadmapRequest>,
) -> CreatedResult<Roadmap> {
    log_api_start!("generate_roadmap");

    if request.topic.trim().is_empty() {
        return Err(api_error!(validation, "generate_roadmap", "roadmap", "topic is required"));
    }
    if request.created_by.trim().is_empty() {
        return Err(api_error!(validation, "generate_roadmap", "roadmap", "createdBy is required"));
    }
    let skill_level = parse_skill_level(&request.skill_level, "generate_roadmap")?;

    let (structure, prerequisites) = state
        .roadmap_service
        .draft_roadmap(request.topic.trim(), skill_level)
        .await
        .map_err(|e| {
            log_api_error!("generate_roadmap", error = e, "roadmap generation failed");
            api_error!(llm, "generate_roadmap", "roadmap", e)
        })?;

    let roadmap = state
        .roadmap_service
        .import_roadmap(CreateRoadmapRequest {
            topic: request.topic.trim().to_string(),
            skill_level,
            created_by: request.created_by,
            structure,
            prerequisites,
        })
        .await
        .map_err(|e| api_error!(database, "generate_roadmap", "roadmap", &request.topic, e))?;

    log_api_success!("generate_roadmap", roadmap_id = roadmap.roadmap_id, "roadmap generated");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(roadmap))))
}

pub async fn import_roadmap(
    State(state): State<AppState>,
    Json(request): Json<ImportRoadmapRequest>,
) -> CreatedResult<Roadmap> {
    log_api_start!("import_roadmap");

    if request.topic.trim().is_empty() {
        return Err(api_error!(validation, "import_roadmap", "roadmap", "topic is required"));
    }
    if request.created_by.trim().is_empty() {
        return Err(api_error!(validation, "import_roadmap", "roadmap", "createdBy is required"));
    }
    let skill_level = parse_skill_level(&request.skill_level, "import_roadmap")?;

    let roadmap = state
        .roadmap_service
        .import_roadmap(CreateRoadmapRequest {
            topic: request.topic,
            skill_level,
            created_by: request.created_by,
            structure: request.structure,
            prerequisites: request.prerequisites,
        })
        .await
        .map_err(|e| api_error!(database, "import_roadmap", "roadmap", "new", e))?;

    log_api_success!("import_roadmap", roadmap_id = roadmap.roadmap_id, "roadmap imported");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(roadmap))))
}

pub async fn list_roadmaps(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<Roadmap>> {
    let created_by = required(&params.created_by, "createdBy", "list_roadmaps")?;
    log_api_start!("list_roadmaps");

    match state.roadmap_service.list_roadmaps(created_by).await {
        Ok(roadmaps) => {
            log_api_success!("list_roadmaps", count = roadmaps.len(), "roadmaps listed");
            Ok(Json(ApiResponse::success(roadmaps)))
        }
        Err(e) => Err(api_error!(database, "list_roadmaps", "roadmap", created_by, e)),
    }
}

pub async fn get_roadmap(
    State(state): State<AppState>,
    Path(roadmap_id): Path<String>,
) -> ApiResult<Roadmap> {
    log_api_start!("get_roadmap", roadmap_id = roadmap_id);

    match state.roadmap_service.get_roadmap(&roadmap_id).await {
        Ok(Some(roadmap)) => Ok(Json(ApiResponse::success(roadmap))),
        Ok(None) => Err(api_error!(not_found, "get_roadmap", "roadmap", &roadmap_id)),
        Err(e) => Err(api_error!(database, "get_roadmap", "roadmap", &roadmap_id, e)),
    }
}

pub async fn update_roadmap(
    State(state): State<AppState>,
    Path(roadmap_id): Path<String>,
    Json(request): Json<UpdateRoadmapRequest>,
) -> ApiResult<Roadmap> {
    log_api_start!("update_roadmap", roadmap_id = roadmap_id);

    if request.structure.is_none() && request.prerequisites.is_none() {
        return Err(api_error!(
            validation,
            "update_roadmap",
            "roadmap",
            "structure or prerequisites must be provided"
        ));
    }

    match state.roadmap_service.update_roadmap(&roadmap_id, request).await {
        Ok(Some(roadmap)) => {
            log_api_success!("update_roadmap", roadmap_id = roadmap_id, "roadmap updated");
            Ok(Json(ApiResponse::success(roadmap)))
        }
        Ok(None) => Err(api_error!(not_found, "update_roadmap", "roadmap", &roadmap_id)),
        Err(e) => Err(api_error!(database, "update_roadmap", "roadmap", &roadmap_id, e)),
    }
}

pub async fn delete_roadmap(
    State(state): State<AppState>,
    Path(roadmap_id): Path<String>,
) -> ApiResult<bool> {
    log_api_start!("delete_roadmap", roadmap_id = roadmap_id);

    match state.roadmap_service.delete_roadmap(&roadmap_id).await {
        Ok(true) => {
            log_api_success!("delete_roadmap", roadmap_id = roadmap_id, "roadmap deleted");
            Ok(Json(ApiResponse::success(true)))
        }
        Ok(false) => Err(api_error!(not_found, "delete_roadmap", "roadmap", &roadmap_id)),
        Err(e) => Err(api_error!(database, "delete_roadmap", "roadmap", &roadmap_id, e)),
    }
}

// Derived views
pub async fn get_timeline(
    State(state): State<AppState>,
    Path(roadmap_id): Path<String>,
    Query(params): Query<TimelineParams>,
) -> ApiResult<Vec<TimelineWeek>> {
    log_api_start!("get_timeline", roadmap_id = roadmap_id);

    let start_date = match params.start_date.as_deref() {
        Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            api_error!(
                validation,
                "get_timeline",
                "timeline",
                format!("Invalid startDate '{}'. Expected YYYY-MM-DD", raw)
            )
        })?),
        None => None,
    };
    let hours_per_week = validate_hours(params.hours_per_week, "get_timeline")?;

    match state
        .roadmap_service
        .timeline(&roadmap_id, start_date, hours_per_week)
        .await
    {
        Ok(Some(weeks)) => {
            log_api_success!("get_timeline", count = weeks.len(), "timeline generated");
            Ok(Json(ApiResponse::success(weeks)))
        }
        Ok(None) => Err(api_error!(not_found, "get_timeline", "roadmap", &roadmap_id)),
        Err(e) => Err(api_error!(database, "get_timeline", "roadmap", &roadmap_id, e)),
    }
}

pub async fn get_duration(
    State(state): State<AppState>,
    Path(roadmap_id): Path<String>,
    Query(params): Query<DurationParams>,
) -> ApiResult<TimelineDuration> {
    log_api_start!("get_duration", roadmap_id = roadmap_id);
    let hours_per_week = validate_hours(params.hours_per_week, "get_duration")?;

    match state.roadmap_service.duration(&roadmap_id, hours_per_week).await {
        Ok(Some(duration)) => Ok(Json(ApiResponse::success(duration))),
        Ok(None) => Err(api_error!(not_found, "get_duration", "roadmap", &roadmap_id)),
        Err(e) => Err(api_error!(database, "get_duration", "roadmap", &roadmap_id, e)),
    }
}

pub async fn get_graph(
    State(state): State<AppState>,
    Path(roadmap_id): Path<String>,
    Query(params): Query<GraphParams>,
) -> ApiResult<GraphLayout> {
    log_api_start!("get_graph", roadmap_id = roadmap_id);

    let direction = match params.direction.as_deref() {
        Some(raw) => raw
            .parse::<LayoutDirection>()
            .map_err(|e| api_error!(validation, "get_graph", "graph", e))?,
        None => LayoutDirection::default(),
    };
    let user_id = params.user_id.as_deref().filter(|id| !id.is_empty());

    match state.roadmap_service.graph(&roadmap_id, user_id, direction).await {
        Ok(Some(layout)) => Ok(Json(ApiResponse::success(layout))),
        Ok(None) => Err(api_error!(not_found, "get_graph", "roadmap", &roadmap_id)),
        Err(e) => Err(api_error!(database, "get_graph", "roadmap", &roadmap_id, e)),
    }
}

// Progress endpoints
pub async fn get_progress(
    State(state): State<AppState>,
    Path(roadmap_id): Path<String>,
    Query(params): Query<UserParams>,
) -> ApiResult<Vec<RoadmapProgress>> {
    let user_id = required(&params.user_id, "userId", "get_progress")?;
    log_api_start!("get_progress", roadmap_id = roadmap_id, user_id = user_id);

    match state.roadmap_service.get_progress(&roadmap_id, user_id).await {
        Ok(Some(progress)) => Ok(Json(ApiResponse::success(progress))),
        Ok(None) => Err(api_error!(not_found, "get_progress", "roadmap", &roadmap_id)),
        Err(e) => Err(api_error!(database, "get_progress", "roadmap", &roadmap_id, e)),
    }
}

pub async fn update_progress(
    State(state): State<AppState>,
    Path(roadmap_id): Path<String>,
    Json(request): Json<UpdateProgressRequest>,
) -> ApiResult<RoadmapProgress> {
    log_api_start!("update_progress", roadmap_id = roadmap_id, user_id = request.user_id);

    if request.topic_id.trim().is_empty() {
        log_api_warn!("update_progress", roadmap_id = roadmap_id, "empty topicId");
        return Err(api_error!(validation, "update_progress", "progress", "topicId is required"));
    }
    if request.user_id.trim().is_empty() {
        return Err(api_error!(validation, "update_progress", "progress", "userId is required"));
    }

    match state.roadmap_service.update_progress(&roadmap_id, request).await {
        Ok(Some(progress)) => {
            log_api_success!("update_progress", roadmap_id = roadmap_id, "progress recorded");
            Ok(Json(ApiResponse::success(progress)))
        }
        Ok(None) => Err(api_error!(not_found, "update_progress", "roadmap", &roadmap_id)),
        Err(e) => Err(api_error!(database, "update_progress", "progress", &roadmap_id, e)),
    }
}

pub async fn get_progress_stats(
    State(state): State<AppState>,
    Path(roadmap_id): Path<String>,
    Query(params): Query<UserParams>,
) -> ApiResult<ProgressStats> {
    let user_id = required(&params.user_id, "userId", "get_progress_stats")?;
    log_api_start!("get_progress_stats", roadmap_id = roadmap_id, user_id = user_id);

    match state.roadmap_service.progress_stats(&roadmap_id, user_id).await {
        Ok(Some(stats)) => Ok(Json(ApiResponse::success(stats))),
        Ok(None) => Err(api_error!(not_found, "get_progress_stats", "roadmap", &roadmap_id)),
        Err(e) => Err(api_error!(database, "get_progress_stats", "progress", &roadmap_id, e)),
    }
}

// Study material endpoints
async fn load_roadmap(state: &AppState, roadmap_id: &str, operation: &str) -> Result<Roadmap, ErrorResponse> {
    match state.roadmap_service.get_roadmap(roadmap_id).await {
        Ok(Some(roadmap)) => Ok(roadmap),
        Ok(None) => Err(api_error!(not_found, operation, "roadmap", roadmap_id)),
        Err(e) => Err(api_error!(database, operation, "roadmap", roadmap_id, e)),
    }
}

fn find_subtopic<'a>(roadmap: &'a Roadmap, topic_id: &str, operation: &str) -> Result<&'a RoadmapSubtopic, ErrorResponse> {
    roadmap
        .structure
        .find_subtopic(topic_id)
        .ok_or_else(|| api_error!(not_found, operation, "topic", topic_id))
}

pub async fn explain_topic(
    State(state): State<AppState>,
    Path((roadmap_id, topic_id)): Path<(String, String)>,
) -> ApiResult<TopicExplanation> {
    log_api_start!("explain_topic", roadmap_id = roadmap_id);

    let roadmap = load_roadmap(&state, &roadmap_id, "explain_topic").await?;
    let subtopic = find_subtopic(&roadmap, &topic_id, "explain_topic")?;

    match state.roadmap_service.explain_topic(subtopic).await {
        Ok(explanation) => {
            log_api_success!("explain_topic", roadmap_id = roadmap_id, "explanation generated");
            Ok(Json(ApiResponse::success(explanation)))
        }
        Err(e) => Err(api_error!(llm, "explain_topic", "topic", e)),
    }
}

pub async fn generate_quiz(
    State(state): State<AppState>,
    Path((roadmap_id, topic_id)): Path<(String, String)>,
    body: Option<Json<QuizRequest>>,
) -> ApiResult<TopicQuiz> {
    log_api_start!("generate_quiz", roadmap_id = roadmap_id);

    let request = body.map(|Json(request)| request).unwrap_or_default();
    if !(1..=20).contains(&request.question_count) {
        return Err(api_error!(validation, "generate_quiz", "quiz", "questionCount must be between 1 and 20"));
    }
    if request.difficulty.trim().is_empty() {
        return Err(api_error!(validation, "generate_quiz", "quiz", "difficulty must not be empty"));
    }

    let roadmap = load_roadmap(&state, &roadmap_id, "generate_quiz").await?;
    let subtopic = find_subtopic(&roadmap, &topic_id, "generate_quiz")?;

    match state.roadmap_service.quiz(subtopic, &request).await {
        Ok(quiz) => {
            log_api_success!("generate_quiz", roadmap_id = roadmap_id, "quiz generated");
            Ok(Json(ApiResponse::success(quiz)))
        }
        Err(e) => Err(api_error!(llm, "generate_quiz", "quiz", e)),
    }
}

pub async fn generate_resources(
    State(state): State<AppState>,
    Path((roadmap_id, topic_id)): Path<(String, String)>,
) -> ApiResult<TopicResources> {
    log_api_start!("generate_resources", roadmap_id = roadmap_id);

    let roadmap = load_roadmap(&state, &roadmap_id, "generate_resources").await?;
    let subtopic = find_subtopic(&roadmap, &topic_id, "generate_resources")?;

    match state.roadmap_service.resources(subtopic).await {
        Ok(resources) => Ok(Json(ApiResponse::success(resources))),
        Err(e) => Err(api_error!(llm, "generate_resources", "topic", e)),
    }
}

pub async fn generate_projects(
    State(state): State<AppState>,
    Path((roadmap_id, section_id)): Path<(String, String)>,
) -> ApiResult<SectionProjects> {
    log_api_start!("generate_projects", roadmap_id = roadmap_id);

    let roadmap = load_roadmap(&state, &roadmap_id, "generate_projects").await?;
    let section = roadmap
        .structure
        .find_section(&section_id)
        .ok_or_else(|| api_error!(not_found, "generate_projects", "section", &section_id))?;

    match state.roadmap_service.projects(section).await {
        Ok(projects) => {
            log_api_success!("generate_projects", roadmap_id = roadmap_id, "projects generated");
            Ok(Json(ApiResponse::success(projects)))
        }
        Err(e) => Err(api_error!(llm, "generate_projects", "section", e)),
    }
}

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "roadmap-planner",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Roadmap routes
        .route("/api/roadmaps", post(import_roadmap).get(list_roadmaps))
        .route("/api/roadmaps/generate", post(generate_roadmap))
        .route(
            "/api/roadmaps/:roadmap_id",
            get(get_roadmap).put(update_roadmap).delete(delete_roadmap),
        )
        .route("/api/roadmaps/:roadmap_id/timeline", get(get_timeline))
        .route("/api/roadmaps/:roadmap_id/duration", get(get_duration))
        .route("/api/roadmaps/:roadmap_id/graph", get(get_graph))
        // Progress routes
        .route(
            "/api/roadmaps/:roadmap_id/progress",
            get(get_progress).post(update_progress),
        )
        .route("/api/roadmaps/:roadmap_id/progress/stats", get(get_progress_stats))
        // Study material routes
        .route("/api/roadmaps/:roadmap_id/explain/:topic_id", post(explain_topic))
        .route("/api/roadmaps/:roadmap_id/quiz/:topic_id", post(generate_quiz))
        .route("/api/roadmaps/:roadmap_id/resources/:topic_id", post(generate_resources))
        .route("/api/roadmaps/:roadmap_id/projects/:section_id", post(generate_projects))
        .with_state(state)
}
