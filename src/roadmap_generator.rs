use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::llm_providers::{
    CompletionProvider, JsonResponseParser, LLMProviderFactory, LLMProviderType, LLMRequestError,
};
use crate::models::{PrerequisitesMap, RoadmapSection, RoadmapStructure, RoadmapSubtopic, SkillLevel};
use crate::{log_llm_operation, log_validation};

use serde::Deserialize;
use serde_json::Value;

const BLUEPRINT_SYSTEM_PROMPT: &str = r#"You are an expert educational roadmap generator. Create a comprehensive, hierarchical learning roadmap organized as Levels -> Sections -> Subtopics.

Requirements:
- Every id is unique across the whole document (levels, sections and subtopics share one namespace)
- No topic appears twice and nothing depends on itself
- Levels progress from fundamentals to advanced material (typically 3-5 levels)
- Every subtopic has id, title, description and estimatedHours (typically 1-5)

Respond with valid JSON only, in exactly this shape:
{
  "levels": [
    {
      "id": "level-1",
      "title": "Foundation Level",
      "description": "Basic concepts",
      "estimatedHours": 40,
      "sections": [
        {
          "id": "section-1-1",
          "title": "Introduction",
          "description": "Overview",
          "estimatedHours": 10,
          "subtopics": [
            { "id": "subtopic-1-1-1", "title": "What is X?", "description": "Definition", "estimatedHours": 2 }
          ]
        }
      ]
    }
  ]
}"#;

const PERSONALIZE_SYSTEM_PROMPT: &str = r#"You personalize learning roadmaps for a learner's skill level.
- beginner: keep fundamentals, remove advanced topics
- intermediate: keep fundamentals briefly, focus on intermediate topics
- pro: keep everything, emphasize advanced topics

Keep every id you retain unchanged. Respond with valid JSON only, using the same shape as the input roadmap."#;

const PREREQUISITES_SYSTEM_PROMPT: &str = r#"You analyze learning dependencies in a roadmap. For each section or subtopic, list the ids that must be completed first and the skills to verify before continuing.

Rules:
- Only reference ids that exist in the roadmap
- Only include prerequisites that are actually necessary
- Never create circular dependencies

Respond with valid JSON only, in exactly this shape:
{
  "prerequisites": {
    "topic-id": {
      "topicId": "topic-id",
      "requiredTopics": ["other-id"],
      "skillChecks": ["Can explain X"]
    }
  }
}"#;

const EXPLANATION_SYSTEM_PROMPT: &str = r#"You are an expert educator who explains technical topics clearly at three depths.

Cover:
- beginner: plain language, an everyday analogy, the key takeaway
- intermediate: how it works, common use cases, best practices
- expert: internals, architecture, performance, edge cases
Also list 3-5 key concepts, 2-3 worked examples, common mistakes, related topics and quick tips.

Respond with valid JSON only, in exactly this shape:
{
  "explanations": {
    "beginner": { "title": "...", "content": "...", "analogy": "...", "keyTakeaway": "..." },
    "intermediate": { "title": "...", "content": "...", "useCases": ["..."], "bestPractices": ["..."] },
    "expert": { "title": "...", "content": "...", "architecture": "...", "performance": "...", "advancedTopics": ["..."] }
  },
  "keyConcepts": [{ "concept": "...", "explanation": "..." }],
  "examples": [{ "title": "...", "description": "...", "code": "...", "explanation": "..." }],
  "commonMistakes": [{ "mistake": "...", "why": "...", "correct": "..." }],
  "relatedTopics": [{ "topic": "...", "relationship": "..." }],
  "quickTips": ["..."]
}"#;

const QUIZ_SYSTEM_PROMPT: &str = r#"You are an expert assessment designer. Write fair quiz questions that test understanding rather than recall.

Mix question types (multiple_choice with 4 options, true_false, code_output, fill_blank, scenario) and difficulties (about 40% easy, 40% medium, 20% hard). Every question has one correct answer and an explanation.

Respond with valid JSON only, in exactly this shape:
{
  "quiz": {
    "title": "Quiz title",
    "totalQuestions": 5,
    "passingScore": 70,
    "questions": [
      {
        "id": 1,
        "question": "...",
        "type": "multiple_choice",
        "difficulty": "easy",
        "options": ["A", "B", "C", "D"],
        "correctAnswer": "B",
        "explanation": "...",
        "conceptTested": "...",
        "hints": ["..."]
      }
    ]
  }
}"#;

const RESOURCES_SYSTEM_PROMPT: &str = r#"You are an expert learning resource curator. Recommend only real, existing resources from reputable sources, 3-5 per category, mixing introductory and in-depth material.

Respond with valid JSON only, in exactly this shape:
{
  "resources": {
    "freeCourses": [{ "title": "...", "provider": "...", "url": "https://...", "description": "...", "estimatedHours": 10 }],
    "paidCourses": [{ "title": "...", "provider": "...", "url": "https://...", "price": "...", "description": "..." }],
    "articles": [{ "title": "...", "author": "...", "url": "https://...", "description": "..." }],
    "documentation": [{ "title": "...", "source": "...", "url": "https://...", "description": "..." }],
    "videos": [{ "title": "...", "channel": "...", "url": "https://...", "duration": "15 min" }],
    "books": [{ "title": "...", "author": "...", "isbn": "...", "description": "..." }],
    "practice": [{ "title": "...", "platform": "...", "url": "https://...", "description": "..." }],
    "githubRepos": [{ "title": "...", "url": "https://github.com/...", "stars": "...", "description": "..." }]
  }
}"#;

const PROJECTS_SYSTEM_PROMPT: &str = r#"You are an expert curriculum designer who creates practical, hands-on learning projects that apply a section's material.

Respond with valid JSON only, in exactly this shape:
{
  "projects": [
    {
      "title": "...",
      "difficulty": "beginner|intermediate|advanced",
      "estimatedHours": 8,
      "description": "...",
      "learningObjectives": ["..."],
      "prerequisites": ["..."],
      "features": [{ "feature": "...", "description": "..." }],
      "bonusFeatures": ["..."],
      "techStack": ["..."],
      "acceptanceCriteria": ["..."],
      "hints": ["..."],
      "exampleUseCase": "..."
    }
  ]
}"#;

#[derive(Debug, Deserialize)]
struct PrerequisitesEnvelope {
    #[serde(default)]
    prerequisites: PrerequisitesMap,
}

/// Retry and timeout policy for completion calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub timeout: Duration,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            timeout: Duration::from_secs(120),
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }
}

/// Only timeouts and rate limiting are worth another attempt.
pub fn is_retryable(error: &anyhow::Error) -> bool {
    if let Some(request_error) = error.downcast_ref::<LLMRequestError>() {
        return matches!(
            request_error,
            LLMRequestError::RateLimited { .. } | LLMRequestError::Timeout(_)
        );
    }
    if let Some(reqwest_error) = error.downcast_ref::<reqwest::Error>() {
        return reqwest_error.is_timeout();
    }

    let message = error.to_string().to_lowercase();
    message.contains("timeout") || message.contains("429") || message.contains("rate limit")
}

#[derive(Clone)]
pub struct RoadmapGenerator {
    provider: Arc<dyn CompletionProvider>,
    json_parser: JsonResponseParser,
    retry_policy: RetryPolicy,
}

impl RoadmapGenerator {
    pub fn new_with_provider(
        api_key: String,
        base_url: Option<String>,
        provider_type: LLMProviderType,
        model: Option<String>,
    ) -> Self {
        let provider = LLMProviderFactory::create_provider(provider_type, api_key, base_url, model);
        Self::from_provider(Arc::new(provider))
    }

    pub fn from_provider(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            json_parser: JsonResponseParser,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Get the provider name for logging and testing
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Get the model name being used
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    async fn complete_with_retry(
        &self,
        operation: &str,
        system_message: &str,
        prompt: &str,
    ) -> Result<String> {
        let policy = self.retry_policy;
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                let delay = policy.backoff_delay(attempt);
                info!(
                    operation = operation,
                    attempt = attempt + 1,
                    max_attempts = policy.max_retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying LLM request"
                );
                tokio::time::sleep(delay).await;
            }

            log_llm_operation!(start, operation, provider = self.provider_name(), attempt = attempt + 1);
            let started = Instant::now();

            let result = match tokio::time::timeout(
                policy.timeout,
                self.provider.complete(Some(system_message), prompt),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(LLMRequestError::Timeout(policy.timeout.as_secs()).into()),
            };

            match result {
                Ok(text) => {
                    log_llm_operation!(
                        success,
                        operation,
                        provider = self.provider_name(),
                        duration_ms = started.elapsed().as_millis() as u64
                    );
                    return Ok(text);
                }
                Err(e) => {
                    log_llm_operation!(
                        error,
                        operation,
                        provider = self.provider_name(),
                        error = e,
                        retry_count = attempt
                    );
                    if attempt >= policy.max_retries || !is_retryable(&e) {
                        return Err(e);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Ask the model for a Levels -> Sections -> Subtopics roadmap.
    pub async fn generate_blueprint(
        &self,
        topic: &str,
        skill_level: SkillLevel,
    ) -> Result<RoadmapStructure> {
        info!(topic = %topic, skill_level = %skill_level, "Generating roadmap blueprint");

        let prompt = format!(
            "Generate a roadmap for: {}\nTarget skill level: {}\n\nMake it comprehensive but appropriate for {} learners. Return the roadmap structure as JSON.",
            topic, skill_level, skill_level
        );

        let response_text = self
            .complete_with_retry("generate_blueprint", BLUEPRINT_SYSTEM_PROMPT, &prompt)
            .await?;
        debug!(response_length = response_text.len(), "Raw LLM response for roadmap blueprint");

        let mut structure: RoadmapStructure = self
            .json_parser
            .parse_json_response(&response_text)
            .map_err(|e| {
                error!(topic = %topic, error = %e, "Failed to parse roadmap blueprint JSON");
                anyhow::anyhow!("Failed to generate roadmap: {}", e)
            })?;

        if structure.levels.is_empty() {
            return Err(anyhow::anyhow!("Failed to generate roadmap: response contained no levels"));
        }

        report_validation(&structure);
        structure.compute_metadata();

        info!(
            topic = %topic,
            level_count = structure.levels.len(),
            subtopic_count = structure.subtopic_count(),
            "Roadmap blueprint generated"
        );
        Ok(structure)
    }

    /// Tailor a structure to the skill level; any failure keeps the input as-is.
    pub async fn personalize(
        &self,
        structure: RoadmapStructure,
        skill_level: SkillLevel,
    ) -> RoadmapStructure {
        let roadmap_json = match serde_json::to_string_pretty(&structure) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Could not serialize roadmap for personalization");
                return structure;
            }
        };

        let prompt = format!(
            "Personalize this roadmap for skill level: {}\n\nCurrent roadmap structure:\n{}\n\nReturn the personalized roadmap structure as JSON.",
            skill_level, roadmap_json
        );

        let response = self
            .complete_with_retry("personalize_roadmap", PERSONALIZE_SYSTEM_PROMPT, &prompt)
            .await
            .and_then(|text| self.json_parser.parse_json_response::<RoadmapStructure>(&text));

        match response {
            Ok(mut personalized) if !personalized.levels.is_empty() => {
                report_validation(&personalized);
                personalized.compute_metadata();
                personalized
            }
            Ok(_) => {
                log_llm_operation!(warn, "personalize_roadmap", "empty roadmap returned, keeping original");
                structure
            }
            Err(e) => {
                log_llm_operation!(warn, "personalize_roadmap", format!("keeping original roadmap: {}", e));
                structure
            }
        }
    }

    /// Ask the model which topics depend on which; any failure yields an empty map.
    pub async fn analyze_prerequisites(&self, structure: &RoadmapStructure) -> PrerequisitesMap {
        let roadmap_json = match serde_json::to_string_pretty(structure) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Could not serialize roadmap for prerequisite analysis");
                return PrerequisitesMap::new();
            }
        };

        let mut topic_list = Vec::new();
        for level in &structure.levels {
            for section in &level.sections {
                topic_list.push(format!("- {}: {} (section)", section.id, section.title));
                for subtopic in &section.subtopics {
                    topic_list.push(format!("- {}: {} (subtopic)", subtopic.id, subtopic.title));
                }
            }
        }

        let prompt = format!(
            "Analyze prerequisites for this roadmap structure:\n\n{}\n\nAvailable topic IDs:\n{}\n\nReturn the prerequisites analysis as JSON.",
            roadmap_json,
            topic_list.join("\n")
        );

        let response = self
            .complete_with_retry("analyze_prerequisites", PREREQUISITES_SYSTEM_PROMPT, &prompt)
            .await
            .and_then(|text| self.json_parser.parse_json_response::<PrerequisitesEnvelope>(&text));

        match response {
            Ok(envelope) => {
                let mut prerequisites = envelope.prerequisites;
                for (topic_id, entry) in prerequisites.iter_mut() {
                    if entry.topic_id.is_empty() {
                        entry.topic_id = topic_id.clone();
                    }
                }
                info!(entry_count = prerequisites.len(), "Prerequisites analyzed");
                prerequisites
            }
            Err(e) => {
                log_llm_operation!(warn, "analyze_prerequisites", format!("using empty prerequisites: {}", e));
                PrerequisitesMap::new()
            }
        }
    }

    /// Layered explanation of one subtopic.
    pub async fn explain_topic(&self, subtopic: &RoadmapSubtopic) -> Result<Value> {
        let prompt = format!(
            "Topic Title: {}\nTopic Description: {}\n\nExplain this topic with examples, key concepts, common mistakes and practical tips.",
            subtopic.title,
            describe(subtopic.description.as_deref())
        );
        self.study_material("explain_topic", EXPLANATION_SYSTEM_PROMPT, &prompt, None)
            .await
    }

    pub async fn generate_quiz(
        &self,
        subtopic: &RoadmapSubtopic,
        difficulty: &str,
        question_count: u32,
    ) -> Result<Value> {
        let prompt = format!(
            "Topic Title: {}\nTopic Description: {}\nDifficulty Level: {}\nNumber of Questions: {}\n\nGenerate a quiz that assesses understanding of this topic.",
            subtopic.title,
            describe(subtopic.description.as_deref()),
            difficulty,
            question_count
        );
        self.study_material("generate_quiz", QUIZ_SYSTEM_PROMPT, &prompt, Some("quiz"))
            .await
    }

    pub async fn curate_resources(&self, subtopic: &RoadmapSubtopic) -> Result<Value> {
        let prompt = format!(
            "Topic Title: {}\nTopic Description: {}\n\nRecommend learning resources for this topic. Use real URLs only.",
            subtopic.title,
            describe(subtopic.description.as_deref())
        );
        self.study_material("curate_resources", RESOURCES_SYSTEM_PROMPT, &prompt, Some("resources"))
            .await
    }

    /// Hands-on projects covering every subtopic of a section.
    pub async fn design_projects(&self, section: &RoadmapSection) -> Result<Value> {
        let topics: Vec<&str> = section.subtopics.iter().map(|s| s.title.as_str()).collect();
        let prompt = format!(
            "Section Title: {}\nSection Description: {}\nTopics Covered: {}\n\nDesign 3-5 projects of varying difficulty that apply these topics.",
            section.title,
            describe(section.description.as_deref()),
            topics.join(", ")
        );
        self.study_material("design_projects", PROJECTS_SYSTEM_PROMPT, &prompt, Some("projects"))
            .await
    }

    /// Complete, parse, and unwrap `key` when the model wrapped its answer in it.
    async fn study_material(
        &self,
        operation: &str,
        system_message: &str,
        prompt: &str,
        key: Option<&str>,
    ) -> Result<Value> {
        let response_text = self.complete_with_retry(operation, system_message, prompt).await?;
        debug!(operation = operation, response_length = response_text.len(), "Raw LLM response");

        let mut document: Value = self
            .json_parser
            .parse_json_response(&response_text)
            .map_err(|e| {
                error!(operation = operation, error = %e, "Failed to parse study material JSON");
                anyhow::anyhow!("Failed to generate {}: {}", operation, e)
            })?;

        let inner = key.and_then(|key| document.get_mut(key)).map(Value::take);
        Ok(inner.unwrap_or(document))
    }
}

fn describe(description: Option<&str>) -> &str {
    match description {
        Some(text) if !text.trim().is_empty() => text,
        _ => "No description provided",
    }
}

fn report_validation(structure: &RoadmapStructure) {
    let errors = structure.validate();
    if errors.is_empty() {
        log_validation!(success, "roadmap_structure", "no duplicate ids");
    } else {
        for message in &errors {
            log_validation!(failure, "roadmap_structure", error = message);
        }
    }
}
