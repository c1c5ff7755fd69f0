use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Hours assumed for a subtopic that carries no usable estimate.
pub const DEFAULT_SUBTOPIC_HOURS: f64 = 2.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapStructure {
    pub levels: Vec<RoadmapLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RoadmapMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_estimated_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_topics: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapLevel {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub sections: Vec<RoadmapSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapSection {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub subtopics: Vec<RoadmapSubtopic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisites: Option<Vec<String>>, // informational, the map is authoritative
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapSubtopic {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
}

impl RoadmapSubtopic {
    /// Estimated hours with the default applied to absent, zero, negative or
    /// non-finite values.
    pub fn effective_hours(&self) -> f64 {
        match self.estimated_hours {
            Some(hours) if hours.is_finite() && hours > 0.0 => hours,
            _ => DEFAULT_SUBTOPIC_HOURS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prerequisite {
    #[serde(default)]
    pub topic_id: String,
    #[serde(default)]
    pub required_topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_checks: Option<Vec<String>>,
}

pub type PrerequisitesMap = HashMap<String, Prerequisite>;

impl RoadmapStructure {
    /// Iterate subtopics in level -> section -> subtopic document order.
    pub fn subtopics(&self) -> impl Iterator<Item = (&RoadmapLevel, &RoadmapSection, &RoadmapSubtopic)> {
        self.levels.iter().flat_map(|level| {
            level.sections.iter().flat_map(move |section| {
                section
                    .subtopics
                    .iter()
                    .map(move |subtopic| (level, section, subtopic))
            })
        })
    }

    pub fn subtopic_count(&self) -> usize {
        self.subtopics().count()
    }

    /// First subtopic with this ID in document order.
    pub fn find_subtopic(&self, topic_id: &str) -> Option<&RoadmapSubtopic> {
        self.subtopics()
            .map(|(_, _, subtopic)| subtopic)
            .find(|subtopic| subtopic.id == topic_id)
    }

    pub fn find_section(&self, section_id: &str) -> Option<&RoadmapSection> {
        self.levels
            .iter()
            .flat_map(|level| level.sections.iter())
            .find(|section| section.id == section_id)
    }

    /// Report duplicate IDs across the shared level/section/subtopic namespace.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for level in &self.levels {
            if !seen.insert(level.id.as_str()) {
                errors.push(format!("Duplicate level ID: {}", level.id));
            }
            for section in &level.sections {
                if !seen.insert(section.id.as_str()) {
                    errors.push(format!("Duplicate section ID: {}", section.id));
                }
                for subtopic in &section.subtopics {
                    if !seen.insert(subtopic.id.as_str()) {
                        errors.push(format!("Duplicate subtopic ID: {}", subtopic.id));
                    }
                }
            }
        }

        errors
    }

    /// Recompute metadata from the level and section hour hints and the subtopic count.
    pub fn compute_metadata(&mut self) {
        let mut total_estimated_hours = 0.0;
        let mut total_topics = 0;

        for level in &self.levels {
            total_estimated_hours += level.estimated_hours.unwrap_or(0.0);
            for section in &level.sections {
                total_topics += section.subtopics.len();
                total_estimated_hours += section.estimated_hours.unwrap_or(0.0);
            }
        }

        self.metadata = Some(RoadmapMetadata {
            total_estimated_hours: Some(total_estimated_hours),
            total_topics: Some(total_topics),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Pro,
}

impl SkillLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkillLevel::Beginner => "beginner",
            SkillLevel::Intermediate => "intermediate",
            SkillLevel::Pro => "pro",
        }
    }
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkillLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(SkillLevel::Beginner),
            "intermediate" => Ok(SkillLevel::Intermediate),
            "pro" => Ok(SkillLevel::Pro),
            other => Err(anyhow::anyhow!(
                "Invalid skillLevel '{}'. Must be 'beginner', 'intermediate', or 'pro'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roadmap {
    pub roadmap_id: String,
    pub topic: String,
    pub skill_level: SkillLevel,
    pub structure: RoadmapStructure,
    pub prerequisites: PrerequisitesMap,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapProgress {
    pub roadmap_id: String,
    pub user_id: String,
    pub topic_id: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStats {
    pub total_topics: usize,
    pub completed_topics: usize,
    pub remaining_topics: usize,
    pub percentage_complete: u32,
    pub total_hours: f64,
    pub completed_hours: f64,
    pub remaining_hours: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDuration {
    pub total_weeks: u32,
    pub total_hours: f64,
    pub estimated_completion_date: NaiveDate,
}

/// The linearizer only emits `Subtopic`; the other kinds keep the wire `type`
/// field open for clients that also tag levels and sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineItemType {
    Level,
    Section,
    Subtopic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub item_type: TimelineItemType,
    pub estimated_hours: f64,
    pub prerequisites: Vec<String>,
    pub level_id: String,
    pub section_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineWeek {
    pub week_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub items: Vec<TimelineItem>,
    pub total_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRoadmapRequest {
    pub topic: String,
    pub skill_level: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoadmapRequest {
    pub topic: String,
    pub skill_level: SkillLevel,
    pub created_by: String,
    pub structure: RoadmapStructure,
    #[serde(default)]
    pub prerequisites: PrerequisitesMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoadmapRequest {
    pub structure: Option<RoadmapStructure>,
    pub prerequisites: Option<PrerequisitesMap>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressRequest {
    pub user_id: String,
    pub topic_id: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRequest {
    #[serde(default = "default_quiz_difficulty")]
    pub difficulty: String,
    #[serde(default = "default_question_count")]
    pub question_count: u32,
}

fn default_quiz_difficulty() -> String {
    "intermediate".to_string()
}

fn default_question_count() -> u32 {
    5
}

impl Default for QuizRequest {
    fn default() -> Self {
        Self {
            difficulty: default_quiz_difficulty(),
            question_count: default_question_count(),
        }
    }
}

// Study material. The generated documents are passed through untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSummary {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&RoadmapSubtopic> for TopicSummary {
    fn from(subtopic: &RoadmapSubtopic) -> Self {
        Self {
            id: subtopic.id.clone(),
            title: subtopic.title.clone(),
            description: subtopic.description.clone(),
        }
    }
}

impl From<&RoadmapSection> for TopicSummary {
    fn from(section: &RoadmapSection) -> Self {
        Self {
            id: section.id.clone(),
            title: section.title.clone(),
            description: section.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicExplanation {
    pub topic: TopicSummary,
    pub explanation: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicQuiz {
    pub topic: TopicSummary,
    pub quiz: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicResources {
    pub topic: TopicSummary,
    pub resources: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionProjects {
    pub section: TopicSummary,
    pub projects: serde_json::Value,
}
