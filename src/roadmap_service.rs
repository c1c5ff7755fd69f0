use anyhow::Result;
use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use std::time::Instant;

use crate::database::Database;
use crate::models::*;
use crate::roadmap_generator::RoadmapGenerator;
use crate::roadmap_graph::{build_roadmap_graph, layout_graph, GraphLayout, LayoutDirection};
use crate::timeline::{estimate_timeline_duration, generate_timeline_with, TimelineOptions, HOURS_PER_WEEK};
use crate::{log_service_start, log_service_success, log_service_warn, log_validation};

/// Duplicate-ID messages for the shared level/section/subtopic namespace.
pub fn validate_structure(structure: &RoadmapStructure) -> Vec<String> {
    structure.validate()
}

impl ProgressStats {
    /// Completion figures for one learner. IDs that name no subtopic are ignored.
    pub fn compute(structure: &RoadmapStructure, completed_ids: &HashSet<String>) -> Self {
        let mut stats = ProgressStats {
            total_topics: 0,
            completed_topics: 0,
            remaining_topics: 0,
            percentage_complete: 0,
            total_hours: 0.0,
            completed_hours: 0.0,
            remaining_hours: 0.0,
        };

        for (_, _, subtopic) in structure.subtopics() {
            let hours = subtopic.effective_hours();
            stats.total_topics += 1;
            stats.total_hours += hours;
            if completed_ids.contains(&subtopic.id) {
                stats.completed_topics += 1;
                stats.completed_hours += hours;
            }
        }

        stats.remaining_topics = stats.total_topics - stats.completed_topics;
        stats.remaining_hours = stats.total_hours - stats.completed_hours;
        if stats.total_topics > 0 {
            stats.percentage_complete =
                (stats.completed_topics as f64 * 100.0 / stats.total_topics as f64).round() as u32;
        }

        stats
    }
}

#[derive(Clone)]
pub struct RoadmapService {
    db: Database,
    generator: RoadmapGenerator,
    hours_per_week: f64,
}

impl RoadmapService {
    pub fn new(db: Database, generator: RoadmapGenerator) -> Self {
        Self {
            db,
            generator,
            hours_per_week: HOURS_PER_WEEK,
        }
    }

    /// Weekly capacity used when a request does not name one.
    pub fn with_hours_per_week(mut self, hours_per_week: f64) -> Self {
        self.hours_per_week = hours_per_week;
        self
    }

    // Roadmap CRUD operations
    pub async fn import_roadmap(&self, mut request: CreateRoadmapRequest) -> Result<Roadmap> {
        log_service_start!("roadmap_service", "import_roadmap", topic = request.topic);

        report_duplicates(&request.structure);
        if request.structure.metadata.is_none() {
            request.structure.compute_metadata();
        }

        let roadmap = self.db.create_roadmap(request).await?;
        log_service_success!("roadmap_service", "import_roadmap", format!("stored roadmap {}", roadmap.roadmap_id));
        Ok(roadmap)
    }

    /// Run the generation pipeline: blueprint, personalization, prerequisites.
    /// Nothing is stored; personalization and prerequisite failures degrade
    /// to the blueprint and an empty map.
    pub async fn draft_roadmap(
        &self,
        topic: &str,
        skill_level: SkillLevel,
    ) -> Result<(RoadmapStructure, PrerequisitesMap)> {
        let started = Instant::now();
        log_service_start!("roadmap_service", "draft_roadmap", topic = topic);

        let blueprint = self.generator.generate_blueprint(topic, skill_level).await?;
        let mut structure = self.generator.personalize(blueprint, skill_level).await;
        if structure.metadata.is_none() {
            structure.compute_metadata();
        }
        let prerequisites = self.generator.analyze_prerequisites(&structure).await;

        log_service_success!(
            "roadmap_service",
            "draft_roadmap",
            format!(
                "{} subtopics, {} prerequisite entries in {}ms",
                structure.subtopic_count(),
                prerequisites.len(),
                started.elapsed().as_millis()
            )
        );
        Ok((structure, prerequisites))
    }

    pub async fn get_roadmap(&self, roadmap_id: &str) -> Result<Option<Roadmap>> {
        self.db.get_roadmap(roadmap_id).await
    }

    pub async fn list_roadmaps(&self, created_by: &str) -> Result<Vec<Roadmap>> {
        self.db.list_roadmaps_by_creator(created_by).await
    }

    pub async fn update_roadmap(
        &self,
        roadmap_id: &str,
        mut request: UpdateRoadmapRequest,
    ) -> Result<Option<Roadmap>> {
        if let Some(structure) = request.structure.as_mut() {
            report_duplicates(structure);
            if structure.metadata.is_none() {
                structure.compute_metadata();
            }
        }
        self.db.update_roadmap(roadmap_id, request).await
    }

    pub async fn delete_roadmap(&self, roadmap_id: &str) -> Result<bool> {
        self.db.delete_roadmap(roadmap_id).await
    }

    // Derived views
    pub async fn timeline(
        &self,
        roadmap_id: &str,
        start_date: Option<NaiveDate>,
        hours_per_week: Option<f64>,
    ) -> Result<Option<Vec<TimelineWeek>>> {
        let started = Instant::now();
        log_service_start!("roadmap_service", "timeline", roadmap_id = roadmap_id);

        let Some(roadmap) = self.db.get_roadmap(roadmap_id).await? else {
            return Ok(None);
        };

        let options = TimelineOptions {
            hours_per_week: hours_per_week.unwrap_or(self.hours_per_week),
            start_date,
        };
        let weeks = generate_timeline_with(&roadmap.structure, Some(&roadmap.prerequisites), options);

        log_service_success!(
            "roadmap_service",
            "timeline",
            roadmap_id = roadmap_id,
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(Some(weeks))
    }

    pub async fn duration(
        &self,
        roadmap_id: &str,
        hours_per_week: Option<f64>,
    ) -> Result<Option<TimelineDuration>> {
        let Some(roadmap) = self.db.get_roadmap(roadmap_id).await? else {
            return Ok(None);
        };

        Ok(Some(estimate_timeline_duration(
            &roadmap.structure,
            hours_per_week.unwrap_or(self.hours_per_week),
            Utc::now().date_naive(),
        )))
    }

    pub async fn graph(
        &self,
        roadmap_id: &str,
        user_id: Option<&str>,
        direction: LayoutDirection,
    ) -> Result<Option<GraphLayout>> {
        let Some(roadmap) = self.db.get_roadmap(roadmap_id).await? else {
            return Ok(None);
        };

        let completed = match user_id {
            Some(user_id) => self.completed_topic_ids(roadmap_id, user_id).await?,
            None => HashSet::new(),
        };

        let graph = build_roadmap_graph(&roadmap.structure, Some(&roadmap.prerequisites), &completed);
        Ok(Some(layout_graph(&graph, direction)))
    }

    // Study material. Callers resolve the topic or section first.
    pub async fn explain_topic(&self, subtopic: &RoadmapSubtopic) -> Result<TopicExplanation> {
        log_service_start!("roadmap_service", "explain_topic", topic = subtopic.id);
        let explanation = self.generator.explain_topic(subtopic).await?;
        Ok(TopicExplanation {
            topic: subtopic.into(),
            explanation,
        })
    }

    pub async fn quiz(&self, subtopic: &RoadmapSubtopic, request: &QuizRequest) -> Result<TopicQuiz> {
        log_service_start!("roadmap_service", "quiz", topic = subtopic.id);
        let quiz = self
            .generator
            .generate_quiz(subtopic, request.difficulty.trim(), request.question_count)
            .await?;
        Ok(TopicQuiz {
            topic: subtopic.into(),
            quiz,
        })
    }

    pub async fn resources(&self, subtopic: &RoadmapSubtopic) -> Result<TopicResources> {
        log_service_start!("roadmap_service", "resources", topic = subtopic.id);
        let resources = self.generator.curate_resources(subtopic).await?;
        Ok(TopicResources {
            topic: subtopic.into(),
            resources,
        })
    }

    pub async fn projects(&self, section: &RoadmapSection) -> Result<SectionProjects> {
        log_service_start!("roadmap_service", "projects", topic = section.id);
        let projects = self.generator.design_projects(section).await?;
        Ok(SectionProjects {
            section: section.into(),
            projects,
        })
    }

    // Progress operations
    pub async fn get_progress(
        &self,
        roadmap_id: &str,
        user_id: &str,
    ) -> Result<Option<Vec<RoadmapProgress>>> {
        if self.db.get_roadmap(roadmap_id).await?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.db.get_progress(roadmap_id, user_id).await?))
    }

    pub async fn update_progress(
        &self,
        roadmap_id: &str,
        request: UpdateProgressRequest,
    ) -> Result<Option<RoadmapProgress>> {
        let Some(roadmap) = self.db.get_roadmap(roadmap_id).await? else {
            return Ok(None);
        };

        if !roadmap.structure.subtopics().any(|(_, _, s)| s.id == request.topic_id) {
            log_service_warn!(
                "roadmap_service",
                "update_progress",
                format!("topic '{}' is not a subtopic of roadmap {}", request.topic_id, roadmap_id)
            );
        }

        let progress = self
            .db
            .upsert_progress(roadmap_id, &request.user_id, &request.topic_id, request.completed)
            .await?;
        Ok(Some(progress))
    }

    pub async fn progress_stats(&self, roadmap_id: &str, user_id: &str) -> Result<Option<ProgressStats>> {
        let Some(roadmap) = self.db.get_roadmap(roadmap_id).await? else {
            return Ok(None);
        };

        let completed = self.completed_topic_ids(roadmap_id, user_id).await?;
        Ok(Some(ProgressStats::compute(&roadmap.structure, &completed)))
    }

    async fn completed_topic_ids(&self, roadmap_id: &str, user_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .db
            .get_progress(roadmap_id, user_id)
            .await?
            .into_iter()
            .filter(|p| p.completed)
            .map(|p| p.topic_id)
            .collect())
    }
}

fn report_duplicates(structure: &RoadmapStructure) {
    let errors = validate_structure(structure);
    if !errors.is_empty() {
        log_validation!(failure, "roadmap_structure", error = errors.join("; "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structure() -> RoadmapStructure {
        serde_json::from_value(serde_json::json!({
            "levels": [{
                "id": "l1",
                "title": "Basics",
                "sections": [{
                    "id": "s1",
                    "title": "Start",
                    "subtopics": [
                        { "id": "a", "title": "A" },
                        { "id": "b", "title": "B", "estimatedHours": 4.0 },
                        { "id": "c", "title": "C", "estimatedHours": 6.0 }
                    ]
                }]
            }]
        }))
        .expect("valid structure")
    }

    #[test]
    fn test_progress_stats_ignores_unknown_ids() {
        let completed: HashSet<String> = ["b".to_string(), "zzz".to_string()].into_iter().collect();
        let stats = ProgressStats::compute(&structure(), &completed);

        assert_eq!(stats.total_topics, 3);
        assert_eq!(stats.completed_topics, 1);
        assert_eq!(stats.remaining_topics, 2);
        assert_eq!(stats.percentage_complete, 33);
        assert_eq!(stats.total_hours, 12.0);
        assert_eq!(stats.completed_hours, 4.0);
        assert_eq!(stats.remaining_hours, 8.0);
    }

    #[test]
    fn test_progress_stats_rounds_percentage() {
        let completed: HashSet<String> = ["a".to_string(), "b".to_string()].into_iter().collect();
        let stats = ProgressStats::compute(&structure(), &completed);
        assert_eq!(stats.percentage_complete, 67);
    }

    #[test]
    fn test_progress_stats_empty_structure() {
        let stats = ProgressStats::compute(&RoadmapStructure::default(), &HashSet::new());
        assert_eq!(stats.total_topics, 0);
        assert_eq!(stats.percentage_complete, 0);
        assert_eq!(stats.total_hours, 0.0);
    }

    #[test]
    fn test_validate_structure_reports_shared_namespace() {
        let mut duplicated = structure();
        duplicated.levels[0].sections[0].subtopics[1].id = "s1".to_string();

        assert!(validate_structure(&structure()).is_empty());
        assert_eq!(validate_structure(&duplicated), vec!["Duplicate subtopic ID: s1".to_string()]);
    }
}
