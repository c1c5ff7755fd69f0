use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::time::Instant;
use uuid::Uuid;

use crate::log_db_operation;
use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn parse_optional_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|s| parse_timestamp(&s).ok())
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Every connection to a private in-memory database would see its own copy
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roadmaps (
                roadmap_id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                skill_level TEXT NOT NULL,
                structure TEXT NOT NULL,
                prerequisites TEXT NOT NULL DEFAULT '{}',
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_roadmaps_created_by ON roadmaps (created_by, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roadmap_progress (
                roadmap_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                topic_id TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT,
                PRIMARY KEY (roadmap_id, user_id, topic_id),
                FOREIGN KEY (roadmap_id) REFERENCES roadmaps(roadmap_id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        log_db_operation!(info, "migrate", "schema ready");
        Ok(())
    }

    fn row_to_roadmap(row: &SqliteRow) -> Result<Roadmap> {
        let roadmap_id: String = row.get("roadmap_id");
        let skill_level: String = row.get("skill_level");
        let structure: String = row.get("structure");
        let prerequisites: String = row.get("prerequisites");

        Ok(Roadmap {
            skill_level: skill_level.parse()?,
            structure: serde_json::from_str(&structure)
                .with_context(|| format!("failed to decode structure of roadmap '{}'", roadmap_id))?,
            prerequisites: serde_json::from_str(&prerequisites).with_context(|| {
                format!("failed to decode prerequisites of roadmap '{}'", roadmap_id)
            })?,
            topic: row.get("topic"),
            created_by: row.get("created_by"),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            updated_at: parse_optional_timestamp(row.get("updated_at")),
            roadmap_id,
        })
    }

    fn row_to_progress(row: &SqliteRow) -> Result<RoadmapProgress> {
        Ok(RoadmapProgress {
            roadmap_id: row.get("roadmap_id"),
            user_id: row.get("user_id"),
            topic_id: row.get("topic_id"),
            completed: row.get("completed"),
            completed_at: parse_optional_timestamp(row.get("completed_at")),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            updated_at: parse_optional_timestamp(row.get("updated_at")),
        })
    }

    // Roadmap operations
    pub async fn create_roadmap(&self, request: CreateRoadmapRequest) -> Result<Roadmap> {
        let roadmap = Roadmap {
            roadmap_id: Uuid::new_v4().simple().to_string(),
            topic: request.topic,
            skill_level: request.skill_level,
            structure: request.structure,
            prerequisites: request.prerequisites,
            created_by: request.created_by,
            created_at: Utc::now(),
            updated_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO roadmaps (roadmap_id, topic, skill_level, structure, prerequisites,
                                  created_by, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&roadmap.roadmap_id)
        .bind(&roadmap.topic)
        .bind(roadmap.skill_level.as_str())
        .bind(serde_json::to_string(&roadmap.structure)?)
        .bind(serde_json::to_string(&roadmap.prerequisites)?)
        .bind(&roadmap.created_by)
        .bind(roadmap.created_at.to_rfc3339())
        .bind(roadmap.updated_at.map(|d| d.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(roadmap)
    }

    pub async fn get_roadmap(&self, roadmap_id: &str) -> Result<Option<Roadmap>> {
        let started = Instant::now();
        let row = sqlx::query("SELECT * FROM roadmaps WHERE roadmap_id = ?1")
            .bind(roadmap_id)
            .fetch_optional(&self.pool)
            .await?;

        log_db_operation!(
            debug,
            "select_roadmap",
            roadmap_id = roadmap_id,
            duration_ms = started.elapsed().as_millis() as u64
        );

        row.as_ref().map(Self::row_to_roadmap).transpose()
    }

    pub async fn list_roadmaps_by_creator(&self, created_by: &str) -> Result<Vec<Roadmap>> {
        let started = Instant::now();
        let rows = sqlx::query(
            "SELECT * FROM roadmaps WHERE created_by = ?1 ORDER BY created_at DESC, rowid DESC",
        )
        .bind(created_by)
        .fetch_all(&self.pool)
        .await?;

        log_db_operation!(
            debug,
            "list_roadmaps",
            count = rows.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );

        rows.iter().map(Self::row_to_roadmap).collect()
    }

    pub async fn update_roadmap(
        &self,
        roadmap_id: &str,
        request: UpdateRoadmapRequest,
    ) -> Result<Option<Roadmap>> {
        let mut roadmap = match self.get_roadmap(roadmap_id).await? {
            Some(roadmap) => roadmap,
            None => return Ok(None),
        };

        if let Some(structure) = request.structure {
            roadmap.structure = structure;
        }
        if let Some(prerequisites) = request.prerequisites {
            roadmap.prerequisites = prerequisites;
        }
        roadmap.updated_at = Some(Utc::now());

        sqlx::query(
            r#"
            UPDATE roadmaps
            SET structure = ?1, prerequisites = ?2, updated_at = ?3
            WHERE roadmap_id = ?4
            "#,
        )
        .bind(serde_json::to_string(&roadmap.structure)?)
        .bind(serde_json::to_string(&roadmap.prerequisites)?)
        .bind(roadmap.updated_at.map(|d| d.to_rfc3339()))
        .bind(roadmap_id)
        .execute(&self.pool)
        .await?;

        Ok(Some(roadmap))
    }

    pub async fn delete_roadmap(&self, roadmap_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM roadmap_progress WHERE roadmap_id = ?1")
            .bind(roadmap_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM roadmaps WHERE roadmap_id = ?1")
            .bind(roadmap_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // Progress operations
    pub async fn get_progress(&self, roadmap_id: &str, user_id: &str) -> Result<Vec<RoadmapProgress>> {
        let rows = sqlx::query(
            "SELECT * FROM roadmap_progress WHERE roadmap_id = ?1 AND user_id = ?2 ORDER BY created_at, topic_id",
        )
        .bind(roadmap_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_progress).collect()
    }

    pub async fn upsert_progress(
        &self,
        roadmap_id: &str,
        user_id: &str,
        topic_id: &str,
        completed: bool,
    ) -> Result<RoadmapProgress> {
        let now = Utc::now().to_rfc3339();
        let completed_at = completed.then(|| now.clone());

        sqlx::query(
            r#"
            INSERT INTO roadmap_progress (roadmap_id, user_id, topic_id, completed, completed_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)
            ON CONFLICT (roadmap_id, user_id, topic_id) DO UPDATE SET
                completed = excluded.completed,
                completed_at = excluded.completed_at,
                updated_at = ?6
            "#,
        )
        .bind(roadmap_id)
        .bind(user_id)
        .bind(topic_id)
        .bind(completed)
        .bind(completed_at)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT * FROM roadmap_progress WHERE roadmap_id = ?1 AND user_id = ?2 AND topic_id = ?3",
        )
        .bind(roadmap_id)
        .bind(user_id)
        .bind(topic_id)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_progress(&row)
    }
}
