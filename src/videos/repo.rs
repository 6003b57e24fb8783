use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Video, VideoQuery};
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn insert(&self, video: &Video) -> AppResult<()>;
    async fn update(&self, video: &Video) -> AppResult<()>;
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Video>>;
    async fn list(&self, query: &VideoQuery) -> AppResult<Vec<Video>>;
    /// Adds one view and returns the updated record.
    async fn record_view(&self, id: Uuid) -> AppResult<Option<Video>>;
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
}

const VIDEO_COLUMNS: &str = "id, video_url, thumbnail_url, description, duration_secs, views, \
     is_published, owner_id, created_at, updated_at";

#[derive(Clone)]
pub struct PgVideoStore {
    db: PgPool,
}

impl PgVideoStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VideoStore for PgVideoStore {
    async fn insert(&self, video: &Video) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO videos (id, video_url, thumbnail_url, description, duration_secs, views,
                                is_published, owner_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(video.id)
        .bind(&video.video_url)
        .bind(&video.thumbnail_url)
        .bind(&video.description)
        .bind(video.duration_secs)
        .bind(video.views)
        .bind(video.is_published)
        .bind(video.owner_id)
        .bind(video.created_at)
        .bind(video.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn update(&self, video: &Video) -> AppResult<()> {
        // views are only ever moved by record_view
        let res = sqlx::query(
            r#"
            UPDATE videos
               SET description = $2, duration_secs = $3, is_published = $4,
                   thumbnail_url = $5, updated_at = $6
             WHERE id = $1
            "#,
        )
        .bind(video.id)
        .bind(&video.description)
        .bind(video.duration_secs)
        .bind(video.is_published)
        .bind(&video.thumbnail_url)
        .bind(video.updated_at)
        .execute(&self.db)
        .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound("Video not found".into()));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Video>> {
        let video = sqlx::query_as::<_, Video>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(video)
    }

    async fn list(&self, query: &VideoQuery) -> AppResult<Vec<Video>> {
        let rows = sqlx::query_as::<_, Video>(&format!(
            r#"
            SELECT {VIDEO_COLUMNS}
              FROM videos
             WHERE ($1::uuid IS NULL OR owner_id = $1)
               AND ($2 OR is_published)
             ORDER BY created_at DESC
             LIMIT $3 OFFSET $4
            "#
        ))
        .bind(query.owner_id)
        .bind(query.include_unpublished)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn record_view(&self, id: Uuid) -> AppResult<Option<Video>> {
        let video = sqlx::query_as::<_, Video>(&format!(
            "UPDATE videos SET views = views + 1 WHERE id = $1 RETURNING {VIDEO_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(video)
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let res = sqlx::query("DELETE FROM videos WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
