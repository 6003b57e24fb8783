use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Video record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Video {
    pub id: Uuid,
    pub video_url: String,
    pub thumbnail_url: String,
    pub description: String,
    /// Seconds. Column `duration_secs`, `duration` on the wire.
    #[serde(rename = "duration")]
    pub duration_secs: f64,
    pub views: i64,
    pub is_published: bool,
    pub owner_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Video {
    pub fn new(
        owner_id: Uuid,
        video_url: String,
        thumbnail_url: String,
        description: String,
        duration_secs: f64,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            video_url,
            thumbnail_url,
            description,
            duration_secs,
            views: 0,
            is_published: true,
            owner_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Listing filter.
#[derive(Debug, Clone, Default)]
pub struct VideoQuery {
    pub owner_id: Option<Uuid>,
    pub include_unpublished: bool,
    pub limit: i64,
    pub offset: i64,
}
