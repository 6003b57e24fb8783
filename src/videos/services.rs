use tracing::info;
use uuid::Uuid;

use super::repo_types::{Video, VideoQuery};
use crate::{
    error::{AppError, AppResult, FieldError},
    state::AppState,
    upload::IncomingFile,
};

pub struct PublishInput {
    pub description: String,
    pub duration: Option<String>,
    pub video_file: Option<IncomingFile>,
    pub thumbnail: Option<IncomingFile>,
}

fn parse_duration(raw: Option<&str>) -> Result<f64, FieldError> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty());
    match raw.map(str::parse::<f64>) {
        Some(Ok(d)) if d.is_finite() && d >= 0.0 => Ok(d),
        Some(_) => Err(FieldError::new("duration", "must be a non-negative number")),
        None => Err(FieldError::new("duration", "is required")),
    }
}

pub async fn publish_video(state: &AppState, owner_id: Uuid, input: PublishInput) -> AppResult<Video> {
    let mut errors = Vec::new();
    if input.description.trim().is_empty() {
        errors.push(FieldError::new("description", "is required"));
    }
    let duration = parse_duration(input.duration.as_deref()).map_err(|e| errors.push(e)).ok();
    if input.video_file.is_none() {
        errors.push(FieldError::new("video_file", "file is required"));
    }
    if input.thumbnail.is_none() {
        errors.push(FieldError::new("thumbnail", "file is required"));
    }
    let (Some(duration), Some(video_file), Some(thumbnail), true) =
        (duration, input.video_file, input.thumbnail, errors.is_empty())
    else {
        return Err(AppError::validation("Invalid video", errors));
    };

    if state.users.find_by_id(owner_id).await?.is_none() {
        return Err(AppError::invalid_field("owner", "must reference an existing user"));
    }

    let video_url = state.stager.upload(video_file).await?;
    let thumbnail_url = state.stager.upload(thumbnail).await?;

    let video = Video::new(
        owner_id,
        video_url,
        thumbnail_url,
        input.description.trim().to_string(),
        duration,
    );
    state.videos.insert(&video).await?;
    info!(video_id = %video.id, %owner_id, "video published");
    Ok(video)
}

async fn load_visible(state: &AppState, id: Uuid, viewer: Option<Uuid>) -> AppResult<Video> {
    match state.videos.find_by_id(id).await? {
        Some(v) if v.is_published || viewer == Some(v.owner_id) => Ok(v),
        _ => Err(AppError::NotFound("Video not found".into())),
    }
}

async fn load_owned(state: &AppState, id: Uuid, owner_id: Uuid) -> AppResult<Video> {
    let video = state
        .videos
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".into()))?;
    if video.owner_id != owner_id {
        return Err(AppError::Forbidden("Only the owner can modify this video".into()));
    }
    Ok(video)
}

/// Fetches a video for playback: counts the view and, for a signed-in
/// viewer, records it as their latest watched video.
pub async fn watch_video(state: &AppState, id: Uuid, viewer: Option<Uuid>) -> AppResult<Video> {
    load_visible(state, id, viewer).await?;
    let video = state
        .videos
        .record_view(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".into()))?;

    if let Some(viewer_id) = viewer {
        state.users.set_watch_history(viewer_id, video.id).await?;
    }
    Ok(video)
}

pub async fn list_videos(state: &AppState, query: VideoQuery) -> AppResult<Vec<Video>> {
    state.videos.list(&query).await
}

pub async fn update_video(
    state: &AppState,
    id: Uuid,
    owner_id: Uuid,
    description: Option<String>,
    duration: Option<f64>,
) -> AppResult<Video> {
    let mut video = load_owned(state, id, owner_id).await?;
    if let Some(desc) = description {
        let desc = desc.trim();
        if desc.is_empty() {
            return Err(AppError::invalid_field("description", "must not be empty"));
        }
        video.description = desc.to_string();
    }
    if let Some(d) = duration {
        if !d.is_finite() || d < 0.0 {
            return Err(AppError::invalid_field("duration", "must be a non-negative number"));
        }
        video.duration_secs = d;
    }
    video.updated_at = time::OffsetDateTime::now_utc();
    state.videos.update(&video).await?;
    Ok(video)
}

pub async fn toggle_publish(state: &AppState, id: Uuid, owner_id: Uuid) -> AppResult<Video> {
    let mut video = load_owned(state, id, owner_id).await?;
    video.is_published = !video.is_published;
    video.updated_at = time::OffsetDateTime::now_utc();
    state.videos.update(&video).await?;
    info!(video_id = %id, published = video.is_published, "publish status toggled");
    Ok(video)
}

pub async fn delete_video(state: &AppState, id: Uuid, owner_id: Uuid) -> AppResult<()> {
    load_owned(state, id, owner_id).await?;
    if !state.videos.delete(id).await? {
        return Err(AppError::NotFound("Video not found".into()));
    }
    info!(video_id = %id, "video deleted");
    Ok(())
}
