use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    handler::Handler,
    routing::{get, patch},
    Router,
};
use axum_extra::extract::WithRejection;
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{Pagination, UpdateVideoRequest},
    repo_types::{Video, VideoQuery},
    services::{self, PublishInput},
};
use crate::{
    auth::extractors::AuthUser,
    error::AppResult,
    extract::{ApiMultipart, ApiPath, ApiQuery, MultipartForm, Payload},
    response::ApiResponse,
    state::AppState,
};

// --- public routers ---

pub fn video_routes(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/videos",
            get(list_videos).post(publish_video.layer(DefaultBodyLimit::max(upload_limit))),
        )
        .route("/videos/:id", get(get_video).patch(update_video).delete(delete_video))
        .route("/videos/:id/toggle-publish", patch(toggle_publish))
}

// --- handlers ---

#[instrument(skip(state))]
pub async fn list_videos(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    WithRejection(Query(p), _): ApiQuery<Pagination>,
) -> AppResult<ApiResponse<Vec<Video>>> {
    let (limit, offset) = p.clamped();
    let viewer = viewer.map(|AuthUser(id)| id);
    let query = VideoQuery {
        owner_id: p.owner,
        // owners see their own drafts
        include_unpublished: p.owner.is_some() && p.owner == viewer,
        limit,
        offset,
    };
    let videos = services::list_videos(&state, query).await?;
    Ok(ApiResponse::ok(videos, "Videos fetched"))
}

#[instrument(skip(state))]
pub async fn get_video(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    WithRejection(Path(id), _): ApiPath<Uuid>,
) -> AppResult<ApiResponse<Video>> {
    let viewer = viewer.map(|AuthUser(id)| id);
    let video = services::watch_video(&state, id, viewer).await?;
    Ok(ApiResponse::ok(video, "Video fetched"))
}

/// POST /videos (multipart): `video_file`, `thumbnail`, `description`, `duration`
#[instrument(skip(state, mp))]
pub async fn publish_video(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    WithRejection(mp, _): ApiMultipart,
) -> AppResult<ApiResponse<Video>> {
    let mut form = MultipartForm::read(mp).await?;
    let input = PublishInput {
        description: form.take_text("description"),
        duration: form.text("duration").map(str::to_string),
        video_file: form.take_file("video_file"),
        thumbnail: form.take_file("thumbnail"),
    };
    let video = services::publish_video(&state, user_id, input).await?;
    Ok(ApiResponse::created(video, "Video published"))
}

#[instrument(skip(state, payload))]
pub async fn update_video(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    WithRejection(Path(id), _): ApiPath<Uuid>,
    Payload(payload): Payload<UpdateVideoRequest>,
) -> AppResult<ApiResponse<Video>> {
    let video =
        services::update_video(&state, id, user_id, payload.description, payload.duration)
            .await?;
    Ok(ApiResponse::ok(video, "Video updated"))
}

#[instrument(skip(state))]
pub async fn toggle_publish(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    WithRejection(Path(id), _): ApiPath<Uuid>,
) -> AppResult<ApiResponse<Video>> {
    let video = services::toggle_publish(&state, id, user_id).await?;
    Ok(ApiResponse::ok(video, "Publish status toggled"))
}

#[instrument(skip(state))]
pub async fn delete_video(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    WithRejection(Path(id), _): ApiPath<Uuid>,
) -> AppResult<ApiResponse<()>> {
    services::delete_video(&state, id, user_id).await?;
    Ok(ApiResponse::ok((), "Video deleted"))
}
