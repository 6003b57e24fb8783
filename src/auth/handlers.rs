use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, State},
    routing::{get, patch, post},
    Router,
};
use axum_extra::extract::{cookie::CookieJar, WithRejection};
use tracing::instrument;

use crate::{
    auth::{
        cookies::{with_auth_cookies, without_auth_cookies},
        dto::{AuthResponse, ChangePasswordRequest, LoginRequest, PublicUser, UpdateAccountRequest},
        extractors::AuthUser,
        jwt::JwtKeys,
        services::{self, ImageSlot, RegisterInput},
    },
    error::{AppError, AppResult},
    extract::{ApiMultipart, MultipartForm, Payload},
    response::ApiResponse,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/change-password", post(change_password))
        .route("/users/me", get(get_me).patch(update_me))
}

pub fn upload_routes(limit: usize) -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/avatar", patch(update_avatar))
        .route("/users/cover-image", patch(update_cover_image))
        .layer(DefaultBodyLimit::max(limit))
}

#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    WithRejection(mp, _): ApiMultipart,
) -> AppResult<ApiResponse<PublicUser>> {
    let mut form = MultipartForm::read(mp).await?;
    let input = RegisterInput {
        username: form.take_text("username"),
        email: form.take_text("email"),
        display_name: form.take_text("display_name"),
        password: form.take_text("password"),
        avatar: form.take_file("avatar"),
        cover_image: form.take_file("cover_image"),
    };
    let user = services::register_user(&state, input).await?;
    Ok(ApiResponse::created(
        PublicUser::from(&user),
        "User registered successfully",
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Payload(payload): Payload<LoginRequest>,
) -> AppResult<(CookieJar, ApiResponse<AuthResponse>)> {
    let keys = JwtKeys::from_ref(&state);
    let res = services::login(
        state.users.as_ref(),
        &keys,
        payload.username.as_deref(),
        payload.email.as_deref(),
        &payload.password,
    )
    .await?;

    let jar = with_auth_cookies(
        jar,
        &keys,
        &res.access_token,
        &res.refresh_token,
        state.config.http.cookie_secure,
    );
    Ok((jar, ApiResponse::ok(res, "User logged in successfully")))
}

#[instrument(skip(state, jar))]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    jar: CookieJar,
) -> AppResult<(CookieJar, ApiResponse<()>)> {
    services::logout(state.users.as_ref(), user_id).await?;
    Ok((without_auth_cookies(jar), ApiResponse::ok((), "User logged out")))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> AppResult<ApiResponse<PublicUser>> {
    let user = services::load_user(state.users.as_ref(), user_id).await?;
    Ok(ApiResponse::ok(PublicUser::from(&user), "Current user fetched"))
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Payload(payload): Payload<UpdateAccountRequest>,
) -> AppResult<ApiResponse<PublicUser>> {
    let user =
        services::update_account(state.users.as_ref(), user_id, payload.display_name, payload.email)
            .await?;
    Ok(ApiResponse::ok(PublicUser::from(&user), "Account details updated"))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Payload(payload): Payload<ChangePasswordRequest>,
) -> AppResult<ApiResponse<()>> {
    services::change_password(
        state.users.as_ref(),
        user_id,
        &payload.old_password,
        &payload.new_password,
    )
    .await?;
    Ok(ApiResponse::ok((), "Password changed successfully"))
}

async fn replace_image(
    state: &AppState,
    user_id: uuid::Uuid,
    mp: Multipart,
    field: &str,
    slot: ImageSlot,
) -> AppResult<ApiResponse<PublicUser>> {
    let mut form = MultipartForm::read(mp).await?;
    let file = form
        .take_file(field)
        .ok_or_else(|| AppError::invalid_field(field, "file is required"))?;
    let user = services::replace_image(state, user_id, slot, file).await?;
    Ok(ApiResponse::ok(PublicUser::from(&user), "Image updated"))
}

#[instrument(skip(state, mp))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    WithRejection(mp, _): ApiMultipart,
) -> AppResult<ApiResponse<PublicUser>> {
    replace_image(&state, user_id, mp, "avatar", ImageSlot::Avatar).await
}

#[instrument(skip(state, mp))]
pub async fn update_cover_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    WithRejection(mp, _): ApiMultipart,
) -> AppResult<ApiResponse<PublicUser>> {
    replace_image(&state, user_id, mp, "cover_image", ImageSlot::Cover).await
}
