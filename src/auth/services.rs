use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{AuthResponse, PublicUser},
        jwt::JwtKeys,
        password,
        repo::{save_user, UserStore},
        repo_types::{normalize, NewUser, User},
    },
    error::{AppError, AppResult, FieldError},
    state::AppState,
    upload::IncomingFile,
};

pub const MIN_PASSWORD_LEN: usize = 6;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[a-z0-9_.]{3,30}$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

#[derive(Default)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub avatar: Option<IncomingFile>,
    pub cover_image: Option<IncomingFile>,
}

pub(crate) fn validate_registration(input: &RegisterInput) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if !is_valid_username(&normalize(&input.username)) {
        errors.push(FieldError::new(
            "username",
            "must be 3-30 characters of a-z, 0-9, '_' or '.'",
        ));
    }
    if !is_valid_email(&normalize(&input.email)) {
        errors.push(FieldError::new("email", "is not a valid email address"));
    }
    if input.display_name.trim().is_empty() {
        errors.push(FieldError::new("display_name", "is required"));
    }
    if input.password.len() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new("password", "must be at least 6 characters"));
    }
    if input.avatar.is_none() {
        errors.push(FieldError::new("avatar", "file is required"));
    }
    errors
}

pub async fn register_user(state: &AppState, input: RegisterInput) -> AppResult<User> {
    let errors = validate_registration(&input);
    if !errors.is_empty() {
        warn!(count = errors.len(), "registration rejected");
        return Err(AppError::validation("Invalid registration", errors));
    }

    let username = normalize(&input.username);
    let email = normalize(&input.email);
    if let Some(existing) = state
        .users
        .find_by_login(Some(&username), Some(&email))
        .await?
    {
        let field = if existing.username == username { "username" } else { "email" };
        warn!(%field, "duplicate registration");
        return Err(AppError::duplicate(field));
    }

    let avatar = input
        .avatar
        .ok_or_else(|| AppError::invalid_field("avatar", "file is required"))?;
    let avatar_url = state.stager.upload(avatar).await?;
    let cover_image_url = state.stager.upload_optional(input.cover_image).await?;

    let mut user = User::new(NewUser {
        username,
        email,
        display_name: input.display_name,
        avatar_url,
        cover_image_url,
        password: input.password,
    });
    save_user(state.users.as_ref(), &mut user, true).await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Checks the credentials, issues a token pair and remembers a hash of the refresh token.
pub async fn login(
    users: &dyn UserStore,
    keys: &JwtKeys,
    username: Option<&str>,
    email: Option<&str>,
    plain: &str,
) -> AppResult<AuthResponse> {
    let username = username.map(normalize).filter(|s| !s.is_empty());
    let email = email.map(normalize).filter(|s| !s.is_empty());
    if username.is_none() && email.is_none() {
        return Err(AppError::invalid_field("username", "or email is required"));
    }

    let invalid = || AppError::Unauthorized("Invalid user credentials".into());
    let Some(mut user) = users
        .find_by_login(username.as_deref(), email.as_deref())
        .await?
    else {
        warn!("login for unknown user");
        return Err(invalid());
    };

    if !user.verify_password(plain)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    let identity = user.identity();
    let access_token = keys.issue_access(&identity)?;
    let refresh_token = keys.issue_refresh(&identity)?;

    let refresh_hash = password::hash_secret(&refresh_token)?;
    users
        .set_refresh_token_hash(user.id, Some(&refresh_hash))
        .await?;
    user.refresh_token_hash = Some(refresh_hash);

    info!(user_id = %user.id, "user logged in");
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser::from(&user),
    })
}

/// Forgets the stored refresh token hash.
pub async fn logout(users: &dyn UserStore, user_id: Uuid) -> AppResult<()> {
    users.set_refresh_token_hash(user_id, None).await?;
    info!(%user_id, "user logged out");
    Ok(())
}

pub async fn load_user(users: &dyn UserStore, id: Uuid) -> AppResult<User> {
    users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))
}

pub async fn change_password(
    users: &dyn UserStore,
    user_id: Uuid,
    old_password: &str,
    new_password: &str,
) -> AppResult<()> {
    if new_password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::invalid_field(
            "new_password",
            "must be at least 6 characters",
        ));
    }
    let mut user = load_user(users, user_id).await?;
    if !user.verify_password(old_password)? {
        return Err(AppError::validation(
            "Invalid old password",
            vec![FieldError::new("old_password", "is incorrect")],
        ));
    }
    user.set_password(new_password);
    user.hash_pending_password()?;
    users.set_password_hash(user_id, &user.password_hash).await?;
    info!(user_id = %user_id, "password changed");
    Ok(())
}

pub async fn update_account(
    users: &dyn UserStore,
    user_id: Uuid,
    display_name: Option<String>,
    email: Option<String>,
) -> AppResult<User> {
    if display_name.is_none() && email.is_none() {
        return Err(AppError::validation(
            "Nothing to update",
            vec![FieldError::new("display_name", "or email is required")],
        ));
    }
    let mut user = load_user(users, user_id).await?;
    if let Some(name) = display_name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::invalid_field("display_name", "must not be empty"));
        }
        user.display_name = name.to_string();
    }
    if let Some(email) = email {
        let email = normalize(&email);
        if !is_valid_email(&email) {
            return Err(AppError::invalid_field("email", "is not a valid email address"));
        }
        user.email = email;
    }
    save_user(users, &mut user, false).await?;
    Ok(user)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSlot {
    Avatar,
    Cover,
}

pub async fn replace_image(
    state: &AppState,
    user_id: Uuid,
    slot: ImageSlot,
    file: IncomingFile,
) -> AppResult<User> {
    load_user(state.users.as_ref(), user_id).await?;
    let url = state.stager.upload(file).await?;
    // reload after the upload so concurrent profile edits are kept
    let mut user = load_user(state.users.as_ref(), user_id).await?;
    match slot {
        ImageSlot::Avatar => user.avatar_url = url,
        ImageSlot::Cover => user.cover_image_url = Some(url),
    }
    save_user(state.users.as_ref(), &mut user, false).await?;
    Ok(user)
}
