use std::fmt;

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{claims::Identity, password};

/// Trim + lowercase, applied to usernames and emails before they are stored or looked up.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// A plaintext password waiting to be hashed. Never printed.
#[derive(Clone, Default)]
pub struct PendingPassword(String);

impl fmt::Debug for PendingPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingPassword(***)")
    }
}

/// Fields needed to register a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
    pub password: String,
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
    pub watch_history: Option<Uuid>, // last video watched
    pub password_hash: String,       // Argon2 PHC string
    pub refresh_token_hash: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    #[sqlx(skip)]
    pending_password: Option<PendingPassword>,
}

impl User {
    pub fn new(input: NewUser) -> Self {
        let now = OffsetDateTime::now_utc();
        let mut user = Self {
            id: Uuid::new_v4(),
            username: normalize(&input.username),
            email: normalize(&input.email),
            display_name: input.display_name.trim().to_string(),
            avatar_url: input.avatar_url,
            cover_image_url: input.cover_image_url,
            watch_history: None,
            password_hash: String::new(),
            refresh_token_hash: None,
            created_at: now,
            updated_at: now,
            pending_password: None,
        };
        user.set_password(&input.password);
        user
    }

    /// Marks the password as changed. The hash is only recomputed by
    /// [`Self::hash_pending_password`], right before the record is written.
    pub fn set_password(&mut self, plain: &str) {
        self.pending_password = Some(PendingPassword(plain.to_string()));
    }

    #[cfg(test)]
    pub fn password_modified(&self) -> bool {
        self.pending_password.is_some()
    }

    /// Replaces the stored hash when a new plaintext was set; otherwise leaves
    /// it untouched. Returns whether a hash was computed.
    pub fn hash_pending_password(&mut self) -> anyhow::Result<bool> {
        let Some(PendingPassword(plain)) = self.pending_password.take() else {
            return Ok(false);
        };
        self.password_hash = password::hash_secret(&plain)?;
        Ok(true)
    }

    pub fn verify_password(&self, candidate: &str) -> anyhow::Result<bool> {
        if self.password_hash.is_empty() {
            anyhow::bail!("password has not been hashed yet");
        }
        password::verify_secret(candidate, &self.password_hash)
    }

    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> User {
        User::new(NewUser {
            username: "  Ada ".into(),
            email: "ADA@x.com".into(),
            display_name: "Ada Lovelace".into(),
            avatar_url: "https://media.test/ada.png".into(),
            cover_image_url: None,
            password: "secret1".into(),
        })
    }

    #[test]
    fn new_user_is_normalized_and_pending_hash() {
        let user = ada();
        assert_eq!(user.username, "ada");
        assert_eq!(user.email, "ada@x.com");
        assert!(user.password_modified());
        assert!(user.password_hash.is_empty());
    }

    #[test]
    fn hashed_password_verifies_only_the_original() {
        let mut user = ada();
        assert!(user.hash_pending_password().unwrap());
        assert_ne!(user.password_hash, "secret1");
        assert!(user.verify_password("secret1").unwrap());
        assert!(!user.verify_password("wrong").unwrap());
    }

    #[test]
    fn rehash_without_change_keeps_hash() {
        let mut user = ada();
        user.hash_pending_password().unwrap();
        let before = user.password_hash.clone();

        user.display_name = "Countess".into();
        assert!(!user.hash_pending_password().unwrap());
        assert_eq!(user.password_hash, before);
    }

    #[test]
    fn changing_password_replaces_hash() {
        let mut user = ada();
        user.hash_pending_password().unwrap();
        let before = user.password_hash.clone();

        user.set_password("secret2");
        assert!(user.hash_pending_password().unwrap());
        assert_ne!(user.password_hash, before);
        assert!(user.verify_password("secret2").unwrap());
        assert!(!user.verify_password("secret1").unwrap());
    }

    #[test]
    fn debug_output_never_contains_plaintext() {
        let user = ada();
        assert!(!format!("{:?}", user).contains("secret1"));
    }
}
