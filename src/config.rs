use std::path::{Component, Path, PathBuf};

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// S3-compatible bucket that plays the role of the media CDN.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base under which stored objects are publicly reachable.
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
    pub public_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub json_body_limit: usize,
    pub form_body_limit: usize,
    pub upload_body_limit: usize,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub http: HttpConfig,
    pub jwt: JwtConfig,
    pub media: MediaConfig,
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Staged uploads must never be reachable through the static file fallback.
fn ensure_scratch_outside_public(public_dir: &Path, scratch_dir: &Path) -> anyhow::Result<()> {
    let lexical = |p: &Path| -> PathBuf {
        p.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect()
    };
    let (public, scratch) = (lexical(public_dir), lexical(scratch_dir));
    if scratch.starts_with(&public) {
        anyhow::bail!(
            "SCRATCH_DIR {} must not be inside PUBLIC_DIR {}",
            scratch_dir.display(),
            public_dir.display()
        );
    }
    Ok(())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = required("DATABASE_URL")?;

        let public_dir = PathBuf::from(
            std::env::var("PUBLIC_DIR").unwrap_or_else(|_| "./public".into()),
        );
        let scratch_dir = PathBuf::from(
            std::env::var("SCRATCH_DIR").unwrap_or_else(|_| "./tmp/uploads".into()),
        );
        ensure_scratch_outside_public(&public_dir, &scratch_dir)?;

        let http = HttpConfig {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parsed_or("PORT", 8000),
            cors_origin: required("CORS_ORIGIN")?,
            public_dir,
            scratch_dir,
            json_body_limit: parsed_or("JSON_BODY_LIMIT", 20 * 1024),
            form_body_limit: parsed_or("FORM_BODY_LIMIT", 16 * 1024),
            upload_body_limit: parsed_or("UPLOAD_BODY_LIMIT", 100 * 1024 * 1024),
            cookie_secure: parsed_or("COOKIE_SECURE", true),
        };

        let jwt = JwtConfig {
            access_secret: required("ACCESS_TOKEN_SECRET")?,
            refresh_secret: required("REFRESH_TOKEN_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "vidhost".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "vidhost-users".into()),
            access_ttl_minutes: parsed_or("ACCESS_TOKEN_EXPIRY_MINUTES", 60 * 24),
            refresh_ttl_minutes: parsed_or("REFRESH_TOKEN_EXPIRY_MINUTES", 60 * 24 * 10),
        };
        if jwt.access_secret == jwt.refresh_secret {
            anyhow::bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }

        let media = MediaConfig {
            endpoint: required("MEDIA_ENDPOINT")?,
            bucket: required("MEDIA_BUCKET")?,
            access_key: required("MEDIA_ACCESS_KEY")?,
            secret_key: required("MEDIA_SECRET_KEY")?,
            region: std::env::var("MEDIA_REGION").unwrap_or_else(|_| "us-east-1".into()),
            public_url: std::env::var("MEDIA_PUBLIC_URL")
                .unwrap_or_else(|_| String::new()),
        };

        Ok(Self {
            database_url,
            http,
            jwt,
            media,
        })
    }
}
