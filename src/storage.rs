use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use tracing::info;
use uuid::Uuid;

use crate::config::MediaConfig;

/// Remote media host: takes a local file, answers with the URL it is served from.
#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn store_file(&self, path: &Path, content_type: &str) -> anyhow::Result<String>;
}

#[derive(Clone)]
pub struct S3MediaHost {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3MediaHost {
    pub async fn new(cfg: &MediaConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        let public_url = if cfg.public_url.is_empty() {
            format!("{}/{}", cfg.endpoint.trim_end_matches('/'), cfg.bucket)
        } else {
            cfg.public_url.trim_end_matches('/').to_string()
        };

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            public_url,
        })
    }
}

/// Object key for a file: a fresh id plus the original extension, if any.
pub(crate) fn object_key(path: &Path) -> String {
    let id = Uuid::new_v4();
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("media/{}.{}", id, ext.to_ascii_lowercase()),
        _ => format!("media/{}", id),
    }
}

#[async_trait]
impl MediaHost for S3MediaHost {
    async fn store_file(&self, path: &Path, content_type: &str) -> anyhow::Result<String> {
        let body = tokio::fs::read(path)
            .await
            .with_context(|| format!("read staged file {}", path.display()))?;
        let key = object_key(path);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;

        let url = format!("{}/{}", self.public_url, key);
        info!(%url, "file stored on media host");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_keeps_lowercased_extension() {
        let key = object_key(Path::new("/tmp/abc-Clip.MP4"));
        assert!(key.starts_with("media/"));
        assert!(key.ends_with(".mp4"));
    }

    #[test]
    fn object_key_without_extension() {
        let key = object_key(Path::new("/tmp/blob"));
        assert!(!key.contains('.'));
    }
}
