use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::auth::{jwt::JwtKeys, repo::{PgUserStore, UserStore}};
use crate::config::AppConfig;
use crate::storage::{MediaHost, S3MediaHost};
use crate::upload::UploadStager;
use crate::videos::repo::{PgVideoStore, VideoStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub users: Arc<dyn UserStore>,
    pub videos: Arc<dyn VideoStore>,
    pub stager: Arc<UploadStager>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        tracing::info!("database migrations applied");

        let media = Arc::new(
            S3MediaHost::new(&config.media)
                .await
                .context("configure media host")?,
        ) as Arc<dyn MediaHost>;
        let stager = UploadStager::new(config.http.scratch_dir.clone(), media).await?;

        Ok(Self::from_parts(
            config.clone(),
            Arc::new(PgUserStore::new(db.clone())),
            Arc::new(PgVideoStore::new(db)),
            Arc::new(stager),
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        videos: Arc<dyn VideoStore>,
        stager: Arc<UploadStager>,
    ) -> Self {
        Self {
            jwt: JwtKeys::from_config(&config.jwt),
            config,
            users,
            videos,
            stager,
        }
    }
}
