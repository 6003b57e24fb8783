use std::collections::HashMap;

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::header::CONTENT_TYPE,
    middleware::Next,
    response::Response,
    Form, Json,
};
use axum_extra::extract::WithRejection;
use serde::de::DeserializeOwned;

use crate::{
    error::{AppError, AppResult},
    upload::IncomingFile,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    UrlEncoded,
    Other,
}

fn body_kind(req: &Request) -> BodyKind {
    let ct = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if ct.starts_with("application/json") {
        BodyKind::Json
    } else if ct.starts_with("application/x-www-form-urlencoded") {
        BodyKind::UrlEncoded
    } else {
        BodyKind::Other
    }
}

/// Per-content-type request body caps.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimits {
    pub json: usize,
    pub form: usize,
}

/// Buffers JSON and URL-encoded bodies up to their limit, answering 413 beyond it.
/// Other bodies (multipart) are left to route-level limits.
pub async fn limit_body(
    State(limits): State<BodyLimits>,
    req: Request,
    next: Next,
) -> AppResult<Response> {
    let limit = match body_kind(&req) {
        BodyKind::Json => limits.json,
        BodyKind::UrlEncoded => limits.form,
        BodyKind::Other => return Ok(next.run(req).await),
    };
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| AppError::PayloadTooLarge)?;
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

/// Extractors whose rejections render as the JSON error envelope.
pub type ApiPath<T> = WithRejection<Path<T>, AppError>;
pub type ApiQuery<T> = WithRejection<Query<T>, AppError>;
pub type ApiMultipart = WithRejection<Multipart, AppError>;

/// JSON or URL-encoded body, chosen by `Content-Type`.
pub struct Payload<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bad_body = |msg: String| AppError::validation(msg, Vec::new());
        match body_kind(&req) {
            BodyKind::UrlEncoded => {
                let Form(v) = Form::<T>::from_request(req, state)
                    .await
                    .map_err(|e| bad_body(e.body_text()))?;
                Ok(Payload(v))
            }
            _ => {
                let Json(v) = Json::<T>::from_request(req, state)
                    .await
                    .map_err(|e| bad_body(e.body_text()))?;
                Ok(Payload(v))
            }
        }
    }
}

/// Text fields and files of a multipart request, keyed by field name.
#[derive(Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, IncomingFile>,
}

impl MultipartForm {
    pub async fn read(mut mp: Multipart) -> AppResult<Self> {
        let mut form = Self::default();
        while let Some(field) = mp
            .next_field()
            .await?
        {
            let Some(name) = field.name().map(|s| s.to_string()) else {
                continue;
            };
            if field.file_name().is_some() {
                let file_name = field.file_name().map(|s| s.to_string());
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field
                    .bytes()
                    .await?;
                if !body.is_empty() {
                    form.files.insert(
                        name,
                        IncomingFile {
                            file_name,
                            content_type,
                            body,
                        },
                    );
                }
            } else {
                let text = field
                    .text()
                    .await?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    pub fn take_text(&mut self, name: &str) -> String {
        self.fields.remove(name).unwrap_or_default()
    }

    pub fn take_file(&mut self, name: &str) -> Option<IncomingFile> {
        self.files.remove(name)
    }
}
