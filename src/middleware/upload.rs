use axum::{
    extract::{FromRequest, Multipart, Request, multipart::MultipartError},
    http::StatusCode,
};

use crate::{AppState, error::AppError, media::MediaFile};

/// 上传文件的大小与类型约束
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub allowed_types: Vec<String>,
}

impl UploadPolicy {
    pub fn images(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            allowed_types: vec!["image/".to_string()],
        }
    }

    pub fn validate(&self, file: Option<&MediaFile>) -> Result<(), AppError> {
        let file = file.ok_or_else(|| AppError::BadRequest("file is required".into()))?;
        if file.bytes.is_empty() {
            return Err(AppError::BadRequest("file is empty".into()));
        }
        if file.bytes.len() > self.max_bytes {
            return Err(AppError::BadRequest("file too large".into()));
        }
        if !self
            .allowed_types
            .iter()
            .any(|t| file.content_type.starts_with(t.as_str()))
        {
            return Err(AppError::InvalidFileType {
                file_type: file.content_type.clone(),
                allowed_types: self.allowed_types.clone(),
            });
        }
        Ok(())
    }
}

/// `multipart/form-data` 作品上传表单：`title` 与 `file`
#[derive(Debug)]
pub struct ArtworkUpload {
    pub title: String,
    pub file: MediaFile,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::BadRequest("file too large".into())
    } else {
        AppError::BadRequest(format!("invalid multipart body: {}", e.body_text()))
    }
}

impl FromRequest<AppState> for ArtworkUpload {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {}", e.body_text())))?;

        let mut title = String::new();
        let mut file = None;
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some("title") => title = field.text().await.map_err(multipart_error)?,
                Some("file") => {
                    let file_name = field.file_name().unwrap_or("upload").to_string();
                    let content_type = field.content_type().unwrap_or_default().to_string();
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    file = Some(MediaFile {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                _ => {}
            }
        }

        UploadPolicy::images(state.config.max_upload_bytes()).validate(file.as_ref())?;
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(AppError::BadRequest("title is required".into()));
        }

        match file {
            Some(file) => Ok(Self { title, file }),
            None => Err(AppError::BadRequest("file is required".into())),
        }
    }
}
