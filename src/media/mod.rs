// 媒体托管服务：上传与删除图片

use async_trait::async_trait;
use thiserror::Error;

pub mod cloudinary;

pub use cloudinary::CloudinaryClient;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct MediaFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// 托管后的资源地址与标识（删除时使用）
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMedia {
    pub secure_url: String,
    pub public_id: String,
}

#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn upload(&self, file: MediaFile, folder: &str) -> Result<StoredMedia, MediaError>;
    async fn destroy(&self, public_id: &str) -> Result<(), MediaError>;
}
