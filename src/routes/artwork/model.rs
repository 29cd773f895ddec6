use serde::Serialize;
use uuid::Uuid;

use crate::{database::Artwork, error::AppError};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub artwork: Artwork,
}

#[derive(Debug, Serialize)]
pub struct ArtworkList {
    pub count: usize,
    pub artworks: Vec<Artwork>,
}

impl From<Vec<Artwork>> for ArtworkList {
    fn from(artworks: Vec<Artwork>) -> Self {
        Self {
            count: artworks.len(),
            artworks,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub name: String,
}

/// 公开作品集页面：只包含公开作品
#[derive(Debug, Serialize)]
pub struct PublicProfileResponse {
    pub profile: Profile,
    #[serde(flatten)]
    pub list: ArtworkList,
}

pub fn parse_artwork_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::BadRequest("invalid artwork id".into()))
}
