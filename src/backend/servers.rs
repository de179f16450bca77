use std::{fmt::Display, future::Future};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::config::{ServerKind, ServerSettings};

use super::render_take::CompositeImage;

pub mod mock;
pub mod supabase;

pub const CODE_LENGTH: usize = 6;

#[derive(Debug, Clone, Error)]
pub enum ServerError {
    #[error("\"{0}\" is not a valid code: codes are {CODE_LENGTH} letters or digits")]
    InvalidCode(String),
    #[error("file is {size} bytes, the limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("lookup failed: {0}")]
    Lookup(String),
    #[error("no photo found for code {0}, please check the code")]
    NotFound(ShortCode),
    #[error("the photo for code {0} has expired")]
    Expired(ShortCode),
    #[error("server is not configured: {0}")]
    Config(String),
}

/// A normalized lookup code: six upper-case ASCII letters or digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShortCode(String);

impl ShortCode {
    pub fn parse(input: &str) -> Result<Self, ServerError> {
        let code = input.trim().to_ascii_uppercase();
        if code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            Ok(Self(code))
        } else {
            Err(ServerError::InvalidCode(input.trim().to_owned()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ShortCode {
    type Error = ServerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShortCode> for String {
    fn from(value: ShortCode) -> Self {
        value.0
    }
}

impl Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a guest can find their photo again.
pub fn share_link(public_base_url: &str, code: &ShortCode) -> String {
    format!("{}/find?code={}", public_base_url.trim_end_matches('/'), code)
}

#[derive(Debug, Clone)]
pub struct EncodedPhoto {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
}

impl From<&CompositeImage> for EncodedPhoto {
    fn from(composite: &CompositeImage) -> Self {
        Self {
            bytes: composite.encoded.clone(),
            width: composite.pixels.width(),
            height: composite.pixels.height(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClipUpload {
    pub bytes: Bytes,
    pub content_type: &'static str,
    pub extension: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub id: String,
    pub code: ShortCode,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub code: ShortCode,
    pub file_url: String,
    pub file_path: String,
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub video_urls: Option<Vec<String>>,
}

impl PhotoRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < now)
    }
}

/// Row ids come back as numbers or uuids depending on the schema.
pub(crate) fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(id) => id,
        other => other.to_string(),
    })
}

pub trait ServerBackend: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Store the composite and create its lookup code.
    fn upload_composite(
        self,
        photo: EncodedPhoto,
    ) -> impl Future<Output = Result<UploadReceipt, ServerError>> + Send;

    /// Store a live clip and list it on the photo. Returns the clip's URL.
    fn attach_clip(
        self,
        photo_id: String,
        clip: ClipUpload,
    ) -> impl Future<Output = Result<String, ServerError>> + Send;

    /// Fetch a photo's metadata, counting the lookup as a download.
    fn find_by_code(
        self,
        code: ShortCode,
    ) -> impl Future<Output = Result<PhotoRecord, ServerError>> + Send;

    fn download(self, url: String) -> impl Future<Output = Result<Bytes, ServerError>> + Send;
}

/// The backend picked by configuration.
#[derive(Debug, Clone)]
pub enum BoothServer {
    Supabase(supabase::SupabaseBackend),
    Mock(mock::MockBackend),
}

impl BoothServer {
    pub fn from_settings(settings: &ServerSettings) -> Result<Self, ServerError> {
        match settings.kind {
            ServerKind::Supabase => Ok(Self::Supabase(supabase::SupabaseBackend::new(settings)?)),
            ServerKind::Mock => {
                log::warn!("using the in-memory mock server, uploads are lost on exit");
                Ok(Self::Mock(mock::MockBackend::new(settings.max_upload_bytes)))
            }
        }
    }
}

impl ServerBackend for BoothServer {
    async fn upload_composite(self, photo: EncodedPhoto) -> Result<UploadReceipt, ServerError> {
        match self {
            Self::Supabase(server) => server.upload_composite(photo).await,
            Self::Mock(server) => server.upload_composite(photo).await,
        }
    }

    async fn attach_clip(self, photo_id: String, clip: ClipUpload) -> Result<String, ServerError> {
        match self {
            Self::Supabase(server) => server.attach_clip(photo_id, clip).await,
            Self::Mock(server) => server.attach_clip(photo_id, clip).await,
        }
    }

    async fn find_by_code(self, code: ShortCode) -> Result<PhotoRecord, ServerError> {
        match self {
            Self::Supabase(server) => server.find_by_code(code).await,
            Self::Mock(server) => server.find_by_code(code).await,
        }
    }

    async fn download(self, url: String) -> Result<Bytes, ServerError> {
        match self {
            Self::Supabase(server) => server.download(url).await,
            Self::Mock(server) => server.download(url).await,
        }
    }
}

pub(crate) fn check_size(size: usize, limit: u64) -> Result<(), ServerError> {
    if size as u64 > limit {
        return Err(ServerError::TooLarge {
            size: size as u64,
            limit,
        });
    }
    Ok(())
}
