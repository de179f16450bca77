use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::{distributions::Uniform, Rng};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;

use super::{
    check_size, id_as_string, ClipUpload, EncodedPhoto, PhotoRecord, ServerError, ShortCode,
    UploadReceipt,
};
use crate::config::ServerSettings;

/// Supabase Storage for the files and a PostgREST table for the metadata.
/// The table assigns each row its `code` and `expires_at`.
#[derive(Debug, Clone)]
pub struct SupabaseBackend {
    client: reqwest::Client,
    url: String,
    bucket: String,
    table: String,
    max_upload_bytes: u64,
}

#[derive(Debug, Deserialize)]
struct InsertedRow {
    code: ShortCode,
    #[serde(deserialize_with = "id_as_string")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct VideoUrls {
    video_urls: Option<Vec<String>>,
}

/// `uploads/<millis>_<random>.<ext>`
pub fn storage_path(now: DateTime<Utc>, extension: &str) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let random: String = rand::thread_rng()
        .sample_iter(Uniform::from(0..ALPHABET.len()))
        .take(13)
        .map(|i| ALPHABET[i] as char)
        .collect();
    format!("uploads/{}_{}.{}", now.timestamp_millis(), random, extension)
}

impl SupabaseBackend {
    pub fn new(settings: &ServerSettings) -> Result<Self, ServerError> {
        let url = settings
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ServerError::Config("SUPABASE_URL is not set".into()))?
            .trim_end_matches('/')
            .to_owned();
        let anon_key = settings
            .anon_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ServerError::Config("SUPABASE_ANON_KEY is not set".into()))?;

        let mut headers = HeaderMap::with_capacity(2);
        let key = HeaderValue::from_str(anon_key)
            .map_err(|err| ServerError::Config(format!("bad anon key: {err}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {anon_key}"))
            .map_err(|err| ServerError::Config(format!("bad anon key: {err}")))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::ClientBuilder::new()
            .default_headers(headers)
            .build()
            .map_err(|err| ServerError::Config(err.to_string()))?;

        Ok(Self {
            client,
            url,
            bucket: settings.bucket.clone(),
            table: settings.table.clone(),
            max_upload_bytes: settings.max_upload_bytes,
        })
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.url, self.bucket, path)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }

    async fn put_object(&self, path: &str, bytes: Bytes, content_type: &str) -> reqwest::Result<()> {
        self.client
            .post(format!("{}/storage/v1/object/{}/{}", self.url, self.bucket, path))
            .header(CONTENT_TYPE, content_type)
            .header(CACHE_CONTROL, "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn fetch_rows<T: for<'de> Deserialize<'de>>(
        &self,
        filter: (&str, String),
        select: &str,
    ) -> reqwest::Result<Vec<T>> {
        self.client
            .get(self.table_url())
            .query(&[filter, ("select", select.to_owned())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn patch_row(&self, id: &str, body: serde_json::Value) -> reqwest::Result<()> {
        self.client
            .patch(self.table_url())
            .query(&[("id", format!("eq.{id}"))])
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl super::ServerBackend for SupabaseBackend {
    async fn upload_composite(self, photo: EncodedPhoto) -> Result<UploadReceipt, ServerError> {
        check_size(photo.bytes.len(), self.max_upload_bytes)?;
        let upload_err = |err: reqwest::Error| ServerError::Upload(err.to_string());

        let path = storage_path(Utc::now(), "jpg");
        let size = photo.bytes.len();
        log::debug!("uploading {size} bytes to {path}");
        self.put_object(&path, photo.bytes, "image/jpeg")
            .await
            .map_err(upload_err)?;
        let url = self.public_url(&path);

        let rows: Vec<InsertedRow> = self
            .client
            .post(self.table_url())
            .query(&[("select", "code,id")])
            .header("Prefer", "return=representation")
            .json(&json!({
                "file_url": url,
                "file_path": path,
                "file_size": size,
                "width": photo.width,
                "height": photo.height,
            }))
            .send()
            .await
            .map_err(upload_err)?
            .error_for_status()
            .map_err(upload_err)?
            .json()
            .await
            .map_err(upload_err)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| ServerError::Upload("the server did not return the new row".into()))?;

        log::info!("uploaded photo {} with code {}", row.id, row.code);
        Ok(UploadReceipt {
            id: row.id,
            code: row.code,
            url,
        })
    }

    async fn attach_clip(self, photo_id: String, clip: ClipUpload) -> Result<String, ServerError> {
        check_size(clip.bytes.len(), self.max_upload_bytes)?;
        let upload_err = |err: reqwest::Error| ServerError::Upload(err.to_string());

        let path = storage_path(Utc::now(), clip.extension);
        self.put_object(&path, clip.bytes, clip.content_type)
            .await
            .map_err(upload_err)?;
        let url = self.public_url(&path);

        let rows: Vec<VideoUrls> = self
            .fetch_rows(("id", format!("eq.{photo_id}")), "video_urls")
            .await
            .map_err(upload_err)?;
        let mut video_urls = rows
            .into_iter()
            .next()
            .and_then(|row| row.video_urls)
            .unwrap_or_default();
        video_urls.push(url.clone());
        self.patch_row(&photo_id, json!({ "video_urls": video_urls }))
            .await
            .map_err(upload_err)?;

        log::info!("attached clip {path} to photo {photo_id}");
        Ok(url)
    }

    async fn find_by_code(self, code: ShortCode) -> Result<PhotoRecord, ServerError> {
        let lookup_err = |err: reqwest::Error| ServerError::Lookup(err.to_string());
        let rows: Vec<PhotoRecord> = self
            .fetch_rows(("code", format!("eq.{code}")), "*")
            .await
            .map_err(lookup_err)?;
        let mut record = rows
            .into_iter()
            .next()
            .ok_or_else(|| ServerError::NotFound(code.clone()))?;
        if record.is_expired(Utc::now()) {
            return Err(ServerError::Expired(code));
        }

        record.download_count += 1;
        if let Err(err) = self
            .patch_row(&record.id, json!({ "download_count": record.download_count }))
            .await
        {
            log::warn!("could not count download of {code}: {err}");
        }
        Ok(record)
    }

    async fn download(self, url: String) -> Result<Bytes, ServerError> {
        let lookup_err = |err: reqwest::Error| ServerError::Lookup(err.to_string());
        self.client
            .get(url)
            .send()
            .await
            .map_err(lookup_err)?
            .error_for_status()
            .map_err(lookup_err)?
            .bytes()
            .await
            .map_err(lookup_err)
    }
}
