use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use chrono::{Duration, Utc};
use rand::{distributions::Uniform, Rng};

use super::{
    check_size, ClipUpload, EncodedPhoto, PhotoRecord, ServerError, ShortCode, UploadReceipt,
    CODE_LENGTH,
};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Default)]
struct Store {
    next_id: u64,
    records: Vec<PhotoRecord>,
    files: Vec<(String, Bytes)>,
}

/// Keeps everything in memory. Clones share the same store.
#[derive(Debug, Clone)]
pub struct MockBackend {
    store: Arc<Mutex<Store>>,
    max_upload_bytes: u64,
    lifetime: Duration,
}

impl MockBackend {
    pub fn new(max_upload_bytes: u64) -> Self {
        Self::with_lifetime(max_upload_bytes, Duration::days(30))
    }

    pub fn with_lifetime(max_upload_bytes: u64, lifetime: Duration) -> Self {
        Self {
            store: Arc::default(),
            max_upload_bytes,
            lifetime,
        }
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn random_code(rng: &mut impl Rng) -> String {
    rng.sample_iter(Uniform::from(0..CODE_ALPHABET.len()))
        .take(CODE_LENGTH)
        .map(|i| CODE_ALPHABET[i] as char)
        .collect()
}

impl super::ServerBackend for MockBackend {
    async fn upload_composite(self, photo: EncodedPhoto) -> Result<UploadReceipt, ServerError> {
        check_size(photo.bytes.len(), self.max_upload_bytes)?;
        let mut store = self.store();

        let mut rng = rand::thread_rng();
        let code = loop {
            let code = ShortCode::parse(&random_code(&mut rng))?;
            if store.records.iter().all(|record| record.code != code) {
                break code;
            }
        };
        store.next_id += 1;
        let id = store.next_id.to_string();
        let path = format!("uploads/{id}.jpg");
        let url = format!("mock://photos/{path}");
        let created_at = Utc::now();

        store.records.push(PhotoRecord {
            id: id.clone(),
            code: code.clone(),
            file_url: url.clone(),
            file_path: path,
            file_size: photo.bytes.len() as u64,
            width: photo.width,
            height: photo.height,
            created_at,
            expires_at: Some(created_at + self.lifetime),
            download_count: 0,
            video_urls: None,
        });
        store.files.push((url.clone(), photo.bytes));
        log::debug!("mock: stored photo {id} as {code}");
        Ok(UploadReceipt { id, code, url })
    }

    async fn attach_clip(self, photo_id: String, clip: ClipUpload) -> Result<String, ServerError> {
        check_size(clip.bytes.len(), self.max_upload_bytes)?;
        let mut store = self.store();
        let url = format!("mock://photos/uploads/{photo_id}-{}.{}", store.files.len(), clip.extension);
        let record = store
            .records
            .iter_mut()
            .find(|record| record.id == photo_id)
            .ok_or_else(|| ServerError::Upload(format!("no photo with id {photo_id}")))?;
        record.video_urls.get_or_insert_with(Vec::new).push(url.clone());
        store.files.push((url.clone(), clip.bytes));
        Ok(url)
    }

    async fn find_by_code(self, code: ShortCode) -> Result<PhotoRecord, ServerError> {
        let mut store = self.store();
        let record = store
            .records
            .iter_mut()
            .find(|record| record.code == code)
            .ok_or_else(|| ServerError::NotFound(code.clone()))?;
        if record.is_expired(Utc::now()) {
            return Err(ServerError::Expired(code));
        }
        record.download_count += 1;
        Ok(record.clone())
    }

    async fn download(self, url: String) -> Result<Bytes, ServerError> {
        self.store()
            .files
            .iter()
            .find(|(file_url, _)| *file_url == url)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| ServerError::Lookup(format!("{url} does not exist")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::servers::ServerBackend;

    fn photo(bytes: &'static [u8]) -> EncodedPhoto {
        EncodedPhoto {
            bytes: Bytes::from_static(bytes),
            width: 10,
            height: 20,
        }
    }

    #[tokio::test]
    async fn uploaded_photos_can_be_found_and_downloaded() {
        let server = MockBackend::new(1024);
        let receipt = server.clone().upload_composite(photo(b"jpeg bytes")).await.unwrap();
        assert_eq!(receipt.code.as_str().len(), CODE_LENGTH);

        let typed = ShortCode::parse(&receipt.code.as_str().to_lowercase()).unwrap();
        let record = server.clone().find_by_code(typed).await.unwrap();
        assert_eq!(record.file_url, receipt.url);
        assert_eq!(record.download_count, 1);
        let bytes = server.clone().download(record.file_url).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"jpeg bytes"));

        let again = server.find_by_code(receipt.code).await.unwrap();
        assert_eq!(again.download_count, 2);
    }

    #[tokio::test]
    async fn unknown_and_expired_codes_fail() {
        let server = MockBackend::with_lifetime(1024, Duration::seconds(-1));
        let receipt = server.clone().upload_composite(photo(b"x")).await.unwrap();
        assert!(matches!(
            server.clone().find_by_code(receipt.code).await,
            Err(ServerError::Expired(_))
        ));
        let unknown = ShortCode::parse("ZZZZZZ").unwrap();
        assert!(matches!(
            server.find_by_code(unknown).await,
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn oversized_uploads_never_reach_the_store() {
        let server = MockBackend::new(4);
        let err = server.clone().upload_composite(photo(b"too big")).await.unwrap_err();
        assert!(matches!(err, ServerError::TooLarge { .. }));
        assert!(server.store().records.is_empty());
    }

    #[tokio::test]
    async fn clips_are_listed_on_their_photo() {
        let server = MockBackend::new(1024);
        let receipt = server.clone().upload_composite(photo(b"x")).await.unwrap();
        let clip = ClipUpload {
            bytes: Bytes::from_static(b"GIF89a"),
            content_type: "image/gif",
            extension: "gif",
        };
        let url = server.clone().attach_clip(receipt.id, clip).await.unwrap();
        let record = server.clone().find_by_code(receipt.code).await.unwrap();
        assert_eq!(record.video_urls, Some(vec![url.clone()]));
        assert_eq!(server.download(url).await.unwrap(), Bytes::from_static(b"GIF89a"));
    }
}
