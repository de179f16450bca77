use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// `photobooth_YYYYMMDD_HHMMSS.<extension>`
pub fn generate_filename(prefix: &str, extension: &str, now: DateTime<Local>) -> String {
    format!("{prefix}_{}.{extension}", now.format("%Y%m%d_%H%M%S"))
}

/// Write `bytes` into `dir` (created if missing) without replacing an
/// existing file; a numeric suffix is added on collision.
pub async fn save_bytes(dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let (stem, extension) = name.rsplit_once('.').unwrap_or((name, ""));
    let mut path = dir.join(name);
    let mut attempt = 1;
    while tokio::fs::try_exists(&path).await? {
        attempt += 1;
        path = dir.join(if extension.is_empty() {
            format!("{stem}-{attempt}")
        } else {
            format!("{stem}-{attempt}.{extension}")
        });
    }
    tokio::fs::write(&path, bytes).await?;
    log::info!("saved {} bytes to {}", bytes.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn filenames_carry_the_local_timestamp() {
        let now = Local.with_ymd_and_hms(2026, 10, 17, 9, 5, 3).unwrap();
        assert_eq!(
            generate_filename("photobooth", "jpg", now),
            "photobooth_20261017_090503.jpg"
        );
    }

    #[tokio::test]
    async fn saving_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let first = save_bytes(dir.path(), "take.jpg", b"one").await.unwrap();
        let second = save_bytes(dir.path(), "take.jpg", b"two").await.unwrap();
        assert_eq!(first.file_name().unwrap(), "take.jpg");
        assert_eq!(second.file_name().unwrap(), "take-2.jpg");
        assert_eq!(std::fs::read(first).unwrap(), b"one");
        assert_eq!(std::fs::read(second).unwrap(), b"two");
    }
}
