use std::{collections::HashSet, fmt::Display, process::Stdio};

use serde::{Deserialize, Serialize};

use super::ClipError;

/// Container/codec pairs a clip can be written as, most preferred first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipCodec {
    Vp9Webm,
    Vp8Webm,
    H264Mp4,
    Gif,
}

impl ClipCodec {
    pub const PREFERENCE: [ClipCodec; 4] = [
        ClipCodec::Vp9Webm,
        ClipCodec::Vp8Webm,
        ClipCodec::H264Mp4,
        ClipCodec::Gif,
    ];

    /// The ffmpeg encoder this codec needs, `None` for codecs encoded
    /// in-process.
    pub fn ffmpeg_encoder(&self) -> Option<&'static str> {
        match self {
            Self::Vp9Webm => Some("libvpx-vp9"),
            Self::Vp8Webm => Some("libvpx"),
            Self::H264Mp4 => Some("libx264"),
            Self::Gif => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Vp9Webm | Self::Vp8Webm => "webm",
            Self::H264Mp4 => "mp4",
            Self::Gif => "gif",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Vp9Webm | Self::Vp8Webm => "video/webm",
            Self::H264Mp4 => "video/mp4",
            Self::Gif => "image/gif",
        }
    }
}

impl Display for ClipCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Vp9Webm => "webm (vp9)",
            Self::Vp8Webm => "webm (vp8)",
            Self::H264Mp4 => "mp4 (h264)",
            Self::Gif => "gif",
        })
    }
}

/// Encoders the local ffmpeg reports.
#[derive(Debug, Clone, Default)]
pub struct AvailableEncoders {
    names: HashSet<String>,
}

impl AvailableEncoders {
    /// Parse the table printed by `ffmpeg -encoders`, where the encoder name
    /// is the second column.
    pub fn parse(listing: &str) -> Self {
        let names = listing
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .map(str::to_owned)
            .collect();
        Self { names }
    }

    pub async fn probe() -> Self {
        let output = tokio::process::Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await;
        match output {
            Ok(output) if output.status.success() => {
                Self::parse(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                log::warn!("ffmpeg -encoders exited with {}", output.status);
                Self::default()
            }
            Err(err) => {
                log::info!("ffmpeg not available ({err}), only gif clips can be made");
                Self::default()
            }
        }
    }

    pub fn supports(&self, codec: ClipCodec) -> bool {
        codec
            .ffmpeg_encoder()
            .map_or(true, |encoder| self.names.contains(encoder))
    }
}

/// First codec in `preferences` this machine can produce.
pub fn negotiate(
    preferences: &[ClipCodec],
    available: &AvailableEncoders,
) -> Result<ClipCodec, ClipError> {
    let chosen = preferences
        .iter()
        .copied()
        .find(|codec| available.supports(*codec));
    match chosen {
        Some(codec) => {
            if preferences.first() != Some(&codec) {
                log::warn!("falling back to {codec} for live clips");
            }
            Ok(codec)
        }
        None => Err(ClipError::UnsupportedCodec {
            tried: preferences.to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libvpx               libvpx VP8 (codec vp8)
 V..... libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn encoder_names_are_the_second_column() {
        let available = AvailableEncoders::parse(LISTING);
        assert!(available.supports(ClipCodec::Vp8Webm));
        assert!(available.supports(ClipCodec::H264Mp4));
        assert!(!available.supports(ClipCodec::Vp9Webm));
    }

    #[test]
    fn first_available_preference_wins() {
        let available = AvailableEncoders::parse(LISTING);
        assert_eq!(
            negotiate(&ClipCodec::PREFERENCE, &available).unwrap(),
            ClipCodec::Vp8Webm
        );
        assert_eq!(
            negotiate(&ClipCodec::PREFERENCE, &AvailableEncoders::default()).unwrap(),
            ClipCodec::Gif
        );
    }

    #[test]
    fn nothing_available_is_unsupported() {
        let err = negotiate(&[ClipCodec::Vp9Webm], &AvailableEncoders::default()).unwrap_err();
        assert!(matches!(err, ClipError::UnsupportedCodec { .. }));
        assert!(negotiate(&[], &AvailableEncoders::default()).is_err());
    }
}
