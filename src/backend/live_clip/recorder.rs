use std::process::Stdio;

use bytes::Bytes;
use image::{
    codecs::gif::{GifEncoder, Repeat},
    Delay, Frame, RgbaImage,
};
use tempfile::NamedTempFile;
use tokio::{
    io::AsyncWriteExt,
    process::{Child, ChildStdin, Command},
};

use super::{codec::ClipCodec, ClipError};

/// Sink for the frames of one clip. Owned by a single `encode_clip` call.
pub enum Recorder {
    Ffmpeg(FfmpegRecorder),
    Gif(GifRecorder),
}

impl Recorder {
    pub async fn start(codec: ClipCodec, width: u32, height: u32, fps: u32) -> Result<Self, ClipError> {
        match codec.ffmpeg_encoder() {
            Some(encoder) => Ok(Self::Ffmpeg(
                FfmpegRecorder::spawn(codec, encoder, width, height, fps).await?,
            )),
            None => Ok(Self::Gif(GifRecorder {
                frames: Vec::new(),
                fps,
            })),
        }
    }

    pub async fn push(&mut self, frame: &RgbaImage) -> Result<(), ClipError> {
        match self {
            Self::Ffmpeg(recorder) => recorder.push(frame).await,
            Self::Gif(recorder) => {
                recorder.frames.push(frame.clone());
                Ok(())
            }
        }
    }

    pub async fn finish(self) -> Result<Bytes, ClipError> {
        match self {
            Self::Ffmpeg(recorder) => recorder.finish().await,
            Self::Gif(recorder) => recorder.finish().await,
        }
    }
}

pub struct FfmpegRecorder {
    child: Child,
    stdin: Option<ChildStdin>,
    output: NamedTempFile,
}

impl FfmpegRecorder {
    async fn spawn(
        codec: ClipCodec,
        encoder: &str,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Self, ClipError> {
        let output = tempfile::Builder::new()
            .prefix("photobooth-clip-")
            .suffix(&format!(".{}", codec.extension()))
            .tempfile()?;

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd.args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{width}x{height}"),
            "-r",
            &fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            // yuv420p needs even dimensions
            "-vf",
            "pad=ceil(iw/2)*2:ceil(ih/2)*2",
            "-c:v",
            encoder,
            "-pix_fmt",
            "yuv420p",
        ]);
        match codec {
            ClipCodec::Vp9Webm | ClipCodec::Vp8Webm => {
                cmd.args(["-b:v", "1M"]);
            }
            ClipCodec::H264Mp4 => {
                cmd.args(["-movflags", "+faststart"]);
            }
            ClipCodec::Gif => {}
        }
        cmd.arg(output.path());

        let mut child = cmd.spawn().map_err(ClipError::Spawn)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClipError::Encoder("ffmpeg stdin was not captured".into()))?;
        log::debug!("recording {codec} clip at {width}x{height}@{fps} via {encoder}");

        Ok(Self {
            child,
            stdin: Some(stdin),
            output,
        })
    }

    async fn push(&mut self, frame: &RgbaImage) -> Result<(), ClipError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ClipError::Encoder("recorder already finished".into()));
        };
        stdin.write_all(frame.as_raw()).await?;
        Ok(())
    }

    async fn finish(mut self) -> Result<Bytes, ClipError> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await?;
        }
        let output = self.child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClipError::Encoder(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        let bytes = tokio::fs::read(self.output.path()).await?;
        Ok(Bytes::from(bytes))
    }
}

pub struct GifRecorder {
    frames: Vec<RgbaImage>,
    fps: u32,
}

impl GifRecorder {
    async fn finish(self) -> Result<Bytes, ClipError> {
        let Self { frames, fps } = self;
        tokio::task::spawn_blocking(move || {
            let mut encoded = Vec::new();
            {
                let mut encoder = GifEncoder::new_with_speed(&mut encoded, 10);
                encoder.set_repeat(Repeat::Infinite)?;
                let delay = Delay::from_numer_denom_ms(1000, fps.max(1));
                encoder.encode_frames(
                    frames
                        .into_iter()
                        .map(|frame| Frame::from_parts(frame, 0, 0, delay)),
                )?;
            }
            Ok::<_, ClipError>(Bytes::from(encoded))
        })
        .await
        .map_err(|err| ClipError::Render(err.to_string()))?
    }
}
