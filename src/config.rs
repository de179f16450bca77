use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::NaiveDate;
use image::Rgba;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{
    capture::{CaptureMode, CountdownDuration},
    imaging::{caption::CaptionFont, filters::PhotoFilter, normalize::NormalizeTarget, overlay::OverlayAsset},
    live_clip::ClipCodec,
    render_take::{LayoutKind, LayoutOptions},
};

pub const CONFIG_ENV: &str = "PHOTOBOOTH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "photobooth.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub mode: CaptureMode,
    pub countdown_seconds: u8,
    /// Pause between automatic shots.
    pub advance_pause_ms: u64,
    pub mirror: bool,
    /// Preview frames kept around each shot for live clips.
    pub motion_buffer_frames: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Auto,
            countdown_seconds: 5,
            advance_pause_ms: 1500,
            mirror: true,
            motion_buffer_frames: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
    pub save_dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            width: 1600,
            height: 1200,
            jpeg_quality: 90,
            save_dir: PathBuf::from("photobooth-output"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    pub kind: LayoutKind,
    pub spacing: u32,
    pub padding: u32,
    pub grid_cell_size: u32,
    pub background: String,
    /// Backgrounds offered on the booth screen.
    pub background_palette: Vec<String>,
    pub header_text: Option<String>,
    pub footer_date: bool,
    pub caption_band_height: u32,
    pub caption_font_size: f32,
    pub font_path: Option<PathBuf>,
    pub filter: PhotoFilter,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            kind: LayoutKind::VerticalStrip,
            spacing: 20,
            padding: 40,
            grid_cell_size: 1200,
            background: "#ffffff".into(),
            background_palette: ["#ffffff", "#000000", "#ee5253", "#f7d945"]
                .map(String::from)
                .to_vec(),
            header_text: None,
            footer_date: true,
            caption_band_height: 120,
            caption_font_size: 48.0,
            font_path: None,
            filter: PhotoFilter::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipSettings {
    pub enabled: bool,
    pub duration_secs: u64,
    pub fps: u32,
    /// Rate the preview frames were buffered at.
    pub source_fps: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub codecs: Vec<ClipCodec>,
}

impl Default for ClipSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            duration_secs: 3,
            fps: 15,
            source_fps: 15,
            cell_width: 320,
            cell_height: 240,
            codecs: ClipCodec::PREFERENCE.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerKind {
    #[default]
    Supabase,
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub kind: ServerKind,
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub bucket: String,
    pub table: String,
    /// Base of the share links encoded in the QR code.
    pub public_base_url: String,
    pub max_upload_bytes: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            kind: ServerKind::Supabase,
            url: None,
            anon_key: None,
            bucket: "photos".into(),
            table: "photos".into(),
            public_base_url: "http://localhost:3000".into(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

fn bundled_frame(id: &str, name: &str) -> OverlayAsset {
    OverlayAsset {
        id: id.into(),
        name: name.into(),
        path: Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("assets/frames")
            .join(format!("{id}.svg")),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoothConfig {
    pub capture: CaptureSettings,
    pub output: OutputSettings,
    pub layout: LayoutSettings,
    pub frames: Vec<OverlayAsset>,
    pub clip: ClipSettings,
    pub server: ServerSettings,
}

impl Default for BoothConfig {
    fn default() -> Self {
        Self {
            capture: Default::default(),
            output: Default::default(),
            layout: Default::default(),
            frames: vec![
                bundled_frame("frame-01", "Classic"),
                bundled_frame("frame-02", "Film strip"),
                bundled_frame("frame-03", "Hearts"),
                bundled_frame("frame-04", "Polaroid"),
                bundled_frame("frame-05", "Stars"),
            ],
            clip: Default::default(),
            server: Default::default(),
        }
    }
}

impl BoothConfig {
    /// Read `$PHOTOBOOTH_CONFIG` (or `./photobooth.toml` when present), then
    /// let the environment override server credentials.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            None => {
                log::info!("no {DEFAULT_CONFIG_PATH} found, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("SUPABASE_URL") {
            self.server.url = Some(url);
        }
        if let Some(key) = var("SUPABASE_ANON_KEY") {
            self.server.anon_key = Some(key);
        }
        if let Some(base) = var("PHOTOBOOTH_PUBLIC_URL") {
            self.server.public_base_url = base;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid(message));

        if let Err(err) = CountdownDuration::try_from(self.capture.countdown_seconds) {
            return invalid(format!("capture.countdown_seconds: {err}"));
        }
        if self.output.width == 0 || self.output.height == 0 {
            return invalid("output.width and output.height must be greater than zero".into());
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return invalid("output.jpeg_quality must be between 1 and 100".into());
        }
        // the grid can be picked at the booth even when the strip is the default
        if self.layout.grid_cell_size == 0 {
            return invalid("layout.grid_cell_size must be greater than zero".into());
        }
        if self.layout.caption_font_size <= 0.0 {
            return invalid("layout.caption_font_size must be positive".into());
        }
        parse_hex_color(&self.layout.background)?;
        for color in &self.layout.background_palette {
            parse_hex_color(color)?;
        }
        if self.clip.fps == 0 || self.clip.source_fps == 0 {
            return invalid("clip.fps and clip.source_fps must be greater than zero".into());
        }
        if self.clip.enabled && (self.clip.duration_secs == 0 || self.clip.cell_width == 0 || self.clip.cell_height == 0) {
            return invalid("clip.duration_secs and clip cell size must be greater than zero".into());
        }
        if self.server.max_upload_bytes == 0 {
            return invalid("server.max_upload_bytes must be greater than zero".into());
        }
        Ok(())
    }

    pub fn countdown(&self) -> CountdownDuration {
        CountdownDuration::try_from(self.capture.countdown_seconds).unwrap_or_default()
    }

    pub fn advance_pause(&self) -> Duration {
        Duration::from_millis(self.capture.advance_pause_ms)
    }

    pub fn normalize_target(&self) -> NormalizeTarget {
        NormalizeTarget::new(self.output.width, self.output.height)
    }

    pub fn background(&self) -> Rgba<u8> {
        parse_hex_color(&self.layout.background).unwrap_or(Rgba([255, 255, 255, 255]))
    }

    pub fn background_palette(&self) -> Vec<Rgba<u8>> {
        self.layout
            .background_palette
            .iter()
            .filter_map(|color| parse_hex_color(color).ok())
            .collect()
    }

    /// Loads the configured caption font, falling back to the bundled one.
    pub fn caption_font(&self) -> Option<Arc<CaptionFont>> {
        let configured = self.layout.font_path.as_ref().and_then(|path| {
            CaptionFont::load(path)
                .map_err(|err| log::warn!("{err}, using the bundled font"))
                .ok()
        });
        let font = configured.or_else(CaptionFont::bundled);
        if font.is_none() {
            log::error!("no usable caption font, labels and captions are disabled");
        }
        font.map(Arc::new)
    }

    pub fn layout_options(&self, font: Option<Arc<CaptionFont>>, today: NaiveDate) -> LayoutOptions {
        LayoutOptions {
            photo_width: self.output.width,
            photo_height: self.output.height,
            grid_cell_size: self.layout.grid_cell_size,
            spacing: self.layout.spacing,
            padding: self.layout.padding,
            background: self.background(),
            header_text: self.layout.header_text.clone().filter(|text| !text.is_empty()),
            footer_text: self
                .layout
                .footer_date
                .then(|| today.format("%Y-%m-%d").to_string()),
            caption_band_height: self.layout.caption_band_height,
            caption_font_size: self.layout.caption_font_size,
            font,
        }
    }

    /// Same arrangement as the still, scaled down to clip cells.
    pub fn clip_layout_options(&self, font: Option<Arc<CaptionFont>>, today: NaiveDate) -> LayoutOptions {
        let full = self.layout_options(font, today);
        let scale = self.clip.cell_width as f32 / self.output.width as f32;
        let scaled = |value: u32| (value as f32 * scale).round() as u32;
        LayoutOptions {
            photo_width: self.clip.cell_width,
            photo_height: self.clip.cell_height,
            grid_cell_size: self.clip.cell_height,
            spacing: scaled(full.spacing),
            padding: scaled(full.padding),
            caption_band_height: scaled(full.caption_band_height),
            caption_font_size: full.caption_font_size * scale,
            ..full
        }
    }
}

/// `#rgb`, `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex_color(input: &str) -> Result<Rgba<u8>, ConfigError> {
    let invalid = || ConfigError::Invalid(format!("{input:?} is not a hex color"));
    let hex = input.trim().strip_prefix('#').ok_or_else(invalid)?;
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = channel(&c.to_string())?;
                rgb[i] = v * 17;
            }
            Ok(Rgba([rgb[0], rgb[1], rgb[2], 255]))
        }
        6 | 8 => {
            let r = channel(&hex[0..2])?;
            let g = channel(&hex[2..4])?;
            let b = channel(&hex[4..6])?;
            let a = if hex.len() == 8 { channel(&hex[6..8])? } else { 255 };
            Ok(Rgba([r, g, b, a]))
        }
        _ => Err(invalid()),
    }
}
