use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StartupError;

const DEFAULT_MODEL_PATH: &str = "best.onnx";
const DEFAULT_SOURCE: &str = "0";
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;
const DEFAULT_CLASS_FILTER: &str = "ambulance";
const DEFAULT_EMERGENCY_DWELL_SECS: f64 = 30.0;
const DEFAULT_FPS_WINDOW_SIZE: usize = 30;
/// Largest accepted FPS smoothing window.
pub const MAX_FPS_WINDOW_SIZE: usize = 10_000;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_SCORE_FLOOR: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_SYNTHETIC_FRAMES: u64 = 300;
const DEFAULT_SYNTHETIC_WIDTH: u32 = 640;
const DEFAULT_SYNTHETIC_HEIGHT: u32 = 480;

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    model_path: Option<PathBuf>,
    source: Option<String>,
    confidence_threshold: Option<f32>,
    class_filter: Option<String>,
    emergency_dwell_secs: Option<f64>,
    fps_window_size: Option<usize>,
    detector: Option<DetectorConfigFile>,
    overlay: Option<OverlayConfigFile>,
    synthetic: Option<SyntheticConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    input_width: Option<u32>,
    input_height: Option<u32>,
    class_names: Option<Vec<String>>,
    score_floor: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    font_path: Option<PathBuf>,
    preview_path: Option<PathBuf>,
    show_window: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct SyntheticConfigFile {
    frames: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Detector weights (`.onnx`) or a recorded detection script (`.json`).
    pub model_path: PathBuf,
    /// Device index, local file path, or `stub://<name>`.
    pub source: String,
    pub confidence_threshold: f32,
    pub class_filter: String,
    pub emergency_dwell: Duration,
    pub fps_window_size: usize,
    pub detector: DetectorSettings,
    pub overlay: OverlaySettings,
    pub synthetic: SyntheticSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub input_width: u32,
    pub input_height: u32,
    /// Class names indexed by model class id.
    pub class_names: Vec<String>,
    /// Detector-side score floor applied before NMS. The class/confidence
    /// decision is made later by the detection filter.
    pub score_floor: f32,
    pub iou_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            class_names: vec![DEFAULT_CLASS_FILTER.to_string()],
            score_floor: DEFAULT_SCORE_FLOOR,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OverlaySettings {
    pub font_path: Option<PathBuf>,
    pub preview_path: Option<PathBuf>,
    /// Show frames in a desktop window (`display-window` builds only).
    pub show_window: bool,
}

#[derive(Debug, Clone)]
pub struct SyntheticSettings {
    /// Frames produced before end of stream.
    pub frames: u64,
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            frames: DEFAULT_SYNTHETIC_FRAMES,
            width: DEFAULT_SYNTHETIC_WIDTH,
            height: DEFAULT_SYNTHETIC_HEIGHT,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            source: DEFAULT_SOURCE.to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            class_filter: DEFAULT_CLASS_FILTER.to_string(),
            emergency_dwell: Duration::from_secs_f64(DEFAULT_EMERGENCY_DWELL_SECS),
            fps_window_size: DEFAULT_FPS_WINDOW_SIZE,
            detector: DetectorSettings::default(),
            overlay: OverlaySettings::default(),
            synthetic: SyntheticSettings::default(),
        }
    }
}

impl MonitorConfig {
    /// Load from `AMBULANCE_CONFIG` (if set) and the environment, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("AMBULANCE_CONFIG").ok().map(PathBuf::from);
        let mut cfg = Self::resolve(config_path.as_deref())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// File layer plus environment overrides, without validation.
    ///
    /// Callers that apply further overrides (CLI flags) must call `validate`
    /// themselves afterwards.
    pub fn resolve(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => read_config_file(path)?,
            None => MonitorConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let emergency_dwell = match file.emergency_dwell_secs {
            Some(secs) => dwell_from_secs(secs)?,
            None => defaults.emergency_dwell,
        };
        let detector_defaults = DetectorSettings::default();
        let detector = match file.detector {
            Some(detector) => DetectorSettings {
                input_width: detector.input_width.unwrap_or(detector_defaults.input_width),
                input_height: detector
                    .input_height
                    .unwrap_or(detector_defaults.input_height),
                class_names: detector
                    .class_names
                    .unwrap_or(detector_defaults.class_names),
                score_floor: detector.score_floor.unwrap_or(detector_defaults.score_floor),
                iou_threshold: detector
                    .iou_threshold
                    .unwrap_or(detector_defaults.iou_threshold),
            },
            None => detector_defaults,
        };
        let overlay = file
            .overlay
            .map(|overlay| OverlaySettings {
                font_path: overlay.font_path,
                preview_path: overlay.preview_path,
                show_window: overlay.show_window.unwrap_or(false),
            })
            .unwrap_or_default();
        let synthetic_defaults = SyntheticSettings::default();
        let synthetic = match file.synthetic {
            Some(synthetic) => SyntheticSettings {
                frames: synthetic.frames.unwrap_or(synthetic_defaults.frames),
                width: synthetic.width.unwrap_or(synthetic_defaults.width),
                height: synthetic.height.unwrap_or(synthetic_defaults.height),
            },
            None => synthetic_defaults,
        };
        Ok(Self {
            model_path: file.model_path.unwrap_or(defaults.model_path),
            source: file.source.unwrap_or(defaults.source),
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            class_filter: file.class_filter.unwrap_or(defaults.class_filter),
            emergency_dwell,
            fps_window_size: file.fps_window_size.unwrap_or(defaults.fps_window_size),
            detector,
            overlay,
            synthetic,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = non_empty_env("AMBULANCE_MODEL_PATH") {
            self.model_path = PathBuf::from(path);
        }
        if let Some(source) = non_empty_env("AMBULANCE_SOURCE") {
            self.source = source;
        }
        if let Some(value) = non_empty_env("AMBULANCE_CONFIDENCE") {
            self.confidence_threshold = value.trim().parse().map_err(|_| {
                StartupError::configuration("AMBULANCE_CONFIDENCE must be a number in [0, 1]")
            })?;
        }
        if let Some(class) = non_empty_env("AMBULANCE_CLASS") {
            self.class_filter = class;
        }
        if let Some(value) = non_empty_env("AMBULANCE_DWELL_SECS") {
            let secs: f64 = value.trim().parse().map_err(|_| {
                StartupError::configuration("AMBULANCE_DWELL_SECS must be a number of seconds")
            })?;
            self.emergency_dwell = dwell_from_secs(secs)?;
        }
        if let Some(value) = non_empty_env("AMBULANCE_FPS_WINDOW") {
            self.fps_window_size = value.trim().parse().map_err(|_| {
                StartupError::configuration("AMBULANCE_FPS_WINDOW must be a positive integer")
            })?;
        }
        if let Some(path) = non_empty_env("AMBULANCE_FONT_PATH") {
            self.overlay.font_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty_env("AMBULANCE_PREVIEW_PATH") {
            self.overlay.preview_path = Some(PathBuf::from(path));
        }
        if let Some(value) = non_empty_env("AMBULANCE_SHOW_WINDOW") {
            self.overlay.show_window = parse_flag(&value).ok_or_else(|| {
                StartupError::configuration("AMBULANCE_SHOW_WINDOW must be true or false")
            })?;
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(StartupError::configuration(format!(
                "confidence threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ))
            .into());
        }
        self.class_filter = self.class_filter.trim().to_string();
        if self.class_filter.is_empty() {
            return Err(StartupError::configuration("class filter must not be empty").into());
        }
        if self.emergency_dwell.is_zero() {
            return Err(
                StartupError::configuration("emergency dwell must be greater than zero").into(),
            );
        }
        if self.fps_window_size == 0 {
            return Err(StartupError::configuration("fps window size must be at least 1").into());
        }
        if self.fps_window_size > MAX_FPS_WINDOW_SIZE {
            return Err(StartupError::configuration(format!(
                "fps window size must be at most {}, got {}",
                MAX_FPS_WINDOW_SIZE, self.fps_window_size
            ))
            .into());
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(StartupError::configuration("detector input size must be non-zero").into());
        }
        if self.detector.class_names.is_empty() {
            return Err(
                StartupError::configuration("detector class_names must not be empty").into(),
            );
        }
        if self.source.trim().is_empty() {
            return Err(StartupError::configuration("source must not be empty").into());
        }
        if !self.model_path.is_file() {
            return Err(StartupError::configuration(format!(
                "model file not found at '{}'",
                self.model_path.display()
            ))
            .into());
        }
        Ok(())
    }
}

/// Seconds to a dwell duration, rejecting zero, negative and non-finite values.
pub fn dwell_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(StartupError::configuration(format!(
            "emergency dwell must be a positive number of seconds, got {}",
            secs
        ))
        .into());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| {
        StartupError::configuration(format!("invalid emergency dwell {}: {}", secs, e)).into()
    })
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        StartupError::configuration(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let parsed: std::result::Result<MonitorConfigFile, String> = if is_toml {
        toml::from_str(&raw).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&raw).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| {
        StartupError::configuration(format!("invalid config file {}: {}", path.display(), e))
            .into()
    })
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
