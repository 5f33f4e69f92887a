use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI configuration, loaded from `TRYON_*` environment variables and
/// optionally overlaid by a TOML file.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base URL of the makeup synthesis service.
    pub synthesis_url: String,
    /// Directory containing `det_10g.onnx`.
    pub model_dir: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Frames discarded after stream start (auto-exposure settling).
    pub warmup_frames: usize,
    /// Per-request timeout in seconds; 0 disables it.
    pub request_timeout_secs: u64,
}

/// Keys accepted in the `--config` file. Absent keys keep the env value.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    synthesis_url: Option<String>,
    model_dir: Option<PathBuf>,
    camera_device: Option<String>,
    warmup_frames: Option<usize>,
    request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = var("TRYON_MODEL_DIR").map(PathBuf::from).unwrap_or_else(|| {
            var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                    PathBuf::from(home).join(".local/share")
                })
                .join("tryon/models")
        });

        Self {
            synthesis_url: var("TRYON_SYNTHESIS_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8000".to_string()),
            model_dir,
            camera_device: var("TRYON_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            warmup_frames: parsed(&var, "TRYON_WARMUP_FRAMES", 4),
            request_timeout_secs: parsed(&var, "TRYON_REQUEST_TIMEOUT_SECS", 0),
        }
    }

    /// Environment first, then `path` on top when given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = Self::from_env();
        match path {
            Some(path) => {
                let src = std::fs::read_to_string(path)?;
                let config = config.overlay(&src)?;
                tracing::debug!(path = %path.display(), "config file applied");
                Ok(config)
            }
            None => Ok(config),
        }
    }

    fn overlay(mut self, src: &str) -> Result<Self, toml::de::Error> {
        let file: ConfigFile = toml::from_str(src)?;
        if let Some(v) = file.synthesis_url {
            self.synthesis_url = v;
        }
        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.camera_device {
            self.camera_device = v;
        }
        if let Some(v) = file.warmup_frames {
            self.warmup_frames = v;
        }
        if let Some(v) = file.request_timeout_secs {
            self.request_timeout_secs = v;
        }
        Ok(self)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn model_location(&self) -> String {
        self.model_dir.to_string_lossy().into_owned()
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
