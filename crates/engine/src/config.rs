use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// File name of the bundled helper looked up next to the front-end executable
pub const HELPER_APPIMAGE_NAME: &str = "Video2X-x86_64.AppImage";

/// Configuration for the video enhancer engine
///
/// The engine never caches this across jobs; a fresh snapshot is taken each
/// time a job is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancerConfig {
    /// Path to the video-processing helper executable
    pub helper_path: PathBuf,
    /// Directory expected to contain an `ffmpeg` binary (first lookup tier)
    pub ffmpeg_dir: Option<PathBuf>,
    /// Default output folder, used when `auto_output_path` is set
    pub output_folder: Option<PathBuf>,
    /// Write outputs to `output_folder` instead of next to the input
    pub auto_output_path: bool,
    /// Encoder passed to the helper with `-c`; empty disables the flag
    pub encoder: String,
    /// Comma-separated encoder options, each passed with `-e`
    pub encoder_options: String,
    /// Real-CUGAN model used by upscale jobs
    pub realcugan_model: String,
    /// RIFE model used by stabilize jobs
    pub rife_model: String,
    /// Working directory for the helper process
    pub working_dir: Option<PathBuf>,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl EnhancerConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            helper_path: PathBuf::new(),
            ffmpeg_dir: None,
            output_folder: None,
            auto_output_path: false,
            encoder: "h264_nvenc".to_string(),
            encoder_options: "preset=llhq,rc-lookahead=0".to_string(),
            realcugan_model: "models-se".to_string(),
            rife_model: "rife-v4.6".to_string(),
            working_dir: None,
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }

    /// Whether the configured helper path points at an existing file
    pub fn helper_is_file(&self) -> bool {
        !self.helper_path.as_os_str().is_empty() && self.helper_path.is_file()
    }

    /// Fill in `helper_path` with the bundled AppImage found in `dir`, if the
    /// configured path is unusable. Returns true when the path was replaced.
    pub fn detect_helper(&mut self, dir: &Path) -> bool {
        if self.helper_is_file() {
            return false;
        }

        let candidate = dir.join(HELPER_APPIMAGE_NAME);
        if candidate.is_file() {
            log::info!("Detected helper executable at: {}", candidate.display());
            self.helper_path = candidate;
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = EnhancerConfig::load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg, EnhancerConfig::default_config());

        let cfg = EnhancerConfig::load_config(None).unwrap();
        assert_eq!(cfg.encoder, "h264_nvenc");
        assert_eq!(cfg.realcugan_model, "models-se");
        assert_eq!(cfg.rife_model, "rife-v4.6");
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("enhancer.toml");
        std::fs::write(
            &path,
            "helper_path = \"/opt/v2x/v2x.AppImage\"\nauto_output_path = true\noutput_folder = \"/out\"\n",
        )
        .unwrap();

        let cfg = EnhancerConfig::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.helper_path, PathBuf::from("/opt/v2x/v2x.AppImage"));
        assert!(cfg.auto_output_path);
        assert_eq!(cfg.output_folder, Some(PathBuf::from("/out")));
        // Unspecified keys keep their defaults
        assert_eq!(cfg.encoder_options, "preset=llhq,rc-lookahead=0");
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("enhancer.json");
        std::fs::write(&path, r#"{"encoder": "", "rife_model": "rife-v4.26"}"#).unwrap();

        let cfg = EnhancerConfig::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.encoder, "");
        assert_eq!(cfg.rife_model, "rife-v4.26");
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "helper_path = [").unwrap();

        let err = EnhancerConfig::load_config(Some(&path)).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse TOML config"));
    }

    #[test]
    fn test_detect_helper_beside_executable() {
        let dir = TempDir::new().unwrap();
        let mut cfg = EnhancerConfig::default_config();
        assert!(!cfg.detect_helper(dir.path()));

        std::fs::write(dir.path().join(HELPER_APPIMAGE_NAME), b"").unwrap();
        assert!(cfg.detect_helper(dir.path()));
        assert_eq!(cfg.helper_path, dir.path().join(HELPER_APPIMAGE_NAME));

        // A usable configured path is left alone
        let other = TempDir::new().unwrap();
        assert!(!cfg.detect_helper(other.path()));
    }
}
