use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::config::EnhancerConfig;
use crate::error::{EngineError, Result};

pub type JobId = Uuid;

/// Upscale ratio accepted by the Real-CUGAN processor
pub const SCALE_RANGE: std::ops::RangeInclusive<u8> = 1..=4;
/// Frame interpolation factor accepted by the RIFE processor
pub const FACTOR_RANGE: std::ops::RangeInclusive<u8> = 2..=8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    Upscale,
    Stabilize,
}

impl JobMode {
    /// Suffix appended to the input stem to name the output file
    pub fn output_suffix(&self) -> &'static str {
        match self {
            JobMode::Upscale => "_upscaled",
            JobMode::Stabilize => "_stabilized",
        }
    }

    /// Processor name passed to the helper with `-p`
    pub fn processor(&self) -> &'static str {
        match self {
            JobMode::Upscale => "realcugan",
            JobMode::Stabilize => "rife",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Gpu,
    Cpu,
}

/// Mode-specific parameters of a job
///
/// A `model_name` of `None` means "use the model from configuration"; it is
/// filled in when the job is built, right before it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum JobParams {
    Upscale {
        model_name: Option<String>,
        scale: u8,
        backend: Backend,
    },
    Stabilize {
        model_name: Option<String>,
        factor: u8,
    },
}

impl JobParams {
    pub fn mode(&self) -> JobMode {
        match self {
            JobParams::Upscale { .. } => JobMode::Upscale,
            JobParams::Stabilize { .. } => JobMode::Stabilize,
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        match self {
            JobParams::Upscale { model_name, .. } | JobParams::Stabilize { model_name, .. } => {
                model_name.as_deref()
            }
        }
    }

    fn model_name_mut(&mut self) -> &mut Option<String> {
        match self {
            JobParams::Upscale { model_name, .. } | JobParams::Stabilize { model_name, .. } => {
                model_name
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

/// One requested conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub input_path: PathBuf,
    pub params: JobParams,
    /// Encoder name; resolved from configuration when the job is built
    pub encoder: String,
    /// Encoder options in order; resolved from configuration when the job is built
    pub encoder_options: Vec<String>,
    /// Computed once when the job is built
    pub output_path: Option<PathBuf>,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job, checking that its parameters are complete
    pub fn new(input_path: impl Into<PathBuf>, params: JobParams) -> Result<Self> {
        let job = Job {
            id: Uuid::new_v4(),
            input_path: input_path.into(),
            params,
            encoder: String::new(),
            encoder_options: Vec::new(),
            output_path: None,
            state: JobState::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        job.validate()?;
        Ok(job)
    }

    pub fn mode(&self) -> JobMode {
        self.params.mode()
    }

    /// File name of the input, used when rendering progress
    pub fn display_name(&self) -> String {
        self.input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input_path.display().to_string())
    }

    /// Structural checks performed at enqueue time
    pub fn validate(&self) -> Result<()> {
        if self.input_path.as_os_str().is_empty() {
            return Err(EngineError::config("input path is empty"));
        }
        if !self.input_path.is_file() {
            return Err(EngineError::config(format!(
                "input file does not exist: {}",
                self.input_path.display()
            )));
        }

        match &self.params {
            JobParams::Upscale { scale, .. } if !SCALE_RANGE.contains(scale) => {
                return Err(EngineError::config(format!(
                    "upscale ratio {} is outside {}-{}",
                    scale,
                    SCALE_RANGE.start(),
                    SCALE_RANGE.end()
                )));
            }
            JobParams::Stabilize { factor, .. } if !FACTOR_RANGE.contains(factor) => {
                return Err(EngineError::config(format!(
                    "interpolation factor {} is outside {}-{}",
                    factor,
                    FACTOR_RANGE.start(),
                    FACTOR_RANGE.end()
                )));
            }
            _ => {}
        }

        if let Some(name) = self.params.model_name() {
            if name.trim().is_empty() {
                return Err(EngineError::config(format!(
                    "{} model name is empty",
                    self.mode().processor()
                )));
            }
        }

        Ok(())
    }

    /// Fill in everything taken from configuration: model name, encoder
    /// settings and output path. Must run while the job is still pending.
    pub(crate) fn resolve(&mut self, cfg: &EnhancerConfig) -> Result<()> {
        let mode = self.mode();
        let slot = self.params.model_name_mut();
        if slot.is_none() {
            let configured = match mode {
                JobMode::Upscale => &cfg.realcugan_model,
                JobMode::Stabilize => &cfg.rife_model,
            };
            *slot = Some(configured.trim().to_string());
        }
        if self.params.model_name().map_or(true, |m| m.is_empty()) {
            return Err(EngineError::config(format!(
                "{} model name not set in settings",
                mode.processor()
            )));
        }

        self.encoder = cfg.encoder.trim().to_string();
        self.encoder_options = crate::command::split_encoder_options(&cfg.encoder_options);

        if self.output_path.is_none() {
            let policy = crate::output::OutputPolicy::from_config(cfg);
            self.output_path = Some(crate::output::generate_output_path(&self.input_path, mode, &policy)?);
        }

        Ok(())
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"").unwrap();
        path
    }

    fn upscale(model: Option<&str>, scale: u8) -> JobParams {
        JobParams::Upscale {
            model_name: model.map(str::to_string),
            scale,
            backend: Backend::Gpu,
        }
    }

    #[test]
    fn test_new_job_is_pending() {
        let dir = TempDir::new().unwrap();
        let input = touch(&dir, "clip.mp4");
        let job = Job::new(&input, upscale(None, 2)).unwrap();

        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.mode(), JobMode::Upscale);
        assert_eq!(job.display_name(), "clip.mp4");
        assert!(job.output_path.is_none());
    }

    #[test]
    fn test_rejects_missing_input_and_bad_ranges() {
        let dir = TempDir::new().unwrap();
        let input = touch(&dir, "clip.mp4");

        assert!(matches!(
            Job::new(dir.path().join("nope.mp4"), upscale(None, 2)),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(Job::new("", upscale(None, 2)), Err(EngineError::Config(_))));
        assert!(matches!(Job::new(&input, upscale(None, 0)), Err(EngineError::Config(_))));
        assert!(matches!(Job::new(&input, upscale(None, 5)), Err(EngineError::Config(_))));
        assert!(matches!(
            Job::new(&input, JobParams::Stabilize { model_name: None, factor: 1 }),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(
            Job::new(&input, JobParams::Stabilize { model_name: None, factor: 9 }),
            Err(EngineError::Config(_))
        ));
        assert!(matches!(Job::new(&input, upscale(Some("  "), 2)), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_resolve_takes_models_and_encoder_from_config() {
        let dir = TempDir::new().unwrap();
        let input = touch(&dir, "clip.mkv");
        let mut job = Job::new(&input, JobParams::Stabilize { model_name: None, factor: 4 }).unwrap();

        let cfg = EnhancerConfig {
            encoder_options: " preset=p7 , ,tune=hq".to_string(),
            ..EnhancerConfig::default_config()
        };
        job.resolve(&cfg).unwrap();

        assert_eq!(job.params.model_name(), Some("rife-v4.6"));
        assert_eq!(job.encoder, "h264_nvenc");
        assert_eq!(job.encoder_options, vec!["preset=p7", "tune=hq"]);
        assert_eq!(job.output_path(), Some(dir.path().join("clip_stabilized.mkv").as_path()));
    }

    #[test]
    fn test_resolve_fails_on_empty_configured_model() {
        let dir = TempDir::new().unwrap();
        let input = touch(&dir, "clip.mp4");
        let mut job = Job::new(&input, JobParams::Stabilize { model_name: None, factor: 2 }).unwrap();

        let cfg = EnhancerConfig {
            rife_model: String::new(),
            ..EnhancerConfig::default_config()
        };
        assert!(matches!(job.resolve(&cfg), Err(EngineError::Config(_))));
        assert!(job.output_path.is_none());
    }

    #[test]
    fn test_explicit_model_wins_over_config() {
        let dir = TempDir::new().unwrap();
        let input = touch(&dir, "clip.mp4");
        let mut job = Job::new(&input, upscale(Some("models-pro"), 3)).unwrap();
        job.resolve(&EnhancerConfig::default_config()).unwrap();
        assert_eq!(job.params.model_name(), Some("models-pro"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }
}
