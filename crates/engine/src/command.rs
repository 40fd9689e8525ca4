use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use crate::error::{EngineError, Result};
use crate::job::{Backend, Job, JobParams};

/// GPU selection overrides applied to every helper invocation
pub const GPU_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("VK_ICD_FILENAMES", "/usr/share/vulkan/icd.d/nvidia_icd.json"),
    ("__NV_PRIME_RENDER_OFFLOAD", "1"),
    ("__GLX_VENDOR_LIBRARY_NAME", "nvidia"),
];

/// Device index passed with `-d` for GPU processing
const GPU_DEVICE_INDEX: &str = "0";

#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_SEPARATOR: &str = ":";

/// A fully resolved helper command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Complete environment for the child process
    pub env: BTreeMap<OsString, OsString>,
}

impl Invocation {
    /// Human-readable command line, for logs and the job-started event
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    pub fn env_var(&self, key: &str) -> Option<&OsStr> {
        self.env.get(OsStr::new(key)).map(OsString::as_os_str)
    }
}

/// Split a comma-separated option string, dropping blank entries
pub fn split_encoder_options(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|opt| !opt.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builds helper arguments and environment from a job
pub struct CommandBuilder {
    base_env: BTreeMap<OsString, OsString>,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuilder {
    /// Builder whose environment starts from the current process environment
    pub fn new() -> Self {
        Self::with_base_env(std::env::vars_os())
    }

    pub fn with_base_env<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        CommandBuilder {
            base_env: vars.into_iter().collect(),
        }
    }

    /// Build the invocation for a resolved job.
    ///
    /// Argument shape:
    /// `-i <in> -o <out> -p <processor> [processor flags] [-c <encoder>] [-e <opt>]...`
    pub fn build(&self, job: &Job, helper_path: &Path, ffmpeg_dir: Option<&Path>) -> Result<Invocation> {
        let output = job
            .output_path()
            .ok_or_else(|| EngineError::config("output path has not been computed"))?;

        let mut args: Vec<OsString> = Vec::new();
        push_pair(&mut args, "-i", job.input_path.as_os_str());
        push_pair(&mut args, "-o", output.as_os_str());

        let model = job
            .params
            .model_name()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                EngineError::config(format!("{} model name is empty", job.mode().processor()))
            })?;

        match &job.params {
            JobParams::Upscale { scale, backend, .. } => {
                push_pair(&mut args, "-p", job.mode().processor());
                push_pair(&mut args, "--realcugan-model", model);
                push_pair(&mut args, "-s", &scale.to_string());
                if *backend == Backend::Gpu {
                    push_pair(&mut args, "-d", GPU_DEVICE_INDEX);
                }
            }
            JobParams::Stabilize { factor, .. } => {
                push_pair(&mut args, "-p", job.mode().processor());
                push_pair(&mut args, "--rife-model", model);
                push_pair(&mut args, "-m", &factor.to_string());
                push_pair(&mut args, "-d", GPU_DEVICE_INDEX);
            }
        }

        if !job.encoder.is_empty() {
            push_pair(&mut args, "-c", &job.encoder);
        }
        for opt in job.encoder_options.iter().map(|o| o.trim()).filter(|o| !o.is_empty()) {
            push_pair(&mut args, "-e", opt);
        }

        Ok(Invocation {
            program: helper_path.to_path_buf(),
            args,
            env: self.env_overlay(ffmpeg_dir),
        })
    }

    /// Base environment with GPU overrides and the ffmpeg directory prepended to PATH
    pub fn env_overlay(&self, ffmpeg_dir: Option<&Path>) -> BTreeMap<OsString, OsString> {
        let mut env = self.base_env.clone();

        for (key, value) in GPU_ENV_OVERRIDES {
            env.insert(OsString::from(key), OsString::from(value));
        }

        if let Some(dir) = ffmpeg_dir {
            let key = OsString::from("PATH");
            let mut path = dir.as_os_str().to_os_string();
            // No separator when PATH is empty or unset: a trailing ':' would
            // put the working directory on the search path
            if let Some(existing) = env.get(&key).filter(|p| !p.is_empty()) {
                path.push(PATH_SEPARATOR);
                path.push(existing);
            }
            env.insert(key, path);
        }

        env
    }
}

fn push_pair(args: &mut Vec<OsString>, flag: &str, value: impl AsRef<OsStr>) {
    args.push(OsString::from(flag));
    args.push(value.as_ref().to_os_string());
}
