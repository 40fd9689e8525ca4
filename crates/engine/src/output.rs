use std::ffi::OsString;
use std::path::{Path, PathBuf};
use crate::config::EnhancerConfig;
use crate::error::{EngineError, Result};
use crate::job::JobMode;

/// Where output files are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Next to the input file
    AlongsideInput,
    /// In the configured default folder; `None` means it was never configured
    DefaultFolder(Option<PathBuf>),
}

impl OutputPolicy {
    pub fn from_config(cfg: &EnhancerConfig) -> Self {
        if cfg.auto_output_path {
            let folder = cfg
                .output_folder
                .clone()
                .filter(|p| !p.as_os_str().is_empty());
            OutputPolicy::DefaultFolder(folder)
        } else {
            OutputPolicy::AlongsideInput
        }
    }
}

/// Output file name for `input`: `<stem><suffix><.ext>`
pub fn output_file_name(input: &Path, mode: JobMode) -> OsString {
    let mut name = input.file_stem().map(OsString::from).unwrap_or_default();
    name.push(mode.output_suffix());
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    name
}

/// Compute the output path for `input` and create its directory.
pub fn generate_output_path(input: &Path, mode: JobMode, policy: &OutputPolicy) -> Result<PathBuf> {
    let base_dir = match policy {
        OutputPolicy::AlongsideInput => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
        OutputPolicy::DefaultFolder(Some(dir)) => dir.clone(),
        OutputPolicy::DefaultFolder(None) => {
            return Err(EngineError::config("default output folder not set in settings"));
        }
    };

    if !base_dir.as_os_str().is_empty() {
        std::fs::create_dir_all(&base_dir).map_err(|source| EngineError::Filesystem {
            path: base_dir.clone(),
            source,
        })?;
    }

    Ok(base_dir.join(output_file_name(input, mode)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_alongside_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.mp4");
        let out = generate_output_path(&input, JobMode::Upscale, &OutputPolicy::AlongsideInput).unwrap();
        assert_eq!(out, dir.path().join("clip_upscaled.mp4"));
    }

    #[test]
    fn test_alongside_input_pure_name() {
        assert_eq!(
            output_file_name(Path::new("/a/b/clip.mp4"), JobMode::Upscale),
            OsString::from("clip_upscaled.mp4")
        );
        assert_eq!(
            output_file_name(Path::new("/a/b/clip"), JobMode::Stabilize),
            OsString::from("clip_stabilized")
        );
        assert_eq!(
            output_file_name(Path::new("/a/b/my.clip.webm"), JobMode::Stabilize),
            OsString::from("my.clip_stabilized.webm")
        );
    }

    #[test]
    fn test_default_folder_is_created() {
        let dir = TempDir::new().unwrap();
        let out_dir = dir.path().join("out").join("nested");
        let policy = OutputPolicy::DefaultFolder(Some(out_dir.clone()));

        let out = generate_output_path(Path::new("/a/b/clip.mp4"), JobMode::Stabilize, &policy).unwrap();
        assert_eq!(out, out_dir.join("clip_stabilized.mp4"));
        assert!(out_dir.is_dir());
    }

    #[test]
    fn test_unset_default_folder_is_config_error() {
        let policy = OutputPolicy::DefaultFolder(None);
        let err = generate_output_path(Path::new("/a/b/clip.mp4"), JobMode::Upscale, &policy).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let cfg = EnhancerConfig {
            auto_output_path: true,
            output_folder: Some(PathBuf::new()),
            ..EnhancerConfig::default_config()
        };
        assert_eq!(OutputPolicy::from_config(&cfg), OutputPolicy::DefaultFolder(None));
    }

    #[cfg(unix)]
    #[test]
    fn test_uncreatable_folder_is_filesystem_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();
        let policy = OutputPolicy::DefaultFolder(Some(blocker.join("sub")));

        let err = generate_output_path(Path::new("/a/clip.mp4"), JobMode::Upscale, &policy).unwrap_err();
        assert!(matches!(err, EngineError::Filesystem { .. }));
    }

    proptest! {
        #[test]
        fn test_output_name_keeps_stem_and_extension(
            stem in "[a-zA-Z0-9 _-]{1,20}",
            ext in prop_oneof![Just("mp4"), Just("mkv"), Just("mov"), Just("avi"), Just("webm")],
            stabilize in prop::bool::ANY,
        ) {
            let mode = if stabilize { JobMode::Stabilize } else { JobMode::Upscale };
            let input = PathBuf::from(format!("/videos/{}.{}", stem, ext));
            let name = output_file_name(&input, mode);
            let expected = format!("{}{}.{}", stem, mode.output_suffix(), ext);
            prop_assert_eq!(name.to_string_lossy(), expected);
        }
    }
}
