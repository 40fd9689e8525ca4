use std::ffi::OsString;
use std::path::{Path, PathBuf};
use log::{debug, warn};
use serde::Serialize;

/// Name of the transcoder binary the helper expects on PATH
pub const FFMPEG_BIN: &str = "ffmpeg";

/// Directory under the user's home checked by the second lookup tier
pub const HOME_FFMPEG_DIR: &str = "ffmpeg";

/// Which lookup tier produced the ffmpeg directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FfmpegSource {
    Configured,
    Home,
    SystemPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegLocation {
    pub dir: PathBuf,
    pub source: FfmpegSource,
}

/// Finds the ffmpeg installation directory
///
/// Tiers are tried in order and each is consulted only when the previous
/// one found nothing:
/// 1. the configured directory, if it contains a file named `ffmpeg`
/// 2. `~/ffmpeg`, under the same check
/// 3. the directory of whatever `ffmpeg` the executable search path yields
#[derive(Debug, Clone)]
pub struct PathResolver {
    configured: Option<PathBuf>,
    home: Option<PathBuf>,
    search_path: Option<OsString>,
}

impl PathResolver {
    /// Resolver using the real home directory and `PATH`
    pub fn from_env(configured: Option<&Path>) -> Self {
        Self {
            configured: configured.map(Path::to_path_buf),
            home: dirs::home_dir(),
            search_path: std::env::var_os("PATH"),
        }
    }

    /// Resolver with explicit inputs for every tier
    pub fn new(configured: Option<PathBuf>, home: Option<PathBuf>, search_path: Option<OsString>) -> Self {
        Self {
            configured,
            home,
            search_path,
        }
    }

    pub fn resolve(&self) -> Option<FfmpegLocation> {
        if let Some(dir) = self.configured.as_deref().filter(|d| !d.as_os_str().is_empty()) {
            if contains_ffmpeg(dir) {
                debug!("Using ffmpeg from settings: {}", dir.display());
                return Some(FfmpegLocation {
                    dir: dir.to_path_buf(),
                    source: FfmpegSource::Configured,
                });
            }
            debug!("Configured ffmpeg directory has no ffmpeg binary: {}", dir.display());
        }

        if let Some(home) = &self.home {
            let dir = home.join(HOME_FFMPEG_DIR);
            if contains_ffmpeg(&dir) {
                debug!("Using ffmpeg from: {}", dir.display());
                return Some(FfmpegLocation {
                    dir,
                    source: FfmpegSource::Home,
                });
            }
        }

        if let Some(search_path) = &self.search_path {
            let cwd = std::env::current_dir().unwrap_or_default();
            if let Ok(found) = which::which_in(FFMPEG_BIN, Some(search_path), cwd) {
                if let Some(dir) = found.parent() {
                    debug!("Using system ffmpeg from: {}", dir.display());
                    return Some(FfmpegLocation {
                        dir: dir.to_path_buf(),
                        source: FfmpegSource::SystemPath,
                    });
                }
            }
        }

        warn!("'{}' not found in settings, home directory, or system PATH", FFMPEG_BIN);
        None
    }
}

fn contains_ffmpeg(dir: &Path) -> bool {
    dir.join(FFMPEG_BIN).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dir_with_ffmpeg() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_ffmpeg(dir.path());
        dir
    }

    fn make_dir(path: PathBuf) -> PathBuf {
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    fn write_ffmpeg(dir: &Path) {
        let bin = dir.join(FFMPEG_BIN);
        std::fs::write(&bin, b"#!/bin/sh\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    #[test]
    fn test_configured_directory_wins() {
        let configured = dir_with_ffmpeg();
        let home = TempDir::new().unwrap();
        write_ffmpeg(&make_dir(home.path().join(HOME_FFMPEG_DIR)));

        let resolver = PathResolver::new(
            Some(configured.path().to_path_buf()),
            Some(home.path().to_path_buf()),
            None,
        );
        let found = resolver.resolve().unwrap();
        assert_eq!(found.dir, configured.path());
        assert_eq!(found.source, FfmpegSource::Configured);
    }

    #[test]
    fn test_configured_without_binary_falls_through_to_home() {
        let configured = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let home_ffmpeg = make_dir(home.path().join(HOME_FFMPEG_DIR));
        write_ffmpeg(&home_ffmpeg);

        let resolver = PathResolver::new(
            Some(configured.path().to_path_buf()),
            Some(home.path().to_path_buf()),
            None,
        );
        let found = resolver.resolve().unwrap();
        assert_eq!(found.dir, home_ffmpeg);
        assert_eq!(found.source, FfmpegSource::Home);
    }

    #[cfg(unix)]
    #[test]
    fn test_falls_back_to_search_path() {
        let empty_home = TempDir::new().unwrap();
        let bin_dir = dir_with_ffmpeg();
        let other = TempDir::new().unwrap();
        let search = std::env::join_paths([other.path(), bin_dir.path()]).unwrap();

        let resolver = PathResolver::new(None, Some(empty_home.path().to_path_buf()), Some(search));
        let found = resolver.resolve().unwrap();
        assert_eq!(found.dir, bin_dir.path());
        assert_eq!(found.source, FfmpegSource::SystemPath);
    }

    #[test]
    fn test_not_found() {
        let empty_home = TempDir::new().unwrap();
        let empty_bin = TempDir::new().unwrap();
        let resolver = PathResolver::new(
            Some(PathBuf::from("/nonexistent/ffmpeg-dir")),
            Some(empty_home.path().to_path_buf()),
            Some(empty_bin.path().as_os_str().to_os_string()),
        );
        assert_eq!(resolver.resolve(), None);
    }

    #[test]
    fn test_home_dir_must_contain_a_file() {
        let home = TempDir::new().unwrap();
        // A directory named ffmpeg inside ~/ffmpeg is not a binary
        std::fs::create_dir_all(home.path().join(HOME_FFMPEG_DIR).join(FFMPEG_BIN)).unwrap();
        let resolver = PathResolver::new(None, Some(home.path().to_path_buf()), None);
        assert_eq!(resolver.resolve(), None);
    }
}
