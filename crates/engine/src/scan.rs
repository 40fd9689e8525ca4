use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use walkdir::WalkDir;

/// Video file extensions accepted as job inputs
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm"];

/// Result of checking one command-line input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    /// File should be queued
    Candidate(PathBuf),
    /// File or path was left out (path, reason)
    Skipped(PathBuf, String),
}

pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Expand files and directories into video inputs.
///
/// Arguments keep their order; files inside a directory are sorted by name.
pub fn collect_inputs(paths: &[PathBuf]) -> Vec<ScanResult> {
    let mut results = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_media_file(path) {
                results.push(ScanResult::Candidate(absolute(path)));
            } else {
                results.push(ScanResult::Skipped(path.clone(), "not a video file".to_string()));
            }
            continue;
        }

        if !path.is_dir() {
            warn!("Input does not exist: {}", path.display());
            results.push(ScanResult::Skipped(path.clone(), "does not exist".to_string()));
            continue;
        }

        info!("Scanning directory: {}", path.display());
        let mut found = 0;
        let walker = WalkDir::new(path).follow_links(false).sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Error reading directory entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !is_media_file(entry.path()) {
                continue;
            }

            debug!("Found media file: {}", entry.path().display());
            found += 1;
            results.push(ScanResult::Candidate(absolute(entry.path())));
        }
        info!("Finished scanning {}: {} media files found", path.display(), found);
    }

    results
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: PathBuf) -> PathBuf {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_extension_filter_is_case_insensitive() {
        assert!(is_media_file(Path::new("a.MP4")));
        assert!(is_media_file(Path::new("/x/y/a.webm")));
        assert!(!is_media_file(Path::new("a.txt")));
        assert!(!is_media_file(Path::new("mp4")));
    }

    #[test]
    fn test_directories_are_walked_in_name_order() {
        let dir = TempDir::new().unwrap();
        let b = touch(dir.path().join("b.mkv"));
        let a = touch(dir.path().join("a.mp4"));
        touch(dir.path().join("notes.txt"));
        let nested = touch(dir.path().join("sub").join("c.MOV"));

        let results = collect_inputs(&[dir.path().to_path_buf()]);
        assert_eq!(
            results,
            vec![
                ScanResult::Candidate(a),
                ScanResult::Candidate(b),
                ScanResult::Candidate(nested),
            ]
        );
    }

    #[test]
    fn test_argument_order_and_skips() {
        let dir = TempDir::new().unwrap();
        let second = touch(dir.path().join("z.avi"));
        let first = touch(dir.path().join("y.mp4"));
        let text = touch(dir.path().join("readme.md"));
        let missing = dir.path().join("missing.mp4");

        let results = collect_inputs(&[second.clone(), text.clone(), missing.clone(), first.clone()]);
        assert_eq!(results[0], ScanResult::Candidate(second));
        assert!(matches!(&results[1], ScanResult::Skipped(p, _) if *p == text));
        assert!(matches!(&results[2], ScanResult::Skipped(p, _) if *p == missing));
        assert_eq!(results[3], ScanResult::Candidate(first));
    }
}
