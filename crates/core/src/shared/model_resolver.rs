use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::constants::APP_DIR_NAME;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("model file not found: {0}")]
    Missing(PathBuf),
    #[error("model '{name}' is not cached in {cache_dir} and no download URL was given")]
    NotCached { name: String, cache_dir: PathBuf },
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Where a model file should come from.
#[derive(Clone, Debug, Default)]
pub struct ModelSource<'a> {
    /// Explicit file chosen by the user; must exist.
    pub path: Option<&'a Path>,
    /// Download location used when the model is not cached yet.
    pub url: Option<&'a str>,
}

/// Resolve a model file by name.
///
/// Resolution order:
/// 1. Explicit path from `source`
/// 2. `cache_dir/name`
/// 3. Download `source.url` into `cache_dir`
pub fn resolve_in(
    name: &str,
    cache_dir: &Path,
    source: &ModelSource<'_>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(path) = source.path {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(ModelResolveError::Missing(path.to_path_buf()))
        };
    }

    let cached_path = cache_dir.join(name);
    if cached_path.is_file() {
        log::debug!("Using cached model {}", cached_path.display());
        return Ok(cached_path);
    }

    let url = source.url.ok_or_else(|| ModelResolveError::NotCached {
        name: name.to_string(),
        cache_dir: cache_dir.to_path_buf(),
    })?;
    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading {name} from {url}");
    download(url, &cached_path, progress)?;
    Ok(cached_path)
}

/// [`resolve_in`] against the platform model cache directory.
pub fn resolve(
    name: &str,
    source: &ModelSource<'_>,
    progress: Option<ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(path) = source.path {
        // Skip the cache lookup entirely so a missing cache dir is not an error.
        return resolve_in(name, path.parent().unwrap_or(path), source, progress);
    }
    resolve_in(name, &model_cache_dir()?, source, progress)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/ShakeFace/models/`
/// - Linux: `$XDG_CACHE_HOME/ShakeFace/models/` or `~/.cache/ShakeFace/models/`
/// - Windows: `%LOCALAPPDATA%/ShakeFace/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    let base = dirs::data_dir();
    #[cfg(not(target_os = "macos"))]
    let base = dirs::cache_dir();

    base.map(|d| d.join(APP_DIR_NAME).join("models"))
        .ok_or(ModelResolveError::NoCacheDir)
}

fn download(url: &str, dest: &Path, progress: Option<ProgressFn>) -> Result<(), ModelResolveError> {
    let download_err = |source| ModelResolveError::Download {
        url: url.to_string(),
        source,
    };
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(download_err)?;
    let total = response.content_length().unwrap_or(0);

    // Stream into a sibling temp file, renamed into place once complete.
    let temp_path = dest.with_extension("part");
    let write_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ModelResolveError::Write { path, source }
    };
    let result = (|| -> Result<(), ModelResolveError> {
        let mut file = fs::File::create(&temp_path).map_err(write_err(&temp_path))?;
        let mut buf = vec![0u8; 256 * 1024];
        let mut downloaded: u64 = 0;
        loop {
            let n = response.read(&mut buf).map_err(write_err(&temp_path))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).map_err(write_err(&temp_path))?;
            downloaded += n as u64;
            if let Some(cb) = &progress {
                cb(downloaded, total);
            }
        }
        file.flush().map_err(write_err(&temp_path))?;
        drop(file);
        fs::rename(&temp_path, dest).map_err(write_err(dest))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_explicit_path_wins() {
        let tmp = TempDir::new().unwrap();
        let model = tmp.path().join("custom.onnx");
        fs::write(&model, b"model").unwrap();

        let source = ModelSource {
            path: Some(&model),
            url: None,
        };
        let resolved = resolve_in("other.onnx", tmp.path(), &source, None).unwrap();
        assert_eq!(resolved, model);
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.onnx");
        let source = ModelSource {
            path: Some(&missing),
            url: None,
        };
        let err = resolve("nope.onnx", &source, None).unwrap_err();
        assert!(matches!(err, ModelResolveError::Missing(p) if p == missing));
    }

    #[test]
    fn test_finds_cached_file() {
        let tmp = TempDir::new().unwrap();
        let cached = tmp.path().join("face.onnx");
        fs::write(&cached, b"cached").unwrap();

        let resolved = resolve_in("face.onnx", tmp.path(), &ModelSource::default(), None).unwrap();
        assert_eq!(resolved, cached);
    }

    #[test]
    fn test_not_cached_without_url_is_error() {
        let tmp = TempDir::new().unwrap();
        let err = resolve_in("face.onnx", tmp.path(), &ModelSource::default(), None).unwrap_err();
        assert!(matches!(err, ModelResolveError::NotCached { .. }));
        assert!(err.to_string().contains("face.onnx"));
    }

    #[test]
    fn test_model_cache_dir_is_namespaced() {
        let path = model_cache_dir().unwrap();
        assert!(path.to_string_lossy().contains(APP_DIR_NAME));
        assert!(path.ends_with("models"));
    }

    #[test]
    fn test_failed_download_leaves_no_partial_file() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("model.onnx");
        let result = download("http://invalid.nonexistent.example.com/model", &dest, None);
        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }
}
