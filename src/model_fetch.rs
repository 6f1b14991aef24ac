//! Face-parsing model download, available with the `fetch-model` feature.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use hairshade::HairshadeResult;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

const APP_DIR_NAME: &str = "hairshade";
const MODEL_FILENAME: &str = "model.onnx";
const CACHE_DIR_ENV: &str = "HAIRSHADE_MODEL_CACHE_DIR";
pub const DEFAULT_MODEL_URL: &str =
    "https://huggingface.co/Xenova/face-parsing/resolve/main/onnx/model.onnx";
/// Header Hugging Face sets on `resolve` redirects of LFS files: the SHA-256 of the content.
const PUBLISHED_DIGEST_HEADER: &str = "x-linked-etag";

/// Where the expected SHA-256 of a download comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    /// A digest supplied by the user, lowercase hex.
    Pinned(String),
    /// The digest the host publishes alongside the file. Fetching fails when there is none.
    Published,
}

impl Checksum {
    /// Pin `hex` after trimming and lowercasing; rejects anything but 64 hex digits.
    pub fn pinned(hex: &str) -> HairshadeResult<Self> {
        normalize_digest(hex).map(Checksum::Pinned).ok_or_else(|| {
            invalid_digest(format!("`{hex}` is not a SHA-256 digest (64 hex digits)")).into()
        })
    }
}

/// A model file to install and the digest it must match.
#[derive(Debug, Clone)]
pub struct ModelSource {
    pub url: String,
    pub checksum: Checksum,
}

impl Default for ModelSource {
    fn default() -> Self {
        Self {
            url: DEFAULT_MODEL_URL.to_string(),
            checksum: Checksum::Published,
        }
    }
}

fn invalid_digest(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

fn network_error(url: &str, error: ureq::Error) -> io::Error {
    match error {
        ureq::Error::StatusCode(status) => {
            io::Error::other(format!("request to {url} failed with HTTP {status}"))
        }
        other => io::Error::other(format!("request to {url} failed: {other}")),
    }
}

fn normalize_digest(hex: &str) -> Option<String> {
    let hex = hex.trim().to_ascii_lowercase();
    (hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit())).then_some(hex)
}

/// Read a SHA-256 out of an ETag-style header value such as `"abc…"` or `W/"abc…"`.
///
/// Git blob ids (40 hex digits) and other opaque tags yield `None`.
fn parse_published_digest(value: &str) -> Option<String> {
    let value = value.trim();
    let value = value.strip_prefix("W/").unwrap_or(value);
    normalize_digest(value.trim_matches('"'))
}

/// Ask the host for the digest it publishes for `url`, without following the redirect.
fn published_digest(url: &str) -> HairshadeResult<String> {
    let response = ureq::head(url)
        .config()
        .max_redirects(0)
        .build()
        .call()
        .map_err(|e| network_error(url, e))?;
    response
        .headers()
        .get(PUBLISHED_DIGEST_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_published_digest)
        .ok_or_else(|| {
            invalid_digest(format!(
                "{url} does not publish a SHA-256; pass --sha256 to verify the download"
            ))
            .into()
        })
}

fn expected_digest(source: &ModelSource) -> HairshadeResult<String> {
    match &source.checksum {
        Checksum::Pinned(hex) => Ok(hex.clone()),
        Checksum::Published => {
            let digest = published_digest(&source.url)?;
            debug!(url = %source.url, sha256 = %digest, "using published digest");
            Ok(digest)
        }
    }
}

/// Get the default model cache directory path.
///
/// Returns `~/.cache/hairshade/` on Linux, `~/Library/Caches/hairshade/` on macOS,
/// or falls back to current directory if home cannot be determined.
pub fn default_model_cache_dir() -> PathBuf {
    let env_override = std::env::var_os(CACHE_DIR_ENV).map(PathBuf::from);
    resolve_cache_dir(env_override, dirs::cache_dir())
}

fn resolve_cache_dir(env_override: Option<PathBuf>, system_cache_dir: Option<PathBuf>) -> PathBuf {
    match env_override {
        Some(path) if !path.as_os_str().is_empty() => path,
        _ => system_cache_dir.map_or_else(|| PathBuf::from("."), |dir| dir.join(APP_DIR_NAME)),
    }
}

pub fn default_model_cache_path() -> PathBuf {
    default_model_cache_dir().join(MODEL_FILENAME)
}

/// Copy `reader` into `dest`, returning the lowercase hex SHA-256 of what was written.
fn stream_to_file<R: Read>(reader: &mut R, dest: &Path, pb: &ProgressBar) -> HairshadeResult<String> {
    let mut file = File::create(dest)?;
    let mut hasher = Sha256::new();
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        file.write_all(&chunk[..n])?;
        hasher.update(&chunk[..n]);
        pb.inc(n as u64);
    }
    file.sync_all()?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Stream into `staging` and keep it only when its digest equals `expected`.
fn download_verified<R: Read>(
    reader: &mut R,
    staging: &Path,
    expected: &str,
    pb: &ProgressBar,
) -> HairshadeResult<()> {
    let actual = match stream_to_file(reader, staging, pb) {
        Ok(actual) => actual,
        Err(err) => {
            let _ = fs::remove_file(staging);
            return Err(err);
        }
    };
    if actual != expected {
        let _ = fs::remove_file(staging);
        return Err(invalid_digest(format!(
            "checksum mismatch: expected {expected}, downloaded {actual}"
        ))
        .into());
    }
    pb.finish_with_message("verified");
    Ok(())
}

fn progress_bar(total: Option<u64>) -> ProgressBar {
    let pb = ProgressBar::new(total.unwrap_or(0));
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

fn print_usage_hint(installed: &Path) {
    eprintln!("Model saved to: {}", installed.display());
    if installed == default_model_cache_path() {
        eprintln!(
            "hairshade uses it whenever --model, {} and ./{} are all absent.",
            hairshade::ENV_MODEL_PATH,
            MODEL_FILENAME
        );
    } else {
        eprintln!(
            "Pass --model {} or set {} to use it.",
            installed.display(),
            hairshade::ENV_MODEL_PATH
        );
    }
}

/// Download `source` to `output` unless a model is already there and `force` is off.
///
/// The download lands in a sibling `.onnx.tmp` file and is renamed into place
/// only after its SHA-256 matches.
pub fn install_model(source: &ModelSource, output: &Path, force: bool) -> HairshadeResult<PathBuf> {
    if output.exists() && !force {
        info!(path = %output.display(), "model already installed");
        eprintln!(
            "Model already exists at {} (use --force to replace it).",
            output.display()
        );
        return Ok(output.to_path_buf());
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let expected = expected_digest(source)?;
    info!(url = %source.url, output = %output.display(), sha256 = %expected, "downloading model");
    eprintln!("Downloading {}", source.url);

    let response = ureq::get(&source.url)
        .call()
        .map_err(|e| network_error(&source.url, e))?;
    let pb = progress_bar(response.body().content_length());
    let staging = output.with_extension("onnx.tmp");
    let mut reader = response.into_body().into_reader();
    download_verified(&mut reader, &staging, &expected, &pb)?;

    fs::rename(&staging, output)?;
    print_usage_hint(output);
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const MODEL_BYTES: &[u8] = b"face-parsing-model-bytes";

    fn digest_of(bytes: &[u8]) -> String {
        format!("{:x}", Sha256::digest(bytes))
    }

    mod checksum {
        use super::*;

        #[test]
        fn pinned_digest_is_normalized() {
            let upper = digest_of(MODEL_BYTES).to_ascii_uppercase();
            let pinned = Checksum::pinned(&format!("  {upper} ")).unwrap();
            assert_eq!(pinned, Checksum::Pinned(digest_of(MODEL_BYTES)));
        }

        #[test]
        fn pinned_rejects_short_or_non_hex() {
            assert!(Checksum::pinned("deadbeef").is_err());
            assert!(Checksum::pinned(&"g".repeat(64)).is_err());
        }

        #[test]
        fn default_source_requires_published_digest() {
            let source = ModelSource::default();
            assert_eq!(source.url, DEFAULT_MODEL_URL);
            assert_eq!(source.checksum, Checksum::Published);
        }

        #[test]
        fn published_digest_parses_quoted_and_weak_etags() {
            let hex = digest_of(MODEL_BYTES);
            assert_eq!(parse_published_digest(&format!("\"{hex}\"")), Some(hex.clone()));
            assert_eq!(parse_published_digest(&format!("W/\"{hex}\"")), Some(hex));
        }

        #[test]
        fn git_blob_etag_is_not_a_digest() {
            let sha1 = "\"0123456789abcdef0123456789abcdef01234567\"";
            assert_eq!(parse_published_digest(sha1), None);
            assert_eq!(parse_published_digest(""), None);
        }
    }

    mod download {
        use super::*;

        #[test]
        fn matching_digest_keeps_staged_file() {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            let staging = dir.path().join("model.onnx.tmp");
            let mut reader = Cursor::new(MODEL_BYTES.to_vec());

            download_verified(&mut reader, &staging, &digest_of(MODEL_BYTES), &ProgressBar::hidden())
                .expect("digest should match");

            assert_eq!(fs::read(&staging).expect("read staged model"), MODEL_BYTES);
        }

        #[test]
        fn mismatched_digest_removes_staged_file() {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            let staging = dir.path().join("model.onnx.tmp");
            let mut reader = Cursor::new(b"tampered".to_vec());

            let err = download_verified(
                &mut reader,
                &staging,
                &digest_of(MODEL_BYTES),
                &ProgressBar::hidden(),
            )
            .expect_err("digest should not match");

            assert!(err.to_string().contains("checksum mismatch"));
            assert!(!staging.exists());
        }

        #[test]
        fn stream_reports_digest_of_written_bytes() {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            let dest = dir.path().join("blob");
            let digest = stream_to_file(
                &mut Cursor::new(MODEL_BYTES.to_vec()),
                &dest,
                &ProgressBar::hidden(),
            )
            .unwrap();
            assert_eq!(digest, digest_of(MODEL_BYTES));
        }

        #[test]
        fn existing_model_without_force_is_left_alone() {
            let dir = tempfile::tempdir().expect("failed to create temp dir");
            let output = dir.path().join("model.onnx");
            fs::write(&output, b"existing-model").expect("write existing model");
            let source = ModelSource {
                url: "http://127.0.0.1:9/unreachable.onnx".into(),
                checksum: Checksum::Published,
            };

            let installed = install_model(&source, &output, false).expect("existing-file shortcut");

            assert_eq!(installed, output);
            assert_eq!(fs::read(&output).expect("read model"), b"existing-model");
            assert!(!output.with_extension("onnx.tmp").exists());
        }
    }

    mod cache_dir {
        use super::*;

        #[test]
        fn env_override_wins() {
            let custom = tempfile::tempdir().expect("failed to create temp dir");
            let resolved = resolve_cache_dir(Some(custom.path().to_path_buf()), None);
            assert_eq!(resolved, custom.path());
        }

        #[test]
        fn empty_override_uses_system_cache() {
            let system = PathBuf::from("/var/cache");
            let resolved = resolve_cache_dir(Some(PathBuf::new()), Some(system.clone()));
            assert_eq!(resolved, system.join(APP_DIR_NAME));
        }

        #[test]
        fn no_source_falls_back_to_current_dir() {
            assert_eq!(resolve_cache_dir(None, None), PathBuf::from("."));
            assert!(default_model_cache_path().ends_with(MODEL_FILENAME));
        }
    }
}
