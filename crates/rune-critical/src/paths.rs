//! Mapping stylesheet hrefs onto files under the configured base directory.

use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::error::{CriticalError, Result};
use crate::options::CriticalOptions;

/// Absolute base directory every stylesheet must live under.
pub fn base_dir(options: &CriticalOptions) -> Result<PathBuf> {
    let base = if options.path.is_empty() {
        std::env::current_dir()?
    } else {
        std::path::absolute(&options.path)?
    };
    Ok(normalize_lexically(&base))
}

/// Resolve `href` to a file path under the base directory.
///
/// The leading `/` and the public path prefix are stripped first. Remote
/// hrefs and paths that escape the base directory are refused.
pub fn resolve_stylesheet(href: &str, options: &CriticalOptions) -> Result<PathBuf> {
    let mut relative = href.strip_prefix('/').unwrap_or(href);
    let public = options.public_path.strip_prefix('/').unwrap_or(&options.public_path);
    let public = public.strip_suffix('/').unwrap_or(public);
    let prefix = format!("{public}/");
    if let Some(rest) = relative.strip_prefix(prefix.as_str()) {
        relative = rest.strip_prefix('/').unwrap_or(rest);
    }

    if is_remote(relative) || href.starts_with("//") {
        return Err(CriticalError::RemoteStylesheet(href.to_string()));
    }

    let base = base_dir(options)?;
    let resolved = normalize_lexically(&base.join(relative));
    ensure_within(&base, resolved)
}

/// Refuse `path` unless it lies under `base`. Both must be normalized.
pub fn ensure_within(base: &Path, path: PathBuf) -> Result<PathBuf> {
    if path.starts_with(base) {
        Ok(path)
    } else {
        Err(CriticalError::PathEscape { path })
    }
}

fn is_remote(href: &str) -> bool {
    Url::parse(href).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Whether an additional-stylesheet entry should be expanded as a glob.
pub fn has_glob_meta(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

/// Resolve `.` and `..` without touching the filesystem. `..` at the root
/// stays at the root.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
