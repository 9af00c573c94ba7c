//! Scanner (C2): walks a repository root, applies the hidden-file and
//! extension/glob policy, classifies each file, and emits `FileInfo` records
//! with a stable `file_id`.

pub mod classify;

use crate::config::RunConfig;
use crate::domain::{file_id, FileInfo};
use crate::error::Result;
use crate::hash::hash_file;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Hidden dotfiles that stay visible even when `include_hidden=false` (§4.2).
const HIDDEN_WHITELIST: &[&str] = &[".env.example", ".gitignore", ".gitattributes", ".editorconfig"];

/// Dotfile patterns hidden even when `include_hidden=true` (§4.2).
const HIDDEN_DENYLIST_PREFIXES: &[&str] = &[".env"];

/// One completed scan: every file considered, with its resolved identity.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub repo: String,
    pub root: PathBuf,
    pub files: Vec<FileInfo>,
}

/// Walks `root` under `config`'s scanner policy and returns a deterministic
/// `ScanResult` (sorted by `relative_path`; `file_id` does not depend on
/// iteration order per §4.2).
pub fn scan(repo: &str, root: &Path, config: &RunConfig) -> Result<ScanResult> {
    let exclude_set = build_glob_set(&config.exclude_globs);

    let mut walker = WalkBuilder::new(root);
    walker.hidden(false).git_ignore(true).git_exclude(true).follow_links(false);

    let mut files = Vec::new();
    for entry in walker.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        if entry.file_type().map(|ft| !ft.is_file()).unwrap_or(true) {
            continue;
        }

        let path = entry.path();
        let Some(relative) = relative_to(root, path) else { continue };
        if is_excluded_path(&relative) {
            continue;
        }
        if !hidden_policy_allows(&relative, config.include_hidden) {
            continue;
        }
        if exclude_set.is_match(&relative) {
            continue;
        }

        let extension = classify::extension_of(path);
        if !config.include_extensions.is_empty() && !config.include_extensions.contains(&extension)
        {
            continue;
        }

        files.push(build_file_info(repo, root, path, &relative, &extension, config));
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(ScanResult { repo: repo.to_string(), root: root.to_path_buf(), files })
}

fn build_file_info(
    repo: &str,
    root: &Path,
    abs_path: &Path,
    relative: &str,
    extension: &str,
    config: &RunConfig,
) -> FileInfo {
    let metadata = std::fs::metadata(abs_path).ok();
    let size_bytes = metadata.as_ref().map(|m| m.len()).unwrap_or(0);

    if size_bytes > config.max_file_bytes {
        return FileInfo {
            repo: repo.to_string(),
            path: abs_path.to_path_buf(),
            relative_path: relative.to_string(),
            size_bytes,
            is_text: false,
            sha256: None,
            category: BTreeSet::new(),
            extension: extension.to_string(),
            skip_reason: Some("max_file_bytes_exceeded".to_string()),
            file_id: file_id(repo, relative),
        };
    }

    let sample = read_sample(abs_path);
    let is_text = sample.as_deref().map(classify::sniff_is_text).unwrap_or(false);

    let sha256 = if config.calculate_hash {
        let result = hash_file(abs_path);
        result.sha256
    } else {
        None
    };

    let category = classify::classify(relative, extension).into_iter().map(String::from).collect();

    let _ = root;
    FileInfo {
        repo: repo.to_string(),
        path: abs_path.to_path_buf(),
        relative_path: relative.to_string(),
        size_bytes,
        is_text,
        sha256,
        category,
        extension: extension.to_string(),
        skip_reason: None,
        file_id: file_id(repo, relative),
    }
}

fn read_sample(path: &Path) -> Option<Vec<u8>> {
    let mut file = File::open(path).ok()?;
    let mut buf = vec![0u8; 8192];
    let read = file.read(&mut buf).ok()?;
    buf.truncate(read);
    Some(buf)
}

/// Converts separators to forward slashes and returns `None` for anything
/// that escapes `root` (absolute paths and `..` traversal are exclusions,
/// per §4.2).
fn relative_to(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let normalized = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
    if normalized.is_empty() || normalized.contains("..") {
        return None;
    }
    Some(normalized)
}

fn is_excluded_path(relative: &str) -> bool {
    relative.starts_with('/') || relative.split('/').any(|component| component == "..")
}

/// Hidden-file policy (§4.2): applies to every path component, not just the
/// final name.
fn hidden_policy_allows(relative: &str, include_hidden: bool) -> bool {
    let file_name = relative.rsplit('/').next().unwrap_or(relative);

    if include_hidden {
        return !HIDDEN_DENYLIST_PREFIXES.iter().any(|prefix| {
            file_name.starts_with(prefix) && !HIDDEN_WHITELIST.contains(&file_name)
        });
    }

    for component in relative.split('/') {
        if component.starts_with('.') && !HIDDEN_WHITELIST.contains(&component) {
            return false;
        }
    }
    true
}

fn build_glob_set(patterns: &std::collections::BTreeSet<String>) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSetBuilder::new().build().unwrap())
}
