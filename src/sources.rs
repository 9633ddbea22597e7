//! Discovery of the course content and project documents to index.
//!
//! Course directories are walked for the configured extensions, sorted by
//! path. The explicit document list follows, keeping only files that
//! exist. Duplicates are dropped with first occurrence kept, so the result
//! is deterministic for an unchanged tree.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::IndexConfig;

pub fn discover_source_files(repo_root: &Path, config: &IndexConfig) -> Result<Vec<PathBuf>> {
    let mut default_excludes = vec![
        "**/node_modules/**".to_string(),
        "**/.git/**".to_string(),
        "**/dist/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let extensions: HashSet<String> = config
        .extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();

    let mut files = Vec::new();

    for dir in &config.course_dirs {
        let root = repo_root.join(dir);
        if !root.is_dir() {
            tracing::debug!(dir = %root.display(), "course directory missing, skipped");
            continue;
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(&root) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "unreadable entry skipped during discovery");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let rel = relative_source_path(repo_root, path);
            if exclude_set.is_match(&rel) {
                continue;
            }
            let ext_ok = path
                .extension()
                .map(|e| extensions.contains(&e.to_string_lossy().to_lowercase()))
                .unwrap_or(false);
            if ext_ok {
                found.push(path.to_path_buf());
            }
        }
        found.sort();
        files.extend(found);
    }

    for doc in &config.doc_files {
        let path = repo_root.join(doc);
        if path.is_file() {
            files.push(path);
        }
    }

    let mut seen = HashSet::new();
    files.retain(|p| seen.insert(p.clone()));
    Ok(files)
}

/// `path` relative to `repo_root`, with `/` separators.
pub fn relative_source_path(repo_root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(repo_root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
