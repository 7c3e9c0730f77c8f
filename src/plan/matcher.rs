//! File-System Pattern Matching
//!
//! Resolves a wildcard specification such as `data/train-*.arff` against the
//! files actually present in its directory. Only the file-name component may
//! carry a wildcard; any run of `*` is treated as a single capture group.

use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use log::debug;

use super::pattern::WILDCARD_CHAR;
use crate::error::MatchError;

/// Resolves wildcard specifications against directory listings.
///
/// Relative directories are looked up under the configured root, or under
/// the process working directory when no root is set. Returned paths keep
/// the directory text exactly as it appears in the specification.
#[derive(Debug, Clone, Default)]
pub struct FileMatcher {
    root: Option<PathBuf>,
}

impl FileMatcher {
    /// Creates a matcher resolving relative paths against the working directory.
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Creates a matcher resolving relative paths against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Returns the configured root, if any.
    pub fn root(&self) -> Option<&PathBuf> {
        self.root.as_ref()
    }

    /// Resolves `spec` to its matches, sorted by file name.
    ///
    /// With `expansions_only` the captured middle part of each matching file
    /// name is returned; otherwise the full path. Zero matches is an error,
    /// and so is a file whose captured part is empty when values are requested.
    pub fn resolve(&self, spec: &str, expansions_only: bool) -> Result<Vec<String>, MatchError> {
        let (dir, file_pattern) = split_spec(spec);

        if dir.is_some_and(|d| d.contains(WILDCARD_CHAR)) {
            return Err(MatchError::WildcardInDirectory {
                pattern: spec.to_string(),
            });
        }
        if !file_pattern.contains(WILDCARD_CHAR) {
            return Err(MatchError::NoWildcard {
                pattern: spec.to_string(),
            });
        }

        let file_pattern = collapse_wildcards(file_pattern);
        let listing_dir = self.listing_dir(dir);
        let files = list_files(&listing_dir)?;

        let mut matches = Vec::new();
        for file in &files {
            let Some(expansion) = match_file(&file_pattern, file) else {
                continue;
            };

            if expansions_only {
                // An empty capture cannot label an expanded task
                if expansion.is_empty() {
                    return Err(MatchError::EmptyCapture {
                        pattern: spec.to_string(),
                        file: file.clone(),
                    });
                }
                matches.push(expansion.to_string());
            } else {
                matches.push(match dir {
                    Some(d) => format!("{}{}{}", d, MAIN_SEPARATOR, file),
                    None => file.clone(),
                });
            }
        }

        if matches.is_empty() {
            return Err(MatchError::NoMatches {
                pattern: spec.to_string(),
            });
        }

        debug!("Resolved '{}' to {} matches", spec, matches.len());
        Ok(matches)
    }

    fn listing_dir(&self, dir: Option<&str>) -> PathBuf {
        let dir = match dir {
            // A spec such as "/x*.txt" lives in the filesystem root
            Some("") => PathBuf::from(MAIN_SEPARATOR.to_string()),
            Some(d) => PathBuf::from(d),
            None => PathBuf::from("."),
        };

        match &self.root {
            Some(root) if dir.is_relative() => root.join(dir),
            _ => dir,
        }
    }
}

/// Splits a spec at its last path separator into directory and file pattern.
fn split_spec(spec: &str) -> (Option<&str>, &str) {
    match spec.rfind(MAIN_SEPARATOR) {
        Some(pos) => (Some(&spec[..pos]), &spec[pos + MAIN_SEPARATOR.len_utf8()..]),
        None => (None, spec),
    }
}

/// Reduces the first run of wildcard characters to a single one.
fn collapse_wildcards(pattern: &str) -> String {
    super::pattern::substitute(pattern, &WILDCARD_CHAR.to_string())
}

/// Lists the regular files of `dir`, sorted by name.
fn list_files(dir: &Path) -> Result<Vec<String>, MatchError> {
    let unreadable = |source| MatchError::Unreadable {
        dir: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let entry = entry.map_err(unreadable)?;

        if !entry.path().is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => files.push(name),
            Err(name) => debug!("Skipping non UTF-8 file name {:?}", name),
        }
    }

    files.sort();
    Ok(files)
}

/// Matches a file name against a `beg*end` pattern, returning the capture.
fn match_file<'a>(pattern: &str, file_name: &'a str) -> Option<&'a str> {
    let (beg, end) = pattern.split_once(WILDCARD_CHAR)?;

    if file_name.len() >= beg.len() + end.len()
        && file_name.starts_with(beg)
        && file_name.ends_with(end)
    {
        Some(&file_name[beg.len()..file_name.len() - end.len()])
    } else {
        None
    }
}
