//! Resolution of glob patterns into watched directories and matchers.
//!
//! Patterns are resolved once, at construction. Each pattern is split at the
//! first component holding a glob metacharacter:
//!
//! ```text
//! src/app/**/*.rb
//! └──┬──┘ └──┬──┘
//!   base   remainder
//! ```
//!
//! The base must exist. If the remainder has directory components, every
//! directory under the base matching them is watched (non-recursively), so a
//! directory created later is not picked up until the patterns are resolved
//! again.
//!
//! A pattern without metacharacters names either a directory (watch it, match
//! everything directly inside) or a file (watch its parent, match only it).

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use oc_core::ConfigError;
use smallvec::SmallVec;
use tracing::{debug, warn};

/// Characters that start a glob construct.
const GLOB_META: [char; 4] = ['*', '?', '[', '{'];

/// One resolved pattern.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    /// Pattern as supplied.
    pattern: String,
    /// Absolute, canonical glob matched against notification paths.
    matcher: GlobMatcher,
    /// Directories to watch for this pattern.
    dirs: Vec<Utf8PathBuf>,
    /// Directory that identifiers are reported relative to, for relative
    /// patterns.
    relative_to: Option<Utf8PathBuf>,
}

impl WatchTarget {
    /// Returns the pattern this target was resolved from.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the directories watched for this target.
    #[must_use]
    pub fn dirs(&self) -> &[Utf8PathBuf] {
        &self.dirs
    }

    /// Returns `true` if `path` (absolute) matches this target.
    #[must_use]
    pub fn is_match(&self, path: &Utf8Path) -> bool {
        self.matcher.is_match(path.as_std_path())
    }

    /// Formats `path` the way events for this target are reported.
    #[must_use]
    pub fn identify(&self, path: &Utf8Path) -> Utf8PathBuf {
        self.relative_to
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .unwrap_or(path)
            .to_owned()
    }
}

/// The resolved form of every pattern supplied at construction.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    targets: SmallVec<[WatchTarget; 4]>,
    watched_dirs: Vec<Utf8PathBuf>,
}

impl PatternSet {
    /// Resolves `patterns` relative to the current working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] for a malformed glob and
    /// [`ConfigError::NoWatchTarget`] if no pattern resolves to an existing
    /// path.
    pub fn resolve<S: AsRef<str>>(patterns: &[S]) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir()?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|e| ConfigError::invalid_pattern(".", e))?
            .canonicalize_utf8()?;
        Self::resolve_in(patterns, &cwd)
    }

    /// Resolves `patterns` relative to `cwd`, which must be canonical.
    pub fn resolve_in<S: AsRef<str>>(patterns: &[S], cwd: &Utf8Path) -> Result<Self, ConfigError> {
        let mut set = Self::default();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            match resolve_one(pattern, cwd)? {
                Some(target) => {
                    debug!(pattern, dirs = ?target.dirs, "Resolved watch pattern");
                    for dir in &target.dirs {
                        if !set.watched_dirs.contains(dir) {
                            set.watched_dirs.push(dir.clone());
                        }
                    }
                    set.targets.push(target);
                }
                None => warn!(pattern, "Pattern does not resolve to an existing path"),
            }
        }

        if set.targets.is_empty() {
            return Err(ConfigError::NoWatchTarget(
                patterns.iter().map(|p| p.as_ref().to_owned()).collect(),
            ));
        }

        Ok(set)
    }

    /// Returns the deduplicated set of directories to watch.
    #[must_use]
    pub fn watched_dirs(&self) -> &[Utf8PathBuf] {
        &self.watched_dirs
    }

    /// Returns every resolved target.
    #[must_use]
    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    /// Returns the identifier for `path` if any pattern matches it.
    #[must_use]
    pub fn identify(&self, path: &Utf8Path) -> Option<Utf8PathBuf> {
        self.targets
            .iter()
            .find(|target| target.is_match(path))
            .map(|target| target.identify(path))
    }
}

fn has_glob_meta(component: &str) -> bool {
    component.contains(GLOB_META)
}

fn build_matcher(pattern: &str, glob: &str) -> Result<GlobMatcher, ConfigError> {
    GlobBuilder::new(glob)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| ConfigError::invalid_pattern(pattern, e.kind()))
}

/// Splits a pattern into its literal base and glob remainder.
fn split_pattern(path: &Utf8Path) -> (Utf8PathBuf, Option<Utf8PathBuf>) {
    let mut base = Utf8PathBuf::new();
    let mut components = path.components();

    while let Some(component) = components.next() {
        match component {
            Utf8Component::Normal(name) if has_glob_meta(name) => {
                let mut rest = Utf8PathBuf::from(name);
                let tail = components.as_path();
                if !tail.as_str().is_empty() {
                    rest.push(tail);
                }
                return (base, Some(rest));
            }
            _ => base.push(component),
        }
    }

    (base, None)
}

fn resolve_one(pattern: &str, cwd: &Utf8Path) -> Result<Option<WatchTarget>, ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::invalid_pattern(pattern, "pattern is empty"));
    }
    Glob::new(pattern).map_err(|e| ConfigError::invalid_pattern(pattern, e.kind()))?;

    let path = Utf8Path::new(pattern);
    let relative_to = path.is_relative().then(|| cwd.to_owned());
    let (base, rest) = split_pattern(path);
    let base = if base.as_str().is_empty() {
        cwd.to_owned()
    } else {
        cwd.join(base)
    };

    let Ok(base) = base.canonicalize_utf8() else {
        return Ok(None);
    };

    let Some(rest) = rest else {
        return Ok(Some(resolve_literal(pattern, base, relative_to)?));
    };

    if !base.is_dir() {
        return Ok(None);
    }

    let escaped_base = globset::escape(base.as_str());
    let matcher = build_matcher(pattern, &format!("{escaped_base}/{rest}"))?;

    let dirs = match rest.parent().filter(|dir| !dir.as_str().is_empty()) {
        None => vec![base],
        Some(dir_rest) => matching_dirs(pattern, &base, &escaped_base, dir_rest)?,
    };

    if dirs.is_empty() {
        return Ok(None);
    }

    Ok(Some(WatchTarget {
        pattern: pattern.to_owned(),
        matcher,
        dirs,
        relative_to,
    }))
}

/// Resolves a pattern with no metacharacters; `path` is canonical.
fn resolve_literal(
    pattern: &str,
    path: Utf8PathBuf,
    relative_to: Option<Utf8PathBuf>,
) -> Result<WatchTarget, ConfigError> {
    let escaped = globset::escape(path.as_str());

    if path.is_dir() {
        return Ok(WatchTarget {
            pattern: pattern.to_owned(),
            matcher: build_matcher(pattern, &format!("{escaped}/*"))?,
            dirs: vec![path],
            relative_to,
        });
    }

    let parent = path
        .parent()
        .map_or_else(|| Utf8PathBuf::from("/"), Utf8Path::to_owned);
    Ok(WatchTarget {
        pattern: pattern.to_owned(),
        matcher: build_matcher(pattern, &escaped)?,
        dirs: vec![parent],
        relative_to,
    })
}

/// Walks `base` for directories matching the directory part of the remainder.
fn matching_dirs(
    pattern: &str,
    base: &Utf8Path,
    escaped_base: &str,
    dir_rest: &Utf8Path,
) -> Result<Vec<Utf8PathBuf>, ConfigError> {
    let recursive = dir_rest.components().any(|c| c.as_str() == "**");

    let mut globs = GlobSetBuilder::new();
    let mut add = |glob: String| -> Result<(), ConfigError> {
        let glob = GlobBuilder::new(&glob)
            .literal_separator(true)
            .build()
            .map_err(|e| ConfigError::invalid_pattern(pattern, e.kind()))?;
        globs.add(glob);
        Ok(())
    };

    add(format!("{escaped_base}/{dir_rest}"))?;
    // `a/**` does not match `a` itself, yet `a/**/*.rb` matches `a/x.rb`.
    if let Some(stripped) = dir_rest.as_str().strip_suffix("**") {
        let stripped = stripped.trim_end_matches('/');
        if stripped.is_empty() {
            add(escaped_base.to_owned())?;
        } else {
            add(format!("{escaped_base}/{stripped}"))?;
        }
    }
    let globs: GlobSet = globs
        .build()
        .map_err(|e| ConfigError::invalid_pattern(pattern, e.kind()))?;

    let max_depth = (!recursive).then(|| dir_rest.components().count());
    let walker = WalkBuilder::new(base)
        .standard_filters(true)
        .require_git(false)
        .follow_links(false)
        .max_depth(max_depth)
        .build();

    let mut dirs = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                warn!(pattern, error = %error, "Skipping unreadable directory");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_dir()) {
            continue;
        }
        let Some(dir) = Utf8Path::from_path(entry.path()) else {
            warn!(path = %entry.path().display(), "Skipping non-UTF-8 directory");
            continue;
        };
        if globs.is_match(dir.as_std_path()) {
            dirs.push(dir.to_owned());
        }
    }

    Ok(dirs)
}
