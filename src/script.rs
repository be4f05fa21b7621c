//! Script Store: discovery, reading and writing of migration files.
//!
//! Forward scripts follow `V<version>__<description>.sql`. The inverse of
//! `X.sql` is stored as `X_rollback.sql`.

use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{MigrateError, MigrateResult};

/// Suffix shared by forward and rollback scripts.
pub const SCRIPT_SUFFIX: &str = ".sql";

/// Marker that identifies a rollback script.
pub const ROLLBACK_MARKER: &str = "_rollback";

/// A forward migration script read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub version: i64,
    pub name: String,
    pub body: String,
}

/// Extract the version from `V<digits>...`.
pub fn parse_version(name: &str) -> Option<i64> {
    let rest = name.strip_prefix(['V', 'v'])?;
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest[..end].parse().ok()
}

/// `X.sql` → `X_rollback.sql`.
pub fn rollback_name(name: &str) -> String {
    let stem = name.strip_suffix(SCRIPT_SUFFIX).unwrap_or(name);
    format!("{}{}{}", stem, ROLLBACK_MARKER, SCRIPT_SUFFIX)
}

/// Whether `name` is a forward script by naming convention.
pub fn is_forward_script(name: &str) -> bool {
    name.ends_with(SCRIPT_SUFFIX) && !name.contains(ROLLBACK_MARKER)
}

/// Compare two names treating every digit run as a number.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let left = take_digits(&mut a);
                let right = take_digits(&mut b);
                let left_trimmed = left.trim_start_matches('0');
                let right_trimmed = right.trim_start_matches('0');
                let ord = left_trimmed
                    .len()
                    .cmp(&right_trimmed.len())
                    .then_with(|| left_trimmed.cmp(right_trimmed))
                    .then_with(|| left.len().cmp(&right.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        digits.push(c);
    }
    digits
}

/// List the forward scripts in `directory`, ascending by numeric version.
///
/// Filtering against the ledger happens in the executor; every forward
/// script on disk is returned here.
pub fn list_pending(directory: &Path) -> MigrateResult<Vec<MigrationScript>> {
    let discovery = |source: io::Error| MigrateError::Discovery {
        path: directory.to_path_buf(),
        source,
    };

    let mut scripts = Vec::new();
    for entry in fs::read_dir(directory).map_err(discovery)? {
        let entry = entry.map_err(discovery)?;
        if !entry.file_type().map_err(discovery)?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_forward_script(&name) {
            continue;
        }
        let Some(version) = parse_version(&name) else {
            tracing::warn!(script = %name, "skipping script without a V<version> prefix");
            continue;
        };
        let body = read(directory, &name)?;
        scripts.push(MigrationScript {
            version,
            name,
            body,
        });
    }

    scripts.sort_by(|a, b| {
        a.version
            .cmp(&b.version)
            .then_with(|| natural_cmp(&a.name, &b.name))
    });
    Ok(scripts)
}

/// Read one script.
pub fn read(directory: &Path, name: &str) -> MigrateResult<String> {
    fs::read_to_string(directory.join(name)).map_err(|source| MigrateError::Read {
        name: name.to_string(),
        source,
    })
}

/// Write one script. Returns `false` without touching the file when it
/// already exists and `overwrite_if_exists` is not set.
pub fn write(
    directory: &Path,
    name: &str,
    text: &str,
    overwrite_if_exists: bool,
) -> MigrateResult<bool> {
    let write_err = |source: io::Error| MigrateError::Write {
        name: name.to_string(),
        source,
    };
    let path = directory.join(name);
    if !overwrite_if_exists && path.exists() {
        tracing::debug!(script = %name, "keeping existing file");
        return Ok(false);
    }
    fs::create_dir_all(directory).map_err(write_err)?;
    fs::write(&path, text).map_err(write_err)?;
    Ok(true)
}

/// The migration and rollback directories of one project.
#[derive(Debug, Clone)]
pub struct ScriptStore {
    migrations: PathBuf,
    rollbacks: PathBuf,
}

impl ScriptStore {
    pub fn new(migrations: impl Into<PathBuf>, rollbacks: impl Into<PathBuf>) -> Self {
        Self {
            migrations: migrations.into(),
            rollbacks: rollbacks.into(),
        }
    }

    /// Store whose rollback scripts sit next to the forward scripts.
    pub fn single_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self::new(dir.clone(), dir)
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations
    }

    pub fn rollbacks_dir(&self) -> &Path {
        &self.rollbacks
    }

    pub fn list_pending(&self) -> MigrateResult<Vec<MigrationScript>> {
        list_pending(&self.migrations)
    }

    pub fn read_rollback(&self, script_name: &str) -> MigrateResult<String> {
        read(&self.rollbacks, &rollback_name(script_name))
    }

    /// Write the inverse of `script_name` unless one already exists.
    pub fn write_rollback(&self, script_name: &str, text: &str) -> MigrateResult<bool> {
        write(&self.rollbacks, &rollback_name(script_name), text, false)
    }

    /// Next free version: one above the highest version on disk.
    pub fn next_version(&self) -> MigrateResult<i64> {
        if !self.migrations.exists() {
            return Ok(1);
        }
        let highest = self.list_pending()?.last().map_or(0, |s| s.version);
        Ok(highest + 1)
    }

    /// Scaffold `V<next>__<description>.sql` and return its path.
    pub fn create(&self, description: &str) -> MigrateResult<PathBuf> {
        let slug: String = description
            .trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        let slug = slug.trim_matches('_');
        if slug.is_empty() {
            return Err(MigrateError::InvalidScriptName(description.to_string()));
        }

        let version = self.next_version()?;
        let name = format!("V{}__{}{}", version, slug, SCRIPT_SUFFIX);
        let content = format!(
            "-- Migration: {}\n-- Created: {}\n\n",
            description.trim(),
            chrono::Local::now().to_rfc3339()
        );
        write(&self.migrations, &name, &content, false)?;
        Ok(self.migrations.join(name))
    }
}
