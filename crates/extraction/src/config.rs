//! Tap configuration: which GRIB files to read and how to shape them.
//!
//! The document is YAML (JSON is accepted by the same loader):
//!
//! ```yaml
//! paths:
//!   - path: ${DATA_DIR}/gfs/*.grib2
//!     group_by: [typeOfLevel]
//!   - path: ~/era5/2023-06.grib.gz
//!     ignore_fields: [centre, grid_type]
//! parameters:
//!   - { discipline: 0, category: 1, number: 8, short_name: tp }
//! ```
//!
//! `paths` may instead live in a separate document referenced by
//! `paths_file`, relative to the configuration file.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use grib2_parser::Grib2Tables;

use crate::schema::Schema;
use crate::shaper::{Shape, DEFAULT_BATCH_SIZE};
use crate::stream::StreamOptions;
use crate::{ExtractionError, Result};

/// GRIB file extensions picked up when a path names a directory.
const GRIB_EXTENSIONS: [&str; 4] = ["grib", "grib2", "grb", "grb2"];

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TapConfig {
    #[serde(default)]
    pub paths: Vec<PathConfig>,

    /// External document holding more path definitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths_file: Option<PathBuf>,

    /// Extra parameter table entries, overriding the built-in table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterEntry>,
}

/// A `paths_file` document: either a bare list or a `paths:` mapping.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PathsDocument {
    List(Vec<PathConfig>),
    Mapping { paths: Vec<PathConfig> },
}

impl PathsDocument {
    fn into_paths(self) -> Vec<PathConfig> {
        match self {
            PathsDocument::List(paths) | PathsDocument::Mapping { paths } => paths,
        }
    }
}

impl TapConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ExtractionError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config: TapConfig = serde_yaml::from_str(&content)?;
        if let Some(paths_file) = config.paths_file.clone() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.paths.extend(load_paths_file(&base.join(paths_file))?);
        }

        config.validate()?;
        debug!(config = %path.display(), paths = config.paths.len(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate an inline document. A `paths_file` is resolved
    /// against the working directory.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let mut config: TapConfig = serde_yaml::from_str(content)?;
        if let Some(paths_file) = config.paths_file.clone() {
            config.paths.extend(load_paths_file(&paths_file)?);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.paths.is_empty() {
            return Err(ExtractionError::NoPaths);
        }
        for path in &self.paths {
            path.validate()?;
        }
        Ok(())
    }

    /// Decoder lookup tables: the standard table plus configured entries.
    pub fn tables(&self) -> Grib2Tables {
        let mut tables = Grib2Tables::standard();
        for entry in &self.parameters {
            tables.add_parameter(
                entry.discipline,
                entry.category,
                entry.number,
                entry.short_name.clone(),
            );
        }
        tables
    }
}

fn load_paths_file(path: &Path) -> Result<Vec<PathConfig>> {
    let content = fs::read_to_string(path).map_err(|e| {
        ExtractionError::InvalidConfig(format!(
            "Failed to read paths file {}: {}",
            path.display(),
            e
        ))
    })?;
    let document: PathsDocument = serde_yaml::from_str(&content)?;
    Ok(document.into_paths())
}

/// Output shape selected for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Long,
    Pivot,
}

/// Additional parameter short name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterEntry {
    pub discipline: u8,
    pub category: u8,
    pub number: u8,
    pub short_name: String,
}

/// One configured file pattern and its per-stream options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathConfig {
    /// Glob pattern, file or directory. `${VAR}` and `~` are expanded.
    pub path: String,

    /// Long-format fields to leave out.
    #[serde(default)]
    pub ignore_fields: Vec<String>,

    /// Variables to leave out of pivot tables.
    #[serde(default)]
    pub skip_fields: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_keys: Option<Vec<String>>,

    /// Message attributes partitioning each file into streams.
    #[serde(default)]
    pub group_by: Vec<String>,

    /// Explicit stream names, by group position.
    #[serde(default)]
    pub datasets_name: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<OutputMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

impl PathConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// The explicit mode, else pivot when skip fields or grouping
    /// attributes are given, else long.
    pub fn mode(&self) -> OutputMode {
        match self.mode {
            Some(mode) => mode,
            None if !self.skip_fields.is_empty() || !self.group_by.is_empty() => OutputMode::Pivot,
            None => OutputMode::Long,
        }
    }

    /// `ignore_fields` and `skip_fields` merged.
    pub fn excluded_fields(&self) -> BTreeSet<String> {
        self.ignore_fields
            .iter()
            .chain(self.skip_fields.iter())
            .cloned()
            .collect()
    }

    /// Stream options shared by every stream of this path. The group
    /// filter is left open; discovery narrows it per group.
    pub fn stream_options(&self) -> StreamOptions {
        let base = match self.mode() {
            OutputMode::Long => StreamOptions::long(),
            OutputMode::Pivot => StreamOptions::pivot()
                .with_batch_size(self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)),
        };
        StreamOptions {
            excluded: self.excluded_fields(),
            primary_keys: self.primary_keys.clone(),
            ..base
        }
    }

    /// Check the options and the pattern without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(ExtractionError::InvalidConfig(
                "Path entry with an empty 'path'".to_string(),
            ));
        }

        let options = self.stream_options();
        options.validate()?;

        let long_schema = match options.shape {
            Shape::Long => Some(Schema::long(&options.excluded)),
            Shape::Pivot { .. } => None,
        };
        for key in options.effective_primary_keys() {
            let excluded = options.excluded.contains(&key);
            let undeclared = long_schema.as_ref().is_some_and(|schema| !schema.contains(&key));
            if excluded || undeclared {
                return Err(ExtractionError::InvalidPrimaryKey {
                    stream: self.path.clone(),
                    key,
                });
            }
        }

        glob::Pattern::new(&self.expanded_pattern()?).map_err(|e| {
            ExtractionError::InvalidPattern {
                pattern: self.path.clone(),
                reason: e.msg.to_string(),
            }
        })?;
        Ok(())
    }

    /// The pattern with environment variables and `~` expanded.
    pub fn expanded_pattern(&self) -> Result<String> {
        shellexpand::full(&self.path)
            .map(|expanded| expanded.into_owned())
            .map_err(|e| ExtractionError::InvalidPattern {
                pattern: self.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Files matched by this path, sorted. A directory match contributes
    /// every GRIB file beneath it.
    pub fn expand(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.expanded_pattern()?;
        let matches = glob::glob(&pattern).map_err(|e| ExtractionError::InvalidPattern {
            pattern: self.path.clone(),
            reason: e.msg.to_string(),
        })?;

        let mut files = BTreeSet::new();
        for entry in matches {
            match entry {
                Ok(path) if path.is_dir() => files.extend(grib_files_in(&path)),
                Ok(path) => {
                    files.insert(path);
                }
                Err(e) => warn!(pattern = %pattern, error = %e, "Unreadable path while expanding"),
            }
        }

        if files.is_empty() {
            warn!(pattern = %pattern, "Path matched no files");
        }
        Ok(files.into_iter().collect())
    }
}

fn grib_files_in(dir: &Path) -> Vec<PathBuf> {
    walkdir::WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_grib_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

/// True for `.grib`, `.grib2`, `.grb` and `.grb2` files, gzipped or not.
fn is_grib_file(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_ascii_lowercase(),
        None => return false,
    };
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    match name.rsplit_once('.') {
        Some((_, extension)) => GRIB_EXTENSIONS.contains(&extension),
        None => false,
    }
}
