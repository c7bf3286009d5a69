//! Discovery: configured paths to resolved stream definitions.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::TapConfig;
use crate::grib2::Grib2Source;
use crate::grouping::scan_groups;
use crate::stream::StreamDefinition;
use crate::Result;

/// Expand every configured path and build one stream per message group of
/// each matched file, each with its schema resolved.
///
/// Configuration problems and unreadable files abort discovery; nothing is
/// extracted yet.
pub fn discover(config: &TapConfig) -> Result<Vec<StreamDefinition<Grib2Source>>> {
    config.validate()?;

    let tables = Arc::new(config.tables());
    let mut names = UniqueNames::default();
    let mut streams = Vec::new();

    for path_config in &config.paths {
        let files = path_config.expand()?;
        debug!(pattern = %path_config.path, files = files.len(), "Expanded path");

        for file in files {
            let source = Arc::new(Grib2Source::new(&file, Arc::clone(&tables)));
            let stem = file_stem(&file);

            for (index, group) in scan_groups(source.as_ref(), &path_config.group_by)?
                .into_iter()
                .enumerate()
            {
                let name = names.claim(group.stream_name(&stem, index, &path_config.datasets_name));
                let options = path_config.stream_options().with_filter(group.filter);

                let mut stream = StreamDefinition::new(name, Arc::clone(&source), options)?;
                let properties = stream.resolve_schema()?.len();
                info!(
                    stream = %stream.name(),
                    file = %file.display(),
                    shape = ?stream.shape(),
                    properties,
                    "Discovered stream"
                );
                streams.push(stream);
            }
        }
    }

    info!(streams = streams.len(), paths = config.paths.len(), "Discovery complete");
    Ok(streams)
}

/// File name without its GRIB and compression extensions.
fn file_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

/// Stream names already handed out; repeats get `_2`, `_3`, ...
#[derive(Debug, Default)]
struct UniqueNames {
    taken: HashSet<String>,
}

impl UniqueNames {
    fn claim(&mut self, name: String) -> String {
        let mut candidate = name.clone();
        let mut suffix = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{}_{}", name, suffix);
            suffix += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}
