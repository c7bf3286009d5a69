//! Partitioning of a file's messages into streams.
//!
//! A scan over the file collects the distinct tuples of the configured
//! grouping attributes; each tuple becomes one stream whose filter keeps
//! the messages carrying exactly those values.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::message::{GribMessage, MessageSource};
use crate::Result;

/// Predicate over message attributes. Values are compared in their
/// display form; an expected `None` matches a missing attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupFilter {
    conditions: Vec<(String, Option<String>)>,
}

impl GroupFilter {
    pub fn new(conditions: Vec<(String, Option<String>)>) -> Self {
        Self { conditions }
    }

    /// The filter accepting every message.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[(String, Option<String>)] {
        &self.conditions
    }

    pub fn matches(&self, message: &impl GribMessage) -> bool {
        self.conditions.iter().all(|(key, expected)| {
            message.attribute(key).map(|v| v.to_string()).as_ref() == expected.as_ref()
        })
    }
}

/// One distinct tuple of grouping attribute values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageGroup {
    pub filter: GroupFilter,
    pub values: Vec<Option<String>>,
}

impl MessageGroup {
    /// The single group of an ungrouped file.
    pub fn ungrouped() -> Self {
        Self {
            filter: GroupFilter::all(),
            values: Vec::new(),
        }
    }

    /// Stream name for this group: the explicit name at `index` if given,
    /// else `{stem}_{values}`, or `{stem}_{index + 1}` when every value is
    /// absent. Ungrouped files are named after their stem.
    pub fn stream_name(&self, stem: &str, index: usize, explicit: &[String]) -> String {
        if let Some(name) = explicit.get(index) {
            return name.clone();
        }
        if self.values.is_empty() {
            return sanitize(stem);
        }

        let present: Vec<&str> = self.values.iter().flatten().map(String::as_str).collect();
        let suffix = if present.is_empty() {
            (index + 1).to_string()
        } else {
            present.join("_")
        };
        sanitize(&format!("{}_{}", stem, suffix))
    }
}

/// Scan `source` for the distinct tuples of `group_by` attributes, in
/// order of first appearance. Without grouping attributes the file is one
/// group and is not scanned.
pub fn scan_groups<S: MessageSource>(source: &S, group_by: &[String]) -> Result<Vec<MessageGroup>> {
    if group_by.is_empty() {
        return Ok(vec![MessageGroup::ungrouped()]);
    }

    let mut seen: HashSet<Vec<Option<String>>> = HashSet::new();
    let mut groups = Vec::new();

    for (index, message) in source.open()?.enumerate() {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                warn!(source = %source.describe(), message = index, error = %e, "Unreadable message during group scan");
                continue;
            }
        };

        let values: Vec<Option<String>> = group_by
            .iter()
            .map(|key| message.attribute(key).map(|v| v.to_string()))
            .collect();

        if seen.insert(values.clone()) {
            let conditions = group_by.iter().cloned().zip(values.iter().cloned()).collect();
            groups.push(MessageGroup {
                filter: GroupFilter::new(conditions),
                values,
            });
        }
    }

    debug!(source = %source.describe(), groups = groups.len(), "Scanned message groups");
    Ok(groups)
}

/// Replace every character outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
