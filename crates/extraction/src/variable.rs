//! Derived variable names.

use crate::message::{keys, GribMessage};
use crate::value::Value;

/// `{level_type}_{level}_{short_name}`, where the level type is dropped
/// when absent or empty and the level when absent or zero.
pub fn variable_name(level_type: Option<&str>, level: Option<&Value>, short_name: &str) -> String {
    let mut name = String::new();
    if let Some(level_type) = level_type.filter(|t| !t.is_empty()) {
        name.push_str(level_type);
        name.push('_');
    }
    if let Some(level) = level.filter(|l| !l.is_zero()) {
        name.push_str(&level.to_string());
        name.push('_');
    }
    name.push_str(short_name);
    name
}

/// Variable name of a message, `None` without a short name.
pub fn message_variable_name(message: &impl GribMessage) -> Option<String> {
    let short_name = message.attribute(keys::SHORT_NAME)?.to_string();
    let level_type = message.attribute(keys::TYPE_OF_LEVEL).map(|v| v.to_string());
    let level = message.attribute(keys::LEVEL);
    Some(variable_name(
        level_type.as_deref(),
        level.as_ref(),
        &short_name,
    ))
}
