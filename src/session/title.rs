//! Working-directory inference from terminal titles.
//!
//! Many shell prompts set the title to something like `zsh:~/projects/app`.
//! This is best effort: titles without the delimiter carry no directory.

use super::InstanceId;

/// Default separator between the program name and the directory.
pub const DEFAULT_TITLE_DELIMITER: char = ':';

/// A session reported a new working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryChange {
    pub instance_id: InstanceId,
    /// The directory as reported, e.g. `~/projects/app`.
    pub directory: String,
    /// Short display name, e.g. `app`.
    pub name: String,
}

/// The segment after the last delimiter, if the title has one.
pub fn directory_from_title(title: &str, delimiter: char) -> Option<&str> {
    let (_, directory) = title.rsplit_once(delimiter)?;
    let directory = directory.trim();
    (!directory.is_empty()).then_some(directory)
}

/// Last path component of a directory, keeping `/` and `~` as they are.
pub fn directory_name(directory: &str) -> &str {
    let trimmed = directory.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Build the rename signal for a title, or `None` if it carries no directory.
pub fn detect_directory_change(
    instance_id: InstanceId,
    title: &str,
    delimiter: char,
) -> Option<DirectoryChange> {
    let directory = directory_from_title(title, delimiter)?;
    Some(DirectoryChange {
        instance_id,
        directory: directory.to_string(),
        name: directory_name(directory).to_string(),
    })
}
