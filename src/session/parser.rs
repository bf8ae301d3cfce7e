//! Tolerant line-by-line parsing of session logs.

use std::path::Path;

use super::entry::SessionEntry;

/// Parse raw log text into entries, one JSON record per line.
///
/// Blank lines are ignored. A line that is not valid JSON, or that claims a
/// known record kind with a malformed payload, is skipped without affecting
/// the rest of the log.
#[must_use]
pub fn parse_session_content(content: &str) -> Vec<SessionEntry> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) => match SessionEntry::from_value(value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping undecodable log record");
                    None
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "Skipping malformed log line");
                None
            }
        })
        .collect()
}

/// Read and parse a session log from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read. Bad lines inside the file
/// are skipped, not errors.
pub async fn parse_session_file(path: &Path) -> std::io::Result<Vec<SessionEntry>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(parse_session_content(&content))
}
