use std::path::Path;

/// Returns true if path is allowed given allow/deny lists.
/// A non-empty allow list requires a matching prefix; deny always wins.
pub fn is_allowed(path: &Path, allow: &[String], deny: &[String]) -> bool {
    let path_str = path.to_string_lossy();
    if deny.iter().any(|prefix| path_str.starts_with(prefix.as_str())) {
        return false;
    }
    allow.is_empty() || allow.iter().any(|prefix| path_str.starts_with(prefix.as_str()))
}
