use crate::database::error::{invalid_argument, DatabaseResult};

/// Splits a slash-delimited path into segments. Outer slashes are ignored;
/// an empty interior segment (`a//b`) is rejected.
pub(crate) fn normalize_path(path: &str) -> DatabaseResult<Vec<String>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return Err(invalid_argument(format!(
                "Database path '{path}' contains an empty segment"
            )));
        }
        segments.push(segment.to_string());
    }
    Ok(segments)
}

pub(crate) fn join_path(segments: &[String]) -> String {
    segments.join("/")
}

pub(crate) fn paths_related(a: &[String], b: &[String]) -> bool {
    is_prefix(a, b) || is_prefix(b, a)
}

pub(crate) fn is_prefix(prefix: &[String], path: &[String]) -> bool {
    prefix.len() <= path.len()
        && prefix
            .iter()
            .zip(path.iter())
            .all(|(left, right)| left == right)
}

/// Rejects keys the Realtime Database refuses to store.
pub(crate) fn validate_key(segment: &str) -> DatabaseResult<()> {
    if segment.is_empty() {
        return Err(invalid_argument("Database keys cannot be empty"));
    }
    if segment.len() > 768 {
        return Err(invalid_argument(format!(
            "Database key '{segment}' exceeds 768 bytes"
        )));
    }
    if let Some(invalid) = segment
        .chars()
        .find(|ch| matches!(ch, '.' | '#' | '$' | '[' | ']' | '/') || ch.is_ascii_control())
    {
        return Err(invalid_argument(format!(
            "Database key '{segment}' contains the forbidden character {invalid:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_outer_slashes() {
        assert_eq!(normalize_path("/a/b/").unwrap(), vec!["a", "b"]);
        assert!(normalize_path("/").unwrap().is_empty());
        assert!(normalize_path("a//b").is_err());
    }

    #[test]
    fn prefix_relations() {
        let parent = normalize_path("users").unwrap();
        let child = normalize_path("users/u1/name").unwrap();
        let other = normalize_path("posts").unwrap();
        assert!(paths_related(&parent, &child));
        assert!(paths_related(&child, &parent));
        assert!(!paths_related(&parent, &other));
        assert!(paths_related(&[], &other));
    }

    #[test]
    fn rejects_forbidden_key_characters() {
        assert!(validate_key("ok-key_1").is_ok());
        for key in ["a.b", "a#b", "a$b", "a[b", "a]b", ""] {
            let err = validate_key(key).unwrap_err();
            assert_eq!(err.code_str(), "database/invalid-argument");
        }
    }
}
