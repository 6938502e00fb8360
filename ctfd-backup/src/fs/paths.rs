//! Mapping remote names onto safe local path components.

/// Turn a remote name into a single path component.
///
/// Separators become `-`, and empty or dot-only names fall back to `fallback`
/// so a name can never climb out of its parent directory.
pub fn sanitize_component(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '-',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        fallback.to_string()
    } else {
        cleaned
    }
}

/// File name from a download URL: last path segment with the query stripped.
///
/// `/files/0a1b/a.zip?token=xyz` becomes `a.zip`.
pub fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let last = without_query.rsplit('/').next().unwrap_or_default();
    sanitize_component(last, "file")
}

/// Join relative components with `/`, the separator used for store keys.
pub fn join_relative(parts: &[&str]) -> String {
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_separators() {
        assert_eq!(sanitize_component("web/pwn", "x"), "web-pwn");
        assert_eq!(sanitize_component("a\\b", "x"), "a-b");
        assert_eq!(sanitize_component("  Crypto 1 ", "x"), "Crypto 1");
    }

    #[test]
    fn test_sanitize_rejects_traversal() {
        assert_eq!(sanitize_component("..", "unknown"), "unknown");
        assert_eq!(sanitize_component(".", "unknown"), "unknown");
        assert_eq!(sanitize_component("", "unknown"), "unknown");
        assert_eq!(sanitize_component("../etc", "unknown"), "..-etc");
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(file_name_from_url("/files/0a1b/a.zip?token=xyz"), "a.zip");
        assert_eq!(file_name_from_url("files/c.py"), "c.py");
        assert_eq!(file_name_from_url("https://cdn.example.com/x/b.txt#frag"), "b.txt");
        assert_eq!(file_name_from_url("/files/dir/"), "file");
    }

    #[test]
    fn test_join_relative() {
        assert_eq!(join_relative(&["challenges", "web", "Web1", "a.zip"]), "challenges/web/Web1/a.zip");
    }
}
