//! Candidate endpoint extraction over raw markup.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Fixed pattern set. Each pattern's first capture group is the candidate.
static ENDPOINT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Quoted paths to server-side action files, optional query string.
        r#"["']([^"'\s<>()]*?\.(?:do|action|jsp|jspx|php|asp|aspx|ashx|cgi)(?:\?[^"'\s<>]*)?)["']"#,
        // Quoted paths with an `api` segment.
        r#"["']((?:/|\./|\.\./)?(?:[\w\-.]+/)*api/[\w\-./]*)["']"#,
        // Servlet-style handlers named by suffix.
        r#"["']((?:/|\./|\.\./)?(?:[\w\-.]+/)*[A-Za-z]\w*(?:Servlet|Controller|Handler))["']"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("endpoint pattern compiles"))
    .collect()
});

/// Distinct candidate endpoint strings found in `markup`, sorted, at most
/// `limit` of them.
pub fn extract_endpoints(markup: &str, limit: usize) -> Vec<String> {
    let mut found = BTreeSet::new();
    for pattern in ENDPOINT_PATTERNS.iter() {
        for captures in pattern.captures_iter(markup) {
            if let Some(m) = captures.get(1) {
                found.insert(m.as_str().to_string());
            }
        }
    }
    found.into_iter().take(limit).collect()
}
