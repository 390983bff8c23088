//! Link rewriting for the `/view` endpoint.
//!
//! Only attribute values inside tags are touched. A value is rewritten when
//! it is an absolute path on the origin (starts with one `/`, not `//`).

use std::sync::LazyLock;

use regex::bytes::{Captures, Regex};

// Byte patterns with Unicode off so pages in any ASCII-compatible charset
// are rewritten without being decoded.
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u)<[A-Za-z][^<>]*>").expect("tag pattern compiles"));

static URL_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i-u)(\s)(href|action|src)(\s*=\s*)(?:"([^"]*)"|'([^']*)')"#)
        .expect("attribute pattern compiles")
});

/// Rewrites origin-absolute links so a browser stays on the proxy.
#[derive(Debug, Clone)]
pub struct LinkRewriter {
    prefix: String,
}

impl LinkRewriter {
    /// `path_prefix` is the base URL's path (ending in `/`); it is stripped
    /// from rewritten page and form links since the proxy routes are
    /// relative to it.
    pub fn new(path_prefix: &str) -> Self {
        Self {
            prefix: path_prefix.to_string(),
        }
    }

    /// Rewrite raw markup. Bytes outside rewritten attribute values are
    /// copied unchanged, whatever the page's charset.
    pub fn rewrite(&self, html: &[u8]) -> Vec<u8> {
        TAG.replace_all(html, |tag: &Captures| {
            URL_ATTR
                .replace_all(&tag[0], |attr: &Captures| self.rewrite_attr(attr))
                .into_owned()
        })
        .into_owned()
    }

    fn rewrite_attr(&self, attr: &Captures) -> Vec<u8> {
        let (quote, value) = match (attr.get(4), attr.get(5)) {
            (Some(v), _) => (b'"', v.as_bytes()),
            (None, Some(v)) => (b'\'', v.as_bytes()),
            (None, None) => return attr[0].to_vec(),
        };
        let Ok(attribute) = std::str::from_utf8(&attr[2]) else {
            return attr[0].to_vec();
        };

        match self.rewrite_value(attribute, value) {
            Some(rewritten) => {
                let mut out = Vec::with_capacity(attr[0].len() + rewritten.len());
                out.extend_from_slice(&attr[1]);
                out.extend_from_slice(&attr[2]);
                out.extend_from_slice(&attr[3]);
                out.push(quote);
                out.extend_from_slice(&rewritten);
                out.push(quote);
                out
            }
            None => attr[0].to_vec(),
        }
    }

    /// New value for one attribute, or `None` to leave it alone.
    pub fn rewrite_value(&self, attribute: &str, value: &[u8]) -> Option<Vec<u8>> {
        if !value.starts_with(b"/") || value.starts_with(b"//") {
            return None;
        }
        let relative = value.strip_prefix(self.prefix.as_bytes()).unwrap_or(value);

        let route: &[u8] = match attribute.to_ascii_lowercase().as_str() {
            "href" => b"/view/",
            "action" => b"/proxy/",
            "src" => {
                let encoded: String = url::form_urlencoded::byte_serialize(value).collect();
                return Some(format!("/resource?url={encoded}").into_bytes());
            }
            _ => return None,
        };
        Some([route, relative].concat())
    }
}
