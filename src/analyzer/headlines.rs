//! Headline and notice extraction for a portal landing page.
//!
//! Long link texts among the first anchors are taken as headlines. When
//! there are none, `news` and `notice` blocks are reported instead.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::Serialize;
use url::Url;

use crate::analyzer::structure::{collapse_whitespace, is_navigable, resolve, selector};

/// Headlines returned in one report.
pub const HEADLINE_LIMIT: usize = 5;

/// Only the first anchors of a page are considered.
const ANCHOR_SCAN_LIMIT: usize = 10;

/// Link texts of this many characters or fewer are navigation, not news.
const MIN_TITLE_CHARS: usize = 5;

/// Block titles are cut to this many characters.
const BLOCK_TITLE_CHARS: usize = 100;

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static NOTICE_BLOCK: LazyLock<Selector> = LazyLock::new(|| selector("div.news, div.notice"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadlineSource {
    Link,
    Block,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Headline {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub source: HeadlineSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Headlines {
    /// At most `HEADLINE_LIMIT` entries, in document order.
    pub items: Vec<Headline>,
    /// Matches found before the cap was applied.
    pub total_found: usize,
}

pub fn extract_headlines(html: &str, base: &Url) -> Headlines {
    let document = Html::parse_document(html);

    let mut found: Vec<Headline> = document
        .select(&ANCHOR)
        .take(ANCHOR_SCAN_LIMIT)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            let title = collapse_whitespace(&a.text().collect::<String>());
            (is_navigable(href) && title.chars().count() > MIN_TITLE_CHARS).then(|| Headline {
                title,
                url: resolve(base, href),
                source: HeadlineSource::Link,
            })
        })
        .collect();

    if found.is_empty() {
        found = document
            .select(&NOTICE_BLOCK)
            .map(|block| Headline {
                title: collapse_whitespace(&block.text().collect::<String>())
                    .chars()
                    .take(BLOCK_TITLE_CHARS)
                    .collect(),
                url: None,
                source: HeadlineSource::Block,
            })
            .collect();
    }

    let total_found = found.len();
    found.truncate(HEADLINE_LIMIT);
    Headlines {
        items: found,
        total_found,
    }
}
