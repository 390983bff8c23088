//! Structural metadata extracted from one HTML page.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use url::Url;

use crate::analyzer::patterns::extract_endpoints;

/// Lower-cased markup fragments that mark a form as a login form.
pub const LOGIN_KEYWORDS: [&str; 5] = ["login", "logon", "signin", "password", "密码"];

/// Number of entries reported in `common_classes`.
pub const COMMON_CLASSES_LIMIT: usize = 10;

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector parses")
}

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static FORM: LazyLock<Selector> = LazyLock::new(|| selector("form"));
static FIELD: LazyLock<Selector> = LazyLock::new(|| selector("input, textarea, select"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static SCRIPT: LazyLock<Selector> = LazyLock::new(|| selector("script[src]"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("link[rel][href]"));
static META: LazyLock<Selector> = LazyLock::new(|| selector("meta"));
static TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static CLASSED: LazyLock<Selector> = LazyLock::new(|| selector("[class]"));

/// One `<input>`, `<textarea>` or `<select>` inside a form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormField {
    pub tag: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub name: Option<String>,
    pub value: Option<String>,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormInfo {
    pub action: Option<String>,
    pub method: String,
    pub id: Option<String>,
    #[serde(rename = "class")]
    pub classes: Vec<String>,
    pub inputs: Vec<FormField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub id: Option<String>,
    #[serde(rename = "class")]
    pub classes: Vec<String>,
    /// Every `<tr>` inside the table, nested tables included.
    pub rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkInfo {
    pub text: String,
    pub href: String,
    /// `href` resolved against the page's base URL, when it resolves.
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassCount {
    pub class: String,
    pub count: usize,
}

/// Everything the analyzer reports about a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteStructure {
    pub url: String,
    pub title: Option<String>,
    pub forms_count: usize,
    pub forms: Vec<FormInfo>,
    pub has_login_form: bool,
    pub login_form_index: Option<usize>,
    pub links: Vec<LinkInfo>,
    pub scripts: Vec<String>,
    pub stylesheets: Vec<String>,
    pub meta: Vec<BTreeMap<String, String>>,
    pub tables_count: usize,
    pub tables: Vec<TableInfo>,
    pub common_classes: Vec<ClassCount>,
    pub api_endpoints: Vec<String>,
}

/// Parse `html` and extract its structure. Relative references resolve
/// against `base`.
pub fn extract_structure(html: &str, base: &Url, max_endpoints: usize) -> SiteStructure {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let form_elements: Vec<ElementRef> = document.select(&FORM).collect();
    let login_form_index = form_elements.iter().position(|form| is_login_form(form));
    let forms: Vec<FormInfo> = form_elements.iter().map(form_info).collect();

    let links = document
        .select(&ANCHOR)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            if is_navigable(href) {
                Some(LinkInfo {
                    text: collapse_whitespace(&a.text().collect::<String>()),
                    href: href.to_string(),
                    url: resolve(base, href),
                })
            } else {
                None
            }
        })
        .collect();

    let scripts = document
        .select(&SCRIPT)
        .filter_map(|s| s.value().attr("src"))
        .filter_map(|src| resolve(base, src.trim()))
        .collect();

    let stylesheets = document
        .select(&LINK)
        .filter(|l| {
            l.value().attr("rel").is_some_and(|rel| {
                rel.split_ascii_whitespace()
                    .any(|token| token.eq_ignore_ascii_case("stylesheet"))
            })
        })
        .filter_map(|l| l.value().attr("href"))
        .filter_map(|href| resolve(base, href.trim()))
        .collect();

    let tables: Vec<TableInfo> = document.select(&TABLE).map(|t| table_info(&t)).collect();

    let meta = document
        .select(&META)
        .map(|m| {
            m.value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .collect();

    SiteStructure {
        url: base.to_string(),
        title,
        forms_count: forms.len(),
        has_login_form: login_form_index.is_some(),
        login_form_index,
        forms,
        links,
        scripts,
        stylesheets,
        meta,
        tables_count: tables.len(),
        tables,
        common_classes: common_classes(&document),
        api_endpoints: extract_endpoints(html, max_endpoints),
    }
}

fn form_info(form: &ElementRef) -> FormInfo {
    let element = form.value();
    FormInfo {
        action: element.attr("action").map(str::to_string),
        method: element
            .attr("method")
            .map(|m| m.trim().to_ascii_uppercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "GET".to_string()),
        id: element.attr("id").map(str::to_string),
        classes: element.classes().map(str::to_string).collect(),
        inputs: form.select(&FIELD).map(|f| form_field(&f)).collect(),
    }
}

fn table_info(table: &ElementRef) -> TableInfo {
    TableInfo {
        id: table.value().attr("id").map(str::to_string),
        classes: table.value().classes().map(str::to_string).collect(),
        rows: table.select(&ROW).count(),
    }
}

fn form_field(field: &ElementRef) -> FormField {
    let element = field.value();
    let tag = element.name().to_string();
    let field_type = match tag.as_str() {
        "input" => element
            .attr("type")
            .map(|t| t.to_ascii_lowercase())
            .unwrap_or_else(|| "text".to_string()),
        other => other.to_string(),
    };
    let value = match tag.as_str() {
        "textarea" => Some(field.text().collect::<String>()),
        _ => element.attr("value").map(str::to_string),
    };

    FormField {
        tag,
        field_type,
        name: element.attr("name").map(str::to_string),
        value,
        placeholder: element.attr("placeholder").map(str::to_string),
    }
}

/// Keyword match over the form's serialized, lower-cased markup.
pub fn is_login_form(form: &ElementRef) -> bool {
    let markup = form.html().to_lowercase();
    LOGIN_KEYWORDS.iter().any(|keyword| markup.contains(keyword))
}

pub(crate) fn is_navigable(href: &str) -> bool {
    !href.is_empty()
        && !href.starts_with('#')
        && !href
            .get(..11)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("javascript:"))
}

pub(crate) fn resolve(base: &Url, reference: &str) -> Option<String> {
    base.join(reference).ok().map(String::from)
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn common_classes(document: &Html) -> Vec<ClassCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for element in document.select(&CLASSED) {
        for class in element.value().classes() {
            *counts.entry(class).or_default() += 1;
        }
    }

    let mut ranked: Vec<ClassCount> = counts
        .into_iter()
        .map(|(class, count)| ClassCount {
            class: class.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.class.cmp(&b.class)));
    ranked.truncate(COMMON_CLASSES_LIMIT);
    ranked
}
