//! Site analyzer.
//!
//! Fetches one page from the origin and reports its forms, links, scripts,
//! stylesheets, meta tags, tables and candidate API endpoints, or the
//! page's headline links.

pub mod headlines;
pub mod patterns;
pub mod site;
pub mod structure;

pub use patterns::extract_endpoints;
pub use headlines::{extract_headlines, Headline, HeadlineSource, Headlines};
pub use site::{AnalysisError, AnalysisReport, HeadlineReport, SiteAnalyzer};
pub use structure::{
    extract_structure, ClassCount, FormField, FormInfo, LinkInfo, SiteStructure, TableInfo,
};
