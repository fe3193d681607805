//! Bibliography automation for a Zotero paper library.
//!
//! `paperflow` is a library for keeping an academic paper collection healthy,
//! providing:
//!
//! - Duplicate detection and merge planning over library records
//! - Candidate discovery, scoring, and import from public feeds
//! - Metadata enrichment from identifier registries
//! - AI-generated summary notes for stored PDFs
//! - Export of records to a Notion database
//!
//! # Features
//!
//! - **Deterministic dedup**: every record resolves to exactly one identity
//!   key (DOI, then URL, then normalized title + year), groups are merged
//!   onto a single surviving record, and re-runs converge.
//! - **Multi-source metadata**: arXiv, Semantic Scholar, Crossref, Unpaywall,
//!   and the HuggingFace Papers trending feed.
//! - **Gateway seams**: the merge executor talks to a narrow async trait so
//!   destructive plans can be exercised against in-memory fakes.
//! - **AI summarization**: OpenAI-compatible chat-completion endpoints
//!   (Ark/Doubao, DashScope/Qwen, or any generic deployment).
//!
//! # Getting Started
//!
//! ```no_run
//! use paperflow::{
//!   identity::GroupBy,
//!   merge::{group_bundles, plan_merge},
//!   zotero::{ItemScope, ZoteroClient, ZoteroConfig},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let zotero = ZoteroClient::new(ZoteroConfig::from_env()?)?;
//!
//!   let mut bundles = Vec::new();
//!   for item in zotero.list_items(&ItemScope::top()).await? {
//!     let children = zotero.list_children(&item.key).await?;
//!     bundles.push(paperflow::bundle::RecordBundle::build(item, children));
//!   }
//!
//!   for group in group_bundles(bundles, GroupBy::Auto) {
//!     let plan = plan_merge(&group);
//!     println!("{} -> keep {}", group.key, plan.winner);
//!   }
//!   Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`record`]: Zotero item and collection data model
//! - [`identity`]: identity key resolution and normalization
//! - [`bundle`]: record bundles (record + children + derived flags)
//! - [`merge`]: duplicate grouping, winner selection, merge plans
//! - [`zotero`]: Zotero Web API v3 client
//! - [`sources`]: public metadata source clients
//! - [`watch`]: candidate scoring and import
//! - [`enrich`]: metadata enrichment for sparse records
//! - [`llm`]: AI summarization gateway
//! - [`notion`]: Notion database export
//! - [`pdf`]: PDF text extraction and storage path resolution
//!
//! # Design Philosophy
//!
//! - Absence is explicit: record fields are `Option`s, and empty strings are
//!   treated as absent everywhere a field participates in identity.
//! - All grouping and selection is deterministic and independent of hash
//!   iteration order.
//! - Failures on a single record never abort a run; they are logged and
//!   counted.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

use std::{
  collections::{BTreeMap, HashMap, HashSet},
  fmt::{self, Display},
  path::{Path, PathBuf},
  str::FromStr,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};
#[cfg(test)]
use {tempfile::tempdir, tracing_test::traced_test};

pub mod bundle;
pub mod enrich;
pub mod error;
pub mod identity;
pub mod llm;
pub mod merge;
pub mod notion;
pub mod pdf;
pub mod record;
pub mod sources;
pub mod watch;
pub mod zotero;

use crate::{bundle::*, error::*, identity::*, record::*};

/// Common traits and types for ergonomic imports.
///
/// # Usage
///
/// ```no_run
/// use paperflow::prelude::*;
///
/// async fn example() -> Result<()> {
///   let zotero =
///     paperflow::zotero::ZoteroClient::new(paperflow::zotero::ZoteroConfig::from_env()?)?;
///   let item = zotero.fetch_item("ABCD2345").await?;
///   println!("{:?}", item.data.title);
///   Ok(())
/// }
/// ```
pub mod prelude {
  pub use crate::{
    error::{PaperflowError, Result},
    merge::BibliographyGateway,
  };
}

/// Reads a required environment variable, mapping absence to a
/// configuration error so callers fail before any processing starts.
pub fn require_env(name: &str) -> Result<String> {
  match std::env::var(name) {
    Ok(value) if !value.trim().is_empty() => Ok(value),
    _ => Err(PaperflowError::Config(format!("environment variable {name} is not set"))),
  }
}
