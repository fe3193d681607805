//! Clients for public bibliographic metadata sources.
//!
//! Each submodule wraps one service:
//!
//! - [`arxiv`]: Atom feed search and id lookup
//! - [`semantic_scholar`]: citation counts from the academic graph
//! - [`crossref`]: DOI resolution to publisher metadata
//! - [`unpaywall`]: open-access PDF locations
//! - [`hf_papers`]: the HuggingFace Papers trending feed
//!
//! These services are best-effort inputs: callers treat failures as missing
//! metadata, never as run-fatal errors.

use super::*;

pub mod arxiv;
pub mod crossref;
pub mod hf_papers;
pub mod semantic_scholar;
pub mod unpaywall;

/// User agent sent to every metadata source.
pub(crate) const SOURCE_USER_AGENT: &str = concat!("paperflow/", env!("CARGO_PKG_VERSION"));

/// Strips HTML markup from abstracts and other rich-text fields.
///
/// Entities are decoded first so escaped markup is removed too, then tags
/// become spaces and whitespace runs collapse.
pub fn strip_tags(text: &str) -> String {
  lazy_static! {
    /// Any HTML/XML tag.
    static ref TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
    /// Whitespace runs left behind by removed markup.
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
  }
  let unescaped = unescape_entities(text);
  let untagged = TAG.replace_all(&unescaped, " ");
  WHITESPACE.replace_all(&untagged, " ").trim().to_string()
}

/// Decodes XML/HTML entities, resolving `&nbsp;` (which quick-xml does not
/// know) to a plain space. Text with broken entities is returned as is.
pub(crate) fn unescape_entities(text: &str) -> String {
  match quick_xml::escape::unescape_with(text, |entity| (entity == "nbsp").then_some(" ")) {
    Ok(unescaped) => unescaped.into_owned(),
    Err(_) => text.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strip_tags_removes_markup_and_entities() {
    let jats = "<jats:p>We study <i>foo</i> &amp; bar.\n  More.</jats:p>";
    assert_eq!(strip_tags(jats), "We study foo & bar. More.");
  }

  #[test]
  fn strip_tags_removes_escaped_markup() {
    assert_eq!(strip_tags("a &lt;b&gt;bold&lt;/b&gt; claim"), "a bold claim");
  }

  #[test]
  fn unescape_entities_handles_numeric_nbsp_and_broken_input() {
    assert_eq!(unescape_entities("x&#39;s&nbsp;y &#x27;z&#x27;"), "x's y 'z'");
    assert_eq!(unescape_entities("3 &lt 4 & 5"), "3 &lt 4 & 5");
  }
}
