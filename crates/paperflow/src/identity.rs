//! Identity key resolution for duplicate detection.
//!
//! Every record resolves to exactly one [`IdentityKey`] through a fixed
//! precedence chain: DOI, then URL, then normalized title plus year. Two
//! records are duplicates iff their keys are equal. Resolution is pure
//! string work; it never goes to the network.
//!
//! # Examples
//!
//! ```
//! use paperflow::{
//!   identity::{resolve, GroupBy, IdentityKind},
//!   record::ItemData,
//! };
//!
//! let data = ItemData { doi: Some("10.1234/ABC".into()), ..Default::default() };
//! let key = resolve(&data, GroupBy::Auto).unwrap();
//! assert_eq!(key.kind, IdentityKind::Doi);
//! assert_eq!(key.value, "10.1234/abc");
//! ```

use super::*;

/// Which field family an identity key was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
  /// Lowercased DOI
  Doi,
  /// Normalized URL
  Url,
  /// Normalized title joined with the publication year
  TitleYear,
}

impl Display for IdentityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      IdentityKind::Doi => write!(f, "doi"),
      IdentityKind::Url => write!(f, "url"),
      IdentityKind::TitleYear => write!(f, "title"),
    }
  }
}

/// The canonical identity of a record for grouping purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
  /// Field family the key came from
  pub kind:  IdentityKind,
  /// Normalized key text
  pub value: String,
}

impl Display for IdentityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind, self.value)
  }
}

/// Grouping mode: the full precedence chain or a single-field override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
  /// DOI, then URL, then title+year
  #[default]
  Auto,
  /// Only group records that share a DOI
  Doi,
  /// Only group records that share a normalized URL
  Url,
  /// Only group records that share a normalized title+year
  Title,
}

impl FromStr for GroupBy {
  type Err = PaperflowError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_ascii_lowercase().as_str() {
      "auto" => Ok(GroupBy::Auto),
      "doi" => Ok(GroupBy::Doi),
      "url" => Ok(GroupBy::Url),
      "title" => Ok(GroupBy::Title),
      other => Err(PaperflowError::Config(format!(
        "unknown group-by mode {other:?}, expected auto, doi, url, or title"
      ))),
    }
  }
}

/// Normalizes a title for identity comparison.
///
/// Lowercases, collapses whitespace runs to single spaces, strips every
/// character outside `[a-z0-9 ]`, and trims. Idempotent.
pub fn normalize_title(title: &str) -> String {
  lazy_static! {
    /// Whitespace runs, collapsed before stripping.
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    /// Everything outside the kept alphabet.
    static ref NON_ALNUM: Regex = Regex::new(r"[^a-z0-9 ]").unwrap();
  }
  let lowered = title.to_lowercase();
  let collapsed = WHITESPACE.replace_all(&lowered, " ");
  NON_ALNUM.replace_all(&collapsed, "").trim().to_string()
}

/// Normalizes a URL for identity comparison.
///
/// Lowercases scheme and host, drops the query and fragment, and strips any
/// trailing slash. Returns `None` when the input does not parse to a URL
/// with both a scheme and a host.
pub fn normalize_url(raw: &str) -> Option<String> {
  let parsed = url::Url::parse(raw.trim()).ok()?;
  let host = parsed.host_str()?;
  let mut normalized = format!("{}://{}", parsed.scheme(), host.to_lowercase());
  if let Some(port) = parsed.port() {
    normalized.push_str(&format!(":{port}"));
  }
  normalized.push_str(parsed.path().trim_end_matches('/'));
  Some(normalized)
}

/// Resolves the identity key for a record payload.
///
/// Under [`GroupBy::Auto`] this never returns `None`: a record with no DOI
/// and no usable URL still keys on `title|year`, with `unknown` standing in
/// for a missing year. Under a single-field override, records lacking that
/// field resolve to `None` and are excluded from grouping.
pub fn resolve(data: &ItemData, group_by: GroupBy) -> Option<IdentityKey> {
  match group_by {
    GroupBy::Auto => doi_key(data).or_else(|| url_key(data)).or_else(|| Some(title_key(data))),
    GroupBy::Doi => doi_key(data),
    GroupBy::Url => url_key(data),
    GroupBy::Title => Some(title_key(data)),
  }
}

/// DOI key: lowercased trimmed DOI, absent when the field is empty.
fn doi_key(data: &ItemData) -> Option<IdentityKey> {
  non_empty(&data.doi)
    .map(|doi| IdentityKey { kind: IdentityKind::Doi, value: doi.to_lowercase() })
}

/// URL key, absent when the field is empty or unparseable.
fn url_key(data: &ItemData) -> Option<IdentityKey> {
  non_empty(&data.url)
    .and_then(normalize_url)
    .map(|value| IdentityKey { kind: IdentityKind::Url, value })
}

/// Title+year key; total, since both parts have defined fallbacks.
fn title_key(data: &ItemData) -> IdentityKey {
  let title = normalize_title(non_empty(&data.title).unwrap_or(""));
  let year = data.year().unwrap_or_else(|| "unknown".to_string());
  IdentityKey { kind: IdentityKind::TitleYear, value: format!("{title}|{year}") }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(doi: Option<&str>, url: Option<&str>, title: Option<&str>, date: Option<&str>) -> ItemData {
    ItemData {
      doi: doi.map(String::from),
      url: url.map(String::from),
      title: title.map(String::from),
      date: date.map(String::from),
      ..Default::default()
    }
  }

  #[test]
  fn doi_takes_precedence_over_url_and_title() {
    let data = record(Some("10.1234/ABC"), Some("https://example.com/p"), Some("T"), Some("2020"));
    let key = resolve(&data, GroupBy::Auto).unwrap();
    assert_eq!(key, IdentityKey { kind: IdentityKind::Doi, value: "10.1234/abc".into() });
  }

  #[test]
  fn doi_grouping_is_case_insensitive() {
    let a = record(Some("10.1234/ABC"), None, None, None);
    let b = record(Some("10.1234/abc"), None, None, None);
    assert_eq!(resolve(&a, GroupBy::Auto), resolve(&b, GroupBy::Auto));
  }

  #[test]
  fn url_normalization_drops_query_and_trailing_slash() {
    let a = record(None, Some("https://example.com/paper?utm=1"), None, None);
    let b = record(None, Some("HTTPS://EXAMPLE.COM/paper/"), None, None);
    let key = resolve(&a, GroupBy::Auto).unwrap();
    assert_eq!(key, resolve(&b, GroupBy::Auto).unwrap());
    assert_eq!(key.value, "https://example.com/paper");
  }

  #[test]
  fn unparseable_url_falls_through_to_title() {
    let data = record(None, Some("not a url"), Some("Fallback"), Some("2022"));
    let key = resolve(&data, GroupBy::Auto).unwrap();
    assert_eq!(key.kind, IdentityKind::TitleYear);
    assert_eq!(key.value, "fallback|2022");
  }

  #[test]
  fn title_keys_collapse_whitespace_and_punctuation() {
    let a = record(None, None, Some("Deep   Learning"), Some("2020"));
    let b = record(None, None, Some("  deep learning! "), Some("2020-06-01"));
    assert_eq!(resolve(&a, GroupBy::Auto), resolve(&b, GroupBy::Auto));
    assert_eq!(resolve(&a, GroupBy::Auto).unwrap().value, "deep learning|2020");
  }

  #[test]
  fn missing_everything_still_resolves_under_auto() {
    let data = record(None, None, None, None);
    let key = resolve(&data, GroupBy::Auto).unwrap();
    assert_eq!(key.value, "|unknown");
  }

  #[test]
  fn empty_strings_are_treated_as_absent() {
    let data = record(Some("  "), Some(""), Some("Only Title"), None);
    let key = resolve(&data, GroupBy::Auto).unwrap();
    assert_eq!(key.kind, IdentityKind::TitleYear);
  }

  #[test]
  fn overrides_exclude_records_missing_the_field() {
    let data = record(None, None, Some("T"), Some("2020"));
    assert!(resolve(&data, GroupBy::Doi).is_none());
    assert!(resolve(&data, GroupBy::Url).is_none());
    assert!(resolve(&data, GroupBy::Title).is_some());
  }

  #[test]
  fn normalize_title_is_idempotent() {
    let once = normalize_title("  Attention\tIs  All — You Need?! ");
    assert_eq!(once, normalize_title(&once));
    assert_eq!(once, "attention is all you need");
  }
}
