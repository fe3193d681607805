//! Crossref works API client.
//!
//! Resolves a DOI to publisher metadata via `api.crossref.org/works/{doi}`.
//! The interesting work is in [`parse_message`], which flattens Crossref's
//! list-heavy message shape into the handful of fields enrichment fills.

use super::*;

/// Works endpoint prefix.
const API_URL: &str = "https://api.crossref.org/works";

/// Metadata extracted from a Crossref work message.
#[derive(Debug, Clone, Default)]
pub struct WorkMetadata {
  /// Primary title
  pub title:         Option<String>,
  /// Author display names, given then family
  pub authors:       Vec<String>,
  /// Tag-stripped abstract
  pub abstract_text: Option<String>,
  /// Year from the `issued` date parts
  pub year:          Option<String>,
  /// Container (journal or proceedings) title
  pub container:     Option<String>,
  /// Crossref work type, e.g. `journal-article`
  pub kind:          Option<String>,
  /// Publisher name
  pub publisher:     Option<String>,
  /// Volume within the container
  pub volume:        Option<String>,
  /// Issue within the volume
  pub issue:         Option<String>,
  /// Page range
  pub pages:         Option<String>,
}

/// Resolves one DOI; `None` when Crossref does not know it.
pub async fn fetch_work(doi: &str) -> Result<Option<WorkMetadata>> {
  let client = reqwest::Client::builder().user_agent(SOURCE_USER_AGENT).build()?;
  let response = client.get(format!("{API_URL}/{doi}")).send().await?;
  if response.status().as_u16() == 404 {
    return Ok(None);
  }
  let body: Value = crate::zotero::ensure_ok("crossref", response).await?.json().await?;
  Ok(body.get("message").map(parse_message))
}

/// Flattens a work message into [`WorkMetadata`].
pub fn parse_message(message: &Value) -> WorkMetadata {
  let first_string = |field: &str| {
    message
      .get(field)
      .and_then(Value::as_array)
      .and_then(|list| list.first())
      .and_then(Value::as_str)
      .map(String::from)
  };
  let plain_string =
    |field: &str| message.get(field).and_then(Value::as_str).map(String::from);

  let authors = message
    .get("author")
    .and_then(Value::as_array)
    .map(|list| {
      list
        .iter()
        .filter_map(|author| {
          let given = author.get("given").and_then(Value::as_str);
          let family = author.get("family").and_then(Value::as_str);
          let name =
            [given, family].into_iter().flatten().collect::<Vec<_>>().join(" ");
          (!name.is_empty()).then_some(name)
        })
        .collect()
    })
    .unwrap_or_default();

  let year = message
    .pointer("/issued/date-parts/0/0")
    .and_then(Value::as_i64)
    .map(|y| y.to_string());

  WorkMetadata {
    title: first_string("title"),
    authors,
    abstract_text: message
      .get("abstract")
      .and_then(Value::as_str)
      .map(strip_tags)
      .filter(|s| !s.is_empty()),
    year,
    container: first_string("container-title"),
    kind: plain_string("type"),
    publisher: plain_string("publisher"),
    volume: plain_string("volume"),
    issue: plain_string("issue"),
    pages: plain_string("page"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_message_flattens_the_work_shape() {
    let message = json!({
      "title": ["A Study of Things"],
      "container-title": ["Journal of Things"],
      "type": "journal-article",
      "publisher": "Things Press",
      "volume": "12",
      "issue": "3",
      "page": "100-110",
      "abstract": "<jats:p>We do things &amp; stuff.</jats:p>",
      "author": [
        { "given": "Ada", "family": "Lovelace" },
        { "family": "Euclid" }
      ],
      "issued": { "date-parts": [[2019, 4]] }
    });
    let meta = parse_message(&message);
    assert_eq!(meta.title.as_deref(), Some("A Study of Things"));
    assert_eq!(meta.authors, ["Ada Lovelace", "Euclid"]);
    assert_eq!(meta.abstract_text.as_deref(), Some("We do things & stuff."));
    assert_eq!(meta.year.as_deref(), Some("2019"));
    assert_eq!(meta.container.as_deref(), Some("Journal of Things"));
    assert_eq!(meta.kind.as_deref(), Some("journal-article"));
    assert_eq!(meta.pages.as_deref(), Some("100-110"));
  }

  #[test]
  fn parse_message_tolerates_sparse_works() {
    let meta = parse_message(&json!({}));
    assert!(meta.title.is_none());
    assert!(meta.authors.is_empty());
    assert!(meta.year.is_none());
  }
}
