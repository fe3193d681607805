//! Semantic Scholar academic graph client.
//!
//! One endpoint matters here: `graph/v1/paper/{id}` with citation fields.
//! The service rate-limits anonymous callers aggressively, so a 429 is a
//! first-class outcome the scorer can react to (by falling back to another
//! identifier) rather than an error.

use super::*;

/// Paper endpoint prefix.
const API_URL: &str = "https://api.semanticscholar.org/graph/v1/paper";

/// Fields requested on every lookup.
const FIELDS: &str = "title,year,externalIds,citationCount,influentialCitationCount,authors,abstract";

/// Identifier namespaces the graph accepts.
#[derive(Debug, Clone, Copy)]
pub enum PaperId<'a> {
  /// `DOI:{doi}`
  Doi(&'a str),
  /// `arXiv:{id}`
  Arxiv(&'a str),
}

impl Display for PaperId<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PaperId::Doi(doi) => write!(f, "DOI:{doi}"),
      PaperId::Arxiv(id) => write!(f, "arXiv:{id}"),
    }
  }
}

/// Citation metadata for one paper.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CitationRecord {
  /// Canonical title
  pub title: Option<String>,
  /// Publication year
  pub year: Option<i64>,
  /// Total citation count
  #[serde(rename = "citationCount")]
  pub citation_count: Option<u64>,
  /// Influential citation count
  #[serde(rename = "influentialCitationCount")]
  pub influential_citation_count: Option<u64>,
  /// Abstract, may carry markup
  #[serde(rename = "abstract")]
  pub abstract_text: Option<String>,
  /// Cross-registry identifiers
  #[serde(rename = "externalIds", default)]
  pub external_ids: ExternalIds,
}

/// Identifiers Semantic Scholar knows the paper under.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalIds {
  /// DOI when registered
  #[serde(rename = "DOI")]
  pub doi:   Option<String>,
  /// arXiv id when posted there
  #[serde(rename = "ArXiv")]
  pub arxiv: Option<String>,
}

impl CitationRecord {
  /// Abstract with markup stripped.
  pub fn clean_abstract(&self) -> Option<String> {
    self.abstract_text.as_deref().map(strip_tags).filter(|s| !s.is_empty())
  }
}

/// Outcome of one lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
  /// The paper is known to the graph
  Found(CitationRecord),
  /// The paper is not in the graph (or the request failed softly)
  Absent,
  /// The service asked us to back off; try another identifier
  RateLimited,
}

/// Fetches citation metadata for one identifier.
///
/// `S2_API_KEY` is attached when set; anonymous access works but trips the
/// rate limiter sooner.
pub async fn fetch(id: PaperId<'_>) -> Result<Lookup> {
  let client = reqwest::Client::builder().user_agent(SOURCE_USER_AGENT).build()?;
  let mut request = client.get(format!("{API_URL}/{id}")).query(&[("fields", FIELDS)]);
  if let Ok(api_key) = std::env::var("S2_API_KEY") {
    request = request.header("x-api-key", api_key);
  }
  let response = request.send().await?;
  match response.status().as_u16() {
    429 => Ok(Lookup::RateLimited),
    404 => Ok(Lookup::Absent),
    _ if response.status().is_success() => Ok(Lookup::Found(response.json().await?)),
    status => {
      warn!(id = %id, status, "semantic scholar lookup failed, treating as absent");
      Ok(Lookup::Absent)
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn citation_record_deserializes_graph_payloads() {
    let record: CitationRecord = serde_json::from_value(json!({
      "paperId": "abc",
      "title": "A Paper",
      "year": 2021,
      "citationCount": 42,
      "influentialCitationCount": 7,
      "abstract": "<p>Short &amp; sweet</p>",
      "externalIds": { "DOI": "10.1/x", "ArXiv": "2101.00001" }
    }))
    .unwrap();
    assert_eq!(record.citation_count, Some(42));
    assert_eq!(record.external_ids.doi.as_deref(), Some("10.1/x"));
    assert_eq!(record.clean_abstract().as_deref(), Some("Short & sweet"));
  }

  #[test]
  fn paper_ids_render_with_their_namespace() {
    assert_eq!(PaperId::Doi("10.1/x").to_string(), "DOI:10.1/x");
    assert_eq!(PaperId::Arxiv("2101.00001").to_string(), "arXiv:2101.00001");
  }
}
