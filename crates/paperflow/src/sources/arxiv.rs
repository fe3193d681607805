//! arXiv Atom API client.
//!
//! Search results and id lookups both come back as Atom XML from
//! `export.arxiv.org/api/query`. The parser is a single event loop over the
//! feed; it needs nothing beyond the entry fields the importers read.

use quick_xml::{events::Event, Reader};

use super::*;

/// Query endpoint for the arXiv API.
const API_URL: &str = "http://export.arxiv.org/api/query";

lazy_static! {
  /// arXiv id embedded in an abs/pdf URL.
  static ref ARXIV_URL: Regex = Regex::new(r"arxiv\.org/(?:abs|pdf)/([A-Za-z0-9.\-]+)").unwrap();
}

/// One entry from the Atom feed.
#[derive(Debug, Clone, Default)]
pub struct ArxivEntry {
  /// arXiv identifier, e.g. `2301.07041v2`
  pub arxiv_id:  String,
  /// Title with whitespace collapsed
  pub title:     String,
  /// Tag-stripped abstract
  pub summary:   String,
  /// Author display names in feed order
  pub authors:   Vec<String>,
  /// Submission timestamp (RFC 3339) when present
  pub published: Option<String>,
  /// DOI, present once a version is published
  pub doi:       Option<String>,
  /// Direct PDF link
  pub pdf_url:   Option<String>,
}

impl ArxivEntry {
  /// Canonical abstract-page URL.
  pub fn abs_url(&self) -> String { format!("https://arxiv.org/abs/{}", self.arxiv_id) }

  /// Submission time parsed to UTC.
  pub fn published_at(&self) -> Option<DateTime<Utc>> {
    self
      .published
      .as_deref()
      .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
      .map(|dt| dt.with_timezone(&Utc))
  }

  /// `YYYY-MM-DD` part of the submission timestamp.
  pub fn date(&self) -> Option<String> {
    self.published.as_deref().map(|ts| ts.chars().take(10).collect())
  }

  /// `YYYY` part of the submission timestamp.
  pub fn year(&self) -> Option<String> {
    self.published.as_deref().map(|ts| ts.chars().take(4).collect())
  }
}

/// Searches recent submissions for each keyword, deduplicating by arXiv id
/// and dropping entries older than `cutoff`.
pub async fn search_recent(
  keywords: &[String],
  cutoff: DateTime<Utc>,
  max_results: usize,
) -> Result<Vec<ArxivEntry>> {
  let client = reqwest::Client::builder().user_agent(SOURCE_USER_AGENT).build()?;
  let mut seen: HashSet<String> = HashSet::new();
  let mut entries = Vec::new();
  for keyword in keywords {
    let query = [
      ("search_query", format!("all:{keyword}")),
      ("start", "0".to_string()),
      ("max_results", max_results.min(200).to_string()),
      ("sortBy", "submittedDate".to_string()),
      ("sortOrder", "descending".to_string()),
    ];
    let response = match client.get(API_URL).query(&query).send().await {
      Ok(response) => response,
      Err(e) => {
        warn!(%keyword, error = %e, "arxiv query failed, skipping keyword");
        continue;
      },
    };
    let body = match crate::zotero::ensure_ok("arxiv", response).await {
      Ok(response) => response.text().await?,
      Err(e) => {
        warn!(%keyword, error = %e, "arxiv query rejected, skipping keyword");
        continue;
      },
    };
    for entry in parse_feed(&body) {
      let too_old = entry.published_at().is_some_and(|at| at < cutoff);
      if too_old || !seen.insert(entry.arxiv_id.clone()) {
        continue;
      }
      entries.push(entry);
    }
  }
  Ok(entries)
}

/// Looks up a single paper by arXiv id.
pub async fn fetch_by_id(arxiv_id: &str) -> Result<Option<ArxivEntry>> {
  let client = reqwest::Client::builder().user_agent(SOURCE_USER_AGENT).build()?;
  let response = client.get(API_URL).query(&[("id_list", arxiv_id)]).send().await?;
  let body = crate::zotero::ensure_ok("arxiv", response).await?.text().await?;
  Ok(parse_feed(&body).into_iter().next())
}

/// Parses an Atom feed into entries, skipping any without an arXiv id.
pub fn parse_feed(xml: &str) -> Vec<ArxivEntry> {
  lazy_static! {
    /// Whitespace runs inside wrapped titles.
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
  }
  let mut reader = Reader::from_str(xml);
  let mut entries = Vec::new();
  let mut current: Option<ArxivEntry> = None;
  let mut path: Vec<String> = Vec::new();
  let mut id_text = String::new();
  let mut buf = Vec::new();

  while let Ok(event) = reader.read_event_into(&mut buf) {
    match event {
      Event::Start(e) => {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        if name == "entry" {
          current = Some(ArxivEntry::default());
          id_text.clear();
        } else if name == "link" {
          if let Some(entry) = current.as_mut() {
            read_link(entry, &e);
          }
        }
        path.push(name);
      },
      Event::Empty(e) =>
        if e.name().as_ref() == b"link" {
          if let Some(entry) = current.as_mut() {
            read_link(entry, &e);
          }
        },
      Event::Text(e) => {
        let Some(entry) = current.as_mut() else {
          buf.clear();
          continue;
        };
        if let Ok(text) = e.unescape() {
          let text = text.trim();
          if !text.is_empty() {
            match path.last().map(String::as_str) {
              Some("id") => id_text.push_str(text),
              Some("title") => entry.title = WHITESPACE.replace_all(text, " ").into_owned(),
              Some("summary") => entry.summary = strip_tags(text),
              Some("published") => entry.published = Some(text.to_string()),
              Some("updated") if entry.published.is_none() =>
                entry.published = Some(text.to_string()),
              Some("name") if path.iter().any(|p| p == "author") =>
                entry.authors.push(text.to_string()),
              Some("arxiv:doi") => entry.doi = Some(text.to_string()),
              _ => (),
            }
          }
        }
      },
      Event::End(e) => {
        path.pop();
        if e.name().as_ref() == b"entry" {
          if let Some(mut entry) = current.take() {
            if entry.arxiv_id.is_empty() {
              if let Some(m) = ARXIV_URL.captures(&id_text) {
                entry.arxiv_id = m[1].to_string();
              }
            }
            if !entry.arxiv_id.is_empty() {
              if entry.pdf_url.is_none() {
                entry.pdf_url = Some(format!("https://arxiv.org/pdf/{}.pdf", entry.arxiv_id));
              }
              entries.push(entry);
            }
          }
        }
      },
      Event::Eof => break,
      _ => (),
    }
    buf.clear();
  }
  entries
}

/// Pulls the PDF link and an id fallback out of a `<link>` element.
fn read_link(entry: &mut ArxivEntry, element: &quick_xml::events::BytesStart<'_>) {
  let mut href = None;
  let mut is_pdf = false;
  for attr in element.attributes().flatten() {
    let value = String::from_utf8_lossy(&attr.value).into_owned();
    match attr.key.as_ref() {
      b"href" => href = Some(value),
      b"title" if value == "pdf" => is_pdf = true,
      b"type" if value == "application/pdf" => is_pdf = true,
      _ => (),
    }
  }
  if let Some(href) = href {
    if entry.arxiv_id.is_empty() {
      if let Some(m) = ARXIV_URL.captures(&href) {
        entry.arxiv_id = m[1].to_string();
      }
    }
    if is_pdf {
      entry.pdf_url = Some(href);
    }
  }
}
