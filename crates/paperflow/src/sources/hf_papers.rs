//! HuggingFace Papers trending feed.
//!
//! There is no JSON API for the trending lists; the page embeds its payload
//! in a `data-props` attribute, so fetching is scrape-then-parse. Rank turns
//! into a score of `1 - rank/(limit+1)`, which the watch pipeline later
//! scales by per-timeframe weights.

use chrono::Datelike;

use super::*;

/// Default page base; `HF_PAPERS_BASE` overrides it.
const DEFAULT_BASE: &str = "https://huggingface.co/papers";

lazy_static! {
  /// The embedded JSON payload attribute.
  static ref DATA_PROPS: Regex = Regex::new(r#"data-props="([^"]+)""#).unwrap();
}

/// Trending list granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
  /// Today's list
  Daily,
  /// This ISO week's list
  Weekly,
  /// This month's list
  Monthly,
}

impl Timeframe {
  /// Label used in reports and weight maps.
  pub fn label(self) -> &'static str {
    match self {
      Timeframe::Daily => "daily",
      Timeframe::Weekly => "weekly",
      Timeframe::Monthly => "monthly",
    }
  }

  /// URL path segment for the period.
  fn period(self) -> &'static str {
    match self {
      Timeframe::Daily => "date",
      Timeframe::Weekly => "week",
      Timeframe::Monthly => "month",
    }
  }

  /// Period identifier for `now`, e.g. `2026-08-23`, `2026-W34`, `2026-08`.
  fn identifier(self, now: DateTime<Utc>) -> String {
    match self {
      Timeframe::Daily => now.format("%Y-%m-%d").to_string(),
      Timeframe::Weekly => {
        let week = now.date_naive().iso_week();
        format!("{}-W{:02}", week.year(), week.week())
      },
      Timeframe::Monthly => now.format("%Y-%m").to_string(),
    }
  }

  /// Payload keys to try, most specific first.
  fn payload_keys(self) -> &'static [&'static str] {
    match self {
      Timeframe::Daily => &["dailyPapers", "papers"],
      Timeframe::Weekly => &["weeklyPapers", "papers", "dailyPapers"],
      Timeframe::Monthly => &["monthlyPapers", "papers", "dailyPapers"],
    }
  }
}

/// One trending paper.
#[derive(Debug, Clone, Default)]
pub struct TrendingPaper {
  /// Paper title
  pub title:         String,
  /// Summary text when the feed carries one
  pub abstract_text: Option<String>,
  /// Project or paper page URL
  pub url:           Option<String>,
  /// arXiv id, present for nearly every entry
  pub arxiv_id:      Option<String>,
  /// DOI when known
  pub doi:           Option<String>,
  /// Direct PDF link
  pub pdf_url:       Option<String>,
  /// Author display names
  pub authors:       Vec<String>,
  /// Publication date `YYYY-MM-DD`
  pub date:          Option<String>,
  /// Publication year
  pub year:          Option<String>,
  /// Which list the paper came from
  pub timeframe:     &'static str,
  /// 1-based position in the list
  pub rank:          usize,
  /// Rank score in `[0, 1)`, before timeframe weighting
  pub hf_score:      f64,
}

/// Fetches one trending list, capped at `limit` papers.
pub async fn fetch_trending(timeframe: Timeframe, limit: usize) -> Result<Vec<TrendingPaper>> {
  if limit == 0 {
    return Ok(Vec::new());
  }
  let base = std::env::var("HF_PAPERS_BASE").unwrap_or_else(|_| DEFAULT_BASE.to_string());
  let now = Utc::now();
  let urls = [
    format!("{base}/{}/{}", timeframe.period(), timeframe.identifier(now)),
    format!("{base}?sort=trending&time={}", timeframe.label()),
  ];
  let client = reqwest::Client::builder().user_agent(SOURCE_USER_AGENT).build()?;
  for url in urls {
    let page = match client.get(&url).send().await {
      Ok(response) if response.status().is_success() => response.text().await?,
      Ok(response) => {
        debug!(url, status = response.status().as_u16(), "trending page unavailable");
        continue;
      },
      Err(e) => {
        debug!(url, error = %e, "trending page fetch failed");
        continue;
      },
    };
    if let Some(payload) = extract_payload(&page) {
      return Ok(parse_trending(&payload, timeframe, limit));
    }
  }
  Ok(Vec::new())
}

/// Finds and decodes the `data-props` JSON payload that mentions papers.
pub fn extract_payload(page: &str) -> Option<Value> {
  for capture in DATA_PROPS.captures_iter(page) {
    let raw = unescape_entities(&capture[1]);
    if !raw.contains("papers") && !raw.contains("Papers") {
      continue;
    }
    if let Ok(payload) = serde_json::from_str(&raw) {
      return Some(payload);
    }
  }
  None
}

/// Turns a decoded payload into ranked papers.
pub fn parse_trending(payload: &Value, timeframe: Timeframe, limit: usize) -> Vec<TrendingPaper> {
  let mut list = None;
  for key in timeframe.payload_keys() {
    if let Some(found) = payload.get(key).and_then(Value::as_array).filter(|l| !l.is_empty()) {
      list = Some(found);
      break;
    }
  }
  let Some(list) = list else { return Vec::new() };

  let mut papers = Vec::new();
  for (index, item) in list.iter().enumerate() {
    if papers.len() >= limit {
      break;
    }
    let paper = item.get("paper").unwrap_or(item);
    let pick = |field: &str| {
      paper
        .get(field)
        .and_then(Value::as_str)
        .or_else(|| item.get(field).and_then(Value::as_str))
        .map(String::from)
    };
    let Some(title) = pick("title").filter(|t| !t.is_empty()) else { continue };

    let arxiv_id = pick("id").or_else(|| pick("arxivId")).or_else(|| pick("arxiv_id"));
    let mut url = pick("projectPage").or_else(|| pick("paperUrl"));
    let mut pdf_url = pick("pdfUrl").or_else(|| pick("pdf_url"));
    if let Some(id) = &arxiv_id {
      url = url.or_else(|| Some(format!("https://huggingface.co/papers/paper/{id}")));
      pdf_url = pdf_url.or_else(|| Some(format!("https://arxiv.org/pdf/{id}.pdf")));
    }
    let published = pick("publishedAt");
    let authors = paper
      .get("authors")
      .or_else(|| item.get("authors"))
      .and_then(Value::as_array)
      .map(|list| {
        list
          .iter()
          .filter_map(|entry| match entry {
            Value::Object(_) => entry.get("name").and_then(Value::as_str).map(String::from),
            Value::String(name) => Some(name.clone()),
            _ => None,
          })
          .collect()
      })
      .unwrap_or_default();

    let rank = index + 1;
    papers.push(TrendingPaper {
      title,
      abstract_text: pick("summary").filter(|s| !s.is_empty()),
      url,
      arxiv_id,
      doi: pick("doi"),
      pdf_url,
      authors,
      date: published.as_deref().map(|p| p.chars().take(10).collect()),
      year: published.as_deref().map(|p| p.chars().take(4).collect()),
      timeframe: timeframe.label(),
      rank,
      hf_score: (1.0 - rank as f64 / (limit + 1) as f64).max(0.0),
    });
  }
  papers
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extract_payload_decodes_the_props_attribute() {
    let page = r#"<div data-props="{&quot;theme&quot;:1}"></div>
      <section data-props="{&quot;dailyPapers&quot;:[{&quot;paper&quot;:{&quot;title&quot;:&quot;X&quot;}}]}"></section>"#;
    let payload = extract_payload(page).unwrap();
    assert!(payload.get("dailyPapers").is_some());
  }

  #[test]
  fn parse_trending_ranks_and_scores() {
    let payload = json!({
      "dailyPapers": [
        { "paper": { "title": "First", "id": "2401.00001", "publishedAt": "2024-01-05T00:00:00Z",
                     "authors": [{ "name": "Ada" }, { "name": "Alan" }] } },
        { "paper": { "title": "", "id": "skip-me" } },
        { "title": "Flat entry", "arxiv_id": "2401.00002" }
      ]
    });
    let papers = parse_trending(&payload, Timeframe::Daily, 5);
    assert_eq!(papers.len(), 2);
    assert_eq!(papers[0].title, "First");
    assert_eq!(papers[0].rank, 1);
    assert!((papers[0].hf_score - (1.0 - 1.0 / 6.0)).abs() < 1e-9);
    assert_eq!(papers[0].pdf_url.as_deref(), Some("https://arxiv.org/pdf/2401.00001.pdf"));
    assert_eq!(papers[0].date.as_deref(), Some("2024-01-05"));
    assert_eq!(papers[0].authors, ["Ada", "Alan"]);
    assert_eq!(papers[1].title, "Flat entry");
    assert_eq!(papers[1].arxiv_id.as_deref(), Some("2401.00002"));
  }

  #[test]
  fn weekly_identifier_uses_iso_weeks() {
    let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(Timeframe::Weekly.identifier(now), "2026-W01");
    assert_eq!(Timeframe::Monthly.identifier(now), "2026-01");
  }
}
