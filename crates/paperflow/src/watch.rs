//! Candidate discovery, scoring, and import support.
//!
//! The watch pipeline turns feed entries (arXiv search hits, HuggingFace
//! trending papers) into [`Candidate`]s, scores them against a recency
//! window and citation counts, dedupes them against a [`LibraryIndex`] of
//! the existing library, and builds the payloads for imports and
//! fill-missing patches. Everything here is pure so the pipeline's
//! decisions are unit-testable; the CLI drives the network around it.

use super::*;
use crate::sources::{arxiv::ArxivEntry, hf_papers::TrendingPaper};

/// One tag in the taxonomy file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagSpec {
  /// Human-facing label; falls back to the tag key
  #[serde(default)]
  pub label:           Option<String>,
  /// Keywords used for feed search and trending matches
  #[serde(default)]
  pub sample_keywords: Vec<String>,
}

/// The tag taxonomy, keyed by tag id, in stable order.
pub type TagSchema = BTreeMap<String, TagSpec>;

/// Loads the taxonomy from a JSON file.
pub fn load_tag_schema(path: &Path) -> Result<TagSchema> {
  let text = std::fs::read_to_string(path)
    .map_err(|e| PaperflowError::Config(format!("tag file {}: {e}", path.display())))?;
  serde_json::from_str(&text)
    .map_err(|e| PaperflowError::Config(format!("tag file {}: {e}", path.display())))
}

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
  /// arXiv keyword search
  Arxiv,
  /// HuggingFace Papers trending list
  #[serde(rename = "hf")]
  HuggingFace,
}

/// One fetched paper before it becomes a library record.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
  /// Title as published
  pub title:         String,
  /// Author display names
  pub authors:       Vec<String>,
  /// Publication date `YYYY-MM-DD`
  pub date:          Option<String>,
  /// Publication year
  pub year:          Option<String>,
  /// Canonical page URL
  pub url:           Option<String>,
  /// Direct PDF URL
  pub pdf_url:       Option<String>,
  /// DOI, lowercased
  pub doi:           Option<String>,
  /// arXiv id
  pub arxiv_id:      Option<String>,
  /// Abstract text
  pub abstract_text: Option<String>,
  /// Originating feed
  pub source:        CandidateSource,
  /// Weighted trending score, zero for non-trending candidates
  pub hf_score:      f64,
  /// Citation count from the academic graph
  pub citations:     Option<u64>,
  /// Influential citation count
  pub influential:   Option<u64>,
  /// Final score, set by [`compute_score`]
  pub score:         f64,
}

impl Candidate {
  /// Builds a candidate from an arXiv entry.
  pub fn from_arxiv(entry: ArxivEntry) -> Self {
    Candidate {
      title:         entry.title.clone(),
      authors:       entry.authors.clone(),
      date:          entry.date(),
      year:          entry.year(),
      url:           Some(entry.abs_url()),
      pdf_url:       entry.pdf_url.clone(),
      doi:           entry.doi.as_deref().map(str::to_lowercase),
      arxiv_id:      Some(entry.arxiv_id),
      abstract_text: Some(entry.summary).filter(|s| !s.is_empty()),
      source:        CandidateSource::Arxiv,
      hf_score:      0.0,
      citations:     None,
      influential:   None,
      score:         0.0,
    }
  }

  /// Builds a candidate from a trending paper, with the timeframe weight
  /// already folded into `hf_score`.
  pub fn from_trending(paper: TrendingPaper, timeframe_weight: f64) -> Self {
    let hf_score = (paper.hf_score.clamp(0.0, 1.0) * timeframe_weight).clamp(0.0, 1.0);
    Candidate {
      title: paper.title,
      authors: paper.authors,
      date: paper.date,
      year: paper.year,
      url: paper.url,
      pdf_url: paper.pdf_url,
      doi: paper.doi.as_deref().map(str::to_lowercase),
      arxiv_id: paper.arxiv_id,
      abstract_text: paper.abstract_text,
      source: CandidateSource::HuggingFace,
      hf_score,
      citations: None,
      influential: None,
      score: 0.0,
    }
  }

  /// In-run identity, most reliable identifier first.
  pub fn identity(&self) -> String {
    if let Some(doi) = &self.doi {
      return format!("doi:{}", doi.to_lowercase());
    }
    if let Some(id) = &self.arxiv_id {
      return format!("arxiv:{id}");
    }
    if let Some(url) = self.url.as_deref().and_then(normalize_url) {
      return format!("url:{url}");
    }
    match (&self.year, normalize_title(&self.title)) {
      (Some(year), title) if !title.is_empty() => format!("ty:{title}|{year}"),
      (_, title) => format!("t:{title}"),
    }
  }

  /// Whether any keyword occurs in the title or abstract.
  pub fn matches_keywords(&self, keywords: &[String]) -> bool {
    if keywords.is_empty() {
      return true;
    }
    let haystack =
      format!("{} {}", self.title, self.abstract_text.as_deref().unwrap_or("")).to_lowercase();
    keywords.iter().any(|kw| !kw.is_empty() && haystack.contains(&kw.to_lowercase()))
  }
}

/// Scores a candidate.
///
/// `0.5 * recency + 0.35 * norm(citations, 200) + 0.15 * norm(influential,
/// 50) + hf_score * hf_weight`, capped at 1.0. Recency decays linearly from
/// 1.0 (today) to 0 at the window edge; with no exact date it falls back to
/// Jan 1 of the publication year.
pub fn compute_score(
  now: DateTime<Utc>,
  candidate: &Candidate,
  window_days: f64,
  hf_weight: f64,
) -> f64 {
  let window_days = window_days.max(1.0);
  let reference = candidate
    .date
    .as_deref()
    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    .or_else(|| {
      let year: i32 = candidate.year.as_deref()?.parse().ok()?;
      NaiveDate::from_ymd_opt(year, 1, 1)
    });
  let recency = match reference {
    Some(date) => {
      let days = (now.date_naive() - date).num_days().max(0) as f64;
      (1.0 - days.min(window_days) / window_days).max(0.0)
    },
    None => 0.0,
  };

  let norm = |count: Option<u64>, cap: u64| match count {
    Some(count) => count.min(cap) as f64 / cap as f64,
    None => 0.0,
  };
  let hf_component = candidate.hf_score.clamp(0.0, 1.0) * hf_weight.max(0.0);
  let base = 0.5 * recency
    + 0.35 * norm(candidate.citations, 200)
    + 0.15 * norm(candidate.influential, 50)
    + hf_component;
  base.min(1.0)
}

/// Transient index of the existing library, for dedupe and fill-missing.
///
/// Keyed four ways: DOI, arXiv id (detected in record URLs), normalized
/// URL, and normalized title+year. First record wins on key collisions.
#[derive(Debug, Default)]
pub struct LibraryIndex {
  /// Indexed records
  items:         Vec<Item>,
  /// Lowercased DOI to slot
  by_doi:        HashMap<String, usize>,
  /// arXiv id to slot
  by_arxiv:      HashMap<String, usize>,
  /// Normalized URL to slot
  by_url:        HashMap<String, usize>,
  /// `title|year` to slot
  by_title_year: HashMap<String, usize>,
}

impl LibraryIndex {
  /// Indexes top-level records; notes and attachments are skipped.
  pub fn build(items: impl IntoIterator<Item = Item>) -> Self {
    let mut index = LibraryIndex::default();
    for item in items {
      index.add(item);
    }
    index
  }

  /// Adds one record, for example an item created mid-run.
  pub fn add(&mut self, item: Item) {
    if item.data.is_note() || item.data.is_attachment() {
      return;
    }
    let slot = self.items.len();
    let data = &item.data;
    if let Some(doi) = non_empty(&data.doi) {
      self.by_doi.entry(doi.to_lowercase()).or_insert(slot);
    }
    if let Some(url) = non_empty(&data.url) {
      if let Some(normalized) = normalize_url(url) {
        self.by_url.entry(normalized).or_insert(slot);
      }
      if let Some(arxiv_id) = crate::enrich::extract_arxiv_id(url) {
        self.by_arxiv.entry(arxiv_id).or_insert(slot);
      }
    }
    let title = normalize_title(non_empty(&data.title).unwrap_or(""));
    if let (false, Some(year)) = (title.is_empty(), data.year()) {
      self.by_title_year.entry(format!("{title}|{year}")).or_insert(slot);
    }
    self.items.push(item);
  }

  /// Finds the record a candidate duplicates, checking identifiers in
  /// order of reliability.
  pub fn find(&self, candidate: &Candidate) -> Option<&Item> {
    let slot = candidate
      .doi
      .as_deref()
      .and_then(|doi| self.by_doi.get(&doi.to_lowercase()))
      .or_else(|| candidate.arxiv_id.as_deref().and_then(|id| self.by_arxiv.get(id)))
      .or_else(|| {
        candidate.url.as_deref().and_then(normalize_url).and_then(|u| self.by_url.get(&u))
      })
      .or_else(|| {
        let year = candidate.year.as_deref()?;
        let title = normalize_title(&candidate.title);
        if title.is_empty() {
          return None;
        }
        self.by_title_year.get(&format!("{title}|{year}"))
      })?;
    self.items.get(*slot)
  }

  /// Index sizes: DOI, arXiv, URL, title+year.
  pub fn sizes(&self) -> (usize, usize, usize, usize) {
    (self.by_doi.len(), self.by_arxiv.len(), self.by_url.len(), self.by_title_year.len())
  }
}

/// Builds the payload for importing a candidate as a new record.
pub fn new_record(candidate: &Candidate, label: &str, collection: Option<&str>) -> ItemData {
  ItemData {
    item_type: "journalArticle".into(),
    title: Some(candidate.title.clone()),
    creators: candidate.authors.iter().map(|a| Creator::author(a)).collect(),
    abstract_note: candidate.abstract_text.clone(),
    url: candidate.url.clone(),
    doi: candidate.doi.clone(),
    date: candidate.date.clone().or_else(|| candidate.year.clone()),
    tags: vec![Tag::new(label)],
    collections: collection.map(|c| vec![c.to_string()]).unwrap_or_default(),
    ..Default::default()
  }
}

/// Builds a fill-missing patch for an existing record.
///
/// Only absent fields are filled; returns `None` when nothing would change.
/// The second element names the filled fields for logging.
pub fn fill_missing_updates(
  data: &ItemData,
  candidate: &Candidate,
  label: &str,
  collection: Option<&str>,
) -> Option<(ItemData, Vec<&'static str>)> {
  let mut updated = data.clone();
  let mut filled = Vec::new();

  if non_empty(&data.abstract_note).is_none() && candidate.abstract_text.is_some() {
    updated.abstract_note = candidate.abstract_text.clone();
    filled.push("abstract");
  }
  if non_empty(&data.doi).is_none() && candidate.doi.is_some() {
    updated.doi = candidate.doi.clone();
    filled.push("doi");
  }
  if non_empty(&data.url).is_none() && candidate.url.is_some() {
    updated.url = candidate.url.clone();
    filled.push("url");
  }
  if data.year().is_none() {
    if let Some(date) = candidate.date.clone().or_else(|| candidate.year.clone()) {
      updated.date = Some(date);
      filled.push("date");
    }
  }
  if let Some(collection) = collection {
    if !updated.collections.iter().any(|c| c == collection) {
      updated.collections.push(collection.to_string());
      filled.push("collection");
    }
  }
  if !label.is_empty() && !updated.has_tag(label) {
    updated.tags.push(Tag::new(label));
    filled.push("tag");
  }

  (!filled.is_empty()).then_some((updated, filled))
}

/// Per-tag counters in the run report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TagCounters {
  /// Human-facing tag label
  pub label:         String,
  /// Candidates fetched and scored
  pub candidates:    usize,
  /// Records created
  pub added:         usize,
  /// Candidates skipped as duplicates
  pub skipped:       usize,
  /// Existing records patched by fill-missing
  pub updated:       usize,
  /// Trending candidates matched to this tag
  pub hf_candidates: usize,
  /// Trending papers force-included below the threshold
  pub hf_overrides:  usize,
}

/// One recoverable error recorded in the report.
#[derive(Debug, Clone, Serialize)]
pub struct WatchError {
  /// What was being processed
  pub context: String,
  /// The failure text
  pub error:   String,
}

/// JSON run report written at the end of a watch run.
#[derive(Debug, Default, Serialize)]
pub struct WatchReport {
  /// Run start, RFC 3339
  pub started_at:  String,
  /// Effective parameters
  pub params:      Value,
  /// Per-tag counters
  pub tags:        BTreeMap<String, TagCounters>,
  /// Run-wide counters
  pub summary:     TagCounters,
  /// Recoverable errors
  pub errors:      Vec<WatchError>,
  /// Trending papers fetched per timeframe
  pub hf_sources:  BTreeMap<String, usize>,
  /// Run end, RFC 3339
  pub finished_at: Option<String>,
}

/// One record created during the run, persisted for downstream stages.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedItem {
  /// New record key
  pub key:            String,
  /// Record title
  pub title:          String,
  /// Tag label it was imported under
  pub tag:            String,
  /// Collection it was filed into
  pub collection_key: Option<String>,
  /// Creation time, RFC 3339
  pub created_at:     String,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn candidate(title: &str) -> Candidate {
    Candidate {
      title:         title.into(),
      authors:       vec![],
      date:          None,
      year:          None,
      url:           None,
      pdf_url:       None,
      doi:           None,
      arxiv_id:      None,
      abstract_text: None,
      source:        CandidateSource::Arxiv,
      hf_score:      0.0,
      citations:     None,
      influential:   None,
      score:         0.0,
    }
  }

  #[test]
  fn same_day_recency_alone_scores_half() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let mut cand = candidate("fresh");
    cand.date = Some("2024-06-01".into());
    let score = compute_score(now, &cand, 1.0, 0.3);
    assert!((score - 0.5).abs() < 1e-9);
  }

  #[test]
  fn trending_weight_adds_on_top_of_recency() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let mut cand = candidate("hot");
    cand.date = Some("2024-06-01".into());
    cand.hf_score = 1.0;
    let score = compute_score(now, &cand, 1.0, 0.3);
    assert!((score - 0.8).abs() < 1e-9);
  }

  #[test]
  fn score_is_capped_at_one() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let mut cand = candidate("max");
    cand.date = Some("2024-06-01".into());
    cand.hf_score = 1.0;
    cand.citations = Some(1000);
    cand.influential = Some(100);
    assert_eq!(compute_score(now, &cand, 1.0, 1.0), 1.0);
  }

  #[test]
  fn recency_falls_back_to_january_first_of_the_year() {
    let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut cand = candidate("dated by year");
    cand.year = Some("2024".into());
    assert!((compute_score(now, &cand, 1.0, 0.0) - 0.5).abs() < 1e-9);

    let old = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
    assert!(compute_score(old, &cand, 7.0, 0.0) < 1e-9);
  }

  #[test]
  fn identity_prefers_doi_then_arxiv_then_url() {
    let mut cand = candidate("Some Title");
    cand.year = Some("2024".into());
    assert_eq!(cand.identity(), "ty:some title|2024");

    cand.url = Some("https://example.com/p/".into());
    assert_eq!(cand.identity(), "url:https://example.com/p");

    cand.arxiv_id = Some("2401.00001".into());
    assert_eq!(cand.identity(), "arxiv:2401.00001");

    cand.doi = Some("10.1/ABC".into());
    assert_eq!(cand.identity(), "doi:10.1/abc");
  }

  #[test]
  fn library_index_finds_duplicates_by_each_key() {
    let record = |key: &str, data: ItemData| Item { key: key.into(), version: 1, data };
    let index = LibraryIndex::build(vec![
      record("DOI00001", ItemData {
        item_type: "journalArticle".into(),
        doi: Some("10.1/X".into()),
        ..Default::default()
      }),
      record("ARXV0001", ItemData {
        item_type: "journalArticle".into(),
        url: Some("https://arxiv.org/abs/2401.00001".into()),
        ..Default::default()
      }),
      record("TITL0001", ItemData {
        item_type: "journalArticle".into(),
        title: Some("A Known  Paper".into()),
        date: Some("2023-02-03".into()),
        ..Default::default()
      }),
    ]);

    let mut by_doi = candidate("x");
    by_doi.doi = Some("10.1/x".into());
    assert_eq!(index.find(&by_doi).unwrap().key, "DOI00001");

    let mut by_arxiv = candidate("y");
    by_arxiv.arxiv_id = Some("2401.00001".into());
    assert_eq!(index.find(&by_arxiv).unwrap().key, "ARXV0001");

    let mut by_url = candidate("z");
    by_url.url = Some("https://arxiv.org/abs/2401.00001?context=cs".into());
    assert_eq!(index.find(&by_url).unwrap().key, "ARXV0001");

    let mut by_title = candidate("a known paper!");
    by_title.year = Some("2023".into());
    assert_eq!(index.find(&by_title).unwrap().key, "TITL0001");

    assert!(index.find(&candidate("unseen")).is_none());
  }

  #[test]
  fn fill_missing_only_touches_absent_fields() {
    let existing = ItemData {
      item_type: "journalArticle".into(),
      title: Some("Kept".into()),
      abstract_note: Some("already here".into()),
      tags: vec![Tag::new("ml")],
      ..Default::default()
    };
    let mut cand = candidate("Kept");
    cand.abstract_text = Some("new abstract".into());
    cand.doi = Some("10.1/x".into());
    cand.url = Some("https://example.com".into());
    cand.year = Some("2024".into());

    let (updated, filled) = fill_missing_updates(&existing, &cand, "nlp", Some("COLL1")).unwrap();
    assert_eq!(filled, ["doi", "url", "date", "collection", "tag"]);
    assert_eq!(updated.abstract_note.as_deref(), Some("already here"));
    assert_eq!(updated.doi.as_deref(), Some("10.1/x"));
    assert!(updated.has_tag("nlp") && updated.has_tag("ml"));

    // A second pass over the patched payload is a no-op.
    assert!(fill_missing_updates(&updated, &cand, "nlp", Some("COLL1")).is_none());
  }

  #[test]
  fn tag_schema_loads_from_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tag.json");
    std::fs::write(
      &path,
      r#"{ "llm": { "label": "Large Language Models", "sample_keywords": ["llm", "transformer"] } }"#,
    )
    .unwrap();
    let schema = load_tag_schema(&path).unwrap();
    assert_eq!(schema["llm"].label.as_deref(), Some("Large Language Models"));
    assert_eq!(schema["llm"].sample_keywords.len(), 2);

    assert!(matches!(
      load_tag_schema(&dir.path().join("missing.json")),
      Err(PaperflowError::Config(_))
    ));
  }
}
