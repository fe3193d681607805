//! Metadata enrichment for sparse records.
//!
//! Items imported from a URL or a bare PDF often arrive with little more
//! than a title. Enrichment detects identifiers (a DOI in the item fields
//! or URL, an arXiv id in the URL, a DOI printed on the first PDF page),
//! resolves them against arXiv, Crossref, and Semantic Scholar, and builds
//! a fill-only-absent update for the record.
//!
//! All lookups accumulate into a [`MetadataPatch`] with first-wins
//! semantics: a field set by an earlier source is never overwritten by a
//! later one. The patch never touches a field the record already has a
//! value for; that is [`build_updates`]'s contract.

use crate::{
  pdf::DocumentSketch,
  sources::{
    arxiv::{self, ArxivEntry},
    crossref::{self, WorkMetadata},
    semantic_scholar::{self, CitationRecord, Lookup, PaperId},
    SOURCE_USER_AGENT,
  },
  zotero::ZoteroClient,
};

use super::*;

lazy_static! {
  /// A DOI anywhere in free text, case-insensitive.
  static ref DOI: Regex = Regex::new(r#"(?i)10\.\d{4,9}/[^\s"'>]+"#).unwrap();
  /// arXiv id embedded in an abs/pdf URL.
  static ref ARXIV_URL: Regex =
    Regex::new(r"(?i)arxiv\.org/(?:abs|pdf)/([A-Za-z0-9.\-]+)").unwrap();
  /// A plausible publication year in page text.
  static ref YEAR_IN_TEXT: Regex = Regex::new(r"\b(19|20)\d{2}\b").unwrap();
}

/// Strips resolver prefixes (`https://doi.org/`, `doi:`) off a raw DOI.
pub fn clean_doi(raw: &str) -> Option<String> {
  let mut doi = raw.trim();
  for prefix in ["https://doi.org/", "http://doi.org/", "doi:"] {
    if let Some(rest) = doi.strip_prefix(prefix) {
      doi = rest.trim();
    }
  }
  (!doi.is_empty()).then(|| doi.to_string())
}

/// First DOI found in a URL or free text, with trailing punctuation trimmed.
pub fn extract_doi_from_url(text: &str) -> Option<String> {
  let found = DOI.find(text)?;
  clean_doi(found.as_str().trim_end_matches([')', '.', ',', ';']))
}

/// arXiv id embedded in an abs or pdf URL.
pub fn extract_arxiv_id(url: &str) -> Option<String> {
  ARXIV_URL.captures(url).map(|m| m[1].to_string())
}

/// Metadata accumulated from enrichment sources, first source wins.
#[derive(Debug, Clone, Default)]
pub struct MetadataPatch {
  /// Record title
  pub title:         Option<String>,
  /// Abstract text
  pub abstract_text: Option<String>,
  /// Author display names
  pub authors:       Vec<String>,
  /// Publication date `YYYY-MM-DD`
  pub date:          Option<String>,
  /// Publication year, used when no full date is known
  pub year:          Option<String>,
  /// Canonical landing page URL
  pub url:           Option<String>,
  /// Digital Object Identifier
  pub doi:           Option<String>,
  /// Container (journal or proceedings) title
  pub container:     Option<String>,
  /// Publisher-side work type, e.g. `journal-article`
  pub kind:          Option<String>,
  /// Publisher name
  pub publisher:     Option<String>,
  /// Volume within the container
  pub volume:        Option<String>,
  /// Issue within the volume
  pub issue:         Option<String>,
  /// Page range
  pub pages:         Option<String>,
  /// Free-form extra line, currently a citation count
  pub extra:         Option<String>,
}

/// Sets `slot` when it is still empty and `value` is non-blank.
fn fill(slot: &mut Option<String>, value: Option<&str>) {
  if slot.as_deref().map_or(true, |s| s.trim().is_empty()) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
      *slot = Some(value.to_string());
    }
  }
}

impl MetadataPatch {
  /// Folds in an arXiv entry.
  pub fn absorb_arxiv(&mut self, entry: &ArxivEntry) {
    fill(&mut self.title, Some(&entry.title));
    fill(&mut self.abstract_text, Some(&entry.summary));
    fill(&mut self.date, entry.date().as_deref());
    fill(&mut self.year, entry.year().as_deref());
    fill(&mut self.url, Some(&entry.abs_url()));
    fill(&mut self.doi, entry.doi.as_deref().and_then(|d| clean_doi(d)).as_deref());
    if self.authors.is_empty() && !entry.authors.is_empty() {
      self.authors = entry.authors.clone();
    }
  }

  /// Folds in a Crossref work resolved from `doi`.
  pub fn absorb_work(&mut self, work: &WorkMetadata, doi: &str) {
    fill(&mut self.title, work.title.as_deref());
    fill(&mut self.abstract_text, work.abstract_text.as_deref());
    fill(&mut self.year, work.year.as_deref());
    fill(&mut self.doi, Some(doi));
    fill(&mut self.container, work.container.as_deref());
    fill(&mut self.kind, work.kind.as_deref());
    fill(&mut self.publisher, work.publisher.as_deref());
    fill(&mut self.volume, work.volume.as_deref());
    fill(&mut self.issue, work.issue.as_deref());
    fill(&mut self.pages, work.pages.as_deref());
    if self.authors.is_empty() && !work.authors.is_empty() {
      self.authors = work.authors.clone();
    }
  }

  /// Folds in a Semantic Scholar citation record.
  pub fn absorb_citations(&mut self, record: &CitationRecord) {
    fill(&mut self.title, record.title.as_deref());
    fill(&mut self.abstract_text, record.clean_abstract().as_deref());
    fill(&mut self.year, record.year.map(|y| y.to_string()).as_deref());
    fill(&mut self.doi, record.external_ids.doi.as_deref());
    if let Some(count) = record.citation_count {
      fill(&mut self.extra, Some(&format!("Citations: {count}")));
    }
  }

  /// Folds in what a PDF exposes: document-info fields plus first-page
  /// heuristics (a printed DOI, the first plausible title line above the
  /// abstract, a year).
  pub fn absorb_document(&mut self, sketch: &DocumentSketch) {
    fill(&mut self.title, sketch.title.as_deref());
    if self.authors.is_empty() {
      if let Some(author) = &sketch.author {
        self.authors = vec![author.clone()];
      }
    }
    let text = &sketch.first_page;
    if text.is_empty() {
      return;
    }
    fill(&mut self.doi, extract_doi_from_url(text).as_deref());
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
      if line.to_lowercase().contains("abstract") {
        break;
      }
      let length = line.chars().count();
      if length > 10 && length <= 200 && line.split_whitespace().count() >= 4 {
        fill(&mut self.title, Some(line));
        break;
      }
    }
    fill(&mut self.year, YEAR_IN_TEXT.find(text).map(|m| m.as_str()));
  }
}

/// Zotero item type suggested by the patch, or `None` to leave the current
/// type alone. Only weakly-typed items (webpage, document, report, or no
/// type at all) are retyped.
pub fn map_item_type(patch: &MetadataPatch, current: &str) -> Option<&'static str> {
  if !current.is_empty() && !matches!(current, "webpage" | "document" | "report") {
    return None;
  }
  if let Some(kind) = patch.kind.as_deref() {
    match kind.to_lowercase().as_str() {
      "journal-article" | "article" | "review-article" => return Some("journalArticle"),
      "proceedings-article" | "conference-paper" | "conference" => return Some("conferencePaper"),
      "book-chapter" | "book-section" => return Some("bookSection"),
      "book" => return Some("book"),
      "dataset" => return Some("dataset"),
      "report" => return Some("report"),
      _ => (),
    }
  }
  patch.container.is_some().then_some("journalArticle")
}

/// Whether a record is sparse enough to be worth enriching.
pub fn needs_enrichment(data: &ItemData) -> bool {
  if data.is_note() || data.is_attachment() {
    return false;
  }
  if non_empty(&data.title).is_none() {
    return true;
  }
  if non_empty(&data.date).is_none() && data.year().is_none() {
    return true;
  }
  if non_empty(&data.doi).is_none() {
    return true;
  }
  if non_empty(&data.abstract_note).is_none() {
    return true;
  }
  if data.creators.is_empty() {
    return true;
  }
  let weakly_typed =
    data.item_type.is_empty() || matches!(data.item_type.as_str(), "webpage" | "document");
  weakly_typed && non_empty(&data.publication_title).is_none()
}

/// Applies a patch to a record, filling only absent fields.
///
/// Returns the updated payload and the names of the fields that were
/// filled, or `None` when the patch adds nothing. Publication fields
/// (journal, volume, proceedings) are only filled when the patch also
/// retypes the item, so a hand-curated record keeps its shape.
pub fn build_updates(
  data: &ItemData,
  patch: &MetadataPatch,
) -> Option<(ItemData, Vec<&'static str>)> {
  /// Fills one absent field and records its API name.
  fn set(
    filled: &mut Vec<&'static str>,
    slot: &mut Option<String>,
    value: Option<&str>,
    field: &'static str,
  ) {
    if slot.as_deref().map_or(true, |s| s.trim().is_empty()) {
      if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        *slot = Some(value.to_string());
        filled.push(field);
      }
    }
  }

  let mut updated = data.clone();
  let mut filled: Vec<&'static str> = Vec::new();

  set(&mut filled, &mut updated.title, patch.title.as_deref(), "title");
  set(
    &mut filled,
    &mut updated.date,
    patch.date.as_deref().or(patch.year.as_deref()),
    "date",
  );
  set(&mut filled, &mut updated.doi, patch.doi.as_deref(), "DOI");
  set(&mut filled, &mut updated.url, patch.url.as_deref(), "url");
  set(&mut filled, &mut updated.abstract_note, patch.abstract_text.as_deref(), "abstractNote");
  set(&mut filled, &mut updated.extra, patch.extra.as_deref(), "extra");

  let item_type = map_item_type(patch, &data.item_type);
  if let Some(item_type) = item_type {
    if updated.item_type != item_type {
      updated.item_type = item_type.to_string();
      filled.push("itemType");
    }
  }
  match item_type {
    Some("journalArticle") => {
      set(
        &mut filled,
        &mut updated.publication_title,
        patch.container.as_deref(),
        "publicationTitle",
      );
      set(&mut filled, &mut updated.volume, patch.volume.as_deref(), "volume");
      set(&mut filled, &mut updated.issue, patch.issue.as_deref(), "issue");
      set(&mut filled, &mut updated.pages, patch.pages.as_deref(), "pages");
      set(&mut filled, &mut updated.publisher, patch.publisher.as_deref(), "publisher");
    },
    Some("conferencePaper") => {
      set(&mut filled, &mut updated.conference_name, patch.container.as_deref(), "conferenceName");
      set(
        &mut filled,
        &mut updated.proceedings_title,
        patch.container.as_deref(),
        "proceedingsTitle",
      );
      set(&mut filled, &mut updated.publisher, patch.publisher.as_deref(), "publisher");
      set(&mut filled, &mut updated.pages, patch.pages.as_deref(), "pages");
    },
    _ => (),
  }

  if data.creators.is_empty() && !patch.authors.is_empty() {
    updated.creators = patch.authors.iter().map(|name| Creator::author(name)).collect();
    filled.push("creators");
  }

  (!filled.is_empty()).then_some((updated, filled))
}

/// Where a PDF for an item can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfSource {
  /// A direct URL, from the item itself or a linked-URL attachment
  Remote(String),
  /// A stored attachment, downloaded through the library API
  Stored(String),
}

/// PDFs reachable from an item: its own URL when it ends in `.pdf`, plus
/// every `application/pdf` child attachment.
pub fn collect_pdf_sources(data: &ItemData, children: &[Item]) -> Vec<PdfSource> {
  let mut sources = Vec::new();
  if let Some(url) = non_empty(&data.url) {
    if url.to_lowercase().ends_with(".pdf") {
      sources.push(PdfSource::Remote(url.to_string()));
    }
  }
  for child in children {
    if !child.data.is_attachment() || child.data.content_type.as_deref() != Some("application/pdf")
    {
      continue;
    }
    match (child.data.link_mode, non_empty(&child.data.url)) {
      (Some(LinkMode::LinkedUrl), Some(url)) => sources.push(PdfSource::Remote(url.to_string())),
      _ => sources.push(PdfSource::Stored(child.key.clone())),
    }
  }
  sources
}

/// Downloads a PDF from a bare URL, skipping anything over `max_bytes`.
async fn fetch_remote_pdf(url: &str, max_bytes: usize) -> Result<Option<Vec<u8>>> {
  let client = reqwest::Client::builder().user_agent(SOURCE_USER_AGENT).build()?;
  let response = client.get(url).send().await?;
  let mut response = crate::zotero::ensure_ok("pdf", response).await?;
  let mut bytes = Vec::new();
  while let Some(chunk) = response.chunk().await? {
    if bytes.len() + chunk.len() > max_bytes {
      debug!(url, max_bytes, "pdf exceeds size cap, skipping");
      return Ok(None);
    }
    bytes.extend_from_slice(&chunk);
  }
  Ok(Some(bytes))
}

/// Resolves everything known about one item into a patch.
///
/// Identifier detection runs first (record DOI, DOI in the URL, arXiv id in
/// the URL), then each DOI goes through Crossref and Semantic Scholar. With
/// `use_pdf` set, reachable PDFs contribute document-info and first-page
/// heuristics; a DOI printed on the first page triggers a second resolver
/// round. Individual source failures are logged and skipped so one flaky
/// service cannot sink the whole item.
pub async fn collect_metadata(
  client: &ZoteroClient,
  item: &Item,
  children: &[Item],
  use_pdf: bool,
  max_pdf_bytes: usize,
) -> Result<(MetadataPatch, Vec<&'static str>)> {
  let data = &item.data;
  let mut patch = MetadataPatch::default();
  let mut sources: Vec<&'static str> = Vec::new();

  let mut doi_candidates: Vec<String> = Vec::new();
  let push_doi = |candidates: &mut Vec<String>, doi: Option<String>| {
    if let Some(doi) = doi {
      if !candidates.contains(&doi) {
        candidates.push(doi);
      }
    }
  };
  push_doi(&mut doi_candidates, non_empty(&data.doi).and_then(clean_doi));
  push_doi(&mut doi_candidates, non_empty(&data.url).and_then(extract_doi_from_url));

  if let Some(arxiv_id) = non_empty(&data.url).and_then(extract_arxiv_id) {
    match arxiv::fetch_by_id(&arxiv_id).await {
      Ok(Some(entry)) => {
        push_doi(&mut doi_candidates, entry.doi.as_deref().and_then(clean_doi));
        patch.absorb_arxiv(&entry);
        sources.push("arxiv");
      },
      Ok(None) => debug!(key = %item.key, %arxiv_id, "arxiv id resolved to nothing"),
      Err(e) => warn!(key = %item.key, %arxiv_id, error = %e, "arxiv lookup failed"),
    }
  }

  let mut resolved = 0;
  while resolved < doi_candidates.len() {
    let doi = doi_candidates[resolved].clone();
    resolved += 1;
    resolve_doi(&doi, &mut patch, &mut sources).await;
  }

  if use_pdf {
    for source in collect_pdf_sources(data, children) {
      let bytes = match &source {
        PdfSource::Remote(url) => match fetch_remote_pdf(url, max_pdf_bytes).await {
          Ok(Some(bytes)) => bytes,
          Ok(None) => continue,
          Err(e) => {
            warn!(key = %item.key, %url, error = %e, "pdf download failed");
            continue;
          },
        },
        PdfSource::Stored(key) => match client.fetch_file_bytes(key, max_pdf_bytes).await {
          Ok(bytes) => bytes,
          Err(e) => {
            warn!(key = %item.key, attachment = %key, error = %e, "attachment download failed");
            continue;
          },
        },
      };
      let sketch = match crate::pdf::sketch(&bytes) {
        Ok(sketch) => sketch,
        Err(e) => {
          debug!(key = %item.key, error = %e, "unreadable pdf, skipping");
          continue;
        },
      };
      patch.absorb_document(&sketch);
      sources.push("pdf");
      // A DOI printed on the first page unlocks the resolvers again.
      if let Some(doi) = patch.doi.clone() {
        if !doi_candidates.contains(&doi) {
          doi_candidates.push(doi.clone());
          resolve_doi(&doi, &mut patch, &mut sources).await;
        }
      }
    }
  }

  Ok((patch, sources))
}

/// Runs one DOI through Crossref and Semantic Scholar.
async fn resolve_doi(doi: &str, patch: &mut MetadataPatch, sources: &mut Vec<&'static str>) {
  match crossref::fetch_work(doi).await {
    Ok(Some(work)) => {
      patch.absorb_work(&work, doi);
      sources.push("crossref");
    },
    Ok(None) => (),
    Err(e) => warn!(doi, error = %e, "crossref lookup failed"),
  }
  match semantic_scholar::fetch(PaperId::Doi(doi)).await {
    Ok(Lookup::Found(record)) => {
      patch.absorb_citations(&record);
      sources.push("semantic-scholar");
    },
    Ok(Lookup::RateLimited) => debug!(doi, "semantic scholar rate limited, skipping"),
    Ok(Lookup::Absent) => (),
    Err(e) => warn!(doi, error = %e, "semantic scholar lookup failed"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clean_doi_strips_resolver_prefixes() {
    assert_eq!(clean_doi("https://doi.org/10.1000/xyz").as_deref(), Some("10.1000/xyz"));
    assert_eq!(clean_doi("doi: 10.1000/xyz ").as_deref(), Some("10.1000/xyz"));
    assert_eq!(clean_doi("  "), None);
  }

  #[test]
  fn extract_doi_trims_trailing_punctuation() {
    assert_eq!(
      extract_doi_from_url("see https://doi.org/10.1145/3297280.3297641).").as_deref(),
      Some("10.1145/3297280.3297641")
    );
    assert_eq!(
      extract_doi_from_url("DOI 10.1038/S41586-021-03819-2;").as_deref(),
      Some("10.1038/S41586-021-03819-2")
    );
    assert_eq!(extract_doi_from_url("no identifier here"), None);
  }

  #[test]
  fn extract_arxiv_id_reads_abs_and_pdf_urls() {
    assert_eq!(
      extract_arxiv_id("https://arxiv.org/abs/2301.07041v2").as_deref(),
      Some("2301.07041v2")
    );
    assert_eq!(
      extract_arxiv_id("https://ARXIV.org/pdf/1706.03762.pdf").as_deref(),
      Some("1706.03762.pdf")
    );
    assert_eq!(extract_arxiv_id("https://example.com/paper"), None);
  }

  #[test]
  fn patch_keeps_the_first_value_per_field() {
    let mut patch = MetadataPatch::default();
    let first = WorkMetadata { title: Some("First".into()), ..Default::default() };
    let second = WorkMetadata {
      title: Some("Second".into()),
      year: Some("2020".into()),
      ..Default::default()
    };
    patch.absorb_work(&first, "10.1/a");
    patch.absorb_work(&second, "10.1/b");
    assert_eq!(patch.title.as_deref(), Some("First"));
    assert_eq!(patch.doi.as_deref(), Some("10.1/a"));
    assert_eq!(patch.year.as_deref(), Some("2020"));
  }

  #[test]
  fn map_item_type_respects_existing_strong_types() {
    let patch =
      MetadataPatch { kind: Some("journal-article".into()), ..Default::default() };
    assert_eq!(map_item_type(&patch, "webpage"), Some("journalArticle"));
    assert_eq!(map_item_type(&patch, ""), Some("journalArticle"));
    assert_eq!(map_item_type(&patch, "journalArticle"), None);
    assert_eq!(map_item_type(&patch, "conferencePaper"), None);

    let conf = MetadataPatch { kind: Some("proceedings-article".into()), ..Default::default() };
    assert_eq!(map_item_type(&conf, "document"), Some("conferencePaper"));

    let container_only =
      MetadataPatch { container: Some("Journal of Things".into()), ..Default::default() };
    assert_eq!(map_item_type(&container_only, "webpage"), Some("journalArticle"));
    assert_eq!(map_item_type(&MetadataPatch::default(), "webpage"), None);
  }

  #[test]
  fn needs_enrichment_flags_sparse_records() {
    let complete = ItemData {
      item_type: "journalArticle".into(),
      title: Some("A Paper".into()),
      date: Some("2021-03-01".into()),
      doi: Some("10.1/x".into()),
      abstract_note: Some("Text".into()),
      creators: vec![Creator::author("Ada Lovelace")],
      ..Default::default()
    };
    assert!(!needs_enrichment(&complete));

    let mut sparse = complete.clone();
    sparse.abstract_note = None;
    assert!(needs_enrichment(&sparse));

    let webpage = ItemData { item_type: "webpage".into(), ..complete.clone() };
    assert!(needs_enrichment(&webpage));

    let note = ItemData { item_type: "note".into(), ..Default::default() };
    assert!(!needs_enrichment(&note));
  }

  #[test]
  fn build_updates_fills_only_absent_fields() {
    let data = ItemData {
      item_type: "webpage".into(),
      title: Some("Kept Title".into()),
      ..Default::default()
    };
    let patch = MetadataPatch {
      title: Some("Ignored".into()),
      abstract_text: Some("An abstract.".into()),
      doi: Some("10.1/x".into()),
      year: Some("2019".into()),
      kind: Some("journal-article".into()),
      container: Some("Journal of Things".into()),
      volume: Some("12".into()),
      authors: vec!["Ada Lovelace".into()],
      ..Default::default()
    };
    let (updated, filled) = build_updates(&data, &patch).unwrap();
    assert_eq!(updated.title.as_deref(), Some("Kept Title"));
    assert_eq!(updated.date.as_deref(), Some("2019"));
    assert_eq!(updated.doi.as_deref(), Some("10.1/x"));
    assert_eq!(updated.item_type, "journalArticle");
    assert_eq!(updated.publication_title.as_deref(), Some("Journal of Things"));
    assert_eq!(updated.volume.as_deref(), Some("12"));
    assert_eq!(updated.creators[0].last_name.as_deref(), Some("Lovelace"));
    assert!(filled.contains(&"DOI") && filled.contains(&"itemType"));
    assert!(!filled.contains(&"title"));
  }

  #[test]
  fn build_updates_retypes_and_fills_conference_fields_together() {
    let data = ItemData { item_type: "report".into(), ..Default::default() };
    let patch = MetadataPatch {
      title: Some("A Paper".into()),
      kind: Some("proceedings-article".into()),
      container: Some("NeurIPS 2023".into()),
      pages: Some("1-12".into()),
      ..Default::default()
    };
    let (updated, filled) = build_updates(&data, &patch).unwrap();
    assert_eq!(updated.item_type, "conferencePaper");
    assert_eq!(updated.conference_name.as_deref(), Some("NeurIPS 2023"));
    assert_eq!(updated.proceedings_title.as_deref(), Some("NeurIPS 2023"));
    assert_eq!(filled, ["title", "itemType", "conferenceName", "proceedingsTitle", "pages"]);
  }

  #[test]
  fn build_updates_returns_none_when_nothing_fills() {
    let data = ItemData {
      item_type: "journalArticle".into(),
      title: Some("A Paper".into()),
      ..Default::default()
    };
    let patch = MetadataPatch { title: Some("Other".into()), ..Default::default() };
    assert!(build_updates(&data, &patch).is_none());
  }

  #[test]
  fn collect_pdf_sources_picks_urls_and_stored_attachments() {
    let data = ItemData { url: Some("https://x.org/paper.PDF".into()), ..Default::default() };
    let linked = Item {
      key:     "CHILD111".into(),
      version: 1,
      data:    ItemData {
        item_type: "attachment".into(),
        content_type: Some("application/pdf".into()),
        link_mode: Some(LinkMode::LinkedUrl),
        url: Some("https://arxiv.org/pdf/1.pdf".into()),
        ..Default::default()
      },
    };
    let stored = Item {
      key:     "CHILD222".into(),
      version: 1,
      data:    ItemData {
        item_type: "attachment".into(),
        content_type: Some("application/pdf".into()),
        link_mode: Some(LinkMode::ImportedFile),
        ..Default::default()
      },
    };
    let note = Item {
      key:     "CHILD333".into(),
      version: 1,
      data:    ItemData { item_type: "note".into(), ..Default::default() },
    };
    let sources = collect_pdf_sources(&data, &[linked, stored, note]);
    assert_eq!(sources, vec![
      PdfSource::Remote("https://x.org/paper.PDF".into()),
      PdfSource::Remote("https://arxiv.org/pdf/1.pdf".into()),
      PdfSource::Stored("CHILD222".into()),
    ]);
  }

  #[test]
  fn absorb_document_applies_first_page_heuristics() {
    let sketch = DocumentSketch {
      title:      None,
      author:     Some("Ada Lovelace".into()),
      first_page: "v3\nDeep Residual Learning for Image Recognition\n\
                   Abstract\ndoi.org/10.1109/CVPR.2016.90\nPublished 2016."
        .into(),
    };
    let mut patch = MetadataPatch::default();
    patch.absorb_document(&sketch);
    assert_eq!(patch.title.as_deref(), Some("Deep Residual Learning for Image Recognition"));
    assert_eq!(patch.authors, ["Ada Lovelace"]);
    assert_eq!(patch.doi.as_deref(), Some("10.1109/CVPR.2016.90"));
    assert_eq!(patch.year.as_deref(), Some("2016"));
  }
}
