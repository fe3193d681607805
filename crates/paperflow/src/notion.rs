//! Notion database export.
//!
//! Pushes records into a Notion database, adapting to whatever schema the
//! database actually has: the property mapping is built by inspecting the
//! database definition, so a workspace with `作者` instead of `Authors`
//! still syncs. Pages are deduplicated by a `Zotero Key` rich-text
//! property when the database has one, falling back to title equality.

use crate::{sources::strip_tags, watch::TagSchema};

use super::*;

/// Notion REST endpoint; `NOTION_API_BASE` overrides it in tests.
const DEFAULT_API_BASE: &str = "https://api.notion.com/v1";
/// Pinned API revision.
const NOTION_VERSION: &str = "2022-06-28";

/// Credentials and target database.
#[derive(Debug, Clone)]
pub struct NotionConfig {
  /// Integration token
  pub api_key:     String,
  /// Database receiving the pages
  pub database_id: String,
}

impl NotionConfig {
  /// Reads `NOTION_API_KEY` and `NOTION_DATABASE_ID`.
  pub fn from_env() -> Result<Self> {
    Ok(NotionConfig {
      api_key:     require_env("NOTION_API_KEY")?,
      database_id: require_env("NOTION_DATABASE_ID")?,
    })
  }
}

/// Minimal Notion client: database introspection, queries, page upserts.
pub struct NotionClient {
  /// Shared HTTP client with auth headers attached
  http:        reqwest::Client,
  /// Target database id
  database_id: String,
  /// Endpoint base
  base:        String,
}

impl NotionClient {
  /// Builds a client from a resolved configuration.
  pub fn new(config: NotionConfig) -> Result<Self> {
    use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
    let mut headers = HeaderMap::new();
    let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
      .map_err(|_| PaperflowError::Config("NOTION_API_KEY contains invalid characters".into()))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);
    headers.insert("Notion-Version", HeaderValue::from_static(NOTION_VERSION));
    let http = reqwest::Client::builder()
      .user_agent(concat!("paperflow/", env!("CARGO_PKG_VERSION")))
      .default_headers(headers)
      .build()?;
    let base =
      std::env::var("NOTION_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
    Ok(NotionClient { http, database_id: config.database_id, base })
  }

  /// Fetches the database definition (schema included).
  pub async fn database(&self) -> Result<Value> {
    let url = format!("{}/databases/{}", self.base, self.database_id);
    let response = self.http.get(url).send().await?;
    Ok(crate::zotero::ensure_ok("notion", response).await?.json().await?)
  }

  /// First page whose title property equals `title`.
  pub async fn query_by_title(&self, property: &str, title: &str) -> Result<Option<String>> {
    self.query(json!({ "filter": { "property": property, "title": { "equals": title } } })).await
  }

  /// First page whose rich-text property equals `text`.
  pub async fn query_by_text(&self, property: &str, text: &str) -> Result<Option<String>> {
    self
      .query(json!({ "filter": { "property": property, "rich_text": { "equals": text } } }))
      .await
  }

  /// Runs one database query, returning the first matching page id.
  async fn query(&self, filter: Value) -> Result<Option<String>> {
    let url = format!("{}/databases/{}/query", self.base, self.database_id);
    let response = self.http.post(url).json(&filter).send().await?;
    let body: Value = crate::zotero::ensure_ok("notion", response).await?.json().await?;
    Ok(
      body
        .pointer("/results/0/id")
        .and_then(Value::as_str)
        .map(String::from),
    )
  }

  /// Creates a page in the database, returning its id.
  pub async fn create_page(&self, properties: &Value) -> Result<String> {
    let url = format!("{}/pages", self.base);
    let payload = json!({
      "parent": { "database_id": self.database_id },
      "properties": properties,
    });
    let response = self.post_with_backoff(&url, &payload).await?;
    let body: Value = crate::zotero::ensure_ok("notion", response).await?.json().await?;
    body
      .get("id")
      .and_then(Value::as_str)
      .map(String::from)
      .ok_or_else(|| PaperflowError::Api("notion create returned no page id".into()))
  }

  /// Replaces the properties of an existing page.
  pub async fn update_page(&self, page_id: &str, properties: &Value) -> Result<()> {
    let url = format!("{}/pages/{page_id}", self.base);
    let payload = json!({ "properties": properties });
    let mut response = self.http.patch(&url).json(&payload).send().await?;
    if response.status().as_u16() == 429 {
      tokio::time::sleep(std::time::Duration::from_secs(1)).await;
      response = self.http.patch(&url).json(&payload).send().await?;
    }
    crate::zotero::ensure_ok("notion", response).await?;
    Ok(())
  }

  /// POST with a single retry after a rate-limit response.
  async fn post_with_backoff(&self, url: &str, payload: &Value) -> Result<reqwest::Response> {
    let response = self.http.post(url).json(payload).send().await?;
    if response.status().as_u16() != 429 {
      return Ok(response);
    }
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    Ok(self.http.post(url).json(payload).send().await?)
  }

  /// Looks for an existing page for the record: by the `Zotero Key`
  /// property when mapped, else by title equality. Query failures on the
  /// key property degrade to the title lookup.
  pub async fn find_existing(
    &self,
    mapping: &PropertyMapping,
    zotero_key: &str,
    display_title: &str,
  ) -> Result<Option<String>> {
    if let Some(key_prop) = &mapping.zotero_key {
      match self.query_by_text(&key_prop.name, zotero_key).await {
        Ok(Some(page_id)) => return Ok(Some(page_id)),
        Ok(None) => (),
        Err(e) => debug!(error = %e, "zotero-key lookup failed, falling back to title"),
      }
    }
    self.query_by_title(&mapping.title.name, display_title).await
  }
}

/// One mapped database property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyTarget {
  /// Property name as it appears in the database
  pub name: String,
  /// Notion property type, e.g. `rich_text`
  pub kind: String,
}

impl PropertyTarget {
  /// Shorthand constructor.
  fn new(name: &str, kind: &str) -> Self {
    PropertyTarget { name: name.to_string(), kind: kind.to_string() }
  }
}

/// Which database properties receive which record fields.
#[derive(Debug, Clone)]
pub struct PropertyMapping {
  /// The title property (every database has exactly one)
  pub title:      PropertyTarget,
  /// Author names, multi-select or rich text
  pub authors:    Option<PropertyTarget>,
  /// Publication year, number or rich text
  pub year:       Option<PropertyTarget>,
  /// Abstract text
  pub abstract_:  Option<PropertyTarget>,
  /// Topic labels, multi-select or rich text
  pub tags:       Option<PropertyTarget>,
  /// Landing page URL
  pub url:        Option<PropertyTarget>,
  /// DOI, url or rich text
  pub doi:        Option<PropertyTarget>,
  /// Dedup key property
  pub zotero_key: Option<PropertyTarget>,
  /// Direct PDF link
  pub pdf:        Option<PropertyTarget>,
  /// Journal or conference name
  pub venue:      Option<PropertyTarget>,
  /// Extracted summary note text
  pub ai_notes:   Option<PropertyTarget>,
}

/// Inspects a database definition and decides where each field goes.
///
/// Named candidates are tried first (in both English and Chinese), then
/// the first property of the right type. Fields with no usable property
/// are simply not synced.
pub fn build_property_mapping(db: &Value) -> PropertyMapping {
  let empty = serde_json::Map::new();
  let props = db.get("properties").and_then(Value::as_object).unwrap_or(&empty);

  let prop_type =
    |name: &str| props.get(name).and_then(|p| p.get("type")).and_then(Value::as_str);

  let find = |target_type: Option<&str>, candidates: &[&str]| -> Option<PropertyTarget> {
    for name in candidates {
      if let Some(kind) = prop_type(name) {
        if target_type.map_or(true, |t| t == kind) {
          return Some(PropertyTarget::new(name, kind));
        }
      }
    }
    let target_type = target_type?;
    props.iter().find_map(|(name, def)| {
      (def.get("type").and_then(Value::as_str) == Some(target_type))
        .then(|| PropertyTarget::new(name, target_type))
    })
  };

  let title = props
    .iter()
    .find_map(|(name, def)| {
      (def.get("type").and_then(Value::as_str) == Some("title"))
        .then(|| PropertyTarget::new(name, "title"))
    })
    .unwrap_or_else(|| PropertyTarget::new("Paper Title", "title"));

  PropertyMapping {
    title,
    authors: find(Some("multi_select"), &["Authors", "Author", "作者"]),
    year: find(Some("number"), &["Year", "年份"]),
    abstract_: find(Some("rich_text"), &["Abstract", "摘要"]),
    tags: find(Some("multi_select"), &["Tags", "标签"]),
    url: find(Some("url"), &["URL", "Link"]),
    doi: find(None, &["DOI"]),
    zotero_key: find(None, &["Zotero Key"]),
    pdf: find(Some("url"), &["PDF", "PDF URL"]),
    venue: find(None, &["Venue", "Publication", "Journal/Conference", "会议/期刊"]),
    ai_notes: find(Some("rich_text"), &["AI Notes", "AI总结"]),
  }
}

/// Display title for a page, falling back through short title, venue plus
/// year, URL, and DOI before giving up.
pub fn derive_title(data: &ItemData) -> String {
  if let Some(title) = non_empty(&data.title) {
    return title.to_string();
  }
  if let Some(short) = non_empty(&data.short_title) {
    return short.to_string();
  }
  let venue = non_empty(&data.publication_title)
    .or_else(|| non_empty(&data.proceedings_title))
    .or_else(|| non_empty(&data.conference_name));
  let year = data.year();
  let combo = [venue.map(String::from), year].into_iter().flatten().collect::<Vec<_>>().join(" ");
  if !combo.trim().is_empty() {
    return combo.trim().to_string();
  }
  if let Some(url) = non_empty(&data.url) {
    return url.to_string();
  }
  if let Some(doi) = non_empty(&data.doi) {
    return doi.to_string();
  }
  "(untitled)".to_string()
}

/// Topic labels whose sample keywords appear in the title or abstract.
pub fn match_tags(title: &str, abstract_text: &str, schema: &TagSchema) -> Vec<String> {
  let text = format!("{} {}", title.to_lowercase(), abstract_text.to_lowercase());
  let mut labels = Vec::new();
  for (key, spec) in schema {
    let hit = spec
      .sample_keywords
      .iter()
      .any(|kw| !kw.is_empty() && text.contains(&kw.to_lowercase()));
    if hit {
      labels.push(non_empty(&spec.label).map_or_else(|| key.clone(), String::from));
    }
  }
  labels
}

/// Text of the first child note that carries a generated summary.
pub fn extract_summary_note(children: &[Item]) -> Option<String> {
  children.iter().filter(|c| c.data.is_note()).find_map(|c| {
    let html = c.data.note.as_deref()?;
    let markers =
      crate::llm::SUMMARY_MARKERS.iter().copied().chain(std::iter::once("AI Summary"));
    markers.into_iter().any(|m| html.contains(m)).then(|| strip_tags(html))
  })
}

/// Direct PDF link for a record: the arXiv pattern when the URL points at
/// arXiv, otherwise an Unpaywall lookup by DOI (when an email is set).
pub async fn resolve_pdf_url(data: &ItemData, unpaywall_email: Option<&str>) -> Option<String> {
  if let Some(id) = non_empty(&data.url).and_then(crate::enrich::extract_arxiv_id) {
    return Some(format!("https://arxiv.org/pdf/{id}.pdf"));
  }
  let doi = non_empty(&data.doi)?;
  let email = unpaywall_email?;
  match crate::sources::unpaywall::best_pdf_url(doi, email).await {
    Ok(url) => url,
    Err(e) => {
      debug!(doi, error = %e, "unpaywall lookup failed");
      None
    },
  }
}

/// Builds the property payload for one record.
///
/// `labels` are the auto-matched topic labels; the record's own tags are
/// merged in. All network-derived inputs (`pdf_url`, `summary_note`) are
/// resolved by the caller so this stays pure.
pub fn make_properties(
  item: &Item,
  mapping: &PropertyMapping,
  labels: &[String],
  pdf_url: Option<&str>,
  summary_note: Option<&str>,
) -> Value {
  let data = &item.data;
  let mut props = serde_json::Map::new();

  let rich_text = |value: &str| json!({ "rich_text": [{ "text": { "content": value } }] });
  let multi_select =
    |values: &[String]| json!({ "multi_select": values.iter().map(|v| json!({ "name": v })).collect::<Vec<_>>() });

  props.insert(
    mapping.title.name.clone(),
    json!({ "title": [{ "text": { "content": derive_title(data) } }] }),
  );

  if let Some(target) = &mapping.authors {
    let authors: Vec<String> = data
      .creators
      .iter()
      .filter_map(|c| non_empty(&c.last_name).or_else(|| non_empty(&c.name)).map(String::from))
      .collect();
    let value = match target.kind.as_str() {
      "multi_select" => Some(multi_select(&authors)),
      "rich_text" => Some(rich_text(&authors.join(", "))),
      _ => None,
    };
    if let Some(value) = value {
      props.insert(target.name.clone(), value);
    }
  }

  if let Some(target) = &mapping.year {
    let year = data.year().and_then(|y| y.parse::<i64>().ok());
    let value = match target.kind.as_str() {
      "number" => Some(json!({ "number": year })),
      "rich_text" => Some(rich_text(&year.map(|y| y.to_string()).unwrap_or_default())),
      _ => None,
    };
    if let Some(value) = value {
      props.insert(target.name.clone(), value);
    }
  }

  if let Some(target) = &mapping.abstract_ {
    props.insert(target.name.clone(), rich_text(data.abstract_note.as_deref().unwrap_or("")));
  }

  if let Some(target) = &mapping.tags {
    let mut all: Vec<String> = labels.to_vec();
    for tag in data.tag_names() {
      if !all.iter().any(|l| l == tag) {
        all.push(tag.to_string());
      }
    }
    let value = match target.kind.as_str() {
      "multi_select" => Some(multi_select(&all)),
      "rich_text" => Some(rich_text(&all.join(", "))),
      _ => None,
    };
    if let Some(value) = value {
      props.insert(target.name.clone(), value);
    }
  }

  if let Some(target) = &mapping.url {
    if let Some(url) = non_empty(&data.url) {
      props.insert(target.name.clone(), json!({ "url": url }));
    }
  }

  if let Some(target) = &mapping.doi {
    if let Some(doi) = non_empty(&data.doi) {
      let value = if target.kind == "url" { json!({ "url": doi }) } else { rich_text(doi) };
      props.insert(target.name.clone(), value);
    }
  }

  if let Some(target) = &mapping.zotero_key {
    props.insert(target.name.clone(), rich_text(&item.key));
  }

  if let Some(target) = &mapping.pdf {
    if let Some(pdf) = pdf_url {
      props.insert(target.name.clone(), json!({ "url": pdf }));
    }
  }

  if let Some(target) = &mapping.venue {
    let venue = non_empty(&data.publication_title)
      .or_else(|| non_empty(&data.proceedings_title))
      .or_else(|| non_empty(&data.conference_name))
      .or_else(|| data.rest.get("series").and_then(Value::as_str).filter(|s| !s.is_empty()))
      .or_else(|| non_empty(&data.publisher));
    if let Some(venue) = venue {
      let value = match target.kind.as_str() {
        "multi_select" => multi_select(std::slice::from_ref(&venue.to_string())),
        "select" => json!({ "select": { "name": venue } }),
        _ => rich_text(venue),
      };
      props.insert(target.name.clone(), value);
    }
  }

  if let Some(target) = &mapping.ai_notes {
    if let Some(note) = summary_note.map(str::trim).filter(|n| !n.is_empty()) {
      props.insert(target.name.clone(), rich_text(note));
    }
  }

  Value::Object(props)
}

#[cfg(test)]
mod tests {
  use crate::watch::TagSpec;

  use super::*;

  fn sample_db() -> Value {
    json!({
      "properties": {
        "Paper Title": { "type": "title" },
        "Authors":     { "type": "multi_select" },
        "Year":        { "type": "number" },
        "Abstract":    { "type": "rich_text" },
        "Tags":        { "type": "multi_select" },
        "URL":         { "type": "url" },
        "DOI":         { "type": "rich_text" },
        "Zotero Key":  { "type": "rich_text" },
        "PDF":         { "type": "url" },
        "Venue":       { "type": "select" }
      }
    })
  }

  #[test]
  fn mapping_follows_the_database_schema() {
    let mapping = build_property_mapping(&sample_db());
    assert_eq!(mapping.title.name, "Paper Title");
    assert_eq!(mapping.authors.as_ref().unwrap().kind, "multi_select");
    assert_eq!(mapping.doi.as_ref().unwrap().kind, "rich_text");
    assert_eq!(mapping.venue.as_ref().unwrap().kind, "select");
    assert!(mapping.ai_notes.is_none());
  }

  #[test]
  fn mapping_falls_back_to_the_first_typed_property() {
    let db = json!({
      "properties": {
        "名前": { "type": "title" },
        "People": { "type": "multi_select" }
      }
    });
    let mapping = build_property_mapping(&db);
    assert_eq!(mapping.title.name, "名前");
    assert_eq!(mapping.authors.as_ref().unwrap().name, "People");
    assert!(mapping.year.is_none());
  }

  #[test]
  fn derive_title_walks_the_fallback_chain() {
    let titled = ItemData { title: Some("A Paper".into()), ..Default::default() };
    assert_eq!(derive_title(&titled), "A Paper");

    let venue_year = ItemData {
      publication_title: Some("Journal of Things".into()),
      date: Some("2021-05".into()),
      ..Default::default()
    };
    assert_eq!(derive_title(&venue_year), "Journal of Things 2021");

    let url_only = ItemData { url: Some("https://x.org/p".into()), ..Default::default() };
    assert_eq!(derive_title(&url_only), "https://x.org/p");

    assert_eq!(derive_title(&ItemData::default()), "(untitled)");
  }

  #[test]
  fn match_tags_scans_title_and_abstract() {
    let mut schema = TagSchema::new();
    schema.insert("vla".into(), TagSpec {
      label:           Some("Awesome-VLA".into()),
      sample_keywords: vec!["vision-language-action".into(), "VLA".into()],
    });
    schema.insert("rl".into(), TagSpec {
      label:           None,
      sample_keywords: vec!["reinforcement learning".into()],
    });
    let labels =
      match_tags("A VLA Policy", "Trained without reinforcement learning.", &schema);
    assert_eq!(labels, ["rl", "Awesome-VLA"]);
    assert!(match_tags("Unrelated", "", &schema).is_empty());
  }

  #[test]
  fn properties_cover_the_mapped_fields() {
    let mapping = build_property_mapping(&sample_db());
    let item = Item {
      key:     "ITEM1234".into(),
      version: 9,
      data:    ItemData {
        item_type: "journalArticle".into(),
        title: Some("A Paper".into()),
        abstract_note: Some("An abstract.".into()),
        date: Some("2021-03-01".into()),
        doi: Some("10.1/x".into()),
        url: Some("https://arxiv.org/abs/2101.00001".into()),
        publication_title: Some("Journal of Things".into()),
        creators: vec![Creator::author("Ada Lovelace"), Creator::author("Euclid")],
        tags: vec![Tag::new("existing")],
        ..Default::default()
      },
    };
    let labels = vec!["Awesome-VLA".to_string()];
    let props = make_properties(
      &item,
      &mapping,
      &labels,
      Some("https://arxiv.org/pdf/2101.00001.pdf"),
      None,
    );

    assert_eq!(props["Paper Title"]["title"][0]["text"]["content"], "A Paper");
    assert_eq!(props["Authors"]["multi_select"][0]["name"], "Lovelace");
    assert_eq!(props["Authors"]["multi_select"][1]["name"], "Euclid");
    assert_eq!(props["Year"]["number"], 2021);
    assert_eq!(props["Tags"]["multi_select"][0]["name"], "Awesome-VLA");
    assert_eq!(props["Tags"]["multi_select"][1]["name"], "existing");
    assert_eq!(props["DOI"]["rich_text"][0]["text"]["content"], "10.1/x");
    assert_eq!(props["Zotero Key"]["rich_text"][0]["text"]["content"], "ITEM1234");
    assert_eq!(props["PDF"]["url"], "https://arxiv.org/pdf/2101.00001.pdf");
    assert_eq!(props["Venue"]["select"]["name"], "Journal of Things");
  }

  #[test]
  fn summary_notes_are_found_by_marker() {
    let summary = Item {
      key:     "NOTE1111".into(),
      version: 1,
      data:    ItemData {
        item_type: "note".into(),
        note: Some("<p><strong>AI总结</strong></p><p>主要贡献：X</p>".into()),
        ..Default::default()
      },
    };
    let plain = Item {
      key:     "NOTE2222".into(),
      version: 1,
      data:    ItemData {
        item_type: "note".into(),
        note: Some("<p>hand-written remark</p>".into()),
        ..Default::default()
      },
    };
    assert_eq!(
      extract_summary_note(&[plain.clone(), summary]).as_deref(),
      Some("AI总结 主要贡献：X")
    );
    assert_eq!(extract_summary_note(&[plain]), None);
  }
}
