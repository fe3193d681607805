//! Zotero Web API v3 client.
//!
//! All store access goes through this client: paginated listing (following
//! RFC 5988 `Link: rel="next"` headers), child fetches, batch creation, and
//! versioned updates and deletes with `If-Unmodified-Since-Version`. It also
//! implements [`BibliographyGateway`](crate::merge::BibliographyGateway),
//! which is all the merge executor ever sees.
//!
//! Credentials come from `ZOTERO_USER_ID` and `ZOTERO_API_KEY`; a missing
//! credential is a configuration error, raised before any request is made.

use reqwest::header::{HeaderMap, HeaderValue};

use super::*;

/// Default API host; `ZOTERO_API_BASE` overrides it for testing.
const DEFAULT_API_BASE: &str = "https://api.zotero.org";

/// Page size used for every listing request.
const PAGE_LIMIT: usize = 100;

/// Credentials and endpoint for one user library.
#[derive(Debug, Clone)]
pub struct ZoteroConfig {
  /// Numeric user id owning the library
  pub user_id:  String,
  /// API key with read/write access
  pub api_key:  String,
  /// API host, normally [`DEFAULT_API_BASE`]
  pub api_base: String,
}

impl ZoteroConfig {
  /// Reads the configuration from the environment.
  pub fn from_env() -> Result<Self> {
    Ok(ZoteroConfig {
      user_id:  require_env("ZOTERO_USER_ID")?,
      api_key:  require_env("ZOTERO_API_KEY")?,
      api_base: std::env::var("ZOTERO_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
    })
  }
}

/// Which records a run operates on.
#[derive(Debug, Clone, Default)]
pub struct ItemScope {
  /// Restrict to one collection (key, not name)
  pub collection: Option<String>,
  /// Restrict to items carrying this tag
  pub tag:        Option<String>,
  /// Stop after this many items
  pub limit:      Option<usize>,
  /// Only top-level items (skip children in the listing itself)
  pub top_only:   bool,
}

impl ItemScope {
  /// All top-level items in the library.
  pub fn top() -> Self { ItemScope { top_only: true, ..Default::default() } }
}

/// Client for one user library.
pub struct ZoteroClient {
  /// Resolved configuration
  config: ZoteroConfig,
  /// HTTP client carrying the auth headers
  http:   reqwest::Client,
}

impl ZoteroClient {
  /// Builds a client with the API key installed as a default header.
  pub fn new(config: ZoteroConfig) -> Result<Self> {
    let mut headers = HeaderMap::new();
    headers.insert(
      "Zotero-API-Key",
      HeaderValue::from_str(&config.api_key)
        .map_err(|_| PaperflowError::Config("ZOTERO_API_KEY contains invalid characters".into()))?,
    );
    headers.insert("Zotero-API-Version", HeaderValue::from_static("3"));
    let http = reqwest::Client::builder()
      .default_headers(headers)
      .user_agent(concat!("paperflow/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(ZoteroClient { config, http })
  }

  /// Absolute URL for a library-relative path.
  fn url(&self, path: &str) -> String {
    format!("{}/users/{}{path}", self.config.api_base, self.config.user_id)
  }

  /// Lists items in scope, following pagination.
  pub async fn list_items(&self, scope: &ItemScope) -> Result<Vec<Item>> {
    let path = match (&scope.collection, scope.top_only) {
      (Some(coll), true) => format!("/collections/{coll}/items/top"),
      (Some(coll), false) => format!("/collections/{coll}/items"),
      (None, true) => "/items/top".to_string(),
      (None, false) => "/items".to_string(),
    };
    let mut query = vec![
      ("format".to_string(), "json".to_string()),
      ("include".to_string(), "data".to_string()),
      ("limit".to_string(), PAGE_LIMIT.to_string()),
    ];
    if let Some(tag) = &scope.tag {
      query.push(("tag".to_string(), tag.clone()));
    }

    let mut items = Vec::new();
    let mut next = Some(self.url(&path));
    let mut first = true;
    while let Some(url) = next.take() {
      let request =
        if first { self.http.get(&url).query(&query) } else { self.http.get(&url) };
      first = false;
      let response = ensure_ok("zotero", request.send().await?).await?;
      next = next_page(response.headers().get("Link").and_then(|v| v.to_str().ok()));
      let page: Vec<Item> = response.json().await?;
      for item in page {
        items.push(item);
        if scope.limit.is_some_and(|limit| items.len() >= limit) {
          return Ok(items);
        }
      }
    }
    Ok(items)
  }

  /// Fetches a single item by key.
  pub async fn fetch_item(&self, key: &str) -> Result<Item> {
    let response = self.http.get(self.url(&format!("/items/{key}"))).send().await?;
    Ok(ensure_ok("zotero", response).await?.json().await?)
  }

  /// Lists the children of a record, following pagination.
  pub async fn list_children(&self, key: &str) -> Result<Vec<Item>> {
    let mut children = Vec::new();
    let mut next = Some(format!(
      "{}?format=json&include=data&limit={PAGE_LIMIT}",
      self.url(&format!("/items/{key}/children"))
    ));
    while let Some(url) = next.take() {
      let response = ensure_ok("zotero", self.http.get(&url).send().await?).await?;
      next = next_page(response.headers().get("Link").and_then(|v| v.to_str().ok()));
      let mut page: Vec<Item> = response.json().await?;
      children.append(&mut page);
    }
    Ok(children)
  }

  /// Lists every collection in the library.
  pub async fn list_collections(&self) -> Result<Vec<Collection>> {
    let response = self
      .http
      .get(self.url("/collections"))
      .query(&[("format", "json"), ("include", "data"), ("limit", "200")])
      .send()
      .await?;
    Ok(ensure_ok("zotero", response).await?.json().await?)
  }

  /// Resolves a collection by name, case-insensitively.
  pub async fn find_collection_by_name(&self, name: &str) -> Result<Option<Collection>> {
    let wanted = name.to_lowercase();
    Ok(self.list_collections().await?.into_iter().find(|c| c.data.name.to_lowercase() == wanted))
  }

  /// Returns the key of the named collection, creating it when absent.
  pub async fn create_collection_if_missing(&self, name: &str) -> Result<String> {
    if let Some(existing) = self.find_collection_by_name(name).await? {
      return Ok(existing.key);
    }
    let response =
      self.http.post(self.url("/collections")).json(&json!([{ "name": name }])).send().await?;
    ensure_ok("zotero", response).await?;
    // The creation response carries keys, but re-listing keeps one parser.
    self
      .find_collection_by_name(name)
      .await?
      .map(|c| c.key)
      .ok_or_else(|| PaperflowError::Api(format!("collection {name:?} not visible after create")))
  }

  /// Creates items in one batch, returning the keys of the successes.
  ///
  /// The batch response maps input indices to created objects; entries in
  /// `failed` are logged and skipped.
  pub async fn create_items(&self, items: &[ItemData]) -> Result<Vec<String>> {
    let response = self.http.post(self.url("/items")).json(items).send().await?;
    let body: Value = ensure_ok("zotero", response).await?.json().await?;
    Ok(parse_created_keys(&body))
  }

  /// Attaches a linked-URL PDF to a record.
  pub async fn create_linked_pdf(&self, parent: &str, title: &str, pdf_url: &str) -> Result<()> {
    let payload = json!([{
      "itemType": "attachment",
      "parentItem": parent,
      "title": title,
      "linkMode": "linked_url",
      "contentType": "application/pdf",
      "url": pdf_url,
    }]);
    let response = self.http.post(self.url("/items")).json(&payload).send().await?;
    ensure_ok("zotero", response).await?;
    Ok(())
  }

  /// Attaches a child note to a record.
  pub async fn create_note(&self, parent: &str, html: &str, tags: &[String]) -> Result<()> {
    let tags: Vec<Value> = tags.iter().map(|t| json!({ "tag": t })).collect();
    let payload = json!([{
      "itemType": "note",
      "parentItem": parent,
      "note": html,
      "tags": tags,
    }]);
    let response = self.http.post(self.url("/items")).json(&payload).send().await?;
    ensure_ok("zotero", response).await?;
    Ok(())
  }

  /// Writes an item payload under optimistic concurrency.
  ///
  /// Returns the new library version from `Last-Modified-Version` so
  /// consecutive writes to the same item can chain.
  pub async fn update_item(&self, key: &str, version: u64, data: &ItemData) -> Result<u64> {
    let mut payload = data.clone();
    payload.key = Some(key.to_string());
    payload.version = Some(version);
    let response = self
      .http
      .put(self.url(&format!("/items/{key}")))
      .header("If-Unmodified-Since-Version", version)
      .json(&payload)
      .send()
      .await?;
    let response = ensure_ok("zotero", response).await?;
    Ok(
      response
        .headers()
        .get("Last-Modified-Version")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(version + 1),
    )
  }

  /// Deletes an item under optimistic concurrency.
  pub async fn delete_item(&self, key: &str, version: u64) -> Result<()> {
    let response = self
      .http
      .delete(self.url(&format!("/items/{key}")))
      .header("If-Unmodified-Since-Version", version)
      .send()
      .await?;
    ensure_ok("zotero", response).await?;
    Ok(())
  }

  /// Downloads a stored attachment, capped at `max_bytes`.
  pub async fn fetch_file_bytes(&self, key: &str, max_bytes: usize) -> Result<Vec<u8>> {
    let response = self.http.get(self.url(&format!("/items/{key}/file"))).send().await?;
    let mut response = ensure_ok("zotero", response).await?;
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
      if bytes.len() + chunk.len() > max_bytes {
        bytes.extend_from_slice(&chunk[..max_bytes - bytes.len()]);
        warn!(key, max_bytes, "attachment truncated at size cap");
        break;
      }
      bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
  }
}

#[async_trait]
impl crate::merge::BibliographyGateway for ZoteroClient {
  async fn update_record(&self, key: &str, version: u64, data: &ItemData) -> Result<u64> {
    self.update_item(key, version, data).await
  }

  async fn delete_record(&self, key: &str, version: u64) -> Result<()> {
    self.delete_item(key, version).await
  }
}

/// Extracts the `rel="next"` target from a `Link` header.
pub fn next_page(link_header: Option<&str>) -> Option<String> {
  let header = link_header?;
  for chunk in header.split(',') {
    let mut parts = chunk.splitn(2, ';');
    let url_part = parts.next()?.trim();
    let rel_part = parts.next()?.trim();
    if rel_part == r#"rel="next""# {
      return Some(url_part.trim_matches(|c| c == '<' || c == '>').to_string());
    }
  }
  None
}

/// Pulls created keys out of a batch-create response body.
fn parse_created_keys(body: &Value) -> Vec<String> {
  let mut keys = Vec::new();
  if let Some(successful) = body.get("successful").and_then(Value::as_object) {
    for created in successful.values() {
      let key = created
        .get("key")
        .and_then(Value::as_str)
        .or_else(|| created.pointer("/data/key").and_then(Value::as_str));
      if let Some(key) = key {
        keys.push(key.to_string());
      }
    }
  }
  if let Some(failed) = body.get("failed").and_then(Value::as_object) {
    for (index, failure) in failed {
      warn!(%index, %failure, "item creation failed");
    }
  }
  keys
}

/// Checks a response status, folding error bodies into [`PaperflowError::Api`].
pub(crate) async fn ensure_ok(service: &str, response: reqwest::Response) -> Result<reqwest::Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let body = response.text().await.unwrap_or_default();
  let body = body.chars().take(300).collect::<String>();
  Err(PaperflowError::Api(format!("{service} returned {status}: {body}")))
}

/// Keys of `root` and every collection nested beneath it.
pub fn collection_descendants(collections: &[Collection], root: &str) -> Vec<String> {
  let mut keys = vec![root.to_string()];
  let mut cursor = 0;
  while cursor < keys.len() {
    let parent = keys[cursor].clone();
    for collection in collections {
      if collection.data.parent.as_deref() == Some(parent.as_str())
        && !keys.contains(&collection.key)
      {
        keys.push(collection.key.clone());
      }
    }
    cursor += 1;
  }
  keys
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn next_page_finds_the_next_relation() {
    let header = r#"<https://api.zotero.org/users/1/items/top?start=100>; rel="next", <https://api.zotero.org/users/1/items/top?start=900>; rel="last""#;
    assert_eq!(
      next_page(Some(header)).as_deref(),
      Some("https://api.zotero.org/users/1/items/top?start=100")
    );
    assert_eq!(next_page(Some(r#"<https://x>; rel="last""#)), None);
    assert_eq!(next_page(None), None);
  }

  #[test]
  fn created_keys_cover_both_response_shapes() {
    let body = json!({
      "successful": {
        "0": { "key": "AAAA1111", "version": 1 },
        "1": { "data": { "key": "BBBB2222" } }
      },
      "failed": {}
    });
    let mut keys = parse_created_keys(&body);
    keys.sort();
    assert_eq!(keys, ["AAAA1111", "BBBB2222"]);
  }

  #[test]
  fn missing_credentials_are_a_config_error() {
    std::env::remove_var("ZOTERO_USER_ID");
    std::env::remove_var("ZOTERO_API_KEY");
    assert!(matches!(ZoteroConfig::from_env(), Err(PaperflowError::Config(_))));
  }

  #[test]
  fn collection_descendants_walks_nested_collections() {
    let collection = |key: &str, name: &str, parent: Option<&str>| Collection {
      key:     key.into(),
      version: 1,
      data:    CollectionData { name: name.into(), parent: parent.map(String::from) },
    };
    let all = vec![
      collection("ROOT", "Papers", None),
      collection("CHILD", "ML", Some("ROOT")),
      collection("GRAND", "NLP", Some("CHILD")),
      collection("OTHER", "Misc", None),
    ];
    assert_eq!(collection_descendants(&all, "ROOT"), ["ROOT", "CHILD", "GRAND"]);
  }
}
