//! Zotero item and collection data model.
//!
//! The Zotero Web API represents every object in a library (papers, child
//! attachments, child notes) as an *item*: a key, a server-assigned version,
//! and a `data` map. The service fills unset fields with empty strings, so
//! all optional fields here are `Option`s and the accessors treat empty
//! strings as absent.
//!
//! Fields the library never reads are carried through [`ItemData::rest`] so
//! a deserialize/patch/serialize round trip does not drop anything the
//! server sent.

use super::*;

/// One object in a Zotero library together with its concurrency token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
  /// Eight-character library-unique key
  pub key:     String,
  /// Monotonic library version, required for conditional writes
  pub version: u64,
  /// The editable payload
  pub data:    ItemData,
}

/// The editable payload of an item.
///
/// Only the fields the library reads or writes are typed; everything else
/// rides along in [`ItemData::rest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemData {
  /// Item key, present when the payload was fetched from the server
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub key: Option<String>,

  /// Item version, present when the payload was fetched from the server
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version: Option<u64>,

  /// Zotero item type, e.g. `journalArticle`, `attachment`, `note`
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub item_type: String,

  /// Record title
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,

  /// Abstract text
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub abstract_note: Option<String>,

  /// Authors and other contributors
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub creators: Vec<Creator>,

  /// Publication date as entered, usually ISO or a bare year
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date: Option<String>,

  /// Digital Object Identifier
  #[serde(rename = "DOI", default, skip_serializing_if = "Option::is_none")]
  pub doi: Option<String>,

  /// Canonical URL
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,

  /// Abbreviated title
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub short_title: Option<String>,

  /// Journal or other container title
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub publication_title: Option<String>,

  /// Proceedings title for conference papers
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub proceedings_title: Option<String>,

  /// Conference name for conference papers
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub conference_name: Option<String>,

  /// Publisher name
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub publisher: Option<String>,

  /// Volume within the container
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub volume: Option<String>,

  /// Issue within the volume
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub issue: Option<String>,

  /// Page range
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pages: Option<String>,

  /// Free-form extra field
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub extra: Option<String>,

  /// Server-assigned last modification timestamp (RFC 3339)
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub date_modified: Option<String>,

  /// Attached tags
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<Tag>,

  /// Keys of the collections containing this item
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub collections: Vec<String>,

  /// Key of the parent record, set on child attachments and notes
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent_item: Option<String>,

  /// Attachment link mode
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub link_mode: Option<LinkMode>,

  /// Attachment MIME type
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content_type: Option<String>,

  /// Attachment filename
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub filename: Option<String>,

  /// Note HTML, set on child notes
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,

  /// Everything else the server sent, preserved for round trips
  #[serde(flatten)]
  pub rest: BTreeMap<String, Value>,
}

/// How an attachment references its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
  /// File stored in the Zotero storage directory
  ImportedFile,
  /// Remote URL with a stored snapshot
  ImportedUrl,
  /// File linked in place on disk
  LinkedFile,
  /// Bare remote URL, nothing stored
  LinkedUrl,
}

impl LinkMode {
  /// Whether the mode can carry a readable document (everything except a
  /// bare linked URL).
  pub fn is_stored(self) -> bool { !matches!(self, LinkMode::LinkedUrl) }
}

/// One author or other contributor on a record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
  /// Contribution kind, almost always `author`
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub creator_type: String,
  /// Given name, for two-field creators
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub first_name:   Option<String>,
  /// Family name, for two-field creators
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_name:    Option<String>,
  /// Single-field name, used when the name does not split
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name:         Option<String>,
}

impl Creator {
  /// Builds an `author` creator from a display name, splitting the last
  /// whitespace-separated token off as the family name.
  pub fn author(display_name: &str) -> Self {
    let name = display_name.trim();
    match name.rsplit_once(char::is_whitespace) {
      Some((first, last)) => Creator {
        creator_type: "author".into(),
        first_name: Some(first.trim().to_string()),
        last_name: Some(last.to_string()),
        name: None,
      },
      None => Creator {
        creator_type: "author".into(),
        first_name: None,
        last_name: None,
        name: Some(name.to_string()),
      },
    }
  }

  /// Display name regardless of which fields are populated.
  pub fn display_name(&self) -> String {
    if let Some(name) = non_empty(&self.name) {
      return name.to_string();
    }
    let first = self.first_name.as_deref().unwrap_or("");
    let last = self.last_name.as_deref().unwrap_or("");
    format!("{first} {last}").trim().to_string()
  }
}

/// A tag attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
  /// Tag text
  pub tag:      String,
  /// Tag kind: absent or 0 for manual, 1 for automatic
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub tag_type: Option<u8>,
}

impl Tag {
  /// A manual tag.
  pub fn new(tag: impl Into<String>) -> Self { Tag { tag: tag.into(), tag_type: None } }
}

/// A collection in a Zotero library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
  /// Eight-character library-unique key
  pub key:     String,
  /// Monotonic library version
  pub version: u64,
  /// The editable payload
  pub data:    CollectionData,
}

/// The editable payload of a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionData {
  /// Display name
  pub name: String,

  /// Parent collection key. The API sends `false` at the top level, which
  /// maps to `None` here.
  #[serde(
    rename = "parentCollection",
    default,
    deserialize_with = "parent_collection_key",
    skip_serializing_if = "Option::is_none"
  )]
  pub parent: Option<String>,
}

/// Deserializes Zotero's `false`-or-key parent collection field.
fn parent_collection_key<'de, D>(deserializer: D) -> core::result::Result<Option<String>, D::Error>
where D: serde::Deserializer<'de> {
  match Value::deserialize(deserializer)? {
    Value::String(key) if !key.is_empty() => Ok(Some(key)),
    _ => Ok(None),
  }
}

/// Treats empty and whitespace-only strings as absent.
pub fn non_empty(field: &Option<String>) -> Option<&str> {
  field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ItemData {
  /// Whether this payload is a child note.
  pub fn is_note(&self) -> bool { self.item_type == "note" }

  /// Whether this payload is an attachment.
  pub fn is_attachment(&self) -> bool { self.item_type == "attachment" }

  /// Four-digit publication year, from the `date` field or a `year` field
  /// some importers write into the payload.
  pub fn year(&self) -> Option<String> {
    lazy_static! {
      /// First four-digit run in a date string.
      static ref YEAR_RE: Regex = Regex::new(r"\d{4}").unwrap();
    }
    if let Some(date) = non_empty(&self.date) {
      if let Some(m) = YEAR_RE.find(date) {
        return Some(m.as_str().to_string());
      }
    }
    self
      .rest
      .get("year")
      .and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
      })
      .filter(|s| !s.trim().is_empty())
  }

  /// Tag texts in attachment order.
  pub fn tag_names(&self) -> Vec<&str> { self.tags.iter().map(|t| t.tag.as_str()).collect() }

  /// Whether a tag with this exact text is attached.
  pub fn has_tag(&self, tag: &str) -> bool { self.tags.iter().any(|t| t.tag == tag) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trip_preserves_unknown_fields() {
    let raw = json!({
      "key": "ABCD2345",
      "version": 10,
      "data": {
        "key": "ABCD2345",
        "version": 10,
        "itemType": "journalArticle",
        "title": "A Paper",
        "DOI": "10.1000/xyz",
        "accessDate": "2024-01-02T03:04:05Z",
        "rights": "CC-BY"
      }
    });
    let item: Item = serde_json::from_value(raw).unwrap();
    assert_eq!(item.data.doi.as_deref(), Some("10.1000/xyz"));

    let back = serde_json::to_value(&item.data).unwrap();
    assert_eq!(back["accessDate"], "2024-01-02T03:04:05Z");
    assert_eq!(back["rights"], "CC-BY");
    assert_eq!(back["DOI"], "10.1000/xyz");
  }

  #[test]
  fn year_prefers_date_field() {
    let mut data = ItemData { date: Some("2023-05-01".into()), ..Default::default() };
    assert_eq!(data.year().as_deref(), Some("2023"));

    data.date = Some("May 2021".into());
    assert_eq!(data.year().as_deref(), Some("2021"));

    data.date = None;
    data.rest.insert("year".into(), json!(2019));
    assert_eq!(data.year().as_deref(), Some("2019"));
  }

  #[test]
  fn parent_collection_false_maps_to_none() {
    let top: Collection = serde_json::from_value(json!({
      "key": "COLL1234",
      "version": 3,
      "data": { "name": "Inbox", "parentCollection": false }
    }))
    .unwrap();
    assert!(top.data.parent.is_none());

    let nested: Collection = serde_json::from_value(json!({
      "key": "COLL5678",
      "version": 4,
      "data": { "name": "ML", "parentCollection": "COLL1234" }
    }))
    .unwrap();
    assert_eq!(nested.data.parent.as_deref(), Some("COLL1234"));
  }

  #[test]
  fn author_splits_family_name() {
    let two = Creator::author("Ada Lovelace");
    assert_eq!(two.first_name.as_deref(), Some("Ada"));
    assert_eq!(two.last_name.as_deref(), Some("Lovelace"));

    let one = Creator::author("Aristotle");
    assert!(one.last_name.is_none());
    assert_eq!(one.name.as_deref(), Some("Aristotle"));
    assert_eq!(one.display_name(), "Aristotle");
  }
}
