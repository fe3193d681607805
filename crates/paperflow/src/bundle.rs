//! Record bundles: a record, its resolved children, and derived flags.
//!
//! Bundles are built fresh each run from the store and are never persisted.
//! The derived flags feed winner selection during merges, and the children
//! feed reparent planning.

use super::*;

/// A record together with its children and the flags derived from them.
#[derive(Debug, Clone)]
pub struct RecordBundle {
  /// The top-level record
  pub record:        Item,
  /// Child attachments, in fetch order
  pub attachments:   Vec<Item>,
  /// Child notes, in fetch order
  pub notes:         Vec<Item>,
  /// Whether any child attachment carries a readable PDF
  pub has_pdf:       bool,
  /// Whether the record has at least one child note
  pub has_notes:     bool,
  /// Server-assigned modification time, epoch when unparseable
  pub last_modified: DateTime<Utc>,
}

impl RecordBundle {
  /// Partitions the children and derives the flags.
  pub fn build(record: Item, children: Vec<Item>) -> Self {
    let mut attachments = Vec::new();
    let mut notes = Vec::new();
    for child in children {
      if child.data.is_note() {
        notes.push(child);
      } else if child.data.is_attachment() {
        attachments.push(child);
      } else {
        debug!(key = %child.key, item_type = %child.data.item_type, "ignoring unexpected child");
      }
    }
    let has_pdf = attachments.iter().any(|a| is_pdf_attachment(&a.data));
    let has_notes = !notes.is_empty();
    let last_modified = parse_modified(&record.data);
    RecordBundle { record, attachments, notes, has_pdf, has_notes, last_modified }
  }

  /// Key of the underlying record.
  pub fn key(&self) -> &str { &self.record.key }

  /// All children, attachments first, in fetch order.
  pub fn children(&self) -> impl Iterator<Item = &Item> {
    self.attachments.iter().chain(self.notes.iter())
  }
}

/// Whether an attachment payload carries a readable PDF.
///
/// The link mode must be one that can hold a document (a bare linked URL
/// cannot), and either the content type says PDF or the filename/URL ends
/// in `.pdf` case-insensitively.
pub fn is_pdf_attachment(data: &ItemData) -> bool {
  let stored = data.link_mode.is_some_and(LinkMode::is_stored);
  if !stored {
    return false;
  }
  if non_empty(&data.content_type).is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf")) {
    return true;
  }
  let ends_pdf = |s: &str| s.to_lowercase().ends_with(".pdf");
  non_empty(&data.filename).is_some_and(ends_pdf) || non_empty(&data.url).is_some_and(ends_pdf)
}

/// Parses the record's `dateModified`; epoch on absence so the winner tie
/// cascade still terminates at encounter order.
fn parse_modified(data: &ItemData) -> DateTime<Utc> {
  non_empty(&data.date_modified)
    .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap_or_default())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(key: &str, data: ItemData) -> Item { Item { key: key.into(), version: 1, data } }

  fn attachment(link_mode: LinkMode, content_type: Option<&str>, filename: Option<&str>) -> Item {
    item("ATT00001", ItemData {
      item_type: "attachment".into(),
      link_mode: Some(link_mode),
      content_type: content_type.map(String::from),
      filename: filename.map(String::from),
      ..Default::default()
    })
  }

  #[test]
  fn pdf_detection_honors_link_mode_and_name() {
    let stored = attachment(LinkMode::ImportedFile, Some("application/pdf"), None);
    assert!(is_pdf_attachment(&stored.data));

    let linked_file = attachment(LinkMode::LinkedFile, None, Some("Paper.PDF"));
    assert!(is_pdf_attachment(&linked_file.data));

    let linked_url = attachment(LinkMode::LinkedUrl, Some("application/pdf"), None);
    assert!(!is_pdf_attachment(&linked_url.data));

    let snapshot = attachment(LinkMode::ImportedUrl, Some("text/html"), Some("page.html"));
    assert!(!is_pdf_attachment(&snapshot.data));
  }

  #[test]
  fn build_partitions_children_and_sets_flags() {
    let record = item("REC00001", ItemData {
      item_type: "journalArticle".into(),
      date_modified: Some("2024-03-01T12:00:00Z".into()),
      ..Default::default()
    });
    let note = item("NOTE0001", ItemData {
      item_type: "note".into(),
      note: Some("<p>hi</p>".into()),
      ..Default::default()
    });
    let pdf = attachment(LinkMode::ImportedFile, Some("application/pdf"), Some("a.pdf"));

    let bundle = RecordBundle::build(record, vec![note, pdf]);
    assert!(bundle.has_pdf);
    assert!(bundle.has_notes);
    assert_eq!(bundle.attachments.len(), 1);
    assert_eq!(bundle.notes.len(), 1);
    assert_eq!(bundle.last_modified, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
  }

  #[test]
  fn missing_date_modified_falls_back_to_epoch() {
    let bundle = RecordBundle::build(item("REC00002", ItemData::default()), vec![]);
    assert_eq!(bundle.last_modified.timestamp(), 0);
  }
}
