//! PDF text and document-info extraction.
//!
//! Two consumers: enrichment reads the document-info dictionary and the
//! first page of text to guess identifiers, and summarization reads a
//! page-capped text body to feed the language model. Both go through
//! [`lopdf`]; extraction failures on individual pages are logged and the
//! page is skipped, since academic PDFs are full of fonts lopdf cannot
//! decode.

use lopdf::Document;

use super::*;

/// What enrichment reads out of a PDF: the info dictionary plus the text
/// of the first page.
#[derive(Debug, Clone, Default)]
pub struct DocumentSketch {
  /// `/Title` from the info dictionary
  pub title:      Option<String>,
  /// `/Author` from the info dictionary
  pub author:     Option<String>,
  /// First-page text, empty when extraction fails
  pub first_page: String,
}

/// Builds a [`DocumentSketch`] from in-memory PDF bytes.
pub fn sketch(bytes: &[u8]) -> Result<DocumentSketch> {
  let doc = Document::load_mem(bytes)?;
  let (title, author) = info_fields(&doc);
  let first_page = doc
    .get_pages()
    .keys()
    .next()
    .map(|page| doc.extract_text(&[*page]).unwrap_or_default())
    .unwrap_or_default();
  Ok(DocumentSketch { title, author, first_page })
}

/// Extracts text from a PDF on disk, reading at most `max_pages` pages
/// (zero means all of them).
pub fn extract_text(path: &Path, max_pages: usize) -> Result<String> {
  let doc = Document::load(path)?;
  Ok(page_text(&doc, max_pages))
}

/// Extracts text from in-memory PDF bytes, reading at most `max_pages`
/// pages (zero means all of them).
pub fn extract_text_from_bytes(bytes: &[u8], max_pages: usize) -> Result<String> {
  let doc = Document::load_mem(bytes)?;
  Ok(page_text(&doc, max_pages))
}

/// Concatenates page texts, skipping pages lopdf cannot decode.
fn page_text(doc: &Document, max_pages: usize) -> String {
  let cap = if max_pages == 0 { usize::MAX } else { max_pages };
  let mut pages = Vec::new();
  for page in doc.get_pages().keys().take(cap) {
    match doc.extract_text(&[*page]) {
      Ok(text) => pages.push(text),
      Err(e) => debug!(page, error = %e, "skipping unreadable page"),
    }
  }
  pages.join("\n")
}

/// Title and author from the document-info dictionary, when present.
fn info_fields(doc: &Document) -> (Option<String>, Option<String>) {
  let info_ref = doc.trailer.get(b"Info").ok().and_then(|o| o.as_reference().ok());
  let Some(info) =
    info_ref.and_then(|r| doc.get_object(r).ok()).and_then(|o| o.as_dict().ok())
  else {
    return (None, None);
  };
  (info_text(info, b"Title"), info_text(info, b"Author"))
}

/// Decodes one info-dictionary string. PDF text strings are either
/// UTF-16BE with a BOM or a latin-ish byte encoding.
fn info_text(dict: &lopdf::Dictionary, key: &[u8]) -> Option<String> {
  let bytes = dict.get(key).ok().and_then(|obj| obj.as_str().ok())?;
  let text = if bytes.starts_with(&[0xFE, 0xFF]) {
    let (decoded, ..) = encoding_rs::UTF_16BE.decode(&bytes[2..]);
    decoded.into_owned()
  } else {
    String::from_utf8_lossy(bytes).into_owned()
  };
  let text = text.trim();
  (!text.is_empty()).then(|| text.to_string())
}

/// Resolves a stored attachment to its path under the Zotero storage
/// directory. A `storage:` path hint takes precedence; otherwise the file
/// lives in `storage/<KEY>/<filename>`.
pub fn resolve_storage_path(storage_root: &Path, attachment: &Item) -> PathBuf {
  if let Some(hint) = attachment.data.rest.get("path").and_then(Value::as_str) {
    if let Some(rel) = hint.strip_prefix("storage:") {
      return storage_root.join(rel.trim_start_matches('/'));
    }
    return PathBuf::from(hint);
  }
  let filename = non_empty(&attachment.data.filename).unwrap_or("document.pdf");
  storage_root.join(&attachment.key).join(filename)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn attachment(key: &str, filename: Option<&str>, path_hint: Option<&str>) -> Item {
    let mut data = ItemData {
      item_type: "attachment".into(),
      filename: filename.map(String::from),
      ..Default::default()
    };
    if let Some(hint) = path_hint {
      data.rest.insert("path".into(), json!(hint));
    }
    Item { key: key.into(), version: 1, data }
  }

  #[test]
  fn storage_path_prefers_the_path_hint() {
    let root = Path::new("/home/u/Zotero/storage");
    let hinted = attachment("ABCD2345", Some("paper.pdf"), Some("storage:sub/paper.pdf"));
    assert_eq!(
      resolve_storage_path(root, &hinted),
      PathBuf::from("/home/u/Zotero/storage/sub/paper.pdf")
    );

    let absolute = attachment("ABCD2345", None, Some("/elsewhere/paper.pdf"));
    assert_eq!(resolve_storage_path(root, &absolute), PathBuf::from("/elsewhere/paper.pdf"));
  }

  #[test]
  fn storage_path_falls_back_to_key_and_filename() {
    let root = Path::new("/home/u/Zotero/storage");
    let named = attachment("ABCD2345", Some("paper.pdf"), None);
    assert_eq!(
      resolve_storage_path(root, &named),
      PathBuf::from("/home/u/Zotero/storage/ABCD2345/paper.pdf")
    );

    let unnamed = attachment("ABCD2345", None, None);
    assert_eq!(
      resolve_storage_path(root, &unnamed),
      PathBuf::from("/home/u/Zotero/storage/ABCD2345/document.pdf")
    );
  }

  #[test]
  fn sketch_rejects_garbage_bytes() {
    assert!(sketch(b"not a pdf at all").is_err());
  }
}
