//! Module for the AI-summarization functionality of the CLI.

use paperflow::{
  bundle::is_pdf_attachment,
  llm::{has_existing_summary, make_note_html, LlmConfig, Locale, SummaryClient},
  pdf::{extract_text, extract_text_from_bytes, resolve_storage_path},
};

use super::*;

/// Download cap for attachments fetched when no local copy exists.
const MAX_ATTACHMENT_BYTES: usize = 64_000_000;

/// Arguments that can be used for the [`Commands::Summarize`]
#[derive(Args, Clone)]
pub struct SummarizeArgs {
  /// Scoping flags
  #[command(flatten)]
  pub scope: ScopeArgs,

  /// Summarize these item keys instead of a scope (repeatable)
  #[arg(long = "item-key")]
  pub item_keys: Vec<String>,

  /// Pages of PDF text to feed the model (0 = all)
  #[arg(long, default_value_t = 12)]
  pub max_pages: usize,

  /// Characters of extracted text kept for the prompt
  #[arg(long, default_value_t = 12_000)]
  pub max_chars: usize,

  /// Tag placed on generated notes
  #[arg(long, default_value = "AI总结")]
  pub note_tag: String,

  /// Local Zotero storage directory (defaults to ZOTERO_STORAGE_DIR, then
  /// ~/Zotero/storage)
  #[arg(long)]
  pub storage_dir: Option<PathBuf>,

  /// Summary language: zh or en
  #[arg(long, default_value = "zh")]
  pub locale: Locale,

  /// Model provider: doubao, qwen, or any OpenAI-compatible deployment
  #[arg(long)]
  pub provider: Option<String>,

  /// Model (or bot) identifier override
  #[arg(long)]
  pub model: Option<String>,

  /// Summarize again even when a summary note exists
  #[arg(long)]
  pub force: bool,

  /// Print the summaries without creating notes
  #[arg(long)]
  pub dry_run: bool,
}

/// Function for the [`Commands::Summarize`] in the CLI.
pub async fn summarize(args: SummarizeArgs) -> Result<()> {
  let client = ZoteroClient::new(ZoteroConfig::from_env()?)?;
  let config =
    LlmConfig::resolve(args.provider.as_deref(), args.model.as_deref(), None, None, None)?;
  println!(
    "{} Summarizing with {} ({})",
    style(INFO_PREFIX).cyan(),
    config.provider,
    config.model
  );
  let llm = SummaryClient::new(config)?;
  let storage_root = storage_dir(args.storage_dir.clone());

  let items = if args.item_keys.is_empty() {
    let scope = args.scope.resolve(&client, true).await?;
    client.list_items(&scope).await?
  } else {
    let mut items = Vec::with_capacity(args.item_keys.len());
    for key in &args.item_keys {
      match client.fetch_item(key).await {
        Ok(item) => items.push(item),
        Err(e) => warn!(%key, error = %e, "item fetch failed, skipping key"),
      }
    }
    items
  };

  let mut summarized = 0usize;
  let mut failed = 0usize;
  for item in items {
    if item.data.is_note() || item.data.is_attachment() {
      continue;
    }
    let title = non_empty(&item.data.title).unwrap_or("(untitled)").to_string();
    let children = match client.list_children(&item.key).await {
      Ok(children) => children,
      Err(e) => {
        warn!(key = %item.key, error = %e, "children fetch failed, skipping record");
        failed += 1;
        continue;
      },
    };
    if !args.force && has_existing_summary(&children, Some(&args.note_tag)) {
      debug!(key = %item.key, "summary note already present, skipping");
      continue;
    }
    let Some(pdf) = children.iter().find(|c| is_pdf_attachment(&c.data)) else {
      println!(
        "{} {} ({title}) has no PDF attachment, skipping",
        style(WARNING_PREFIX).yellow(),
        item.key
      );
      continue;
    };

    let Some(text) = read_pdf_text(&client, &storage_root, pdf, args.max_pages).await else {
      warn!(key = %item.key, attachment = %pdf.key, "no text extracted, skipping");
      continue;
    };

    let summary = llm.summarize(&title, &text, args.locale, args.max_chars).await;
    if args.dry_run {
      println!("\n{} {} ({title})\n{summary}", style(INFO_PREFIX).cyan(), item.key);
      summarized += 1;
      continue;
    }
    let html = make_note_html(&summary);
    match client.create_note(&item.key, &html, std::slice::from_ref(&args.note_tag)).await {
      Ok(_) => {
        summarized += 1;
        println!("{} Summarized {} ({title})", style(SUCCESS_PREFIX).green(), item.key);
      },
      Err(e) => {
        warn!(key = %item.key, error = %e, "note creation failed, skipping record");
        failed += 1;
      },
    }
  }

  println!(
    "{} Summarization done: {summarized} notes, {failed} failed{}",
    style(SUCCESS_PREFIX).green(),
    if args.dry_run { " (dry run)" } else { "" }
  );
  Ok(())
}

/// Storage directory precedence: the flag, `ZOTERO_STORAGE_DIR`, then the
/// default desktop-client location under the home directory.
fn storage_dir(flag: Option<PathBuf>) -> PathBuf {
  flag.or_else(|| std::env::var_os("ZOTERO_STORAGE_DIR").map(PathBuf::from)).unwrap_or_else(|| {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    home.join("Zotero").join("storage")
  })
}

/// Text of a PDF attachment, preferring the local storage copy over a
/// download. Returns `None` when no readable text is found either way.
async fn read_pdf_text(
  client: &ZoteroClient,
  storage_root: &Path,
  attachment: &Item,
  max_pages: usize,
) -> Option<String> {
  let path = resolve_storage_path(storage_root, attachment);
  if path.exists() {
    match extract_text(&path, max_pages) {
      Ok(text) if !text.trim().is_empty() => return Some(text),
      Ok(_) => debug!(path = %path.display(), "local pdf has no extractable text"),
      Err(e) => debug!(path = %path.display(), error = %e, "local pdf unreadable"),
    }
  }

  let bytes = match client.fetch_file_bytes(&attachment.key, MAX_ATTACHMENT_BYTES).await {
    Ok(bytes) => bytes,
    Err(e) => {
      warn!(attachment = %attachment.key, error = %e, "attachment download failed");
      return None;
    },
  };
  match extract_text_from_bytes(&bytes, max_pages) {
    Ok(text) if !text.trim().is_empty() => Some(text),
    Ok(_) => None,
    Err(e) => {
      debug!(attachment = %attachment.key, error = %e, "downloaded pdf unreadable");
      None
    },
  }
}
