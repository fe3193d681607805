//! Module for the Notion-export functionality of the CLI.

use paperflow::{
  notion::{
    build_property_mapping, derive_title, extract_summary_note, make_properties, match_tags,
    resolve_pdf_url, NotionClient, NotionConfig,
  },
  watch::{load_tag_schema, TagSchema},
};

use super::*;

/// Arguments that can be used for the [`Commands::Sync`]
#[derive(Args, Clone)]
pub struct SyncArgs {
  /// Scoping flags
  #[command(flatten)]
  pub scope: ScopeArgs,

  /// Only sync records modified within this many days (0 = all)
  #[arg(long, default_value_t = 0)]
  pub since_days: u64,

  /// Tag taxonomy used for topic labels; skipped when the file is absent
  #[arg(long, default_value = "tag.json")]
  pub tag_file: PathBuf,

  /// Print what would be synced without writing to Notion
  #[arg(long)]
  pub dry_run: bool,

  /// Skip records that have no usable title
  #[arg(long)]
  pub skip_untitled: bool,
}

/// Function for the [`Commands::Sync`] in the CLI.
pub async fn sync(args: SyncArgs) -> Result<()> {
  let zotero = ZoteroClient::new(ZoteroConfig::from_env()?)?;
  let notion = NotionClient::new(NotionConfig::from_env()?)?;
  let scope = args.scope.resolve(&zotero, true).await?;

  let schema: TagSchema =
    if args.tag_file.exists() { load_tag_schema(&args.tag_file)? } else { TagSchema::default() };
  let unpaywall_email =
    std::env::var("UNPAYWALL_EMAIL").ok().filter(|v| !v.trim().is_empty());

  println!("{} Reading the database schema...", style(INFO_PREFIX).cyan());
  let database = notion.database().await?;
  let mapping = build_property_mapping(&database);

  let items = modified_since(zotero.list_items(&scope).await?, args.since_days as f64 * 24.0);

  let mut created = 0usize;
  let mut updated = 0usize;
  let mut skipped = 0usize;
  let mut failed = 0usize;
  for item in items {
    if item.data.is_note() || item.data.is_attachment() {
      continue;
    }
    let title = derive_title(&item.data);
    if args.skip_untitled && title == "(untitled)" {
      skipped += 1;
      continue;
    }

    let labels = match_tags(&title, item.data.abstract_note.as_deref().unwrap_or(""), &schema);
    let children = match zotero.list_children(&item.key).await {
      Ok(children) => children,
      Err(e) => {
        warn!(key = %item.key, error = %e, "children fetch failed, syncing without notes");
        Vec::new()
      },
    };
    let summary = extract_summary_note(&children);
    let pdf_url = resolve_pdf_url(&item.data, unpaywall_email.as_deref()).await;
    let properties =
      make_properties(&item, &mapping, &labels, pdf_url.as_deref(), summary.as_deref());

    if args.dry_run {
      println!(
        "{} Would sync {} ({title}) with labels [{}]",
        style(INFO_PREFIX).cyan(),
        item.key,
        labels.join(", ")
      );
      continue;
    }
    let outcome = match notion.find_existing(&mapping, &item.key, &title).await {
      Ok(Some(page_id)) => notion.update_page(&page_id, &properties).await.map(|()| false),
      Ok(None) => notion.create_page(&properties).await.map(|_| true),
      Err(e) => Err(e),
    };
    match outcome {
      Ok(true) => {
        created += 1;
        println!("{} Created {} ({title})", style(SUCCESS_PREFIX).green(), item.key);
      },
      Ok(false) => {
        updated += 1;
        println!("{} Updated {} ({title})", style(SUCCESS_PREFIX).green(), item.key);
      },
      Err(e) => {
        warn!(key = %item.key, error = %e, "notion write failed, skipping record");
        failed += 1;
      },
    }
  }

  println!(
    "{} Sync done: {created} created, {updated} updated, {skipped} skipped, {failed} failed{}",
    style(SUCCESS_PREFIX).green(),
    if args.dry_run { " (dry run)" } else { "" }
  );
  Ok(())
}
