//! Module for the metadata-enrichment functionality of the CLI.

use paperflow::enrich::{build_updates, collect_metadata, needs_enrichment};

use super::*;

/// Arguments that can be used for the [`Commands::Enrich`]
#[derive(Args, Clone)]
pub struct EnrichArgs {
  /// Scoping flags
  #[command(flatten)]
  pub scope: ScopeArgs,

  /// Only consider items modified within this many hours (0 = all)
  #[arg(long, default_value_t = 0.0)]
  pub modified_since_hours: f64,

  /// Also read reachable PDFs for identifiers and a title guess
  #[arg(long)]
  pub use_pdf: bool,

  /// Largest PDF to download, in bytes
  #[arg(long, default_value_t = 8_000_000)]
  pub max_pdf_bytes: usize,

  /// Print the updates without writing anything
  #[arg(long)]
  pub dry_run: bool,
}

/// Function for the [`Commands::Enrich`] in the CLI.
pub async fn enrich(args: EnrichArgs) -> Result<()> {
  let client = ZoteroClient::new(ZoteroConfig::from_env()?)?;
  let scope = args.scope.resolve(&client, true).await?;
  let items = modified_since(client.list_items(&scope).await?, args.modified_since_hours);

  let mut scanned = 0usize;
  let mut updated = 0usize;
  let mut failed = 0usize;
  for item in items {
    if item.data.is_note() || item.data.is_attachment() {
      continue;
    }
    scanned += 1;
    if !needs_enrichment(&item.data) {
      continue;
    }
    let children = match client.list_children(&item.key).await {
      Ok(children) => children,
      Err(e) => {
        warn!(key = %item.key, error = %e, "children fetch failed, skipping record");
        failed += 1;
        continue;
      },
    };
    let (patch, sources) =
      match collect_metadata(&client, &item, &children, args.use_pdf, args.max_pdf_bytes).await {
        Ok(resolved) => resolved,
        Err(e) => {
          warn!(key = %item.key, error = %e, "metadata collection failed, skipping item");
          failed += 1;
          continue;
        },
      };
    let Some((data, fields)) = build_updates(&item.data, &patch) else {
      debug!(key = %item.key, "nothing to fill");
      continue;
    };

    let title = non_empty(&item.data.title).unwrap_or("(untitled)");
    if args.dry_run {
      println!(
        "{} Would update {} ({title}) via [{}]: {}",
        style(INFO_PREFIX).cyan(),
        item.key,
        sources.join(", "),
        fields.join(", ")
      );
      updated += 1;
      continue;
    }
    match client.update_item(&item.key, item.version, &data).await {
      Ok(_) => {
        updated += 1;
        println!(
          "{} Updated {} ({title}): {}",
          style(SUCCESS_PREFIX).green(),
          item.key,
          fields.join(", ")
        );
      },
      Err(e) => {
        warn!(key = %item.key, error = %e, "update failed, skipping item");
        failed += 1;
      },
    }
  }

  println!(
    "{} Enrichment done: {scanned} records scanned, {updated} updated, {failed} failed{}",
    style(SUCCESS_PREFIX).green(),
    if args.dry_run { " (dry run)" } else { "" }
  );
  Ok(())
}
