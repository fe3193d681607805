//! Module for the duplicate-merge functionality of the CLI.

use dialoguer::Confirm;
use paperflow::{
  bundle::RecordBundle,
  identity::GroupBy,
  merge::{execute_plan, group_bundles, plan_merge, DuplicateGroup, MergePlan, MergeStats},
};

use super::*;

/// Arguments that can be used for the [`Commands::Merge`]
#[derive(Args, Clone)]
pub struct MergeArgs {
  /// Identity to group on: auto, doi, url, or title
  #[arg(long, default_value = "auto")]
  pub group_by: GroupBy,

  /// Scoping flags
  #[command(flatten)]
  pub scope: ScopeArgs,

  /// Only consider items modified within this many hours (0 = all)
  #[arg(long, default_value_t = 0.0)]
  pub modified_since_hours: f64,

  /// Print the merge plans without writing anything
  #[arg(long)]
  pub dry_run: bool,

  /// Skip the confirmation prompt
  #[arg(long, short)]
  pub yes: bool,
}

/// Function for the [`Commands::Merge`] in the CLI.
pub async fn merge(args: MergeArgs) -> Result<()> {
  let client = ZoteroClient::new(ZoteroConfig::from_env()?)?;
  let scope = args.scope.resolve(&client, true).await?;

  println!("{} Scanning the library for duplicates...", style(INFO_PREFIX).cyan());
  let items = modified_since(client.list_items(&scope).await?, args.modified_since_hours);

  let mut bundles = Vec::with_capacity(items.len());
  let mut fetch_failures = 0usize;
  for item in items {
    if item.data.is_note() || item.data.is_attachment() {
      continue;
    }
    let children = match client.list_children(&item.key).await {
      Ok(children) => children,
      Err(e) => {
        warn!(key = %item.key, error = %e, "children fetch failed, skipping record");
        fetch_failures += 1;
        continue;
      },
    };
    bundles.push(RecordBundle::build(item, children));
  }
  if fetch_failures > 0 {
    println!(
      "{} {fetch_failures} records skipped on fetch errors",
      style(WARNING_PREFIX).yellow()
    );
  }

  let groups: Vec<DuplicateGroup> =
    group_bundles(bundles, args.group_by).into_iter().filter(|g| g.is_actionable()).collect();
  if groups.is_empty() {
    println!("{} No duplicate groups found", style(SUCCESS_PREFIX).green());
    return Ok(());
  }

  let plans: Vec<MergePlan> = groups.iter().map(plan_merge).collect();
  let deletions: usize = plans.iter().map(MergePlan::deletions).sum();
  println!(
    "{} {} duplicate groups, {} records would be deleted",
    style(INFO_PREFIX).cyan(),
    groups.len(),
    deletions
  );

  if args.dry_run {
    for (group, plan) in groups.iter().zip(&plans) {
      println!("\n{} {} (keep {})", style("group").yellow().bold(), group.key, plan.winner);
      println!("{}", serde_json::to_string_pretty(&plan.ops)?);
    }
    return Ok(());
  }

  if !args.yes {
    let confirmed = Confirm::new()
      .with_prompt(format!(
        "{PROMPT_PREFIX}Merge {} groups and delete {deletions} records?",
        groups.len()
      ))
      .default(false)
      .interact()?;
    if !confirmed {
      println!("{} Merge cancelled", style(WARNING_PREFIX).yellow());
      return Ok(());
    }
  }

  let mut stats = MergeStats::default();
  for (group, plan) in groups.iter().zip(&plans) {
    execute_plan(&client, group, plan, &mut stats).await;
  }

  println!(
    "{} Merged {} groups: {} operations applied, {} failed, {} records deleted",
    style(SUCCESS_PREFIX).green(),
    stats.groups,
    stats.ops_applied,
    stats.ops_failed,
    stats.deleted
  );
  Ok(())
}
