//! Subcommand implementations and shared scoping helpers.

use super::*;

pub mod enrich;
pub mod merge;
pub mod summarize;
pub mod sync;
pub mod watch;

pub use enrich::{enrich, EnrichArgs};
pub use merge::{merge, MergeArgs};
pub use summarize::{summarize, SummarizeArgs};
pub use sync::{sync, SyncArgs};
pub use watch::{watch, WatchArgs};

/// Available commands for the CLI
#[derive(Subcommand)]
pub enum Commands {
  /// Find duplicate records and merge each group onto one survivor
  Merge(MergeArgs),

  /// Score trending and keyword-matched papers and import the best
  Watch(WatchArgs),

  /// Fill missing record metadata from identifier registries
  Enrich(EnrichArgs),

  /// Generate AI summary notes for records with PDF attachments
  Summarize(SummarizeArgs),

  /// Export records into a Notion database
  Sync(SyncArgs),
}

/// Scoping flags shared by every library-reading command.
#[derive(Args, Clone, Default)]
pub struct ScopeArgs {
  /// Restrict to one collection key
  #[arg(long)]
  pub collection: Option<String>,

  /// Restrict to one collection, resolved by name
  #[arg(long, conflicts_with = "collection")]
  pub collection_name: Option<String>,

  /// Restrict to items carrying this tag
  #[arg(long)]
  pub tag: Option<String>,

  /// Stop after this many items (0 = no limit)
  #[arg(long, default_value_t = 0)]
  pub limit: usize,
}

impl ScopeArgs {
  /// Resolves the flags into an [`ItemScope`], looking the collection up by
  /// name when one was given. A name that matches nothing is an error; a
  /// silently empty scope would make a run look clean.
  pub async fn resolve(&self, client: &ZoteroClient, top_only: bool) -> Result<ItemScope> {
    let collection = match (&self.collection, &self.collection_name) {
      (Some(key), _) => Some(key.clone()),
      (None, Some(name)) => {
        let found = client.find_collection_by_name(name).await?;
        let collection = found
          .ok_or_else(|| PaperflowError::Config(format!("collection {name:?} not found")))?;
        Some(collection.key)
      },
      (None, None) => None,
    };
    Ok(ItemScope {
      collection,
      tag: self.tag.clone(),
      limit: (self.limit > 0).then_some(self.limit),
      top_only,
    })
  }
}

/// Keeps items modified within the last `hours` hours. Zero disables the
/// filter; items with a missing or unparsable `dateModified` are kept.
pub fn modified_since(items: Vec<Item>, hours: f64) -> Vec<Item> {
  if hours <= 0.0 {
    return items;
  }
  let cutoff = Utc::now() - Duration::milliseconds((hours * 3_600_000.0) as i64);
  items
    .into_iter()
    .filter(|item| match item.data.date_modified.as_deref().and_then(parse_api_time) {
      Some(at) => at >= cutoff,
      None => true,
    })
    .collect()
}

/// Parses the API's `dateModified` timestamps (RFC 3339 with a `Z` suffix).
fn parse_api_time(text: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
  use paperflow::record::ItemData;

  use super::*;

  fn item(key: &str, modified: Option<&str>) -> Item {
    Item {
      key:     key.into(),
      version: 1,
      data:    ItemData {
        item_type: "journalArticle".into(),
        date_modified: modified.map(String::from),
        ..Default::default()
      },
    }
  }

  #[test]
  fn modified_since_drops_old_items_and_keeps_undated_ones() {
    let items = vec![
      item("OLD00001", Some("2001-01-01T00:00:00Z")),
      item("UNDATED1", None),
      item("GARBLED1", Some("yesterday-ish")),
    ];
    let kept = modified_since(items, 1.0);
    let keys: Vec<&str> = kept.iter().map(|i| i.key.as_str()).collect();
    assert_eq!(keys, ["UNDATED1", "GARBLED1"]);
  }

  #[test]
  fn zero_hours_disables_the_filter() {
    let items = vec![item("OLD00001", Some("2001-01-01T00:00:00Z"))];
    assert_eq!(modified_since(items, 0.0).len(), 1);
  }
}
