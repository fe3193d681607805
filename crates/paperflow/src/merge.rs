//! Duplicate grouping, winner selection, and merge planning.
//!
//! The pipeline is deliberately staged so every destructive decision is
//! inspectable before anything is written:
//!
//! 1. [`group_bundles`] partitions bundles by identity key, preserving
//!    encounter order.
//! 2. [`plan_merge`] picks the surviving record for a group and emits the
//!    exact operation list that would merge the rest into it.
//! 3. [`execute_plan`] applies a plan through the [`BibliographyGateway`]
//!    seam, logging and counting failures without aborting the run.
//!
//! Planning is pure; a dry run prints plans and simply never calls the
//! gateway. Re-running after a partial failure converges, because children
//! equivalent to ones already on the winner are not re-emitted.

use super::*;

/// Records sharing one identity key, in encounter order.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
  /// The shared identity key
  pub key:     IdentityKey,
  /// Member bundles; index 0 was encountered first
  pub bundles: Vec<RecordBundle>,
}

impl DuplicateGroup {
  /// Groups of one need no merging.
  pub fn is_actionable(&self) -> bool { self.bundles.len() > 1 }
}

/// Partitions bundles into duplicate groups.
///
/// Group order follows first encounter of each key, and members keep their
/// encounter order, so output never depends on hash iteration. Bundles that
/// do not resolve under a `group-by` override are dropped.
pub fn group_bundles(bundles: Vec<RecordBundle>, group_by: GroupBy) -> Vec<DuplicateGroup> {
  let mut groups: Vec<DuplicateGroup> = Vec::new();
  let mut index: HashMap<IdentityKey, usize> = HashMap::new();
  for bundle in bundles {
    let Some(key) = resolve(&bundle.record.data, group_by) else {
      debug!(record = bundle.key(), "record lacks the grouping field, skipping");
      continue;
    };
    match index.get(&key) {
      Some(&slot) => groups[slot].bundles.push(bundle),
      None => {
        index.insert(key.clone(), groups.len());
        groups.push(DuplicateGroup { key, bundles: vec![bundle] });
      },
    }
  }
  groups
}

/// Index of the winning bundle in a group.
///
/// Cascading comparator: has_pdf, then has_notes, then last_modified, all
/// descending. A strictly-greater fold keeps the first-encountered bundle
/// on full ties.
pub fn select_winner(bundles: &[RecordBundle]) -> usize {
  let rank = |b: &RecordBundle| (b.has_pdf, b.has_notes, b.last_modified);
  let mut best = 0;
  for (i, bundle) in bundles.iter().enumerate().skip(1) {
    if rank(bundle) > rank(&bundles[best]) {
      best = i;
    }
  }
  best
}

/// One mutation in a merge plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum MergeOp {
  /// Move a child from a losing record to the winner
  Reparent {
    /// Child item key
    child: String,
    /// Losing record currently holding the child
    from:  String,
    /// Winning record
    to:    String,
  },
  /// Replace the winner's tags with the union over the group
  UnionTags {
    /// Winning record
    record: String,
    /// Full tag list to write, winner's tags first
    tags:   Vec<String>,
  },
  /// Replace the winner's collections with the union over the group
  UnionCollections {
    /// Winning record
    record:      String,
    /// Full collection key list to write, winner's first
    collections: Vec<String>,
  },
  /// Delete a losing record
  Delete {
    /// Losing record key
    record: String,
  },
}

/// The full mutation list for one duplicate group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergePlan {
  /// Key of the surviving record
  pub winner: String,
  /// Operations in execution order
  pub ops:    Vec<MergeOp>,
}

impl MergePlan {
  /// Number of losing records this plan deletes.
  pub fn deletions(&self) -> usize {
    self.ops.iter().filter(|op| matches!(op, MergeOp::Delete { .. })).count()
  }
}

/// Plans the merge for one group.
///
/// Reparents each loser child that has no equivalent already on the winner,
/// unions tags and collections onto the winner when the union adds
/// anything, and deletes every loser. The winner is never deleted. For a
/// single-member group the plan is empty.
pub fn plan_merge(group: &DuplicateGroup) -> MergePlan {
  let winner_index = select_winner(&group.bundles);
  let winner = &group.bundles[winner_index];
  let winner_key = winner.key().to_string();
  let mut ops = Vec::new();

  // Signatures of children already on (or headed to) the winner.
  let mut seen: HashSet<String> = winner.children().map(|c| child_signature(&c.data)).collect();

  let mut tags: Vec<String> =
    winner.record.data.tag_names().iter().map(|t| t.to_string()).collect();
  let mut collections = winner.record.data.collections.clone();
  let mut tags_grew = false;
  let mut collections_grew = false;

  for (i, loser) in group.bundles.iter().enumerate() {
    if i == winner_index {
      continue;
    }
    for child in loser.children() {
      let signature = child_signature(&child.data);
      if seen.insert(signature) {
        ops.push(MergeOp::Reparent {
          child: child.key.clone(),
          from:  loser.key().to_string(),
          to:    winner_key.clone(),
        });
      }
    }
    for tag in loser.record.data.tag_names() {
      if !tags.iter().any(|t| t == tag) {
        tags.push(tag.to_string());
        tags_grew = true;
      }
    }
    for collection in &loser.record.data.collections {
      if !collections.contains(collection) {
        collections.push(collection.clone());
        collections_grew = true;
      }
    }
  }

  if tags_grew {
    ops.push(MergeOp::UnionTags { record: winner_key.clone(), tags });
  }
  if collections_grew {
    ops.push(MergeOp::UnionCollections { record: winner_key.clone(), collections });
  }
  for (i, loser) in group.bundles.iter().enumerate() {
    if i != winner_index {
      ops.push(MergeOp::Delete { record: loser.key().to_string() });
    }
  }

  MergePlan { winner: winner_key, ops }
}

/// Equivalence signature for reparent idempotence.
///
/// Notes match on tag-stripped, whitespace-collapsed text; attachments on
/// link mode plus URL, filename, or title, whichever is present first.
fn child_signature(data: &ItemData) -> String {
  if data.is_note() {
    let text = sources::strip_tags(data.note.as_deref().unwrap_or(""));
    return format!("note:{}", text.to_lowercase());
  }
  let mode = data
    .link_mode
    .map(|m| serde_json::to_string(&m).unwrap_or_default())
    .unwrap_or_default();
  let locator = non_empty(&data.url)
    .or_else(|| non_empty(&data.filename))
    .or_else(|| non_empty(&data.title))
    .unwrap_or("");
  format!("att:{mode}:{}", locator.to_lowercase())
}

/// Narrow mutation seam between the merge executor and the store.
///
/// Production code plugs in the Zotero client; tests plug in an in-memory
/// fake to count or fail calls.
#[async_trait]
pub trait BibliographyGateway: Send + Sync {
  /// Writes a record payload under optimistic concurrency, returning the
  /// new version.
  async fn update_record(&self, key: &str, version: u64, data: &ItemData) -> Result<u64>;

  /// Deletes a record under optimistic concurrency.
  async fn delete_record(&self, key: &str, version: u64) -> Result<()>;
}

/// Counters for one merge run.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeStats {
  /// Actionable groups processed
  pub groups:      usize,
  /// Mutations that succeeded
  pub ops_applied: usize,
  /// Mutations that failed and were skipped
  pub ops_failed:  usize,
  /// Losing records actually deleted
  pub deleted:     usize,
}

/// Applies one plan through the gateway.
///
/// Execution is sequential and non-atomic: each failed operation is logged,
/// counted, and skipped. Consecutive writes to the winner thread the
/// returned version so the second write does not trip the optimistic lock.
pub async fn execute_plan(
  gateway: &dyn BibliographyGateway,
  group: &DuplicateGroup,
  plan: &MergePlan,
  stats: &mut MergeStats,
) {
  stats.groups += 1;
  let mut winner_version = version_of(group, &plan.winner);
  let mut winner_data = data_of(group, &plan.winner);

  for op in &plan.ops {
    let outcome = match op {
      MergeOp::Reparent { child, to, .. } => {
        match group.bundles.iter().flat_map(|b| b.children()).find(|c| c.key == *child) {
          Some(item) => {
            let mut data = item.data.clone();
            data.parent_item = Some(to.clone());
            gateway.update_record(child, item.version, &data).await.map(|_| ())
          },
          None => Err(PaperflowError::Api(format!("child {child} vanished from the group"))),
        }
      },
      MergeOp::UnionTags { record, tags } => {
        winner_data.tags = tags.iter().map(Tag::new).collect();
        match gateway.update_record(record, winner_version, &winner_data).await {
          Ok(version) => {
            winner_version = version;
            Ok(())
          },
          Err(e) => Err(e),
        }
      },
      MergeOp::UnionCollections { record, collections } => {
        winner_data.collections = collections.clone();
        match gateway.update_record(record, winner_version, &winner_data).await {
          Ok(version) => {
            winner_version = version;
            Ok(())
          },
          Err(e) => Err(e),
        }
      },
      MergeOp::Delete { record } => {
        let deleted = gateway.delete_record(record, version_of(group, record)).await;
        if deleted.is_ok() {
          stats.deleted += 1;
        }
        deleted
      },
    };

    match outcome {
      Ok(()) => stats.ops_applied += 1,
      Err(e) => {
        warn!(group = %group.key, ?op, error = %e, "merge operation failed, continuing");
        stats.ops_failed += 1;
      },
    }
  }
}

/// Current version of a record inside the group.
fn version_of(group: &DuplicateGroup, key: &str) -> u64 {
  group.bundles.iter().find(|b| b.key() == key).map(|b| b.record.version).unwrap_or(0)
}

/// Payload of a record inside the group; empty payload when absent.
fn data_of(group: &DuplicateGroup, key: &str) -> ItemData {
  group
    .bundles
    .iter()
    .find(|b| b.key() == key)
    .map(|b| b.record.data.clone())
    .unwrap_or_default()
}
