//! Module for the feed-watch and import functionality of the CLI.

use std::collections::HashSet;

use paperflow::{
  sources::{
    arxiv, crossref,
    hf_papers::{fetch_trending, Timeframe},
    semantic_scholar::{self, Lookup, PaperId},
    unpaywall,
  },
  watch::{
    compute_score, fill_missing_updates, load_tag_schema, new_record, Candidate, CandidateSource,
    CreatedItem, LibraryIndex, TagCounters, WatchError, WatchReport,
  },
};

use super::*;

/// Arguments that can be used for the [`Commands::Watch`]
#[derive(Args, Clone)]
pub struct WatchArgs {
  /// Tag taxonomy driving the feed searches
  #[arg(long, default_value = "tag.json")]
  pub tags: PathBuf,

  /// Lookback window for feed entries, in hours
  #[arg(long, default_value_t = 24.0)]
  pub since_hours: f64,

  /// Papers to import per tag
  #[arg(long, default_value_t = 10)]
  pub top_k: usize,

  /// Minimum score for import
  #[arg(long, default_value_t = 0.3)]
  pub min_score: f64,

  /// Create missing per-tag collections and file imports into them
  #[arg(long)]
  pub create_collections: bool,

  /// Patch absent fields on records that already exist
  #[arg(long)]
  pub fill_missing: bool,

  /// Score and report without writing anything
  #[arg(long)]
  pub dry_run: bool,

  /// Write the run report to this JSON file
  #[arg(long)]
  pub report_json: Option<PathBuf>,

  /// Append created records to this JSON array file
  #[arg(long)]
  pub new_items_json: Option<PathBuf>,

  /// Skip the HuggingFace Papers trending feeds
  #[arg(long)]
  pub no_hf_papers: bool,

  /// Trending papers fetched from the daily list
  #[arg(long, default_value_t = 5)]
  pub hf_daily_limit: usize,

  /// Trending papers fetched from the weekly list
  #[arg(long, default_value_t = 20)]
  pub hf_weekly_limit: usize,

  /// Trending papers fetched from the monthly list
  #[arg(long, default_value_t = 50)]
  pub hf_monthly_limit: usize,

  /// Weight of the trending component in the final score
  #[arg(long, default_value_t = 0.3)]
  pub hf_weight: f64,

  /// Score multiplier for the daily trending list
  #[arg(long, default_value_t = 1.0)]
  pub hf_daily_weight: f64,

  /// Score multiplier for the weekly trending list
  #[arg(long, default_value_t = 1.1)]
  pub hf_weekly_weight: f64,

  /// Score multiplier for the monthly trending list
  #[arg(long, default_value_t = 1.2)]
  pub hf_monthly_weight: f64,

  /// Trending papers force-imported per tag even below the threshold
  #[arg(long, default_value_t = 2)]
  pub hf_override_limit: usize,
}

/// Function for the [`Commands::Watch`] in the CLI.
pub async fn watch(args: WatchArgs) -> Result<()> {
  let schema = load_tag_schema(&args.tags)?;
  let client = ZoteroClient::new(ZoteroConfig::from_env()?)?;
  let now = Utc::now();
  let cutoff = now - Duration::milliseconds((args.since_hours * 3_600_000.0) as i64);
  let window_days = (args.since_hours / 24.0).max(0.01);

  let mut report = WatchReport {
    started_at: now.to_rfc3339(),
    params: json!({
      "since_hours": args.since_hours,
      "top_k": args.top_k,
      "min_score": args.min_score,
      "hf_weight": args.hf_weight,
      "hf_override_limit": args.hf_override_limit,
      "create_collections": args.create_collections,
      "fill_missing": args.fill_missing,
      "dry_run": args.dry_run,
    }),
    ..Default::default()
  };

  // Trending feeds, fetched once and shared across tags.
  let mut trending: Vec<Candidate> = Vec::new();
  if !args.no_hf_papers {
    let feeds = [
      (Timeframe::Daily, args.hf_daily_limit, args.hf_daily_weight),
      (Timeframe::Weekly, args.hf_weekly_limit, args.hf_weekly_weight),
      (Timeframe::Monthly, args.hf_monthly_limit, args.hf_monthly_weight),
    ];
    for (timeframe, limit, weight) in feeds {
      if limit == 0 {
        continue;
      }
      match fetch_trending(timeframe, limit).await {
        Ok(papers) => {
          report.hf_sources.insert(timeframe.label().to_string(), papers.len());
          trending.extend(papers.into_iter().map(|p| Candidate::from_trending(p, weight)));
        },
        Err(e) => {
          warn!(timeframe = timeframe.label(), error = %e, "trending fetch failed");
          report.errors.push(WatchError {
            context: format!("hf {}", timeframe.label()),
            error:   e.to_string(),
          });
        },
      }
    }
  }

  println!("{} Indexing the existing library...", style(INFO_PREFIX).cyan());
  let mut index = LibraryIndex::build(client.list_items(&ItemScope::top()).await?);
  let (doi_keys, arxiv_keys, url_keys, title_keys) = index.sizes();
  debug!(doi_keys, arxiv_keys, url_keys, title_keys, "library index built");

  let unpaywall_email =
    std::env::var("UNPAYWALL_EMAIL").ok().filter(|v| !v.trim().is_empty());
  let mut seen_this_run: HashSet<String> = HashSet::new();
  let mut created_items: Vec<CreatedItem> = Vec::new();

  for (tag_key, spec) in &schema {
    let label = non_empty(&spec.label).unwrap_or(tag_key).to_string();
    let mut counters = TagCounters { label: label.clone(), ..Default::default() };
    println!("{} [{label}] searching feeds...", style(INFO_PREFIX).cyan());

    let mut candidates: Vec<Candidate> = Vec::new();
    match arxiv::search_recent(&spec.sample_keywords, cutoff, args.top_k * 5).await {
      Ok(entries) => candidates.extend(entries.into_iter().map(Candidate::from_arxiv)),
      Err(e) => report
        .errors
        .push(WatchError { context: format!("arxiv {tag_key}"), error: e.to_string() }),
    }
    for cand in &trending {
      if cand.matches_keywords(&spec.sample_keywords) {
        counters.hf_candidates += 1;
        candidates.push(cand.clone());
      }
    }

    // In-tag dedupe, first occurrence wins.
    let mut seen_ids = HashSet::new();
    candidates.retain(|c| seen_ids.insert(c.identity()));
    counters.candidates = candidates.len();

    for cand in candidates.iter_mut().take(args.top_k * 5) {
      enrich_candidate(cand, &mut report.errors).await;
      backfill_abstract(cand, &mut report.errors).await;
    }

    for cand in &mut candidates {
      cand.score = compute_score(now, cand, window_days, args.hf_weight);
    }
    candidates
      .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected: Vec<Candidate> =
      candidates.iter().filter(|c| c.score >= args.min_score).take(args.top_k).cloned().collect();

    // Trending papers get a small allowance below the score threshold.
    let selected_ids: HashSet<String> = selected.iter().map(Candidate::identity).collect();
    let overrides: Vec<Candidate> = candidates
      .iter()
      .filter(|c| {
        c.source == CandidateSource::HuggingFace && !selected_ids.contains(&c.identity())
      })
      .take(args.hf_override_limit)
      .cloned()
      .collect();
    counters.hf_overrides = overrides.len();
    selected.extend(overrides);

    let collection = if args.create_collections && !args.dry_run && !selected.is_empty() {
      match client.create_collection_if_missing(&label).await {
        Ok(key) => Some(key),
        Err(e) => {
          report
            .errors
            .push(WatchError { context: format!("collection {label}"), error: e.to_string() });
          None
        },
      }
    } else {
      None
    };

    for cand in &selected {
      if let Some(existing) = index.find(cand) {
        counters.skipped += 1;
        if args.fill_missing && !args.dry_run {
          if let Some((data, fields)) =
            fill_missing_updates(&existing.data, cand, &label, collection.as_deref())
          {
            match client.update_item(&existing.key, existing.version, &data).await {
              Ok(_) => {
                counters.updated += 1;
                println!(
                  "{} Filled {} on {} ({})",
                  style(INFO_PREFIX).cyan(),
                  fields.join(", "),
                  existing.key,
                  cand.title
                );
              },
              Err(e) => report.errors.push(WatchError {
                context: format!("fill {}", existing.key),
                error:   e.to_string(),
              }),
            }
          }
        }
        continue;
      }
      if !seen_this_run.insert(cand.identity()) {
        counters.skipped += 1;
        continue;
      }
      if args.dry_run {
        counters.added += 1;
        println!(
          "{} Would add [{label}] {:.2} {}",
          style(INFO_PREFIX).cyan(),
          cand.score,
          cand.title
        );
        continue;
      }

      let data = new_record(cand, &label, collection.as_deref());
      let keys = match client.create_items(std::slice::from_ref(&data)).await {
        Ok(keys) => keys,
        Err(e) => {
          report
            .errors
            .push(WatchError { context: format!("create {}", cand.title), error: e.to_string() });
          continue;
        },
      };
      let Some(key) = keys.into_iter().next() else {
        report.errors.push(WatchError {
          context: format!("create {}", cand.title),
          error:   "no key in the batch response".into(),
        });
        continue;
      };
      if let Some(pdf_url) = candidate_pdf_url(cand, unpaywall_email.as_deref()).await {
        if let Err(e) = client.create_linked_pdf(&key, "PDF", &pdf_url).await {
          warn!(%key, error = %e, "pdf attach failed");
        }
      }
      index.add(Item { key: key.clone(), version: 0, data });
      created_items.push(CreatedItem {
        key,
        title: cand.title.clone(),
        tag: label.clone(),
        collection_key: collection.clone(),
        created_at: Utc::now().to_rfc3339(),
      });
      counters.added += 1;
      println!(
        "{} Added [{label}] {:.2} {}",
        style(SUCCESS_PREFIX).green(),
        cand.score,
        cand.title
      );
    }

    report.summary.candidates += counters.candidates;
    report.summary.added += counters.added;
    report.summary.skipped += counters.skipped;
    report.summary.updated += counters.updated;
    report.summary.hf_candidates += counters.hf_candidates;
    report.summary.hf_overrides += counters.hf_overrides;
    report.tags.insert(tag_key.clone(), counters);
  }

  report.finished_at = Some(Utc::now().to_rfc3339());
  if let Some(path) = &args.report_json {
    write_json(path, &serde_json::to_value(&report)?)?;
  }
  if let Some(path) = &args.new_items_json {
    if !created_items.is_empty() {
      append_new_items(path, &created_items)?;
    }
  }

  println!(
    "{} Watch done: {} candidates, {} added, {} skipped, {} updated{}",
    style(SUCCESS_PREFIX).green(),
    report.summary.candidates,
    report.summary.added,
    report.summary.skipped,
    report.summary.updated,
    if args.dry_run { " (dry run)" } else { "" }
  );
  Ok(())
}

/// Backfills citation counts and missing fields from the academic graph.
///
/// A rate-limited or unknown DOI falls back to the arXiv id, matching how
/// the graph indexes preprints.
async fn enrich_candidate(candidate: &mut Candidate, errors: &mut Vec<WatchError>) {
  let mut record = None;
  if let Some(doi) = candidate.doi.clone() {
    match semantic_scholar::fetch(PaperId::Doi(&doi)).await {
      Ok(Lookup::Found(found)) => record = Some(found),
      Ok(Lookup::RateLimited) | Ok(Lookup::Absent) => (),
      Err(e) =>
        errors.push(WatchError { context: format!("s2 doi {doi}"), error: e.to_string() }),
    }
  }
  if record.is_none() {
    if let Some(id) = candidate.arxiv_id.clone() {
      match semantic_scholar::fetch(PaperId::Arxiv(&id)).await {
        Ok(Lookup::Found(found)) => record = Some(found),
        Ok(_) => (),
        Err(e) =>
          errors.push(WatchError { context: format!("s2 arxiv {id}"), error: e.to_string() }),
      }
    }
  }
  let Some(record) = record else { return };

  candidate.citations = record.citation_count;
  candidate.influential = record.influential_citation_count;
  if candidate.year.is_none() {
    candidate.year = record.year.map(|y| y.to_string());
  }
  if candidate.abstract_text.is_none() {
    candidate.abstract_text = record.clean_abstract();
  }
  if candidate.doi.is_none() {
    candidate.doi = record.external_ids.doi.as_deref().map(str::to_lowercase);
  }
}

/// Fills a missing abstract from the Crossref registry.
async fn backfill_abstract(candidate: &mut Candidate, errors: &mut Vec<WatchError>) {
  if candidate.abstract_text.is_some() {
    return;
  }
  let Some(doi) = candidate.doi.clone() else { return };
  match crossref::fetch_work(&doi).await {
    Ok(Some(work)) => candidate.abstract_text = work.abstract_text,
    Ok(None) => (),
    Err(e) => errors.push(WatchError { context: format!("crossref {doi}"), error: e.to_string() }),
  }
}

/// Direct PDF link for a candidate: the feed's own link when present, else
/// an Unpaywall lookup by DOI (when an email is configured).
async fn candidate_pdf_url(candidate: &Candidate, unpaywall_email: Option<&str>) -> Option<String> {
  if let Some(url) = &candidate.pdf_url {
    return Some(url.clone());
  }
  let doi = candidate.doi.as_deref()?;
  let email = unpaywall_email?;
  match unpaywall::best_pdf_url(doi, email).await {
    Ok(url) => url,
    Err(e) => {
      debug!(doi, error = %e, "unpaywall lookup failed");
      None
    },
  }
}

/// Writes a value as pretty JSON, creating parent directories when needed.
fn write_json(path: &Path, value: &Value) -> Result<()> {
  if let Some(parent) = path.parent() {
    if !parent.as_os_str().is_empty() {
      std::fs::create_dir_all(parent)?;
    }
  }
  std::fs::write(path, serde_json::to_string_pretty(value)?)?;
  Ok(())
}

/// Appends created records to a JSON array file, creating it when absent so
/// downstream stages can pick new imports up between runs.
fn append_new_items(path: &Path, created: &[CreatedItem]) -> Result<()> {
  let mut entries: Vec<Value> = match std::fs::read_to_string(path) {
    Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
    Err(_) => Vec::new(),
  };
  for item in created {
    entries.push(serde_json::to_value(item)?);
  }
  write_json(path, &Value::Array(entries))
}
