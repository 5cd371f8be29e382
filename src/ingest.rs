use crate::db::{self, NewEntry, Pool};
use crate::model::{entry_id, Candidate};
use anyhow::Result;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub seen: usize,
    pub inserted: usize,
}

/// Record first sightings of the batch. Rows that already exist keep their
/// delivery flags; duplicates inside the batch are absorbed the same way.
#[instrument(skip_all)]
pub async fn merge_candidates(pool: &Pool, batch: &[Candidate]) -> Result<MergeStats> {
    let mut stats = MergeStats::default();
    for candidate in batch {
        let url = candidate.url.trim();
        if url.is_empty() {
            warn!(title = %candidate.title, "candidate without url; skipping");
            continue;
        }
        stats.seen += 1;
        let id = entry_id(url);
        let inserted = db::upsert_if_absent(
            pool,
            &NewEntry {
                id: &id,
                url,
                title: &candidate.title,
                published: &candidate.published,
            },
        )
        .await?;
        if inserted {
            stats.inserted += 1;
            debug!(%url, "new entry");
        }
    }
    info!(seen = stats.seen, inserted = stats.inserted, "merge done");
    Ok(stats)
}
