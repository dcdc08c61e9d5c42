//! Offset-vote matching of query landmarks against the index.

use std::collections::{HashMap, HashSet};

use crate::index::{Database, IndexError, LandmarkRow};
use crate::landmark::{Key, Landmark};

/// Keep every Nth query landmark before lookup.
///
/// Landmark generation is redundant enough that thinning the query set
/// trades little recall for a large lookup saving.
const QUERY_STRIDE: usize = 3;

/// Best candidate found for a query, threshold not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub song_name: Option<String>,
    pub score: u32,
    /// Winning alignment: indexed anchor time minus query anchor time,
    /// seconds. Only meaningful when `song_name` is set.
    pub offset: f64,
}

impl MatchOutcome {
    fn no_match() -> Self {
        Self { song_name: None, score: 0, offset: 0.0 }
    }
}

/// Find the indexed song best aligned with the query landmarks.
///
/// Votes are tallied per `(song, offset)` bucket; a genuine match
/// concentrates votes on a single offset while coincidental key collisions
/// scatter. The caller decides whether the winning score clears its
/// confidence threshold.
pub async fn best_match(db: &Database, query: &[Landmark]) -> Result<MatchOutcome, IndexError> {
    let sampled: Vec<&Landmark> = query.iter().step_by(QUERY_STRIDE).collect();
    if sampled.is_empty() {
        return Ok(MatchOutcome::no_match());
    }

    let keys: Vec<Key> = sampled
        .iter()
        .map(|l| l.key())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let rows = db.lookup(&keys).await?;

    let Some((song_id, offset, score)) = tally_votes(&sampled, &rows) else {
        return Ok(MatchOutcome::no_match());
    };

    // A dangling song_id means the index is inconsistent; report no match
    // rather than failing the query.
    match db.song_name(song_id).await? {
        Some(name) => Ok(MatchOutcome { song_name: Some(name), score, offset }),
        None => {
            log::warn!("landmark rows reference missing song {song_id}");
            Ok(MatchOutcome::no_match())
        }
    }
}

/// Tally `(song, offset)` votes and pick the winner.
///
/// Offsets are rounded to hundredths of a second and kept as integer
/// hundredths so buckets hash exactly. Ties are resolved deterministically:
/// highest count first, then the smallest `(song_id, offset)` pair.
fn tally_votes(query: &[&Landmark], rows: &[LandmarkRow]) -> Option<(i64, f64, u32)> {
    let mut anchors_by_key: HashMap<Key, Vec<f64>> = HashMap::new();
    for landmark in query {
        anchors_by_key
            .entry(landmark.key())
            .or_default()
            .push(landmark.anchor_t);
    }

    let mut votes: HashMap<(i64, i64), u32> = HashMap::new();
    for row in rows {
        if let Some(anchor_times) = anchors_by_key.get(&row.key()) {
            for &query_t in anchor_times {
                let hundredths = ((row.time_offset - query_t) * 100.0).round() as i64;
                *votes.entry((row.song_id, hundredths)).or_default() += 1;
            }
        }
    }

    votes
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|((song_id, hundredths), count)| (song_id, hundredths as f64 / 100.0, count))
}
