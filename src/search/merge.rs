use std::collections::HashMap;

use crate::core::types::{Category, Hit, MediaInfo, PageInfo, Query};

/// Tracking params stripped during canonicalization.
const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "yclid", "mc_cid", "mc_eid", "ref", "ref_src", "igshid", "spm",
];

/// The normalized form used for result deduplication: lowercased host plus
/// normalized path (no trailing `/`, no fragment, no tracking params, the
/// remaining query pairs sorted).
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(parsed) = url::Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();
    let mut path = parsed.path().to_string();
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path == "/" {
        path.clear();
    }

    let mut kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_ascii_lowercase();
            !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_str())
        })
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    kept.sort();

    let mut out = format!("{}{}", host, path);
    if !kept.is_empty() {
        out.push('?');
        for (i, (k, v)) in kept.iter().enumerate() {
            if i > 0 {
                out.push('&');
            }
            out.push_str(k);
            out.push('=');
            out.push_str(v);
        }
    }
    out
}

/// Rank-derived contribution of one placement: first place counts full,
/// lower placements decay harmonically.
fn position_score(rank: usize) -> f64 {
    1.0 / (rank as f64 + 1.0)
}

/// One engine's ordered hit list with its fusion weight.
pub struct EngineHits {
    pub engine: String,
    pub weight: f64,
    pub hits: Vec<Hit>,
}

struct MergedEntry {
    hit: Hit,
    score: f64,
    engines: Vec<String>,
    /// Weight of the strongest contributing engine; drives title choice
    /// and tie-breaks.
    best_weight: f64,
    /// Rank within the strongest engine; secondary tie-break.
    best_rank: usize,
    canonical: String,
}

/// Group hits by canonical URL and fuse scores:
/// `score = Σ engine.weight × 1/(rank+1)` across contributing engines.
/// Title/snippet come from the highest-weighted engine; media fields merge
/// field-wise with the same preference.
pub fn merge_hits(batches: Vec<EngineHits>) -> Vec<Hit> {
    let mut groups: HashMap<String, MergedEntry> = HashMap::new();

    for batch in batches {
        for (rank, hit) in batch.hits.into_iter().enumerate() {
            let canonical = canonical_url(&hit.url);
            let contribution = batch.weight * position_score(rank);

            match groups.get_mut(&canonical) {
                None => {
                    groups.insert(
                        canonical.clone(),
                        MergedEntry {
                            hit,
                            score: contribution,
                            engines: vec![batch.engine.clone()],
                            best_weight: batch.weight,
                            best_rank: rank,
                            canonical,
                        },
                    );
                }
                Some(entry) => {
                    entry.score += contribution;
                    if !entry.engines.contains(&batch.engine) {
                        entry.engines.push(batch.engine.clone());
                    }

                    let stronger = batch.weight > entry.best_weight
                        || (batch.weight == entry.best_weight && rank < entry.best_rank);
                    if stronger {
                        // The stronger engine's title/snippet win; keep the
                        // weaker media as gap filler.
                        let old_media = entry.hit.media.take();
                        let mut new_hit = hit;
                        if let Some(old) = old_media {
                            match new_hit.media.as_mut() {
                                Some(media) => media.merge_from(&old),
                                None => new_hit.media = Some(old),
                            }
                        }
                        entry.hit = new_hit;
                        entry.best_weight = batch.weight;
                        entry.best_rank = rank;
                    } else if let Some(media) = hit.media {
                        match entry.hit.media.as_mut() {
                            Some(existing) => existing.merge_from(&media),
                            None => entry.hit.media = Some(media),
                        }
                    }
                }
            }
        }
    }

    let mut merged: Vec<MergedEntry> = groups.into_values().collect();
    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.best_weight
                    .partial_cmp(&a.best_weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.best_rank.cmp(&b.best_rank))
            .then_with(|| a.canonical.cmp(&b.canonical))
    });

    merged
        .into_iter()
        .map(|mut entry| {
            entry.engines.sort();
            entry.hit.engine = entry.engines[0].clone();
            entry.hit.engines = entry.engines;
            entry.hit.score = entry.score;
            entry.hit
        })
        .collect()
}

/// Category-specific post-filters applied between ranking and pagination.
pub fn apply_post_filters(hits: &mut Vec<Hit>, query: &Query) {
    match query.category {
        Category::Videos => {
            if let Some(bucket) = query.filters.get("duration") {
                let range = match bucket.as_str() {
                    "short" => Some((0u64, 240u64)),
                    "medium" => Some((240, 1200)),
                    "long" => Some((1200, u64::MAX)),
                    _ => None,
                };
                if let Some((lo, hi)) = range {
                    // A hit without a known duration cannot satisfy the
                    // bucket and is dropped.
                    hits.retain(|h| {
                        h.media
                            .as_ref()
                            .and_then(|m| m.duration_seconds)
                            .is_some_and(|secs| secs >= lo && secs < hi)
                    });
                }
            }
        }
        Category::Images => {
            let min_w = parse_dim(query.filters.get("min_width"));
            let min_h = parse_dim(query.filters.get("min_height"));
            let max_w = parse_dim(query.filters.get("max_width"));
            let max_h = parse_dim(query.filters.get("max_height"));
            if min_w.is_some() || min_h.is_some() || max_w.is_some() || max_h.is_some() {
                hits.retain(|h| {
                    let Some(media) = h.media.as_ref() else {
                        return true;
                    };
                    dim_ok(media.width, min_w, max_w) && dim_ok(media.height, min_h, max_h)
                });
            }
        }
        _ => {}
    }
}

fn parse_dim(value: Option<&String>) -> Option<u32> {
    value.and_then(|v| v.parse().ok())
}

fn dim_ok(actual: Option<u32>, min: Option<u32>, max: Option<u32>) -> bool {
    let Some(actual) = actual else {
        return true;
    };
    min.is_none_or(|m| actual >= m) && max.is_none_or(|m| actual <= m)
}

/// Slice the merged pool into the requested window and estimate totals.
pub fn paginate(mut hits: Vec<Hit>, query: &Query) -> (Vec<Hit>, PageInfo, u64) {
    let per_page = query.per_page as usize;
    let page = query.page as usize;
    let start = per_page * (page - 1);
    let end = per_page * page;

    let has_more = hits.len() >= end + 1;
    let slice: Vec<Hit> = if start >= hits.len() {
        Vec::new()
    } else {
        hits.drain(..).skip(start).take(per_page).collect()
    };

    // Upstream SERPs expose no reliable counts; the estimate is coarse.
    let total = if has_more {
        (query.per_page as u64) * 10
    } else {
        (per_page * (page - 1) + slice.len()) as u64
    };

    (
        slice,
        PageInfo {
            page: query.page,
            per_page: query.per_page,
            has_more,
        },
        total,
    )
}
