//! Global boundary selection.
//!
//! Picks exactly the expected number of boundaries from the merged
//! candidate pool, maximizing combined score under a minimum-spacing
//! constraint, relaxing the spacing only when the pool cannot otherwise
//! satisfy the count.

use chaptersmith_core::SegmentConfig;
use tracing::{info, warn};

use crate::boundary::{Boundary, Candidate};

/// The optimizer's result: boundaries in file order, plus how many short
/// of the expected count the pool proved to be.
#[derive(Debug)]
pub struct OptimizedSelection {
    pub boundaries: Vec<Boundary>,
    pub shortfall: usize,
}

pub struct GlobalOptimizer<'a> {
    config: &'a SegmentConfig,
}

impl<'a> GlobalOptimizer<'a> {
    pub fn new(config: &'a SegmentConfig) -> Self {
        Self { config }
    }

    /// Select exactly `expected` boundaries if the pool allows it.
    ///
    /// Greedy descent by combined score with minimum spacing
    /// `max(avg_chapter_bytes / 4, floor)`; the spacing is halved per
    /// relaxation pass when the strict constraint starves the selection.
    /// Score ties break toward the ideal stride grid.
    pub fn select(
        &self,
        candidates: &[Candidate],
        expected: usize,
        file_size: u64,
    ) -> OptimizedSelection {
        if candidates.is_empty() || expected == 0 {
            return OptimizedSelection {
                boundaries: Vec::new(),
                shortfall: expected,
            };
        }

        let stride = (file_size / expected as u64).max(1);
        let base_spacing = (stride / 4).max(self.config.min_spacing_floor);

        // Deduplicate by position, then order by score with the stride
        // tie-break so the greedy pass is deterministic.
        let mut pool: Vec<&Candidate> = Vec::with_capacity(candidates.len());
        {
            let mut seen = std::collections::HashSet::new();
            for candidate in candidates {
                if seen.insert(candidate.byte_offset) {
                    pool.push(candidate);
                }
            }
        }
        pool.sort_by(|a, b| {
            b.combined_score()
                .partial_cmp(&a.combined_score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    grid_distance(a.byte_offset, stride, expected)
                        .cmp(&grid_distance(b.byte_offset, stride, expected))
                })
                .then_with(|| a.byte_offset.cmp(&b.byte_offset))
        });

        info!(
            "Optimizer: selecting {expected} from {} candidates (spacing {}B)",
            pool.len(),
            base_spacing
        );

        let mut best: Vec<&Candidate> = Vec::new();
        for pass in 0..=self.config.spacing_relax_passes {
            let spacing = base_spacing >> pass;
            let selected = greedy_pick(&pool, expected, spacing);

            if selected.len() > best.len() {
                best = selected;
            }
            if best.len() >= expected {
                break;
            }
            warn!(
                "Spacing {}B yielded {}/{} boundaries; relaxing",
                spacing,
                best.len(),
                expected
            );
        }

        let shortfall = expected.saturating_sub(best.len());
        if shortfall > 0 {
            warn!("Optimizer shortfall: {}/{} boundaries", best.len(), expected);
        }

        let mut boundaries: Vec<Boundary> = best
            .into_iter()
            .map(|c| Boundary {
                line_num: c.line_num,
                byte_offset: c.byte_offset,
                text: c.text.clone(),
                score: Some(c.combined_score()),
                source: c.source,
            })
            .collect();
        boundaries.sort_by_key(|b| b.byte_offset);

        OptimizedSelection {
            boundaries,
            shortfall,
        }
    }
}

/// Distance to the nearest ideal chapter-start offset `k * stride`,
/// k in `0..expected`.
fn grid_distance(offset: u64, stride: u64, expected: usize) -> u64 {
    let nearest = ((offset + stride / 2) / stride).min(expected.saturating_sub(1) as u64);
    offset.abs_diff(nearest * stride)
}

fn greedy_pick<'c>(
    pool: &[&'c Candidate],
    expected: usize,
    min_spacing: u64,
) -> Vec<&'c Candidate> {
    let mut chosen: Vec<&Candidate> = Vec::with_capacity(expected);
    for candidate in pool {
        if chosen.len() >= expected {
            break;
        }
        let conflict = chosen
            .iter()
            .any(|sel| sel.byte_offset.abs_diff(candidate.byte_offset) < min_spacing);
        if !conflict {
            chosen.push(candidate);
        }
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundarySource;

    fn candidate(byte_offset: u64, structural: f32, ai: Option<f32>) -> Candidate {
        Candidate {
            line_num: (byte_offset / 100) as usize,
            byte_offset,
            text: format!("후보 {byte_offset}"),
            structural,
            ai,
            source: BoundarySource::Structural,
        }
    }

    #[test]
    fn test_exact_selection_in_file_order() {
        let config = SegmentConfig::default();
        let optimizer = GlobalOptimizer::new(&config);

        // 10 strong candidates evenly spread over 100 KB, plus weak noise
        let mut pool: Vec<Candidate> = (0..10)
            .map(|i| candidate(i * 10_000, 0.9, Some(0.9)))
            .collect();
        pool.extend((0..20).map(|i| candidate(i * 4_700 + 137, 0.2, Some(0.1))));

        let selection = optimizer.select(&pool, 10, 100_000);
        assert_eq!(selection.boundaries.len(), 10);
        assert_eq!(selection.shortfall, 0);

        for pair in selection.boundaries.windows(2) {
            assert!(pair[0].byte_offset < pair[1].byte_offset);
        }
        // The strong grid wins
        assert!(selection
            .boundaries
            .iter()
            .all(|b| b.byte_offset % 10_000 == 0));
    }

    #[test]
    fn test_spacing_enforced() {
        let config = SegmentConfig::default();
        let optimizer = GlobalOptimizer::new(&config);

        // Candidates clustered 100 bytes apart can never satisfy the
        // spacing floor for more than one pick per cluster region.
        let pool: Vec<Candidate> = (0..5).map(|i| candidate(i * 100, 0.9, None)).collect();
        let selection = optimizer.select(&pool, 2, 400_000);

        // avg/4 = 50 KB; even fully relaxed (÷8) spacing is 6.25 KB, far
        // beyond the 400-byte cluster: only one boundary fits.
        assert_eq!(selection.boundaries.len(), 1);
        assert_eq!(selection.shortfall, 1);
    }

    #[test]
    fn test_relaxation_recovers_count() {
        let config = SegmentConfig::default();
        let optimizer = GlobalOptimizer::new(&config);

        // avg/4 = 2.5 KB > floor; candidates 1.5 KB apart need one halving
        let pool: Vec<Candidate> = (0..10).map(|i| candidate(i * 1_500, 0.8, None)).collect();
        let selection = optimizer.select(&pool, 10, 100_000);

        assert_eq!(selection.boundaries.len(), 10);
        assert_eq!(selection.shortfall, 0);
    }

    #[test]
    fn test_tie_breaks_toward_stride_grid() {
        let config = SegmentConfig::default();
        let optimizer = GlobalOptimizer::new(&config);

        // Equal scores; the candidate on an ideal chapter-start offset wins
        let on_grid = candidate(50_000, 0.8, Some(0.8));
        let off_grid = candidate(71_300, 0.8, Some(0.8));
        let selection = optimizer.select(&[off_grid.clone(), on_grid], 2, 100_000);
        assert_eq!(selection.boundaries[0].byte_offset, 50_000);

        let selection = optimizer.select(&[off_grid, candidate(20_000, 0.8, Some(0.8))], 1, 100_000);
        assert_eq!(selection.boundaries.len(), 1);
        assert_eq!(selection.boundaries[0].byte_offset, 20_000);
    }

    #[test]
    fn test_empty_pool() {
        let config = SegmentConfig::default();
        let optimizer = GlobalOptimizer::new(&config);
        let selection = optimizer.select(&[], 5, 10_000);
        assert!(selection.boundaries.is_empty());
        assert_eq!(selection.shortfall, 5);
    }
}
