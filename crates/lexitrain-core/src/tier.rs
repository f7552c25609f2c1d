//! Frequency-tier unlock gate.
//!
//! The catalog is cut into fixed, ordered rank ranges. Tier 1 is always
//! open; tier n+1 opens once the share of tier n's words at recall level or
//! above reaches `unlock_threshold`. Unlocks are permanent.
//!
//! ## Layout
//!
//! With boundaries `[500, 1000, 2000]`:
//!
//! ```text
//! tier 1: ranks    0..=500
//! tier 2: ranks  501..=1000
//! tier 3: ranks 1001..=2000
//! ```
//!
//! Ranks past the last boundary belong to the last tier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, TrainingError, ValidationError};
use crate::mastery::{LearnerWordState, RECALL_LEVEL};
use crate::word::{RankRange, WordCatalog, WordId};

pub const DEFAULT_UNLOCK_THRESHOLD: f64 = 0.70;

/// One frequency tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRecord {
    pub tier_number: u32,
    pub rank_range: RankRange,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

/// Derived numbers for one tier, computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    pub tier_number: u32,
    pub words_total: u32,
    pub words_at_or_above_recall: u32,
    pub ratio: f64,
}

/// Snapshot returned by the planning API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierProgress {
    /// Highest unlocked tier, the one the learner is working through.
    pub tier_number: u32,
    pub ratio: f64,
    pub unlocked_tiers: Vec<u32>,
}

/// Counts learner words at or above recall level inside a rank range.
pub trait LevelSource {
    fn recalled_in_range(&self, range: RankRange) -> Result<u32>;
}

impl LevelSource for HashMap<WordId, LearnerWordState> {
    fn recalled_in_range(&self, range: RankRange) -> Result<u32> {
        Ok(self
            .values()
            .filter(|s| range.contains(s.frequency_rank) && s.mastery_level >= RECALL_LEVEL)
            .count() as u32)
    }
}

impl LevelSource for [LearnerWordState] {
    fn recalled_in_range(&self, range: RankRange) -> Result<u32> {
        Ok(self
            .iter()
            .filter(|s| range.contains(s.frequency_rank) && s.mastery_level >= RECALL_LEVEL)
            .count() as u32)
    }
}

/// Build tier records from ascending upper bounds. Tier 1 starts unlocked.
///
/// # Errors
/// Returns a validation error for an empty or non-ascending boundary list.
pub fn layout(boundaries: &[u32], now: DateTime<Utc>) -> Result<Vec<TierRecord>> {
    if boundaries.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "tiers.boundaries".into(),
            message: "at least one tier is required".into(),
        }
        .into());
    }
    if boundaries.windows(2).any(|w| w[0] >= w[1]) {
        return Err(ValidationError::InvalidValue {
            field: "tiers.boundaries".into(),
            message: "boundaries must be strictly ascending".into(),
        }
        .into());
    }

    let mut start = 0;
    let mut tiers = Vec::with_capacity(boundaries.len());
    for (i, &end) in boundaries.iter().enumerate() {
        let tier_number = i as u32 + 1;
        tiers.push(TierRecord {
            tier_number,
            rank_range: RankRange::new(start, end),
            unlocked: tier_number == 1,
            unlocked_at: (tier_number == 1).then_some(now),
        });
        start = end + 1;
    }
    Ok(tiers)
}

#[derive(Debug, Clone)]
pub struct TierGate {
    tiers: Vec<TierRecord>,
    unlock_threshold: f64,
}

impl TierGate {
    /// # Errors
    /// Fails on an invalid boundary list.
    pub fn new(boundaries: &[u32], unlock_threshold: f64, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            tiers: layout(boundaries, now)?,
            unlock_threshold,
        })
    }

    /// Rebuild the gate from configured boundaries, keeping unlock flags that
    /// were persisted earlier. Re-locking never happens, so a stored unlock
    /// wins over the default layout.
    ///
    /// # Errors
    /// Fails on an invalid boundary list.
    pub fn restore(
        boundaries: &[u32],
        unlock_threshold: f64,
        stored: &[TierRecord],
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let mut gate = Self::new(boundaries, unlock_threshold, now)?;
        for saved in stored.iter().filter(|t| t.unlocked) {
            if let Some(tier) = gate.tier_mut(saved.tier_number) {
                tier.unlocked = true;
                tier.unlocked_at = saved.unlocked_at.or(tier.unlocked_at);
            }
        }
        Ok(gate)
    }

    pub fn unlock_threshold(&self) -> f64 {
        self.unlock_threshold
    }

    pub fn tiers(&self) -> &[TierRecord] {
        &self.tiers
    }

    pub fn tier(&self, tier_number: u32) -> Option<&TierRecord> {
        self.tiers.iter().find(|t| t.tier_number == tier_number)
    }

    fn tier_mut(&mut self, tier_number: u32) -> Option<&mut TierRecord> {
        self.tiers.iter_mut().find(|t| t.tier_number == tier_number)
    }

    fn last_tier_number(&self) -> u32 {
        self.tiers.len() as u32
    }

    /// Tier owning `rank`.
    ///
    /// # Errors
    /// Returns `TierInconsistency` when no configured range contains it.
    pub fn tier_for_rank(&self, word_id: WordId, rank: u32) -> Result<u32, TrainingError> {
        self.tiers
            .iter()
            .find(|t| t.rank_range.contains(rank))
            .map(|t| t.tier_number)
            .ok_or(TrainingError::TierInconsistency { word_id, rank })
    }

    /// Like [`tier_for_rank`](Self::tier_for_rank) but falls back to the
    /// last tier, logging the inconsistency.
    pub fn resolve_tier(&self, word_id: WordId, rank: u32) -> u32 {
        match self.tier_for_rank(word_id, rank) {
            Ok(n) => n,
            Err(err) => {
                tracing::warn!(%err, "treating word as part of the last tier");
                self.last_tier_number()
            }
        }
    }

    pub fn is_unlocked(&self, tier_number: u32) -> bool {
        self.tier(tier_number).map(|t| t.unlocked).unwrap_or(false)
    }

    pub fn first_locked(&self) -> Option<u32> {
        self.tiers.iter().find(|t| !t.unlocked).map(|t| t.tier_number)
    }

    pub fn unlocked_tiers(&self) -> Vec<u32> {
        self.tiers
            .iter()
            .filter(|t| t.unlocked)
            .map(|t| t.tier_number)
            .collect()
    }

    /// Rank ranges new words may be drawn from, in tier order.
    ///
    /// The last tier's range is open-ended so out-of-range ranks stay reachable
    /// once it unlocks.
    pub fn unlocked_ranges(&self) -> Vec<RankRange> {
        let last = self.last_tier_number();
        self.tiers
            .iter()
            .filter(|t| t.unlocked)
            .map(|t| {
                if t.tier_number == last {
                    RankRange::new(t.rank_range.start, u32::MAX)
                } else {
                    t.rank_range
                }
            })
            .collect()
    }

    /// Recall ratio for one tier. An empty tier has ratio 0.
    ///
    /// # Errors
    /// Propagates level source failures.
    pub fn stats<C, L>(&self, tier_number: u32, catalog: &C, levels: &L) -> Result<Option<TierStats>>
    where
        C: WordCatalog + ?Sized,
        L: LevelSource + ?Sized,
    {
        let Some(tier) = self.tier(tier_number) else {
            return Ok(None);
        };
        let words_total = catalog.list_by_rank_range(tier.rank_range).len() as u32;
        let recalled = levels.recalled_in_range(tier.rank_range)?;
        let ratio = if words_total == 0 {
            0.0
        } else {
            f64::from(recalled.min(words_total)) / f64::from(words_total)
        };
        Ok(Some(TierStats {
            tier_number,
            words_total,
            words_at_or_above_recall: recalled,
            ratio,
        }))
    }

    /// Re-evaluate `tier_number` and open the next tier if it has earned it.
    ///
    /// The next tier opens only when `tier_number` is itself unlocked, its
    /// ratio reaches the threshold, and the next tier is the first locked
    /// one. Returns whether the tier after `tier_number` is unlocked once
    /// the call completes; for the last tier that is `false`.
    ///
    /// # Errors
    /// Propagates level source failures.
    pub fn recompute<C, L>(
        &mut self,
        tier_number: u32,
        catalog: &C,
        levels: &L,
        now: DateTime<Utc>,
    ) -> Result<bool>
    where
        C: WordCatalog + ?Sized,
        L: LevelSource + ?Sized,
    {
        let next = tier_number + 1;
        if self.tier(next).is_none() {
            return Ok(false);
        }
        if self.is_unlocked(next) {
            return Ok(true);
        }
        if !self.is_unlocked(tier_number) || self.first_locked() != Some(next) {
            return Ok(false);
        }

        let Some(stats) = self.stats(tier_number, catalog, levels)? else {
            return Ok(false);
        };
        tracing::debug!(
            tier = tier_number,
            ratio = stats.ratio,
            threshold = self.unlock_threshold,
            "tier recomputed"
        );
        if stats.words_total == 0 || stats.ratio < self.unlock_threshold {
            return Ok(false);
        }

        if let Some(record) = self.tier_mut(next) {
            record.unlocked = true;
            record.unlocked_at = Some(now);
        }
        tracing::info!(tier = next, ratio = stats.ratio, "tier unlocked");
        Ok(true)
    }

    /// Progress through the highest unlocked tier.
    ///
    /// # Errors
    /// Propagates level source failures.
    pub fn progress<C, L>(&self, catalog: &C, levels: &L) -> Result<TierProgress>
    where
        C: WordCatalog + ?Sized,
        L: LevelSource + ?Sized,
    {
        let unlocked_tiers = self.unlocked_tiers();
        let tier_number = unlocked_tiers.last().copied().unwrap_or(1);
        let ratio = self
            .stats(tier_number, catalog, levels)?
            .map(|s| s.ratio)
            .unwrap_or(0.0);
        Ok(TierProgress {
            tier_number,
            ratio,
            unlocked_tiers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::{MemoryCatalog, WordRef};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).unwrap()
    }

    fn catalog(ranks: impl IntoIterator<Item = u32>) -> MemoryCatalog {
        MemoryCatalog::new(ranks.into_iter().map(|r| WordRef {
            id: i64::from(r),
            frequency_rank: r,
            part_of_speech: None,
            lemma: String::new(),
            translations: Vec::new(),
        }))
    }

    fn learned(ranks: impl IntoIterator<Item = u32>, level: u8) -> Vec<LearnerWordState> {
        ranks
            .into_iter()
            .map(|r| {
                let mut s = LearnerWordState::unseen(i64::from(r), r, now());
                s.mastery_level = level;
                s
            })
            .collect()
    }

    #[test]
    fn layout_is_contiguous_and_opens_tier_one() {
        let tiers = layout(&[500, 1000, 2000], now()).unwrap();
        assert_eq!(tiers[0].rank_range, RankRange::new(0, 500));
        assert_eq!(tiers[1].rank_range, RankRange::new(501, 1000));
        assert_eq!(tiers[2].rank_range, RankRange::new(1001, 2000));
        assert!(tiers[0].unlocked);
        assert!(!tiers[1].unlocked);
    }

    #[test]
    fn layout_rejects_unsorted_boundaries() {
        assert!(layout(&[1000, 500], now()).is_err());
        assert!(layout(&[], now()).is_err());
    }

    #[test]
    fn seventy_percent_unlocks_next_tier() {
        let mut gate = TierGate::new(&[300, 600], 0.70, now()).unwrap();
        let catalog = catalog(1..=300);
        let states = learned(1..=210, 3);
        assert!(gate.recompute(1, &catalog, states.as_slice(), now()).unwrap());
        assert!(gate.is_unlocked(2));
        assert_eq!(gate.tier(2).unwrap().unlocked_at, Some(now()));
    }

    #[test]
    fn below_threshold_stays_locked() {
        let mut gate = TierGate::new(&[300, 600], 0.70, now()).unwrap();
        let catalog = catalog(1..=300);
        let mut states = learned(1..=209, 3);
        states.extend(learned(210..=300, 2));
        assert!(!gate.recompute(1, &catalog, states.as_slice(), now()).unwrap());
        assert!(!gate.recompute(1, &catalog, states.as_slice(), now()).unwrap());
        assert!(!gate.is_unlocked(2));
    }

    #[test]
    fn unlock_is_permanent() {
        let mut gate = TierGate::new(&[10, 20], 0.5, now()).unwrap();
        let catalog = catalog(1..=10);
        let strong = learned(1..=10, 5);
        assert!(gate.recompute(1, &catalog, strong.as_slice(), now()).unwrap());
        let weak = learned(1..=10, 1);
        assert!(gate.recompute(1, &catalog, weak.as_slice(), now()).unwrap());
    }

    #[test]
    fn tiers_unlock_in_order_only() {
        let mut gate = TierGate::new(&[10, 20, 30], 0.5, now()).unwrap();
        let catalog = catalog(1..=30);
        let states = learned(11..=20, 4);
        assert!(!gate.recompute(2, &catalog, states.as_slice(), now()).unwrap());
        assert_eq!(gate.unlocked_tiers(), vec![1]);
    }

    #[test]
    fn empty_tier_never_unlocks_next() {
        let mut gate = TierGate::new(&[10, 20], 0.0, now()).unwrap();
        let catalog = catalog(std::iter::empty());
        let states: Vec<LearnerWordState> = Vec::new();
        assert!(!gate.recompute(1, &catalog, states.as_slice(), now()).unwrap());
    }

    #[test]
    fn out_of_range_rank_resolves_to_last_tier() {
        let gate = TierGate::new(&[10, 20], 0.7, now()).unwrap();
        assert_eq!(gate.resolve_tier(1, 15), 2);
        assert_eq!(gate.resolve_tier(1, 99), 2);
        assert!(matches!(
            gate.tier_for_rank(1, 99),
            Err(TrainingError::TierInconsistency { rank: 99, .. })
        ));
    }

    #[test]
    fn restore_keeps_stored_unlocks() {
        let mut stored = layout(&[10, 20, 30], now()).unwrap();
        stored[1].unlocked = true;
        let gate = TierGate::restore(&[10, 20, 30], 0.7, &stored, now()).unwrap();
        assert_eq!(gate.unlocked_tiers(), vec![1, 2]);
        assert_eq!(gate.first_locked(), Some(3));
    }

    #[test]
    fn progress_reports_highest_unlocked_tier() {
        let mut gate = TierGate::new(&[4, 8], 0.5, now()).unwrap();
        let catalog = catalog(1..=8);
        let mut states = learned(1..=4, 3);
        states.extend(learned(5..=5, 3));
        gate.recompute(1, &catalog, states.as_slice(), now()).unwrap();
        let progress = gate.progress(&catalog, states.as_slice()).unwrap();
        assert_eq!(progress.tier_number, 2);
        assert_eq!(progress.unlocked_tiers, vec![1, 2]);
        assert!((progress.ratio - 0.25).abs() < 1e-9);
    }
}
