//! Learner statistics: today's numbers, study streak, weekly history,
//! mastery distribution, text coverage and a yearly activity heatmap.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mastery::RECALL_LEVEL;
use crate::storage::{DailyStats, Database};

const HISTORY_DAYS: i64 = 7;

/// (known words, percent of running text covered) breakpoints.
const COVERAGE_THRESHOLDS: [(u32, f64); 8] = [
    (100, 50.0),
    (300, 65.0),
    (500, 72.0),
    (1000, 80.0),
    (2000, 86.0),
    (3000, 90.0),
    (5000, 95.0),
    (10000, 98.0),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub today: DailyStats,
    pub accuracy: f64,
    pub streak_days: u32,
    /// Last seven days, oldest first, today included.
    pub history: Vec<DailyStats>,
    /// Word counts for mastery levels 0 through 7.
    pub level_distribution: [u32; 8],
    pub words_introduced: u32,
    pub words_at_or_above_recall: u32,
    /// Estimated share of everyday text covered by introduced words.
    pub coverage_percent: f64,
}

/// One day of the activity heatmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapDay {
    pub date: NaiveDate,
    pub reviews: u32,
    /// 0 for no activity, otherwise the quartile (1-4) of the busiest day.
    pub intensity: u8,
}

/// Estimated text coverage for a number of known words, interpolated
/// linearly between frequency breakpoints and rounded to two decimals.
pub fn coverage_percent(words_known: u32) -> f64 {
    if words_known == 0 {
        return 0.0;
    }
    let mut prev = (0u32, 0.0f64);
    for &(words, percent) in &COVERAGE_THRESHOLDS {
        if words_known <= words {
            let ratio = f64::from(words_known - prev.0) / f64::from(words - prev.0);
            let value = prev.1 + ratio * (percent - prev.1);
            return (value * 100.0).round() / 100.0;
        }
        prev = (words, percent);
    }
    prev.1
}

fn intensity(reviews: u32, busiest: u32) -> u8 {
    if reviews == 0 {
        return 0;
    }
    let share = f64::from(reviews) / f64::from(busiest.max(1));
    match share {
        s if s <= 0.25 => 1,
        s if s <= 0.5 => 2,
        s if s <= 0.75 => 3,
        _ => 4,
    }
}

/// Consecutive study days ending today. `dates` must be newest first.
pub fn study_streak(dates: &[NaiveDate], today: NaiveDate) -> u32 {
    let mut expected = today;
    let mut streak = 0;
    for &date in dates {
        if date > expected {
            continue;
        }
        if date != expected {
            break;
        }
        streak += 1;
        expected -= Duration::days(1);
    }
    streak
}

/// # Errors
/// Propagates database failures.
pub fn today(db: &Database, today: NaiveDate) -> Result<DailyStats> {
    db.daily_stats(today)
}

/// # Errors
/// Propagates database failures.
pub fn dashboard(db: &Database, today: NaiveDate) -> Result<Dashboard> {
    let today_stats = db.daily_stats(today)?;
    let streak_days = study_streak(&db.study_dates()?, today);

    let mut history = Vec::with_capacity(HISTORY_DAYS as usize);
    for offset in (0..HISTORY_DAYS).rev() {
        history.push(db.daily_stats(today - Duration::days(offset))?);
    }

    let level_distribution = db.level_distribution()?;
    let words_introduced = level_distribution[1..].iter().sum();
    let words_at_or_above_recall = level_distribution[RECALL_LEVEL as usize..].iter().sum();

    Ok(Dashboard {
        accuracy: today_stats.accuracy(),
        today: today_stats,
        streak_days,
        history,
        level_distribution,
        words_introduced,
        words_at_or_above_recall,
        coverage_percent: coverage_percent(words_introduced),
    })
}

/// Every day of `year`, January first onwards, with its review count.
///
/// # Errors
/// Propagates database failures. An invalid year yields an empty heatmap.
pub fn heatmap(db: &Database, year: i32) -> Result<Vec<HeatmapDay>> {
    let (Some(first), Some(last)) = (
        NaiveDate::from_ymd_opt(year, 1, 1),
        NaiveDate::from_ymd_opt(year, 12, 31),
    ) else {
        return Ok(Vec::new());
    };

    let counts: HashMap<NaiveDate, u32> = db.reviews_per_day(first, last)?.into_iter().collect();
    let busiest = counts.values().copied().max().unwrap_or(0);

    Ok(first
        .iter_days()
        .take_while(|date| *date <= last)
        .map(|date| {
            let reviews = counts.get(&date).copied().unwrap_or(0);
            HeatmapDay {
                date,
                reviews,
                intensity: intensity(reviews, busiest),
            }
        })
        .collect())
}
