use chrono::Utc;
use std::cmp::Ordering;
use uuid::Uuid;

use crate::models::{MarketTrend, ScreeningResult, ScreeningSnapshot};

pub struct Ranking;

impl Ranking {
    pub fn compare(a: &ScreeningResult, b: &ScreeningResult) -> Ordering {
        b.score.cmp(&a.score).then_with(|| a.symbol.cmp(&b.symbol))
    }

    pub fn publish(
        trend: MarketTrend,
        mut results: Vec<ScreeningResult>,
        scanned: usize,
        skipped: usize,
    ) -> ScreeningSnapshot {
        results.retain(|r| r.score >= 1);
        results.sort_by(Self::compare);

        ScreeningSnapshot {
            id: Uuid::new_v4(),
            generated_at: Utc::now(),
            trend,
            results,
            scanned,
            skipped,
            degraded: false,
        }
    }
}
