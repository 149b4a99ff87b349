//! Urgency tiers and chain lengths.
//!
//! The tier is derived purely from how far away an occurrence is:
//!
//! | time until fire      | tier     | default chain length |
//! |----------------------|----------|----------------------|
//! | past due, or < 24h   | Critical | 15                   |
//! | 24h – 48h            | High     | 15                   |
//! | 48h – 7d             | Medium   | 8                    |
//! | > 7d                 | Low      | 4                    |

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityTier {
    Low,
    Medium,
    High,
    Critical,
}

impl PriorityTier {
    /// Most urgent first.
    pub const ALL: [PriorityTier; 4] = [
        PriorityTier::Critical,
        PriorityTier::High,
        PriorityTier::Medium,
        PriorityTier::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityTier::Low => "low",
            PriorityTier::Medium => "medium",
            PriorityTier::High => "high",
            PriorityTier::Critical => "critical",
        }
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps time-to-fire onto a tier and a tier onto a chain length.
///
/// Implementations must be pure: same inputs, same outputs, no I/O.
pub trait PriorityStrategy: Send + Sync {
    fn calculate_priority(&self, fire_date: DateTime<Utc>, now: DateTime<Utc>) -> PriorityTier;

    fn chain_count(&self, tier: PriorityTier) -> u32;
}

/// Number of chain links generated per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLengths {
    #[serde(default = "default_critical")]
    pub critical: u32,
    #[serde(default = "default_high")]
    pub high: u32,
    #[serde(default = "default_medium")]
    pub medium: u32,
    #[serde(default = "default_low")]
    pub low: u32,
}

fn default_critical() -> u32 {
    15
}
fn default_high() -> u32 {
    15
}
fn default_medium() -> u32 {
    8
}
fn default_low() -> u32 {
    4
}

impl Default for ChainLengths {
    fn default() -> Self {
        Self {
            critical: default_critical(),
            high: default_high(),
            medium: default_medium(),
            low: default_low(),
        }
    }
}

impl ChainLengths {
    /// Clamp so every tier has at least one link and no tier gets more
    /// links than a more urgent one.
    pub fn normalized(self) -> Self {
        let critical = self.critical.max(1);
        let high = self.high.clamp(1, critical);
        let medium = self.medium.clamp(1, high);
        let low = self.low.clamp(1, medium);
        Self {
            critical,
            high,
            medium,
            low,
        }
    }

    pub fn for_tier(&self, tier: PriorityTier) -> u32 {
        match tier {
            PriorityTier::Critical => self.critical,
            PriorityTier::High => self.high,
            PriorityTier::Medium => self.medium,
            PriorityTier::Low => self.low,
        }
    }
}

/// Default time-bucketed strategy.
#[derive(Debug, Clone, Default)]
pub struct TieredPriorityStrategy {
    lengths: ChainLengths,
}

impl TieredPriorityStrategy {
    pub fn new(lengths: ChainLengths) -> Self {
        Self {
            lengths: lengths.normalized(),
        }
    }

    pub fn lengths(&self) -> &ChainLengths {
        &self.lengths
    }
}

impl PriorityStrategy for TieredPriorityStrategy {
    fn calculate_priority(&self, fire_date: DateTime<Utc>, now: DateTime<Utc>) -> PriorityTier {
        let until = fire_date.signed_duration_since(now);
        if until < Duration::hours(24) {
            PriorityTier::Critical
        } else if until < Duration::hours(48) {
            PriorityTier::High
        } else if until <= Duration::days(7) {
            PriorityTier::Medium
        } else {
            PriorityTier::Low
        }
    }

    fn chain_count(&self, tier: PriorityTier) -> u32 {
        self.lengths.for_tier(tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    #[test]
    fn tier_boundaries() {
        let s = TieredPriorityStrategy::default();
        let tier = |d: Duration| s.calculate_priority(now() + d, now());

        assert_eq!(tier(Duration::minutes(-5)), PriorityTier::Critical);
        assert_eq!(tier(Duration::hours(23)), PriorityTier::Critical);
        assert_eq!(tier(Duration::hours(24)), PriorityTier::High);
        assert_eq!(tier(Duration::hours(47)), PriorityTier::High);
        assert_eq!(tier(Duration::hours(48)), PriorityTier::Medium);
        assert_eq!(tier(Duration::days(7)), PriorityTier::Medium);
        assert_eq!(tier(Duration::days(7) + Duration::seconds(1)), PriorityTier::Low);
    }

    #[test]
    fn default_table() {
        let s = TieredPriorityStrategy::default();
        assert_eq!(s.chain_count(PriorityTier::Critical), 15);
        assert_eq!(s.chain_count(PriorityTier::High), 15);
        assert_eq!(s.chain_count(PriorityTier::Medium), 8);
        assert_eq!(s.chain_count(PriorityTier::Low), 4);
    }

    #[test]
    fn configured_table_is_made_monotone() {
        let s = TieredPriorityStrategy::new(ChainLengths {
            critical: 6,
            high: 10,
            medium: 0,
            low: 3,
        });
        assert_eq!(s.chain_count(PriorityTier::Critical), 6);
        assert_eq!(s.chain_count(PriorityTier::High), 6);
        assert_eq!(s.chain_count(PriorityTier::Medium), 1);
        assert_eq!(s.chain_count(PriorityTier::Low), 1);
    }

    #[test]
    fn tiers_are_totally_ordered() {
        assert!(PriorityTier::Low < PriorityTier::Medium);
        assert!(PriorityTier::Medium < PriorityTier::High);
        assert!(PriorityTier::High < PriorityTier::Critical);
    }

    proptest! {
        #[test]
        fn urgency_and_chain_length_never_increase_with_distance(
            a in -86_400i64..(30 * 86_400),
            b in -86_400i64..(30 * 86_400),
        ) {
            let s = TieredPriorityStrategy::default();
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            let t_near = s.calculate_priority(now() + Duration::seconds(near), now());
            let t_far = s.calculate_priority(now() + Duration::seconds(far), now());
            prop_assert!(t_near >= t_far);
            prop_assert!(s.chain_count(t_near) >= s.chain_count(t_far));
        }

        #[test]
        fn under_a_day_is_always_critical(secs in -86_400i64..86_400) {
            let s = TieredPriorityStrategy::default();
            let tier = s.calculate_priority(now() + Duration::seconds(secs), now());
            prop_assert_eq!(tier, PriorityTier::Critical);
            for lower in PriorityTier::ALL {
                prop_assert!(s.chain_count(tier) >= s.chain_count(lower));
            }
        }

        #[test]
        fn normalized_tables_are_monotone(
            c in 0u32..40, h in 0u32..40, m in 0u32..40, l in 0u32..40,
        ) {
            let t = ChainLengths { critical: c, high: h, medium: m, low: l }.normalized();
            prop_assert!(t.critical >= t.high && t.high >= t.medium && t.medium >= t.low && t.low >= 1);
        }
    }
}
