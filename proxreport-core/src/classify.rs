use serde::{Deserialize, Serialize};

/// Tri-level health of a utilization metric. Ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Green,
    Amber,
    Red,
}

/// Classify a utilization percentage against warn/critical thresholds.
///
/// An unknown value is a caution signal and never reads as [`HealthState::Green`].
/// Out-of-range values are classified as given.
pub fn classify(percent: Option<f64>, warn: u8, crit: u8) -> HealthState {
    match percent {
        None => HealthState::Amber,
        Some(p) if p >= f64::from(crit) => HealthState::Red,
        Some(p) if p >= f64::from(warn) => HealthState::Amber,
        Some(_) => HealthState::Green,
    }
}
