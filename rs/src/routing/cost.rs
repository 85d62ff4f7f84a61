use crate::core::errors::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Edge as seen by a cost function during path search.
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'a> {
    pub source: i64,
    pub target: i64,
    pub length_m: f64,
    pub class: Option<&'a str>,
}

/// Weight of traversing one edge. Must be non-negative; `f64::INFINITY` marks an
/// impassable edge.
pub trait EdgeCost: Send + Sync {
    fn cost(&self, edge: &EdgeView<'_>) -> f64;
}

impl<F> EdgeCost for F
where
    F: Fn(&EdgeView<'_>) -> f64 + Send + Sync,
{
    fn cost(&self, edge: &EdgeView<'_>) -> f64 {
        self(edge)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ByLength;

impl EdgeCost for ByLength {
    fn cost(&self, edge: &EdgeView<'_>) -> f64 {
        edge.length_m
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CostModel {
    #[default]
    Length,
    /// Seconds of travel at a per-class speed.
    TravelTime {
        default_speed_kmh: f64,
        #[serde(default)]
        speeds_kmh: HashMap<String, f64>,
    },
    /// Length multiplied by a per-class penalty; a penalty of 0 closes the class.
    Penalized {
        #[serde(default)]
        default_penalty: Option<f64>,
        #[serde(default)]
        penalties: HashMap<String, f64>,
    },
}

impl CostModel {
    pub fn validate(&self) -> Result<()> {
        match self {
            CostModel::Length => Ok(()),
            CostModel::TravelTime {
                default_speed_kmh,
                speeds_kmh,
            } => {
                let bad = std::iter::once(("default", default_speed_kmh))
                    .chain(speeds_kmh.iter().map(|(k, v)| (k.as_str(), v)))
                    .find(|(_, speed)| !speed.is_finite() || **speed <= 0.0);
                match bad {
                    Some((class, speed)) => Err(SearchError::InvalidConfig(format!(
                        "speed for '{}' must be positive, got {}",
                        class, speed
                    ))),
                    None => Ok(()),
                }
            }
            CostModel::Penalized {
                default_penalty,
                penalties,
            } => {
                let bad = default_penalty
                    .iter()
                    .map(|p| ("default", p))
                    .chain(penalties.iter().map(|(k, v)| (k.as_str(), v)))
                    .find(|(_, penalty)| !penalty.is_finite() || **penalty < 0.0);
                match bad {
                    Some((class, penalty)) => Err(SearchError::InvalidConfig(format!(
                        "penalty for '{}' must be non-negative, got {}",
                        class, penalty
                    ))),
                    None => Ok(()),
                }
            }
        }
    }
}

impl EdgeCost for CostModel {
    fn cost(&self, edge: &EdgeView<'_>) -> f64 {
        match self {
            CostModel::Length => edge.length_m,
            CostModel::TravelTime {
                default_speed_kmh,
                speeds_kmh,
            } => {
                let speed = edge
                    .class
                    .and_then(|class| speeds_kmh.get(class))
                    .unwrap_or(default_speed_kmh);
                edge.length_m / (speed / 3.6)
            }
            CostModel::Penalized {
                default_penalty,
                penalties,
            } => {
                let penalty = edge
                    .class
                    .and_then(|class| penalties.get(class).copied())
                    .or(*default_penalty);
                match penalty {
                    Some(p) if p == 0.0 => f64::INFINITY,
                    Some(p) => edge.length_m * p,
                    None => edge.length_m,
                }
            }
        }
    }
}
