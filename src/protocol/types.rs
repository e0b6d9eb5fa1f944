use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

pub type NodeId = String;
pub type PortId = u32;

/// Wire value standing for "poisoned / unreachable".
pub const INFINITY: u64 = 1_000_000_000;

/// Path cost. `Unreachable` orders above every finite value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "WireCost", into = "WireCost")]
pub enum Cost {
    Finite(u64),
    Unreachable,
}

impl Cost {
    pub const ZERO: Cost = Cost::Finite(0);

    /// Maps a raw number onto the tagged form, folding anything at or past
    /// the sentinel into `Unreachable`.
    pub fn from_raw(raw: u64) -> Self {
        if raw >= INFINITY {
            Cost::Unreachable
        } else {
            Cost::Finite(raw)
        }
    }

    pub fn to_raw(self) -> u64 {
        match self {
            Cost::Finite(value) => value,
            Cost::Unreachable => INFINITY,
        }
    }

    pub fn is_unreachable(self) -> bool {
        matches!(self, Cost::Unreachable)
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        match (self, rhs) {
            (Cost::Finite(a), Cost::Finite(b)) => Cost::from_raw(a.saturating_add(b)),
            _ => Cost::Unreachable,
        }
    }
}

impl From<u64> for Cost {
    fn from(raw: u64) -> Self {
        Cost::from_raw(raw)
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cost::Finite(value) => write!(f, "{}", value),
            Cost::Unreachable => write!(f, "inf"),
        }
    }
}

// Peers may send the sentinel as a float (1e9), so accept both shapes.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireCost {
    Whole(u64),
    Fractional(f64),
}

impl From<WireCost> for Cost {
    fn from(wire: WireCost) -> Self {
        match wire {
            WireCost::Whole(raw) => Cost::from_raw(raw),
            WireCost::Fractional(raw) => {
                if raw >= INFINITY as f64 {
                    Cost::Unreachable
                } else {
                    // `as` saturates, so negatives and NaN land on 0.
                    Cost::from_raw(raw.round() as u64)
                }
            }
        }
    }
}

impl From<Cost> for WireCost {
    fn from(cost: Cost) -> Self {
        WireCost::Whole(cost.to_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addition_saturates_into_unreachable() {
        assert_eq!(Cost::Finite(3) + Cost::Finite(4), Cost::Finite(7));
        assert_eq!(Cost::Finite(INFINITY - 1) + Cost::Finite(1), Cost::Unreachable);
        assert_eq!(Cost::Finite(5) + Cost::Unreachable, Cost::Unreachable);
        assert_eq!(Cost::Finite(u64::MAX) + Cost::Finite(u64::MAX), Cost::Unreachable);
    }

    #[test]
    fn test_unreachable_orders_last() {
        assert!(Cost::Finite(INFINITY - 1) < Cost::Unreachable);
        assert!(Cost::ZERO < Cost::Finite(1));
    }

    #[test]
    fn test_wire_sentinel_forms() {
        let int: Cost = serde_json::from_str("1000000000").unwrap();
        let float: Cost = serde_json::from_str("1000000000.0").unwrap();
        let exp: Cost = serde_json::from_str("1e9").unwrap();
        let bigger: Cost = serde_json::from_str("4000000000").unwrap();
        assert_eq!(int, Cost::Unreachable);
        assert_eq!(float, Cost::Unreachable);
        assert_eq!(exp, Cost::Unreachable);
        assert_eq!(bigger, Cost::Unreachable);

        assert_eq!(serde_json::to_string(&Cost::Unreachable).unwrap(), "1000000000");
        assert_eq!(serde_json::to_string(&Cost::Finite(7)).unwrap(), "7");
    }

    #[test]
    fn test_fractional_costs_round() {
        let cost: Cost = serde_json::from_str("2.6").unwrap();
        assert_eq!(cost, Cost::Finite(3));
        let negative: Cost = serde_json::from_str("-4").unwrap();
        assert_eq!(negative, Cost::ZERO);
    }
}
