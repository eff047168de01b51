//! Solar proximity zones

use serde::{Deserialize, Serialize};

/// Severity of pointing near the sun, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SafetyZone {
    Safe,
    Caution,
    Warning,
    Critical,
}

impl SafetyZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Caution => "CAUTION",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Band edges in degrees of separation from the sun.
///
/// Below `min_separation_deg` is critical, below `warning_deg` is warning,
/// below `caution_deg` is caution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SafetyThresholds {
    pub min_separation_deg: f64,
    pub warning_deg: f64,
    pub caution_deg: f64,
}

impl SafetyThresholds {
    pub fn is_ordered(&self) -> bool {
        self.min_separation_deg <= self.warning_deg && self.warning_deg <= self.caution_deg
    }
}

impl Default for SafetyThresholds {
    fn default() -> Self {
        Self {
            min_separation_deg: 10.0,
            warning_deg: 20.0,
            caution_deg: 30.0,
        }
    }
}

/// Classify a separation. The checks cascade from most severe, so the result
/// is monotone in `separation_deg` even for mis-ordered thresholds.
pub fn classify_zone(separation_deg: f64, thresholds: &SafetyThresholds) -> SafetyZone {
    // NaN separation is treated as the worst case
    if separation_deg.is_nan() || separation_deg < thresholds.min_separation_deg {
        SafetyZone::Critical
    } else if separation_deg < thresholds.warning_deg {
        SafetyZone::Warning
    } else if separation_deg < thresholds.caution_deg {
        SafetyZone::Caution
    } else {
        SafetyZone::Safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_edges() {
        let t = SafetyThresholds::default();
        assert_eq!(classify_zone(5.0, &t), SafetyZone::Critical);
        assert_eq!(classify_zone(10.0, &t), SafetyZone::Warning);
        assert_eq!(classify_zone(19.9, &t), SafetyZone::Warning);
        assert_eq!(classify_zone(20.0, &t), SafetyZone::Caution);
        assert_eq!(classify_zone(30.0, &t), SafetyZone::Safe);
        assert_eq!(classify_zone(f64::NAN, &t), SafetyZone::Critical);
    }

    #[test]
    fn test_zone_ordering() {
        assert!(SafetyZone::Critical > SafetyZone::Warning);
        assert!(SafetyZone::Warning > SafetyZone::Caution);
        assert!(SafetyZone::Caution > SafetyZone::Safe);
    }

    mod proptests {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(512))]

            #[test]
            fn test_wider_separation_never_more_severe(
                a in 0.0f64..180.0,
                b in 0.0f64..180.0,
                min in 0.0f64..60.0,
                warning in 0.0f64..60.0,
                caution in 0.0f64..60.0,
            ) {
                let t = SafetyThresholds { min_separation_deg: min, warning_deg: warning, caution_deg: caution };
                let (near, far) = if a <= b { (a, b) } else { (b, a) };
                prop_assert!(classify_zone(far, &t) <= classify_zone(near, &t));
            }
        }
    }
}
