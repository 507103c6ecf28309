//! Calibration tables and engine settings.
//!
//! None of these constants are physiological truths; they are starting
//! points meant to be re-fit against real performance data. Every table is
//! plain data that can be overridden from the config file, and a run only
//! ever borrows it immutably.

use crate::{Error, PatternBucket, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Monotonic interpolation
// ============================================================================

/// Required direction of a calibration curve
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trend {
    Increasing,
    Decreasing,
}

/// Piecewise-linear curve through `(x, y)` anchors
///
/// Outside the anchor range the nearest end segment is extended, and the
/// result is clamped to `[min, max]`. Construction rejects anchors that are
/// not monotonic in the requested direction, so `eval` is monotonic too.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationCurve {
    anchors: Vec<(f64, f64)>,
    min: f64,
    max: f64,
}

impl CalibrationCurve {
    pub fn new(
        name: &str,
        anchors: &[[f64; 2]],
        trend: Trend,
        min: f64,
        max: f64,
    ) -> Result<Self> {
        if anchors.len() < 2 {
            return Err(Error::Calibration(format!(
                "{}: need at least two anchors, got {}",
                name,
                anchors.len()
            )));
        }

        if anchors.iter().flatten().any(|v| !v.is_finite()) {
            return Err(Error::Calibration(format!("{}: non-finite anchor", name)));
        }

        for pair in anchors.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if b[0] <= a[0] {
                return Err(Error::Calibration(format!(
                    "{}: anchor x values must strictly increase ({} then {})",
                    name, a[0], b[0]
                )));
            }
            let ordered = match trend {
                Trend::Increasing => b[1] >= a[1],
                Trend::Decreasing => b[1] <= a[1],
            };
            if !ordered {
                return Err(Error::Calibration(format!(
                    "{}: anchors not {:?} between x={} and x={}",
                    name, trend, a[0], b[0]
                )));
            }
        }

        Ok(Self {
            anchors: anchors.iter().map(|a| (a[0], a[1])).collect(),
            min,
            max,
        })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let n = self.anchors.len();
        let segment = if x <= self.anchors[0].0 {
            0
        } else if x >= self.anchors[n - 1].0 {
            n - 2
        } else {
            self.anchors
                .windows(2)
                .position(|w| x >= w[0].0 && x <= w[1].0)
                .unwrap_or(n - 2)
        };

        let (x0, y0) = self.anchors[segment];
        let (x1, y1) = self.anchors[segment + 1];
        let y = y0 + (y1 - y0) * (x - x0) / (x1 - x0);
        y.clamp(self.min, self.max)
    }
}

// ============================================================================
// RPE calibration
// ============================================================================

/// Anchor tables mapping target RPE to each derived constraint
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RpeCalibration {
    #[serde(default = "default_max_load_pct")]
    pub max_load_pct: Vec<[f64; 2]>,

    #[serde(default = "default_preferred_load_pct")]
    pub preferred_load_pct: Vec<[f64; 2]>,

    #[serde(default = "default_preferred_set_fraction")]
    pub preferred_set_fraction: Vec<[f64; 2]>,

    #[serde(default = "default_min_rest_between_sets")]
    pub min_rest_between_sets: Vec<[f64; 2]>,

    #[serde(default = "default_cardio_reserve")]
    pub cardio_reserve: Vec<[f64; 2]>,

    #[serde(default = "default_cardio_intensity_cap")]
    pub cardio_intensity_cap: Vec<[f64; 2]>,

    #[serde(default = "default_local_fatigue_tolerance")]
    pub local_fatigue_tolerance: Vec<[f64; 2]>,

    #[serde(default = "default_min_rest_between_movements")]
    pub min_rest_between_movements: Vec<[f64; 2]>,
}

impl Default for RpeCalibration {
    fn default() -> Self {
        Self {
            max_load_pct: default_max_load_pct(),
            preferred_load_pct: default_preferred_load_pct(),
            preferred_set_fraction: default_preferred_set_fraction(),
            min_rest_between_sets: default_min_rest_between_sets(),
            cardio_reserve: default_cardio_reserve(),
            cardio_intensity_cap: default_cardio_intensity_cap(),
            local_fatigue_tolerance: default_local_fatigue_tolerance(),
            min_rest_between_movements: default_min_rest_between_movements(),
        }
    }
}

/// Curves built from an [`RpeCalibration`]
#[derive(Clone, Debug)]
pub struct RpeCurves {
    pub max_load_pct: CalibrationCurve,
    pub preferred_load_pct: CalibrationCurve,
    pub preferred_set_fraction: CalibrationCurve,
    pub min_rest_between_sets: CalibrationCurve,
    pub cardio_reserve: CalibrationCurve,
    pub cardio_intensity_cap: CalibrationCurve,
    pub local_fatigue_tolerance: CalibrationCurve,
    pub min_rest_between_movements: CalibrationCurve,
}

impl RpeCalibration {
    pub fn curves(&self) -> Result<RpeCurves> {
        use Trend::*;
        Ok(RpeCurves {
            max_load_pct: CalibrationCurve::new(
                "max_load_pct",
                &self.max_load_pct,
                Increasing,
                0.0,
                1.0,
            )?,
            preferred_load_pct: CalibrationCurve::new(
                "preferred_load_pct",
                &self.preferred_load_pct,
                Increasing,
                0.0,
                1.0,
            )?,
            preferred_set_fraction: CalibrationCurve::new(
                "preferred_set_fraction",
                &self.preferred_set_fraction,
                Increasing,
                0.0,
                1.0,
            )?,
            min_rest_between_sets: CalibrationCurve::new(
                "min_rest_between_sets",
                &self.min_rest_between_sets,
                Decreasing,
                0.0,
                600.0,
            )?,
            cardio_reserve: CalibrationCurve::new(
                "cardio_reserve",
                &self.cardio_reserve,
                Decreasing,
                0.0,
                1.0,
            )?,
            cardio_intensity_cap: CalibrationCurve::new(
                "cardio_intensity_cap",
                &self.cardio_intensity_cap,
                Increasing,
                0.3,
                2.0,
            )?,
            local_fatigue_tolerance: CalibrationCurve::new(
                "local_fatigue_tolerance",
                &self.local_fatigue_tolerance,
                Increasing,
                0.1,
                0.95,
            )?,
            min_rest_between_movements: CalibrationCurve::new(
                "min_rest_between_movements",
                &self.min_rest_between_movements,
                Decreasing,
                0.0,
                600.0,
            )?,
        })
    }
}

fn default_max_load_pct() -> Vec<[f64; 2]> {
    vec![[3.0, 0.60], [5.0, 0.70], [7.0, 0.84], [9.0, 0.92]]
}

fn default_preferred_load_pct() -> Vec<[f64; 2]> {
    vec![[3.0, 0.50], [5.0, 0.60], [7.0, 0.70], [9.0, 0.78]]
}

fn default_preferred_set_fraction() -> Vec<[f64; 2]> {
    vec![[3.0, 0.30], [5.0, 0.45], [7.0, 0.60], [9.0, 0.85]]
}

fn default_min_rest_between_sets() -> Vec<[f64; 2]> {
    vec![[3.0, 12.0], [5.0, 8.0], [7.0, 5.0], [9.0, 3.0]]
}

fn default_cardio_reserve() -> Vec<[f64; 2]> {
    vec![[3.0, 0.45], [5.0, 0.30], [7.0, 0.18], [9.0, 0.06]]
}

fn default_cardio_intensity_cap() -> Vec<[f64; 2]> {
    vec![[3.0, 0.80], [5.0, 0.90], [7.0, 1.02], [9.0, 1.12]]
}

fn default_local_fatigue_tolerance() -> Vec<[f64; 2]> {
    vec![[3.0, 0.35], [5.0, 0.50], [7.0, 0.65], [9.0, 0.80]]
}

fn default_min_rest_between_movements() -> Vec<[f64; 2]> {
    vec![[3.0, 22.5], [5.0, 17.5], [7.0, 12.5], [9.0, 7.5]]
}

// ============================================================================
// Recovery calibration
// ============================================================================

/// Local-fatigue half-life per pattern bucket, in seconds
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BucketHalfLives {
    pub pull: f64,
    pub push: f64,
    pub squat: f64,
    pub hinge: f64,
    pub core: f64,
    pub grip: f64,
}

impl Default for BucketHalfLives {
    fn default() -> Self {
        Self {
            pull: 90.0,
            push: 90.0,
            squat: 120.0,
            hinge: 120.0,
            core: 60.0,
            grip: 75.0,
        }
    }
}

impl BucketHalfLives {
    pub fn get(&self, bucket: PatternBucket) -> f64 {
        match bucket {
            PatternBucket::Pull => self.pull,
            PatternBucket::Push => self.push,
            PatternBucket::Squat => self.squat,
            PatternBucket::Hinge => self.hinge,
            PatternBucket::Core => self.core,
            PatternBucket::Grip => self.grip,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RecoveryCalibration {
    /// Time constant for modalities missing from `tau_s`
    #[serde(default = "default_fallback_tau_s")]
    pub fallback_tau_s: f64,

    #[serde(default)]
    pub half_life_s: BucketHalfLives,

    /// W′ recovery time constant per modality
    #[serde(default = "default_tau_s")]
    pub tau_s: BTreeMap<String, f64>,
}

impl Default for RecoveryCalibration {
    fn default() -> Self {
        Self {
            half_life_s: BucketHalfLives::default(),
            tau_s: default_tau_s(),
            fallback_tau_s: default_fallback_tau_s(),
        }
    }
}

impl RecoveryCalibration {
    pub fn tau_for(&self, modality: &str) -> f64 {
        self.tau_s
            .get(modality)
            .copied()
            .unwrap_or(self.fallback_tau_s)
    }
}

fn default_tau_s() -> BTreeMap<String, f64> {
    [
        ("bike", 300.0),
        ("row", 320.0),
        ("ski", 310.0),
        ("run", 280.0),
        ("swim", 350.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn default_fallback_tau_s() -> f64 {
    300.0
}

// ============================================================================
// Environment calibration
// ============================================================================

/// Comfort bands and sensitivities for the environmental modifier
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvironmentCalibration {
    pub comfort_temp_low_c: f64,
    pub comfort_temp_high_c: f64,
    /// Multiplier gain per squared degree outside the band
    pub temp_coeff: f64,
    pub comfort_humidity_high_pct: f64,
    pub humidity_coeff: f64,
    pub altitude_threshold_m: f64,
    pub altitude_coeff: f64,
    pub sleep_target_h: f64,
    pub sleep_coeff: f64,
    pub water_target_l: f64,
    pub water_coeff: f64,
    /// Lowest recovery multiplier sleep/hydration deficits can produce
    pub recovery_floor: f64,
}

impl Default for EnvironmentCalibration {
    fn default() -> Self {
        Self {
            comfort_temp_low_c: 10.0,
            comfort_temp_high_c: 22.0,
            temp_coeff: 0.0008,
            comfort_humidity_high_pct: 60.0,
            humidity_coeff: 0.003,
            altitude_threshold_m: 700.0,
            altitude_coeff: 0.0002,
            sleep_target_h: 7.5,
            sleep_coeff: 0.06,
            water_target_l: 2.5,
            water_coeff: 0.10,
            recovery_floor: 0.4,
        }
    }
}

// ============================================================================
// Bundles
// ============================================================================

/// Every calibration table a run consults
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Calibration {
    #[serde(default)]
    pub rpe: RpeCalibration,
    #[serde(default)]
    pub recovery: RecoveryCalibration,
    #[serde(default)]
    pub environment: EnvironmentCalibration,
}

impl Calibration {
    /// Check every table before it is used by a run
    pub fn validate(&self) -> Result<()> {
        self.rpe.curves()?;

        for bucket in PatternBucket::ALL {
            let half_life = self.recovery.half_life_s.get(bucket);
            if !(half_life.is_finite() && half_life > 0.0) {
                return Err(Error::Calibration(format!(
                    "half-life for {} must be positive, got {}",
                    bucket.as_str(),
                    half_life
                )));
            }
        }

        let taus = self
            .recovery
            .tau_s
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .chain(std::iter::once(("fallback", self.recovery.fallback_tau_s)));
        for (modality, tau) in taus {
            if !(tau.is_finite() && tau > 0.0) {
                return Err(Error::Calibration(format!(
                    "tau for {} must be positive, got {}",
                    modality, tau
                )));
            }
        }

        let env = &self.environment;
        if env.comfort_temp_low_c > env.comfort_temp_high_c {
            return Err(Error::Calibration(
                "comfort_temp_low_c exceeds comfort_temp_high_c".into(),
            ));
        }
        let coeffs = [
            env.temp_coeff,
            env.humidity_coeff,
            env.altitude_coeff,
            env.sleep_coeff,
            env.water_coeff,
        ];
        if coeffs.iter().any(|c| !(c.is_finite() && *c >= 0.0)) {
            return Err(Error::Calibration(
                "environment coefficients must be non-negative".into(),
            ));
        }
        if !(env.recovery_floor > 0.0 && env.recovery_floor <= 1.0) {
            return Err(Error::Calibration(format!(
                "recovery_floor must be in (0, 1], got {}",
                env.recovery_floor
            )));
        }

        Ok(())
    }
}

/// Loop-level constants that are not RPE-dependent
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationSettings {
    /// Fixed time moving between exercises
    pub transition_s: f64,
    /// Length of one paced cardio interval on the timeline
    pub cardio_interval_s: f64,
    /// Upper bound on a single strategy-chosen rest
    pub max_rest_s: f64,
    /// Floor on any single rep's cost
    pub min_rep_s: f64,
    /// Local-fatigue ceiling shared by all buckets
    pub local_ceiling: f64,
    /// Largest unbroken barbell set at any load
    pub barbell_set_cap: u32,
    /// Local load per second of cardio at critical power
    pub cardio_local_per_s: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            transition_s: 5.0,
            cardio_interval_s: 15.0,
            max_rest_s: 120.0,
            min_rep_s: 0.2,
            local_ceiling: 10.0,
            barbell_set_cap: 30,
            cardio_local_per_s: 0.01,
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("cardio_interval_s", self.cardio_interval_s),
            ("max_rest_s", self.max_rest_s),
            ("min_rep_s", self.min_rep_s),
            ("local_ceiling", self.local_ceiling),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!(
                    "simulation.{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if !(self.transition_s.is_finite() && self.transition_s >= 0.0) {
            return Err(Error::Config(format!(
                "simulation.transition_s must be non-negative, got {}",
                self.transition_s
            )));
        }
        if !(self.cardio_local_per_s.is_finite() && self.cardio_local_per_s >= 0.0) {
            return Err(Error::Config(format!(
                "simulation.cardio_local_per_s must be non-negative, got {}",
                self.cardio_local_per_s
            )));
        }
        if self.barbell_set_cap == 0 {
            return Err(Error::Config("simulation.barbell_set_cap must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_hits_anchors() {
        let curve = CalibrationCurve::new(
            "load",
            &default_max_load_pct(),
            Trend::Increasing,
            0.0,
            1.0,
        )
        .unwrap();
        assert!((curve.eval(3.0) - 0.60).abs() < 1e-12);
        assert!((curve.eval(7.0) - 0.84).abs() < 1e-12);
        assert!((curve.eval(6.0) - 0.77).abs() < 1e-12);
    }

    #[test]
    fn test_curve_extrapolates_end_segments() {
        let curve = CalibrationCurve::new(
            "load",
            &default_max_load_pct(),
            Trend::Increasing,
            0.0,
            1.0,
        )
        .unwrap();
        // slope 0.05 per RPE below the first anchor
        assert!((curve.eval(0.0) - 0.45).abs() < 1e-12);
        // slope 0.04 per RPE above the last anchor
        assert!((curve.eval(10.0) - 0.96).abs() < 1e-12);
    }

    #[test]
    fn test_curve_clamps_to_range() {
        let curve = CalibrationCurve::new(
            "reserve",
            &default_cardio_reserve(),
            Trend::Decreasing,
            0.0,
            1.0,
        )
        .unwrap();
        let at_max = curve.eval(10.0);
        assert!((0.0..1e-9).contains(&at_max));
        assert!(curve.eval(0.0) <= 1.0);
        assert_eq!(curve.eval(100.0), 0.0);
    }

    #[test]
    fn test_curve_rejects_non_monotonic_anchors() {
        let result = CalibrationCurve::new(
            "bad",
            &[[3.0, 0.6], [5.0, 0.5]],
            Trend::Increasing,
            0.0,
            1.0,
        );
        assert!(matches!(result, Err(Error::Calibration(_))));
    }

    #[test]
    fn test_curve_rejects_unsorted_x() {
        let result = CalibrationCurve::new(
            "bad",
            &[[5.0, 0.5], [3.0, 0.6]],
            Trend::Decreasing,
            0.0,
            1.0,
        );
        assert!(matches!(result, Err(Error::Calibration(_))));
    }

    #[test]
    fn test_default_calibration_validates() {
        Calibration::default().validate().unwrap();
        SimulationSettings::default().validate().unwrap();
    }

    #[test]
    fn test_zero_half_life_rejected() {
        let mut calibration = Calibration::default();
        calibration.recovery.half_life_s.core = 0.0;
        assert!(calibration.validate().is_err());
    }

    #[test]
    fn test_tau_fallback() {
        let recovery = RecoveryCalibration::default();
        assert_eq!(recovery.tau_for("row"), 320.0);
        assert_eq!(recovery.tau_for("sled"), 300.0);
    }
}
