//! Pacing strategy.
//!
//! An RPE target becomes a set of [`RpeConstraints`] through the calibration
//! curves. During a run the [`StrategyEngine`] turns those constraints and
//! the current fatigue into set sizes, loads, rest lengths and cardio pace.
//! Its preferences are soft: hard limits reported by the fatigue tracker
//! override them through [`StrategyEvent`]s.

use crate::calibration::{RpeCalibration, SimulationSettings};
use crate::fatigue::FatigueTracker;
use crate::timing::{pace_cardio, CardioMetric};
use crate::{CardioProfile, Error, MovementSpec, PatternBucket, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Constraints
// ============================================================================

/// Concrete pacing limits derived from (or standing in for) a target RPE
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RpeConstraints {
    pub target_rpe: f64,
    /// Heaviest barbell load as a fraction of 1RM
    pub max_load_pct: f64,
    /// Barbell load used when the workout prescribes none
    pub preferred_load_pct: f64,
    /// Share of unbroken capacity aimed for in each set
    pub preferred_set_fraction: f64,
    pub min_rest_between_sets: f64,
    /// Share of W′ kept in hand
    pub cardio_reserve: f64,
    /// Ceiling on output as a multiple of CP
    pub cardio_intensity_cap: f64,
    /// Fullest a bucket may be (share of the ceiling) when a new set starts
    #[serde(default = "default_local_fatigue_tolerance")]
    pub local_fatigue_tolerance: f64,
    /// Base rest between consecutive exercises
    #[serde(default)]
    pub min_rest_between_movements: f64,
}

const DEFAULT_LOCAL_FATIGUE_TOLERANCE: f64 = 0.9;

fn default_local_fatigue_tolerance() -> f64 {
    DEFAULT_LOCAL_FATIGUE_TOLERANCE
}

impl RpeConstraints {
    /// Build constraints directly, bypassing the calibration curves
    pub fn new(
        target_rpe: f64,
        max_load_pct: f64,
        preferred_set_fraction: f64,
        min_rest_between_sets: f64,
        cardio_reserve: f64,
    ) -> Result<Self> {
        let constraints = Self {
            target_rpe,
            max_load_pct,
            preferred_load_pct: max_load_pct,
            preferred_set_fraction,
            min_rest_between_sets,
            cardio_reserve,
            cardio_intensity_cap: 1.0,
            local_fatigue_tolerance: DEFAULT_LOCAL_FATIGUE_TOLERANCE,
            min_rest_between_movements: 0.0,
        };
        constraints.validate()?;
        Ok(constraints)
    }

    pub fn with_preferred_load_pct(mut self, pct: f64) -> Result<Self> {
        self.preferred_load_pct = pct;
        self.validate()?;
        Ok(self)
    }

    pub fn with_cardio_intensity_cap(mut self, cap: f64) -> Result<Self> {
        self.cardio_intensity_cap = cap;
        self.validate()?;
        Ok(self)
    }

    pub fn with_local_fatigue_tolerance(mut self, tolerance: f64) -> Result<Self> {
        self.local_fatigue_tolerance = tolerance;
        self.validate()?;
        Ok(self)
    }

    pub fn with_min_rest_between_movements(mut self, seconds: f64) -> Result<Self> {
        self.min_rest_between_movements = seconds;
        self.validate()?;
        Ok(self)
    }

    /// Derive constraints from a target RPE through the calibration curves
    pub fn from_rpe(target_rpe: f64, calibration: &RpeCalibration) -> Result<Self> {
        check_range("target_rpe", target_rpe, 0.0, 10.0)?;
        let curves = calibration.curves()?;

        let constraints = Self {
            target_rpe,
            max_load_pct: curves.max_load_pct.eval(target_rpe),
            preferred_load_pct: curves.preferred_load_pct.eval(target_rpe),
            preferred_set_fraction: curves.preferred_set_fraction.eval(target_rpe),
            min_rest_between_sets: curves.min_rest_between_sets.eval(target_rpe),
            cardio_reserve: curves.cardio_reserve.eval(target_rpe),
            cardio_intensity_cap: curves.cardio_intensity_cap.eval(target_rpe),
            local_fatigue_tolerance: curves.local_fatigue_tolerance.eval(target_rpe),
            min_rest_between_movements: curves.min_rest_between_movements.eval(target_rpe),
        };
        constraints.validate()?;

        tracing::debug!(
            "RPE {:.1} -> load<={:.2}, set fraction {:.2}, tolerance {:.2}, min rest {:.1}s, reserve {:.2}",
            target_rpe,
            constraints.max_load_pct,
            constraints.preferred_set_fraction,
            constraints.local_fatigue_tolerance,
            constraints.min_rest_between_sets,
            constraints.cardio_reserve
        );

        Ok(constraints)
    }

    /// Reject any field outside its domain
    pub fn validate(&self) -> Result<()> {
        check_range("target_rpe", self.target_rpe, 0.0, 10.0)?;
        check_range("max_load_pct", self.max_load_pct, 0.0, 1.0)?;
        check_range("preferred_load_pct", self.preferred_load_pct, 0.0, 1.0)?;
        check_range("preferred_set_fraction", self.preferred_set_fraction, 0.0, 1.0)?;
        check_range("min_rest_between_sets", self.min_rest_between_sets, 0.0, f64::MAX)?;
        check_range("cardio_reserve", self.cardio_reserve, 0.0, 1.0)?;
        check_range("cardio_intensity_cap", self.cardio_intensity_cap, f64::MIN_POSITIVE, 2.0)?;
        check_range(
            "local_fatigue_tolerance",
            self.local_fatigue_tolerance,
            f64::MIN_POSITIVE,
            1.0,
        )?;
        check_range(
            "min_rest_between_movements",
            self.min_rest_between_movements,
            0.0,
            f64::MAX,
        )?;
        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::OutOfRangeConstraint {
            field,
            value,
            min,
            max,
        })
    }
}

// ============================================================================
// State machine
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyState {
    Working,
    Resting,
    Done,
}

/// Inputs that move the state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyEvent {
    /// A set ended on the strategy's own terms
    SetFinished { exercise_done: bool },
    RestFinished,
    /// A local-fatigue bucket hit its ceiling
    CeilingReached,
    /// A W′ balance hit zero
    WbalExhausted,
    TimeCap,
}

/// The work still ahead of an exercise after a set
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NextSet {
    /// Local load of one rep before bucket weights
    pub rep_load: f64,
    /// Reps left, for fixed-count exercises
    pub remaining: Option<u32>,
}

impl NextSet {
    /// Work with no rep structure (cardio intervals, station windows)
    pub const OPEN: NextSet = NextSet {
        rep_load: 0.0,
        remaining: None,
    };
}

/// Load chosen for the next barbell set
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoadDecision {
    pub kg: f64,
    pub fraction: f64,
    /// Prescribed load, when it had to be reduced
    pub scaled_from: Option<f64>,
}

pub struct StrategyEngine<'a> {
    constraints: &'a RpeConstraints,
    settings: &'a SimulationSettings,
    state: StrategyState,
}

impl<'a> StrategyEngine<'a> {
    pub fn new(constraints: &'a RpeConstraints, settings: &'a SimulationSettings) -> Self {
        Self {
            constraints,
            settings,
            state: StrategyState::Working,
        }
    }

    pub fn state(&self) -> StrategyState {
        self.state
    }

    pub fn constraints(&self) -> &RpeConstraints {
        self.constraints
    }

    /// Start a new exercise in WORKING
    pub fn begin_exercise(&mut self) {
        self.state = StrategyState::Working;
    }

    /// Apply an event; DONE is terminal
    pub fn transition(&mut self, event: StrategyEvent) -> StrategyState {
        use StrategyEvent::*;
        use StrategyState::*;

        let next = match (self.state, event) {
            (Done, _) => Done,
            (_, TimeCap) => Done,
            (_, SetFinished { exercise_done: true }) => Done,
            (Working, SetFinished { exercise_done: false }) => Resting,
            (_, CeilingReached) | (_, WbalExhausted) => Resting,
            (Resting, RestFinished) => Working,
            (state, event) => {
                tracing::debug!("Ignoring {:?} while {:?}", event, state);
                state
            }
        };

        if matches!(event, CeilingReached | WbalExhausted) {
            tracing::warn!("Forced transition {:?} -> {:?} ({:?})", self.state, next, event);
        }
        self.state = next;
        next
    }

    /// Reps to attempt in the next set
    ///
    /// `fatigue_ratio` is the fill of the movement's fullest bucket. The
    /// result is at least 1, at most `unbroken_cap`, and at most `remaining`
    /// when the exercise has a fixed rep count.
    pub fn decide_set(&self, unbroken_cap: u32, remaining: Option<u32>, fatigue_ratio: f64) -> u32 {
        let cap = unbroken_cap.max(1);
        let headroom = if fatigue_ratio.is_finite() {
            (1.0 - fatigue_ratio).clamp(0.0, 1.0)
        } else {
            0.0
        };
        // Tolerate rounding just below a whole rep count
        let preferred =
            (self.constraints.preferred_set_fraction * cap as f64 * headroom + 1e-9).floor();
        let mut size = (preferred as u32).clamp(1, cap);
        if let Some(remaining) = remaining {
            size = size.min(remaining.max(1));
        }
        tracing::debug!(
            "Set decision: {} of cap {} (headroom {:.2})",
            size,
            cap,
            headroom
        );
        size
    }

    /// Barbell load for the exercise, never above `max_load_pct · 1RM`
    pub fn decide_load(&self, prescribed_kg: Option<f64>, one_rm: f64) -> LoadDecision {
        let ceiling_kg = self.constraints.max_load_pct * one_rm;
        match prescribed_kg {
            Some(kg) if kg > ceiling_kg => {
                tracing::warn!(
                    "Prescribed load {:.1}kg exceeds {:.0}% of 1RM, scaling to {:.1}kg",
                    kg,
                    self.constraints.max_load_pct * 100.0,
                    ceiling_kg
                );
                LoadDecision {
                    kg: ceiling_kg,
                    fraction: self.constraints.max_load_pct,
                    scaled_from: Some(kg),
                }
            }
            Some(kg) => LoadDecision {
                kg,
                fraction: kg / one_rm,
                scaled_from: None,
            },
            None => {
                let pct = self
                    .constraints
                    .preferred_load_pct
                    .min(self.constraints.max_load_pct);
                LoadDecision {
                    kg: pct * one_rm,
                    fraction: pct,
                    scaled_from: None,
                }
            }
        }
    }

    /// Rest after a set of `movement`
    ///
    /// Each bucket the movement loads decays to `local_fatigue_tolerance` of
    /// the ceiling, which rises with RPE. When the reps left in `next` fit
    /// under the ceiling from where the bucket already is, no decay is needed.
    pub fn decide_local_rest(
        &self,
        tracker: &FatigueTracker<'_>,
        movement: &MovementSpec,
        next: NextSet,
    ) -> f64 {
        let ceiling = tracker.ceiling();
        let accum = tracker.multipliers().fatigue_accum;
        let tolerance = self.constraints.local_fatigue_tolerance;

        let needed = movement
            .patterns
            .iter()
            .map(|pattern| {
                let current = tracker.local(pattern.bucket) / ceiling;
                let rep_fill = next.rep_load * pattern.weight * accum / ceiling;
                let target = next
                    .remaining
                    .map_or(tolerance, |reps| tolerance.max(1.0 - reps as f64 * rep_fill));

                if current <= target {
                    0.0
                } else {
                    tracker.effective_half_life(pattern.bucket) * (current / target).log2()
                }
            })
            .fold(0.0, f64::max);
        self.bound_rest(needed)
    }

    /// Rest before moving from one exercise to the next
    ///
    /// Starts from `min_rest_between_movements`, grows by half for every
    /// pattern bucket the two movements share, and by 30% of the fullest
    /// bucket's fill.
    pub fn decide_transition_rest(
        &self,
        tracker: &FatigueTracker<'_>,
        from: &MovementSpec,
        to: &MovementSpec,
    ) -> f64 {
        let overlap = from
            .buckets()
            .filter(|bucket| to.buckets().any(|b| b == *bucket))
            .count();
        let fullest = PatternBucket::ALL
            .iter()
            .map(|bucket| tracker.local(*bucket) / tracker.ceiling())
            .fold(0.0, f64::max);

        let rest = self.constraints.min_rest_between_movements
            * (1.0 + 0.5 * overlap as f64)
            * (1.0 + 0.3 * fullest);
        let rest = if rest.is_finite() {
            rest.clamp(0.0, self.settings.max_rest_s)
        } else {
            0.0
        };
        tracing::debug!(
            "Transition rest {} -> {}: {:.1}s ({} shared buckets)",
            from.id,
            to.id,
            rest,
            overlap
        );
        rest
    }

    /// Rest after cardio work on `modality`, refilling W′ to the reserve
    pub fn decide_cardio_rest(&self, tracker: &FatigueTracker<'_>, modality: &str) -> f64 {
        let needed = match (tracker.profile(modality), tracker.wbal(modality)) {
            (Some(profile), Some(wbal)) => {
                let need = self.constraints.cardio_reserve * profile.w_prime - wbal;
                let rate = (profile.w_prime - wbal) / tracker.effective_tau(modality);
                if need > 0.0 && rate > 0.0 {
                    need / rate
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };
        self.bound_rest(needed)
    }

    fn bound_rest(&self, needed: f64) -> f64 {
        let needed = if needed.is_finite() { needed.max(0.0) } else { 0.0 };
        let rest = needed
            .min(self.settings.max_rest_s)
            .max(self.constraints.min_rest_between_sets);
        tracing::debug!("Rest decision: {:.1}s (need {:.1}s)", rest, needed);
        rest
    }

    /// Output for the next cardio interval
    pub fn decide_pace(
        &self,
        tracker: &FatigueTracker<'_>,
        modality: &str,
        profile: &CardioProfile,
        metric: CardioMetric,
        remaining_units: f64,
    ) -> f64 {
        let wbal = tracker.wbal(modality).unwrap_or(profile.w_prime);
        pace_cardio(
            profile,
            metric,
            remaining_units,
            wbal,
            self.constraints.cardio_reserve,
            self.constraints.cardio_intensity_cap,
            &tracker.multipliers(),
        )
    }
}
