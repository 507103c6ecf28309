//! Rep and interval timing.
//!
//! Barbell and gymnastic movements are timed per rep through a [`RepModel`]
//! resolved once per exercise before the run starts. Cardio is paced: the
//! critical-power model picks the highest output whose implied W′ depletion
//! over the remaining work fits inside the usable balance.
//!
//! Everything here is a pure function of its arguments.

use crate::environment::EnvironmentMultipliers;
use crate::{
    AthleteCapabilities, BarbellProfile, CardioProfile, CardioUnit, Error, GymSkill, MovementKind,
    MovementSpec, Result, WorkTarget,
};

/// Drag constant of the ergometer pace relation `P = 2.80 · v³`
const ERG_DRAG: f64 = 2.80;

/// Ergometer calorie display: `cal/h = 4 · 0.8604 · P + 300`
const ERG_KCAL_PER_WATT_HOUR: f64 = 4.0 * 0.8604;
const ERG_KCAL_OFFSET_PER_HOUR: f64 = 300.0;

const BISECTION_STEPS: usize = 60;

// ============================================================================
// Per-rep timing
// ============================================================================

/// Timing parameters of a rep-based movement, resolved against the athlete
#[derive(Clone, Debug, PartialEq)]
pub enum RepModel {
    Barbell { one_rm: f64, profile: BarbellProfile },
    Gymnastic { skill: GymSkill },
}

impl RepModel {
    /// Look up and check the capability entry a rep movement needs
    pub fn resolve(movement: &MovementSpec, capabilities: &AthleteCapabilities) -> Result<Self> {
        match movement.kind {
            MovementKind::Barbell => {
                let one_rm = capabilities.one_rm_for(movement).ok_or_else(|| {
                    Error::capability(&movement.id, "no 1RM for the movement or its load references")
                })?;
                if !(one_rm.is_finite() && one_rm > 0.0) {
                    return Err(Error::capability(
                        &movement.id,
                        format!("1RM must be positive, got {}", one_rm),
                    ));
                }

                let profile = capabilities.barbell_profile.clone();
                let valid = profile.base_cycle_s.is_finite()
                    && profile.base_cycle_s > 0.0
                    && profile.load_exp.is_finite()
                    && profile.load_exp > 0.0
                    && profile.transition_s.is_finite()
                    && profile.transition_s >= 0.0
                    && profile.fatigue_slope.is_finite()
                    && profile.fatigue_slope >= 0.0;
                if !valid {
                    return Err(Error::capability(&movement.id, "invalid barbell profile"));
                }

                Ok(RepModel::Barbell { one_rm, profile })
            }
            MovementKind::Gymnastic => {
                let skill = capabilities.gym_skills.get(&movement.id).ok_or_else(|| {
                    Error::capability(&movement.id, "no gymnastics skill entry")
                })?;
                if !(skill.cycle_s.is_finite() && skill.cycle_s > 0.0) {
                    return Err(Error::capability(
                        &movement.id,
                        format!("cycle_s must be positive, got {}", skill.cycle_s),
                    ));
                }
                if skill.unbroken_cap == 0 {
                    return Err(Error::capability(&movement.id, "unbroken_cap must be at least 1"));
                }
                if !(skill.fatigue_slope.is_finite() && skill.fatigue_slope >= 0.0) {
                    return Err(Error::capability(&movement.id, "fatigue_slope must be non-negative"));
                }
                Ok(RepModel::Gymnastic {
                    skill: skill.clone(),
                })
            }
            MovementKind::Cardio => Err(Error::capability(
                &movement.id,
                "cardio movements are paced, not timed per rep",
            )),
        }
    }

    pub fn one_rm(&self) -> Option<f64> {
        match self {
            RepModel::Barbell { one_rm, .. } => Some(*one_rm),
            RepModel::Gymnastic { .. } => None,
        }
    }

    /// Seconds for the next rep
    ///
    /// `fatigue_ratio` is the movement's bucket fill in [0, 1]. The result is
    /// never below `min_rep_s`.
    pub fn rep_cost(
        &self,
        load_fraction: f64,
        fatigue_ratio: f64,
        multipliers: &EnvironmentMultipliers,
        min_rep_s: f64,
    ) -> f64 {
        let ratio = if fatigue_ratio.is_finite() {
            fatigue_ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let (fresh, slope) = match self {
            RepModel::Barbell { profile, .. } => (profile.rep_time(load_fraction), profile.fatigue_slope),
            RepModel::Gymnastic { skill } => (skill.cycle_s, skill.fatigue_slope),
        };
        (fresh * (1.0 + slope * ratio) * multipliers.rep_time).max(min_rep_s)
    }

    /// Largest set the athlete can do fresh
    pub fn unbroken_cap(&self, load_fraction: f64, ceiling: f64, barbell_set_cap: u32) -> u32 {
        match self {
            RepModel::Barbell { .. } => {
                if !(load_fraction.is_finite() && load_fraction > 0.0) {
                    return barbell_set_cap;
                }
                let reps = (ceiling / load_fraction).floor();
                if reps >= barbell_set_cap as f64 {
                    barbell_set_cap
                } else {
                    (reps as u32).max(1)
                }
            }
            RepModel::Gymnastic { skill } => skill.unbroken_cap,
        }
    }

    /// Local-fatigue load of one rep, before pattern weights
    pub fn local_load(&self, load_fraction: f64, ceiling: f64) -> f64 {
        match self {
            RepModel::Barbell { .. } => load_fraction,
            RepModel::Gymnastic { skill } => ceiling / skill.unbroken_cap as f64,
        }
    }
}

// ============================================================================
// Cardio pacing
// ============================================================================

/// What a cardio target is measured in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardioMetric {
    Meters,
    Calories,
    Seconds,
}

impl CardioMetric {
    /// Metric and amount of a cardio work target (`None` for reps)
    pub fn for_target(work: &WorkTarget) -> Option<(Self, f64)> {
        match *work {
            WorkTarget::Distance { meters } => Some((CardioMetric::Meters, meters)),
            WorkTarget::Calories { calories } => Some((CardioMetric::Calories, calories)),
            WorkTarget::Duration { seconds } => Some((CardioMetric::Seconds, seconds)),
            WorkTarget::Reps { .. } => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CardioMetric::Meters => "m",
            CardioMetric::Calories => "cal",
            CardioMetric::Seconds => "s",
        }
    }
}

/// Check the cardio profile a movement paces against
pub fn resolve_cardio<'a>(
    movement: &MovementSpec,
    capabilities: &'a AthleteCapabilities,
) -> Result<&'a CardioProfile> {
    let modality = movement
        .modality
        .as_deref()
        .ok_or_else(|| Error::capability(&movement.id, "cardio movement has no modality"))?;
    let profile = capabilities.cardio_profiles.get(modality).ok_or_else(|| {
        Error::capability(&movement.id, format!("no cardio profile for '{}'", modality))
    })?;
    if !(profile.cp.is_finite() && profile.cp > 0.0) {
        return Err(Error::capability(
            &movement.id,
            format!("critical power must be positive, got {}", profile.cp),
        ));
    }
    if !(profile.w_prime.is_finite() && profile.w_prime >= 0.0) {
        return Err(Error::capability(
            &movement.id,
            format!("W′ must be non-negative, got {}", profile.w_prime),
        ));
    }
    Ok(profile)
}

/// Units of `metric` produced per second at `power`, fresh and in neutral
/// conditions. `None` when the profile's unit cannot express the metric.
pub fn work_rate(profile: &CardioProfile, metric: CardioMetric, power: f64) -> Option<f64> {
    let power = power.max(0.0);
    match (profile.unit, metric) {
        (_, CardioMetric::Seconds) => Some(1.0),
        (CardioUnit::Watts, CardioMetric::Meters) => Some((power / ERG_DRAG).cbrt()),
        (CardioUnit::Watts, CardioMetric::Calories) => {
            Some((ERG_KCAL_PER_WATT_HOUR * power + ERG_KCAL_OFFSET_PER_HOUR) / 3600.0)
        }
        (CardioUnit::MetersPerSecond, CardioMetric::Meters) => Some(power),
        (CardioUnit::MetersPerSecond, CardioMetric::Calories) => None,
    }
}

/// Seconds needed to cover `units` at `power` under the rep-time multiplier
///
/// Timed pieces are not stretched by the environment.
pub fn time_to_cover(
    profile: &CardioProfile,
    metric: CardioMetric,
    units: f64,
    power: f64,
    rep_time_mult: f64,
) -> f64 {
    if units <= 0.0 {
        return 0.0;
    }
    let rate = match work_rate(profile, metric, power) {
        Some(rate) if rate > 0.0 => rate,
        _ => return f64::INFINITY,
    };
    match metric {
        CardioMetric::Seconds => units,
        _ => units / rate * rep_time_mult,
    }
}

/// Highest sustainable output for the remaining work
///
/// Searches `[min(CP, cap), cap]` where `cap = CP · intensity_cap`, keeping
/// the implied depletion over the whole remaining piece within
/// `wbal − reserve · W′`.
pub fn pace_cardio(
    profile: &CardioProfile,
    metric: CardioMetric,
    remaining_units: f64,
    wbal: f64,
    cardio_reserve: f64,
    intensity_cap: f64,
    multipliers: &EnvironmentMultipliers,
) -> f64 {
    let cap = profile.cp * intensity_cap.max(0.0);
    let usable = (wbal - cardio_reserve * profile.w_prime).max(0.0);

    let depletion = |power: f64| -> f64 {
        if power <= profile.cp {
            return 0.0;
        }
        let seconds = time_to_cover(profile, metric, remaining_units, power, multipliers.rep_time);
        (power - profile.cp) * seconds * multipliers.fatigue_accum
    };

    if depletion(cap) <= usable {
        return cap;
    }

    let mut lo = profile.cp.min(cap);
    let mut hi = cap;
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if depletion(mid) <= usable {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}
