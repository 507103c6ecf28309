//! Two-tier fatigue tracking.
//!
//! Cardiovascular fatigue is a W′-balance per cardio modality: work above
//! critical power drains it linearly, anything at or below critical power
//! lets it recover exponentially toward W′. Local fatigue is one accumulator
//! per movement-pattern bucket: reps add `load_fraction × reps`, and idle
//! buckets decay with a bucket-specific half-life.
//!
//! The tracker is total over its inputs. Out-of-domain values are clamped
//! and recorded as [`Diagnostic`]s rather than returned as errors.

use crate::calibration::{RecoveryCalibration, SimulationSettings};
use crate::environment::EnvironmentMultipliers;
use crate::{
    AthleteCapabilities, CardioProfile, Diagnostic, DiagnosticKind, FatigueState, MovementSpec,
    PatternBucket,
};
use std::collections::BTreeMap;

/// What the athlete was doing during an elapsed interval
#[derive(Clone, Copy, Debug)]
pub enum Effort<'a> {
    Rest,
    /// `reps` reps at `load_fraction` (of 1RM, or the gymnastic equivalent)
    Reps {
        movement: &'a MovementSpec,
        load_fraction: f64,
        reps: u32,
    },
    /// Steady cardio output (watts or m/s, matching the modality's profile)
    Cardio {
        movement: &'a MovementSpec,
        power: f64,
    },
}

impl<'a> Effort<'a> {
    fn movement(&self) -> Option<&'a MovementSpec> {
        match *self {
            Effort::Rest => None,
            Effort::Reps { movement, .. } | Effort::Cardio { movement, .. } => Some(movement),
        }
    }
}

/// Hard limits reached during an update
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateOutcome {
    /// First bucket of the movement that reached the ceiling
    pub ceiling_hit: Option<PatternBucket>,
    /// Modality whose W′ balance reached zero
    pub wbal_exhausted: Option<String>,
}

impl UpdateOutcome {
    pub fn is_forced(&self) -> bool {
        self.ceiling_hit.is_some() || self.wbal_exhausted.is_some()
    }
}

/// Owns and mutates the athlete's physiological state for one run
#[derive(Debug)]
pub struct FatigueTracker<'a> {
    state: FatigueState,
    profiles: &'a BTreeMap<String, CardioProfile>,
    recovery: &'a RecoveryCalibration,
    multipliers: EnvironmentMultipliers,
    ceiling: f64,
    cardio_local_per_s: f64,
    elapsed: f64,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> FatigueTracker<'a> {
    /// Create a tracker, fresh or from a carried-over state
    ///
    /// Every cardio modality in the capabilities starts at full W′ unless the
    /// carry-over state names it. Carried values are clamped into range.
    pub fn new(
        capabilities: &'a AthleteCapabilities,
        recovery: &'a RecoveryCalibration,
        settings: &SimulationSettings,
        multipliers: EnvironmentMultipliers,
        initial: Option<&FatigueState>,
    ) -> Self {
        let mut tracker = Self {
            state: FatigueState::default(),
            profiles: &capabilities.cardio_profiles,
            recovery,
            multipliers,
            ceiling: settings.local_ceiling,
            cardio_local_per_s: settings.cardio_local_per_s,
            elapsed: 0.0,
            diagnostics: Vec::new(),
        };

        for (modality, profile) in tracker.profiles {
            let carried = initial.and_then(|s| s.wbal(modality));
            let value = match carried {
                Some(v) => tracker.clamp_recorded(
                    &format!("carry-over wbal[{}]", modality),
                    v,
                    0.0,
                    profile.w_prime,
                ),
                None => profile.w_prime,
            };
            tracker.state.wbal.insert(modality.clone(), value);
        }

        if let Some(initial) = initial {
            for bucket in PatternBucket::ALL {
                let value = tracker.clamp_recorded(
                    &format!("carry-over local[{}]", bucket.as_str()),
                    initial.local(bucket),
                    0.0,
                    tracker.ceiling,
                );
                tracker.state.local.insert(bucket, value);
            }
        }

        tracker
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    pub fn multipliers(&self) -> EnvironmentMultipliers {
        self.multipliers
    }

    pub fn local(&self, bucket: PatternBucket) -> f64 {
        self.state.local(bucket)
    }

    pub fn wbal(&self, modality: &str) -> Option<f64> {
        self.state.wbal(modality)
    }

    pub fn profile(&self, modality: &str) -> Option<&'a CardioProfile> {
        self.profiles.get(modality)
    }

    /// Weighted mean fill of the movement's buckets, in [0, 1]
    pub fn load_ratio(&self, movement: &MovementSpec) -> f64 {
        let total_weight: f64 = movement.patterns.iter().map(|p| p.weight).sum();
        if total_weight <= 0.0 {
            return 0.0;
        }
        let weighted: f64 = movement
            .patterns
            .iter()
            .map(|p| p.weight * self.local(p.bucket))
            .sum();
        (weighted / total_weight / self.ceiling).clamp(0.0, 1.0)
    }

    /// Fill of the fullest bucket the movement loads, in [0, 1]
    pub fn peak_ratio(&self, movement: &MovementSpec) -> f64 {
        movement
            .buckets()
            .map(|b| self.local(b) / self.ceiling)
            .fold(0.0, f64::max)
            .clamp(0.0, 1.0)
    }

    /// Half-life of a bucket after the environmental recovery multiplier
    pub fn effective_half_life(&self, bucket: PatternBucket) -> f64 {
        self.recovery.half_life_s.get(bucket) / self.multipliers.recovery
    }

    /// W′ recovery time constant after the environmental recovery multiplier
    pub fn effective_tau(&self, modality: &str) -> f64 {
        self.recovery.tau_for(modality) / self.multipliers.recovery
    }

    /// Read-only copy of the current state
    pub fn snapshot(&self) -> FatigueState {
        self.state.clone()
    }

    pub fn into_state(self) -> (FatigueState, Vec<Diagnostic>) {
        (self.state, self.diagnostics)
    }

    /// Move accumulated diagnostics out of the tracker
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Overwrite one bucket (clamped), e.g. to model a pre-fatigued athlete
    pub fn set_local(&mut self, bucket: PatternBucket, value: f64) {
        let value = self.clamp_recorded(
            &format!("set local[{}]", bucket.as_str()),
            value,
            0.0,
            self.ceiling,
        );
        self.state.local.insert(bucket, value);
    }

    /// Advance physiology by `elapsed_s` seconds of `effort`
    pub fn advance(&mut self, elapsed_s: f64, effort: Effort<'_>) -> UpdateOutcome {
        let dt = if elapsed_s.is_finite() && elapsed_s >= 0.0 {
            elapsed_s
        } else {
            self.record("elapsed seconds", elapsed_s, 0.0);
            0.0
        };

        let mut outcome = UpdateOutcome::default();
        if dt == 0.0 && matches!(effort, Effort::Rest) {
            return outcome;
        }

        self.elapsed += dt;
        self.update_local(dt, &effort, &mut outcome);
        self.update_wbal(dt, &effort, &mut outcome);
        outcome
    }

    fn update_local(&mut self, dt: f64, effort: &Effort<'_>, outcome: &mut UpdateOutcome) {
        let movement = effort.movement();
        let recovery = self.multipliers.recovery;

        // Idle buckets decay
        for bucket in PatternBucket::ALL {
            let active = movement.map_or(false, |m| m.buckets().any(|b| b == bucket));
            if active || dt == 0.0 {
                continue;
            }
            let half_life = self.recovery.half_life_s.get(bucket);
            let current = self.state.local(bucket);
            if current > 0.0 {
                let decayed = current * 0.5_f64.powf(dt * recovery / half_life);
                self.state.local.insert(bucket, decayed.max(0.0));
            }
        }

        let base = match *effort {
            Effort::Rest => return,
            Effort::Reps {
                load_fraction,
                reps,
                ..
            } => {
                let fraction = if load_fraction.is_finite() && load_fraction >= 0.0 {
                    load_fraction
                } else {
                    self.record("load fraction", load_fraction, 0.0);
                    0.0
                };
                fraction * reps as f64
            }
            Effort::Cardio { movement, power } => {
                let intensity = movement
                    .modality
                    .as_deref()
                    .and_then(|m| self.profiles.get(m))
                    .filter(|p| p.cp > 0.0)
                    .map_or(1.0, |p| power / p.cp);
                let intensity = if intensity.is_finite() {
                    intensity.max(0.0)
                } else {
                    self.record("cardio intensity", intensity, 0.0);
                    0.0
                };
                self.cardio_local_per_s * dt * intensity
            }
        };

        let Some(movement) = movement else {
            return;
        };

        for pattern in &movement.patterns {
            let amount = base * pattern.weight * self.multipliers.fatigue_accum;
            if amount <= 0.0 {
                continue;
            }
            let next = self.state.local(pattern.bucket) + amount;
            if next >= self.ceiling {
                self.state.local.insert(pattern.bucket, self.ceiling);
                if outcome.ceiling_hit.is_none() {
                    outcome.ceiling_hit = Some(pattern.bucket);
                }
            } else {
                self.state.local.insert(pattern.bucket, next);
            }
        }
    }

    fn update_wbal(&mut self, dt: f64, effort: &Effort<'_>, outcome: &mut UpdateOutcome) {
        let (active_modality, power) = match *effort {
            Effort::Cardio { movement, power } => {
                let power = if power.is_finite() && power >= 0.0 {
                    power
                } else {
                    self.record("cardio power", power, 0.0);
                    0.0
                };
                (movement.modality.as_deref(), power)
            }
            _ => (None, 0.0),
        };

        let modalities: Vec<String> = self.state.wbal.keys().cloned().collect();
        for modality in modalities {
            let Some(profile) = self.profiles.get(&modality) else {
                continue;
            };
            let current = self.state.wbal(&modality).unwrap_or(profile.w_prime);
            let demand = if active_modality == Some(modality.as_str()) {
                power
            } else {
                0.0
            };

            let next = if demand > profile.cp {
                let drained = current - (demand - profile.cp) * dt * self.multipliers.fatigue_accum;
                if drained <= 0.0 {
                    outcome.wbal_exhausted = Some(modality.clone());
                    0.0
                } else {
                    drained
                }
            } else {
                let tau = self.effective_tau(&modality);
                let deficit = (profile.w_prime - current).max(0.0);
                profile.w_prime - deficit * (-dt / tau).exp()
            };

            let next = self.clamp_recorded(
                &format!("wbal[{}]", modality),
                next,
                0.0,
                profile.w_prime,
            );
            self.state.wbal.insert(modality, next);
        }
    }

    fn clamp_recorded(&mut self, context: &str, value: f64, min: f64, max: f64) -> f64 {
        if value.is_nan() {
            self.record(context, value, min);
            return min;
        }
        if value < min {
            self.record(context, value, min);
            return min;
        }
        if value > max {
            self.record(context, value, max);
            return max;
        }
        value
    }

    fn record(&mut self, context: &str, value: f64, clamped_to: f64) {
        tracing::warn!(
            "Numeric divergence in {}: {} clamped to {} at t={:.1}s",
            context,
            value,
            clamped_to,
            self.elapsed
        );
        self.diagnostics.push(Diagnostic {
            at_seconds: self.elapsed,
            kind: DiagnosticKind::NumericDivergence,
            context: context.to_string(),
            value,
            clamped_to,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::get_default_catalog;
    use crate::GymSkill;
    use proptest::prelude::*;

    fn capabilities() -> AthleteCapabilities {
        AthleteCapabilities::default()
            .with_one_rm("back_squat", 140.0)
            .with_gym_skill("pull_up", GymSkill::new(1.5, 20))
            .with_cardio("row", CardioProfile::watts(250.0, 18_000.0))
    }

    fn movement(id: &str) -> &'static MovementSpec {
        get_default_catalog().get(id).unwrap()
    }

    #[test]
    fn test_fresh_tracker() {
        let caps = capabilities();
        let recovery = RecoveryCalibration::default();
        let tracker = FatigueTracker::new(
            &caps,
            &recovery,
            &SimulationSettings::default(),
            EnvironmentMultipliers::NEUTRAL,
            None,
        );
        assert_eq!(tracker.wbal("row"), Some(18_000.0));
        for bucket in PatternBucket::ALL {
            assert_eq!(tracker.local(bucket), 0.0);
        }
    }

    #[test]
    fn test_zero_rest_is_idempotent() {
        let caps = capabilities();
        let recovery = RecoveryCalibration::default();
        let mut tracker = FatigueTracker::new(
            &caps,
            &recovery,
            &SimulationSettings::default(),
            EnvironmentMultipliers::NEUTRAL,
            None,
        );
        tracker.advance(
            3.0,
            Effort::Reps {
                movement: movement("thruster"),
                load_fraction: 0.3,
                reps: 5,
            },
        );
        tracker.advance(
            30.0,
            Effort::Cardio {
                movement: movement("row"),
                power: 400.0,
            },
        );

        let before = tracker.snapshot();
        tracker.advance(0.0, Effort::Rest);
        assert_eq!(tracker.snapshot(), before);
    }

    #[test]
    fn test_reps_accumulate_weighted_load() {
        let caps = capabilities();
        let recovery = RecoveryCalibration::default();
        let multipliers = EnvironmentMultipliers {
            fatigue_accum: 1.5,
            ..EnvironmentMultipliers::NEUTRAL
        };
        let mut tracker = FatigueTracker::new(
            &caps,
            &recovery,
            &SimulationSettings::default(),
            multipliers,
            None,
        );

        let outcome = tracker.advance(
            10.0,
            Effort::Reps {
                movement: movement("thruster"),
                load_fraction: 0.4,
                reps: 5,
            },
        );

        assert_eq!(outcome, UpdateOutcome::default());
        // squat weight 1.0, push weight 0.6
        assert!((tracker.local(PatternBucket::Squat) - 3.0).abs() < 1e-12);
        assert!((tracker.local(PatternBucket::Push) - 1.8).abs() < 1e-12);
        assert_eq!(tracker.local(PatternBucket::Pull), 0.0);
    }

    #[test]
    fn test_ceiling_truncates_and_reports() {
        let caps = capabilities();
        let recovery = RecoveryCalibration::default();
        let mut tracker = FatigueTracker::new(
            &caps,
            &recovery,
            &SimulationSettings::default(),
            EnvironmentMultipliers::NEUTRAL,
            None,
        );
        tracker.set_local(PatternBucket::Pull, 9.8);

        let outcome = tracker.advance(
            1.5,
            Effort::Reps {
                movement: movement("pull_up"),
                load_fraction: 0.5,
                reps: 1,
            },
        );

        assert_eq!(outcome.ceiling_hit, Some(PatternBucket::Pull));
        assert_eq!(tracker.local(PatternBucket::Pull), tracker.ceiling());
        assert!(tracker.take_diagnostics().is_empty());
    }

    #[test]
    fn test_idle_bucket_halves_after_half_life() {
        let caps = capabilities();
        let recovery = RecoveryCalibration::default();
        let mut tracker = FatigueTracker::new(
            &caps,
            &recovery,
            &SimulationSettings::default(),
            EnvironmentMultipliers::NEUTRAL,
            None,
        );
        tracker.set_local(PatternBucket::Squat, 8.0);

        tracker.advance(recovery.half_life_s.squat, Effort::Rest);
        assert!((tracker.local(PatternBucket::Squat) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_poor_recovery_slows_decay() {
        let caps = capabilities();
        let recovery = RecoveryCalibration::default();
        let settings = SimulationSettings::default();
        let slow = EnvironmentMultipliers {
            recovery: 0.5,
            ..EnvironmentMultipliers::NEUTRAL
        };

        let mut normal = FatigueTracker::new(&caps, &recovery, &settings, EnvironmentMultipliers::NEUTRAL, None);
        let mut tired = FatigueTracker::new(&caps, &recovery, &settings, slow, None);
        normal.set_local(PatternBucket::Core, 6.0);
        tired.set_local(PatternBucket::Core, 6.0);

        normal.advance(60.0, Effort::Rest);
        tired.advance(60.0, Effort::Rest);

        assert!(tired.local(PatternBucket::Core) > normal.local(PatternBucket::Core));
        assert_eq!(tired.effective_half_life(PatternBucket::Core), 120.0);
    }

    #[test]
    fn test_working_bucket_does_not_decay() {
        let caps = capabilities();
        let recovery = RecoveryCalibration::default();
        let mut tracker = FatigueTracker::new(
            &caps,
            &recovery,
            &SimulationSettings::default(),
            EnvironmentMultipliers::NEUTRAL,
            None,
        );
        tracker.set_local(PatternBucket::Pull, 2.0);
        tracker.set_local(PatternBucket::Squat, 2.0);

        tracker.advance(
            30.0,
            Effort::Reps {
                movement: movement("pull_up"),
                load_fraction: 0.0,
                reps: 10,
            },
        );

        assert_eq!(tracker.local(PatternBucket::Pull), 2.0);
        assert!(tracker.local(PatternBucket::Squat) < 2.0);
    }

    #[test]
    fn test_wbal_depletes_above_cp_and_clamps() {
        let caps = capabilities();
        let recovery = RecoveryCalibration::default();
        let mut tracker = FatigueTracker::new(
            &caps,
            &recovery,
            &SimulationSettings::default(),
            EnvironmentMultipliers::NEUTRAL,
            None,
        );

        let outcome = tracker.advance(
            60.0,
            Effort::Cardio {
                movement: movement("row"),
                power: 350.0,
            },
        );
        assert!(!outcome.is_forced());
        assert!((tracker.wbal("row").unwrap() - 12_000.0).abs() < 1e-9);

        let outcome = tracker.advance(
            200.0,
            Effort::Cardio {
                movement: movement("row"),
                power: 350.0,
            },
        );
        assert_eq!(outcome.wbal_exhausted.as_deref(), Some("row"));
        assert_eq!(tracker.wbal("row"), Some(0.0));
        assert!(tracker.take_diagnostics().is_empty());
    }

    #[test]
    fn test_wbal_recovers_toward_max() {
        let caps = capabilities();
        let recovery = RecoveryCalibration::default();
        let mut tracker = FatigueTracker::new(
            &caps,
            &recovery,
            &SimulationSettings::default(),
            EnvironmentMultipliers::NEUTRAL,
            None,
        );
        tracker.advance(
            60.0,
            Effort::Cardio {
                movement: movement("row"),
                power: 400.0,
            },
        );
        let drained = tracker.wbal("row").unwrap();

        // Rowing below CP still recovers
        tracker.advance(
            60.0,
            Effort::Cardio {
                movement: movement("row"),
                power: 200.0,
            },
        );
        let easy = tracker.wbal("row").unwrap();
        assert!(easy > drained);

        tracker.advance(10_000.0, Effort::Rest);
        let rested = tracker.wbal("row").unwrap();
        assert!(rested > easy);
        assert!(rested <= 18_000.0);
    }

    #[test]
    fn test_carry_over_is_clamped_and_diagnosed() {
        let caps = capabilities();
        let recovery = RecoveryCalibration::default();
        let mut initial = FatigueState::default();
        initial.wbal.insert("row".into(), -50.0);
        initial.local.insert(PatternBucket::Grip, 99.0);

        let mut tracker = FatigueTracker::new(
            &caps,
            &recovery,
            &SimulationSettings::default(),
            EnvironmentMultipliers::NEUTRAL,
            Some(&initial),
        );

        assert_eq!(tracker.wbal("row"), Some(0.0));
        assert_eq!(tracker.local(PatternBucket::Grip), 10.0);
        let diagnostics = tracker.take_diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics
            .iter()
            .all(|d| d.kind == DiagnosticKind::NumericDivergence));
    }

    #[test]
    fn test_non_finite_inputs_are_clamped_not_fatal() {
        let caps = capabilities();
        let recovery = RecoveryCalibration::default();
        let mut tracker = FatigueTracker::new(
            &caps,
            &recovery,
            &SimulationSettings::default(),
            EnvironmentMultipliers::NEUTRAL,
            None,
        );
        let before = tracker.snapshot();

        tracker.advance(f64::NAN, Effort::Rest);
        assert_eq!(tracker.snapshot(), before);

        tracker.advance(
            5.0,
            Effort::Cardio {
                movement: movement("row"),
                power: f64::INFINITY,
            },
        );
        assert_eq!(tracker.wbal("row"), Some(18_000.0));
        assert_eq!(tracker.take_diagnostics().len(), 3);
    }

    #[derive(Clone, Debug)]
    enum Step {
        Rest(f64),
        Reps(usize, f64, u32, f64),
        Cardio(f64, f64),
    }

    fn step() -> impl Strategy<Value = Step> {
        let movements = 0usize..4;
        prop_oneof![
            (0.0..300.0f64).prop_map(Step::Rest),
            (movements, 0.0..1.2f64, 1u32..30, 0.5..60.0f64)
                .prop_map(|(m, f, r, t)| Step::Reps(m, f, r, t)),
            (0.0..800.0f64, 1.0..120.0f64).prop_map(|(p, t)| Step::Cardio(p, t)),
        ]
    }

    proptest! {
        #[test]
        fn prop_state_stays_in_domain(steps in prop::collection::vec(step(), 1..60)) {
            let caps = capabilities();
            let recovery = RecoveryCalibration::default();
            let mut tracker = FatigueTracker::new(
                &caps,
                &recovery,
                &SimulationSettings::default(),
                EnvironmentMultipliers { rep_time: 1.2, fatigue_accum: 1.3, recovery: 0.7 },
                None,
            );
            let ids = ["thruster", "pull_up", "burpee", "toes_to_bar"];

            for step in steps {
                match step {
                    Step::Rest(t) => { tracker.advance(t, Effort::Rest); }
                    Step::Reps(m, f, r, t) => {
                        tracker.advance(t, Effort::Reps { movement: movement(ids[m]), load_fraction: f, reps: r });
                    }
                    Step::Cardio(p, t) => {
                        tracker.advance(t, Effort::Cardio { movement: movement("row"), power: p });
                    }
                }

                let wbal = tracker.wbal("row").unwrap();
                prop_assert!((0.0..=18_000.0).contains(&wbal));
                for bucket in PatternBucket::ALL {
                    let v = tracker.local(bucket);
                    prop_assert!(v >= 0.0 && v <= tracker.ceiling());
                }
            }
            prop_assert!(tracker.take_diagnostics().is_empty());
        }
    }
}
