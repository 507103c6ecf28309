//! Discrete-event simulation loop.
//!
//! A run walks the workout's rounds and exercises in order. For each set it
//! asks the strategy for a size and load, the timing model for each rep's
//! cost, and the fatigue tracker for the new state; then it rests as long as
//! the strategy (or a hard limit) demands. Every clock advance passes through
//! the tracker, so the timeline and the physiology can never drift apart.
//!
//! Everything that can be wrong with the inputs is checked before the clock
//! starts. Once running, a simulation always produces a result.

use crate::calibration::{Calibration, SimulationSettings};
use crate::environment::environment_multipliers;
use crate::fatigue::{Effort, FatigueTracker, UpdateOutcome};
use crate::strategy::{LoadDecision, NextSet, RpeConstraints, StrategyEngine, StrategyEvent};
use crate::timing::{resolve_cardio, time_to_cover, work_rate, CardioMetric, RepModel};
use crate::{
    AthleteCapabilities, CardioProfile, Catalog, ContextParams, DayState, Error, EventKind,
    EventNote, Exercise, FatigueState, MovementKind, MovementSpec, Result, RoundSplit,
    SimulationEvent, SimulationResult, WorkTarget, WorkoutKind, Wod,
};

/// Remaining cardio work below this is treated as finished
const WORK_EPSILON: f64 = 1e-9;

/// Everything a single run consumes
#[derive(Clone, Debug)]
pub struct SimulationInputs {
    pub capabilities: AthleteCapabilities,
    pub context: ContextParams,
    pub day: DayState,
    /// Overrides derivation from `day.rpe_intended`
    pub constraints: Option<RpeConstraints>,
    pub wod: Wod,
    /// Carry-over from an earlier workout the same day
    pub initial_fatigue: Option<FatigueState>,
}

impl SimulationInputs {
    pub fn new(capabilities: AthleteCapabilities, wod: Wod) -> Self {
        Self {
            capabilities,
            context: ContextParams::default(),
            day: DayState::default(),
            constraints: None,
            wod,
            initial_fatigue: None,
        }
    }

    pub fn with_context(mut self, context: ContextParams) -> Self {
        self.context = context;
        self
    }

    pub fn with_day(mut self, day: DayState) -> Self {
        self.day = day;
        self
    }

    pub fn with_rpe(mut self, rpe: f64) -> Self {
        self.day.rpe_intended = rpe;
        self
    }

    pub fn with_constraints(mut self, constraints: RpeConstraints) -> Self {
        self.constraints = Some(constraints);
        self
    }

    pub fn with_initial_fatigue(mut self, state: FatigueState) -> Self {
        self.initial_fatigue = Some(state);
        self
    }
}

// ============================================================================
// Pre-run planning
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
enum RepTarget {
    Count(u32),
    /// Max reps inside a station window of this many seconds
    Window(f64),
}

enum Plan<'a> {
    Reps {
        model: RepModel,
        target: RepTarget,
        load: LoadDecision,
    },
    Cardio {
        profile: &'a CardioProfile,
        modality: &'a str,
        metric: CardioMetric,
        units: f64,
    },
}

struct PlannedExercise<'a> {
    movement: &'a MovementSpec,
    plan: Plan<'a>,
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn plan_exercise<'a>(
    exercise: &Exercise,
    catalog: &'a Catalog,
    capabilities: &'a AthleteCapabilities,
    strategy: &StrategyEngine<'_>,
) -> Result<PlannedExercise<'a>> {
    let movement = catalog
        .get(&exercise.movement)
        .ok_or_else(|| Error::capability(&exercise.movement, "movement not in catalog"))?;

    if let Some(kg) = exercise.load_kg {
        if !(kg.is_finite() && kg >= 0.0) {
            return Err(Error::InvalidWorkout(format!(
                "'{}' has invalid load {}",
                movement.id, kg
            )));
        }
    }

    let plan = match movement.kind {
        MovementKind::Cardio => {
            let profile = resolve_cardio(movement, capabilities)?;
            let modality = movement.modality.as_deref().unwrap_or(movement.id.as_str());
            let (metric, units) = CardioMetric::for_target(&exercise.work).ok_or_else(|| {
                Error::InvalidWorkout(format!(
                    "'{}' is cardio and needs a distance, calorie or duration target",
                    movement.id
                ))
            })?;
            if !positive(units) {
                return Err(Error::InvalidWorkout(format!(
                    "'{}' has non-positive target {}",
                    movement.id, units
                )));
            }
            if work_rate(profile, metric, profile.cp).is_none() {
                return Err(Error::capability(
                    &movement.id,
                    format!("a speed-based profile cannot pace a {} target", metric.as_str()),
                ));
            }
            Plan::Cardio {
                profile,
                modality,
                metric,
                units,
            }
        }
        MovementKind::Barbell | MovementKind::Gymnastic => {
            let model = RepModel::resolve(movement, capabilities)?;
            let target = match exercise.work {
                WorkTarget::Reps { reps } if reps > 0 => RepTarget::Count(reps),
                WorkTarget::Duration { seconds } if positive(seconds) => RepTarget::Window(seconds),
                WorkTarget::Reps { .. } | WorkTarget::Duration { .. } => {
                    return Err(Error::InvalidWorkout(format!(
                        "'{}' has an empty work target",
                        movement.id
                    )));
                }
                WorkTarget::Distance { .. } | WorkTarget::Calories { .. } => {
                    return Err(Error::InvalidWorkout(format!(
                        "'{}' is rep-based and needs a rep or duration target",
                        movement.id
                    )));
                }
            };
            let load = match model.one_rm() {
                Some(one_rm) => strategy.decide_load(exercise.load_kg, one_rm),
                None => {
                    if exercise.load_kg.is_some() {
                        tracing::debug!("Ignoring external load on '{}'", movement.id);
                    }
                    LoadDecision {
                        kg: 0.0,
                        fraction: 0.0,
                        scaled_from: None,
                    }
                }
            };
            Plan::Reps {
                model,
                target,
                load,
            }
        }
    };

    Ok(PlannedExercise { movement, plan })
}

fn validate_wod(wod: &Wod) -> Result<Option<f64>> {
    let cap = match wod.time_cap_seconds {
        Some(cap) if positive(cap) => Some(cap),
        Some(cap) => {
            return Err(Error::InvalidWorkout(format!(
                "time cap must be positive, got {}",
                cap
            )))
        }
        None => None,
    };
    if wod.kind == WorkoutKind::Amrap && cap.is_none() {
        return Err(Error::InvalidWorkout(format!(
            "AMRAP '{}' needs a time cap",
            wod.name
        )));
    }
    if !(wod.rest_between_rounds_s.is_finite() && wod.rest_between_rounds_s >= 0.0) {
        return Err(Error::InvalidWorkout(format!(
            "rest_between_rounds_s must be non-negative, got {}",
            wod.rest_between_rounds_s
        )));
    }
    Ok(cap)
}

// ============================================================================
// Run state
// ============================================================================

/// Why a wait or exercise stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    WindowClosed,
    Capped,
}

struct Run<'a> {
    clock: f64,
    cap: Option<f64>,
    settings: &'a SimulationSettings,
    tracker: FatigueTracker<'a>,
    strategy: StrategyEngine<'a>,
    timeline: Vec<SimulationEvent>,
    round: u32,
    round_reps: u32,
    total_reps: u32,
}

impl<'a> Run<'a> {
    fn push(&mut self, kind: EventKind, movement: Option<&str>, units: f64, note: Option<EventNote>) {
        self.timeline.push(SimulationEvent {
            timestamp: self.clock,
            kind,
            movement: movement.map(str::to_string),
            round: self.round,
            units,
            note,
            fatigue: self.tracker.snapshot(),
        });
    }

    /// Finish the run at the cap, idling through whatever time is left
    fn stop_at_cap(&mut self, movement: Option<&str>) -> Flow {
        if let Some(cap) = self.cap {
            let left = (cap - self.clock).max(0.0);
            self.tracker.advance(left, Effort::Rest);
            self.clock = cap;
        }
        self.push(EventKind::Rest, movement, 0.0, Some(EventNote::TimeCap));
        self.strategy.transition(StrategyEvent::TimeCap);
        tracing::info!("Time cap reached at {:.1}s", self.clock);
        Flow::Capped
    }

    /// Idle for `seconds`, stopping early at a window end or the cap
    fn wait(
        &mut self,
        kind: EventKind,
        seconds: f64,
        movement: Option<&str>,
        window_end: Option<f64>,
    ) -> Flow {
        if seconds <= 0.0 {
            return Flow::Continue;
        }
        let end = self.clock + seconds;

        let cap_first = match (self.cap, window_end) {
            // A window ending on the cap closes normally
            (Some(cap), Some(window)) => cap < window,
            (Some(_), None) => true,
            _ => false,
        };
        if cap_first && self.cap.map_or(false, |cap| end >= cap) {
            return self.stop_at_cap(movement);
        }
        if let Some(window) = window_end {
            if end >= window {
                self.tracker.advance(window - self.clock, Effort::Rest);
                self.clock = window;
                self.push(kind, movement, 0.0, None);
                return Flow::WindowClosed;
            }
        }

        self.tracker.advance(seconds, Effort::Rest);
        self.clock = end;
        self.push(kind, movement, 0.0, None);
        Flow::Continue
    }

    /// Latest time a unit of work may end
    fn limit(&self, window_end: Option<f64>) -> f64 {
        let cap = self.cap.unwrap_or(f64::INFINITY);
        window_end.map_or(cap, |w| w.min(cap))
    }

    fn run_exercise(&mut self, exercise: &PlannedExercise<'_>) -> Flow {
        self.strategy.begin_exercise();
        match &exercise.plan {
            Plan::Reps {
                model,
                target,
                load,
            } => self.run_reps(exercise.movement, model, *target, load),
            Plan::Cardio {
                profile,
                modality,
                metric,
                units,
            } => self.run_cardio(exercise.movement, profile, modality, *metric, *units),
        }
    }

    fn run_reps(
        &mut self,
        movement: &MovementSpec,
        model: &RepModel,
        target: RepTarget,
        load: &LoadDecision,
    ) -> Flow {
        let id = movement.id.as_str();
        let ceiling = self.tracker.ceiling();
        let multipliers = self.tracker.multipliers();
        let unbroken_cap = model.unbroken_cap(load.fraction, ceiling, self.settings.barbell_set_cap);
        let local_load = model.local_load(load.fraction, ceiling);
        let window_end = match target {
            RepTarget::Window(seconds) => Some(self.clock + seconds),
            RepTarget::Count(_) => None,
        };

        let mut load_note = load.scaled_from.map(|from_kg| EventNote::LoadScaled {
            from_kg,
            to_kg: load.kg,
        });
        let mut done = 0u32;

        loop {
            let remaining = match target {
                RepTarget::Count(reps) => Some(reps.saturating_sub(done)),
                RepTarget::Window(_) => None,
            };
            let set_size = self.strategy.decide_set(
                unbroken_cap,
                remaining,
                self.tracker.peak_ratio(movement),
            );

            let mut set_done = 0u32;
            let mut ceiling_hit = false;
            while set_done < set_size {
                let cost = model.rep_cost(
                    load.fraction,
                    self.tracker.load_ratio(movement),
                    &multipliers,
                    self.settings.min_rep_s,
                );
                if self.clock + cost > self.limit(window_end) {
                    let window_closes_first = match (window_end, self.cap) {
                        (Some(w), Some(c)) => w <= c,
                        (Some(_), None) => true,
                        _ => false,
                    };
                    if !window_closes_first {
                        return self.stop_at_cap(Some(id));
                    }
                    let left = window_end.map_or(0.0, |w| w - self.clock);
                    self.wait(EventKind::Rest, left, Some(id), window_end);
                    self.strategy.transition(StrategyEvent::SetFinished {
                        exercise_done: true,
                    });
                    return Flow::Continue;
                }

                let outcome = self.tracker.advance(
                    cost,
                    Effort::Reps {
                        movement,
                        load_fraction: local_load,
                        reps: 1,
                    },
                );
                self.clock += cost;
                set_done += 1;
                done += 1;
                self.round_reps += 1;
                self.total_reps += 1;

                let note = match outcome.ceiling_hit {
                    Some(bucket) => Some(EventNote::CeilingReached { bucket }),
                    None => load_note.take(),
                };
                self.push(EventKind::Rep, Some(id), 1.0, note);

                if outcome.ceiling_hit.is_some() {
                    ceiling_hit = true;
                    break;
                }
            }

            let exercise_done = matches!(target, RepTarget::Count(reps) if done >= reps);
            if exercise_done {
                self.strategy.transition(StrategyEvent::SetFinished {
                    exercise_done: true,
                });
                return Flow::Continue;
            }

            if ceiling_hit {
                tracing::debug!("'{}' set cut at {} of {} reps", id, set_done, set_size);
                self.strategy.transition(StrategyEvent::CeilingReached);
            } else {
                self.strategy.transition(StrategyEvent::SetFinished {
                    exercise_done: false,
                });
            }

            let next = NextSet {
                rep_load: local_load,
                remaining: match target {
                    RepTarget::Count(reps) => Some(reps.saturating_sub(done)),
                    RepTarget::Window(_) => None,
                },
            };
            let rest = self.strategy.decide_local_rest(&self.tracker, movement, next);
            match self.wait(EventKind::Rest, rest, Some(id), window_end) {
                Flow::Continue => {
                    self.strategy.transition(StrategyEvent::RestFinished);
                }
                Flow::WindowClosed => {
                    self.strategy.transition(StrategyEvent::SetFinished {
                        exercise_done: true,
                    });
                    return Flow::Continue;
                }
                Flow::Capped => return Flow::Capped,
            }
        }
    }

    fn run_cardio(
        &mut self,
        movement: &MovementSpec,
        profile: &CardioProfile,
        modality: &str,
        metric: CardioMetric,
        units: f64,
    ) -> Flow {
        let id = movement.id.as_str();
        let rep_time = self.tracker.multipliers().rep_time;
        let mut remaining = units;

        while remaining > WORK_EPSILON {
            let power = self
                .strategy
                .decide_pace(&self.tracker, modality, profile, metric, remaining);
            let finish = time_to_cover(profile, metric, remaining, power, rep_time);
            let mut seconds = finish.min(self.settings.cardio_interval_s);

            let capped = self.cap.map_or(false, |cap| self.clock + seconds > cap);
            if capped {
                seconds = self.cap.map_or(0.0, |cap| cap - self.clock).max(0.0);
            }

            let mut outcome = UpdateOutcome::default();
            if seconds > 0.0 {
                let covered = if seconds >= finish {
                    remaining
                } else {
                    remaining * seconds / finish
                };
                outcome = self
                    .tracker
                    .advance(seconds, Effort::Cardio { movement, power });
                self.clock += seconds;
                remaining -= covered;

                let note = if let Some(modality) = outcome.wbal_exhausted.clone() {
                    Some(EventNote::WbalExhausted { modality })
                } else {
                    outcome
                        .ceiling_hit
                        .map(|bucket| EventNote::CeilingReached { bucket })
                };
                self.push(EventKind::Rep, Some(id), covered, note);
            }

            if capped {
                return self.stop_at_cap(Some(id));
            }

            if outcome.is_forced()
                && remaining > WORK_EPSILON
                && self.forced_cardio_rest(movement, modality, &outcome) == Flow::Capped
            {
                return Flow::Capped;
            }
        }

        self.strategy.transition(StrategyEvent::SetFinished {
            exercise_done: true,
        });
        Flow::Continue
    }

    /// Mandatory rest after an interval drained W′ or filled a bucket
    fn forced_cardio_rest(
        &mut self,
        movement: &MovementSpec,
        modality: &str,
        outcome: &UpdateOutcome,
    ) -> Flow {
        let mut rest: f64 = 0.0;
        if outcome.wbal_exhausted.is_some() {
            self.strategy.transition(StrategyEvent::WbalExhausted);
            rest = rest.max(self.strategy.decide_cardio_rest(&self.tracker, modality));
        }
        if outcome.ceiling_hit.is_some() {
            self.strategy.transition(StrategyEvent::CeilingReached);
            rest = rest.max(
                self.strategy
                    .decide_local_rest(&self.tracker, movement, NextSet::OPEN),
            );
        }
        match self.wait(EventKind::Rest, rest, Some(movement.id.as_str()), None) {
            Flow::Capped => Flow::Capped,
            _ => {
                self.strategy.transition(StrategyEvent::RestFinished);
                Flow::Continue
            }
        }
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Run one simulation
///
/// Fails only on pre-run validation: unknown movements, missing or invalid
/// capability entries, malformed workouts, out-of-range constraints or bad
/// calibration. A validated run always returns a result.
pub fn simulate(
    inputs: &SimulationInputs,
    catalog: &Catalog,
    settings: &SimulationSettings,
    calibration: &Calibration,
) -> Result<SimulationResult> {
    settings.validate()?;
    calibration.validate()?;
    let cap = validate_wod(&inputs.wod)?;

    let constraints = match &inputs.constraints {
        Some(constraints) => {
            constraints.validate()?;
            constraints.clone()
        }
        None => RpeConstraints::from_rpe(inputs.day.rpe_intended, &calibration.rpe)?,
    };
    let strategy = StrategyEngine::new(&constraints, settings);

    let plans = inputs
        .wod
        .rounds
        .iter()
        .map(|round| {
            round
                .exercises
                .iter()
                .map(|exercise| plan_exercise(exercise, catalog, &inputs.capabilities, &strategy))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let multipliers = environment_multipliers(&inputs.context, &inputs.day, &calibration.environment);
    let tracker = FatigueTracker::new(
        &inputs.capabilities,
        &calibration.recovery,
        settings,
        multipliers,
        inputs.initial_fatigue.as_ref(),
    );

    tracing::info!(
        "Simulating '{}' ({:?}, {} round blocks, cap {:?}) at RPE {:.1}",
        inputs.wod.name,
        inputs.wod.kind,
        inputs.wod.rounds.len(),
        cap,
        constraints.target_rpe
    );

    let mut run = Run {
        clock: 0.0,
        cap,
        settings,
        tracker,
        strategy,
        timeline: Vec::new(),
        round: 0,
        round_reps: 0,
        total_reps: 0,
    };
    let mut splits = Vec::new();
    let mut rounds_completed = 0u32;
    let mut capped = false;

    if !inputs.wod.is_empty() {
        let mut previous: Option<&MovementSpec> = None;
        'workout: loop {
            for (round, planned) in inputs.wod.rounds.iter().zip(&plans) {
                if planned.is_empty() {
                    continue;
                }
                for _ in 0..round.repeat {
                    for (index, exercise) in planned.iter().enumerate() {
                        if let Some(from) = previous {
                            if index == 0 {
                                let flow = run.wait(
                                    EventKind::Rest,
                                    inputs.wod.rest_between_rounds_s,
                                    None,
                                    None,
                                );
                                if flow == Flow::Capped {
                                    capped = true;
                                    break 'workout;
                                }
                            }
                            if run.wait(EventKind::Transition, settings.transition_s, None, None)
                                == Flow::Capped
                            {
                                capped = true;
                                break 'workout;
                            }
                            let to = exercise.movement;
                            let rest = run.strategy.decide_transition_rest(&run.tracker, from, to);
                            if run.wait(EventKind::Rest, rest, Some(to.id.as_str()), None)
                                == Flow::Capped
                            {
                                capped = true;
                                break 'workout;
                            }
                        }
                        if index == 0 {
                            run.round += 1;
                            splits.push(RoundSplit {
                                round: run.round,
                                start: run.clock,
                                end: run.clock,
                                reps: 0,
                            });
                        }
                        previous = Some(exercise.movement);

                        if run.run_exercise(exercise) == Flow::Capped {
                            capped = true;
                            break 'workout;
                        }
                    }

                    rounds_completed += 1;
                    if let Some(split) = splits.last_mut() {
                        split.end = run.clock;
                        split.reps = run.round_reps;
                    }
                    run.round_reps = 0;
                }
            }

            if inputs.wod.kind == WorkoutKind::ForTime {
                break;
            }
        }
    }

    // The unfinished round has no split
    if capped && splits.len() as u32 > rounds_completed {
        splits.pop();
    }
    let partial_reps = if capped { run.round_reps } else { 0 };

    let completed = match inputs.wod.kind {
        WorkoutKind::ForTime => !capped,
        WorkoutKind::Amrap => true,
    };
    let total_time = match (inputs.wod.kind, cap) {
        (WorkoutKind::Amrap, Some(cap)) if !inputs.wod.is_empty() => cap,
        _ => run.clock,
    };

    let Run {
        tracker,
        timeline,
        total_reps,
        ..
    } = run;
    let (final_fatigue_state, diagnostics) = tracker.into_state();

    tracing::info!(
        "Finished '{}': {:.1}s, completed={}, rounds={}, reps={} (+{} partial), {} diagnostics",
        inputs.wod.name,
        total_time,
        completed,
        rounds_completed,
        total_reps,
        partial_reps,
        diagnostics.len()
    );

    Ok(SimulationResult {
        total_time,
        completed,
        rounds_completed,
        total_reps,
        partial_reps,
        timeline,
        final_fatigue_state,
        round_splits: splits,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::get_default_catalog;
    use crate::environment::EnvironmentMultipliers;
    use crate::strategy::StrategyState;
    use crate::{GymSkill, PatternBucket, Round};
    use proptest::prelude::*;

    fn athlete() -> AthleteCapabilities {
        AthleteCapabilities::default()
            .with_one_rm("back_squat", 140.0)
            .with_one_rm("deadlift", 180.0)
            .with_gym_skill("pull_up", GymSkill::new(1.5, 20))
            .with_gym_skill("burpee", GymSkill::new(3.0, 30))
            .with_gym_skill("toes_to_bar", GymSkill::new(1.2, 25))
            .with_gym_skill("box_jump", GymSkill::new(2.0, 40))
            .with_cardio("row", CardioProfile::watts(250.0, 18_000.0))
            .with_cardio("run", CardioProfile::speed(4.0, 200.0))
    }

    fn run(inputs: &SimulationInputs) -> Result<SimulationResult> {
        simulate(
            inputs,
            get_default_catalog(),
            &SimulationSettings::default(),
            &Calibration::default(),
        )
    }

    fn thrusters() -> Wod {
        Wod::for_time(
            "21 thrusters",
            vec![Round::new(vec![Exercise::reps("thruster", 21).with_load(43.0)])],
        )
        .with_time_cap(600.0)
    }

    fn cindy(cap: f64) -> Wod {
        Wod::amrap(
            "Cindy-ish",
            cap,
            vec![Round::new(vec![
                Exercise::reps("pull_up", 5),
                Exercise::reps("burpee", 10),
                Exercise::reps("box_jump", 15),
            ])],
        )
    }

    fn fran() -> Wod {
        Wod::for_time(
            "Fran",
            [21, 15, 9]
                .iter()
                .map(|&reps| {
                    Round::new(vec![
                        Exercise::reps("thruster", reps).with_load(43.0),
                        Exercise::reps("pull_up", reps),
                    ])
                })
                .collect(),
        )
        .with_time_cap(900.0)
    }

    /// A run positioned at the start of round 1, outside `simulate`
    fn bare_run<'a>(
        caps: &'a AthleteCapabilities,
        constraints: &'a RpeConstraints,
        settings: &'a SimulationSettings,
        calibration: &'a Calibration,
        initial: &FatigueState,
    ) -> Run<'a> {
        Run {
            clock: 0.0,
            cap: None,
            settings,
            tracker: FatigueTracker::new(
                caps,
                &calibration.recovery,
                settings,
                EnvironmentMultipliers::NEUTRAL,
                Some(initial),
            ),
            strategy: StrategyEngine::new(constraints, settings),
            timeline: Vec::new(),
            round: 1,
            round_reps: 0,
            total_reps: 0,
        }
    }

    fn assert_in_domain(result: &SimulationResult) {
        let ceiling = SimulationSettings::default().local_ceiling;
        for event in &result.timeline {
            for wbal in event.fatigue.wbal.values() {
                assert!(*wbal >= 0.0);
            }
            for bucket in PatternBucket::ALL {
                let v = event.fatigue.local(bucket);
                assert!((0.0..=ceiling).contains(&v));
            }
        }
    }

    fn assert_ordered(result: &SimulationResult) {
        for pair in result.timeline.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn test_thrusters_complete_inside_cap() {
        let inputs = SimulationInputs::new(athlete(), thrusters()).with_rpe(7.0);
        let result = run(&inputs).unwrap();

        assert!(result.completed);
        assert!(result.total_time < 600.0);
        assert_eq!(result.total_reps, 21);
        assert_eq!(result.rounds_completed, 1);
        assert_eq!(result.partial_reps, 0);

        let first = result
            .timeline
            .iter()
            .find(|e| e.kind == EventKind::Rep)
            .unwrap();
        assert!((1.0..=3.0).contains(&first.timestamp), "first rep {}", first.timestamp);

        // Every rep stays in the plausible band
        let mut last = 0.0;
        for event in &result.timeline {
            if event.kind == EventKind::Rep {
                let cost = event.timestamp - last;
                assert!((1.0..=3.0).contains(&cost), "rep cost {}", cost);
            }
            last = event.timestamp;
        }
        assert_ordered(&result);
        assert_in_domain(&result);
    }

    #[test]
    fn test_amrap_runs_to_cap() {
        let inputs = SimulationInputs::new(athlete(), cindy(720.0)).with_rpe(6.0);
        let result = run(&inputs).unwrap();

        assert_eq!(result.total_time, 720.0);
        assert!(result.completed);
        assert!(result.rounds_completed >= 1);
        assert!(result.partial_reps < 30);
        assert_eq!(
            result.total_reps,
            result.rounds_completed * 30 + result.partial_reps
        );
        assert_eq!(result.round_splits.len(), result.rounds_completed as usize);

        let last = result.timeline.last().unwrap();
        assert_eq!(last.timestamp, 720.0);
        assert_eq!(last.note, Some(EventNote::TimeCap));
        assert_ordered(&result);
        assert_in_domain(&result);
    }

    #[test]
    fn test_heat_slows_the_same_workout() {
        let mild = SimulationInputs::new(athlete(), thrusters()).with_rpe(7.0);
        let hot = mild.clone().with_context(ContextParams {
            temperature_c: 35.0,
            ..ContextParams::default()
        });

        let mild = run(&mild).unwrap();
        let hot = run(&hot).unwrap();
        assert!(hot.total_time > mild.total_time);
    }

    #[test]
    fn test_ceiling_truncates_set_and_forces_rest() {
        crate::logging::init_test();
        let wod = Wod::for_time(
            "pull-ups",
            vec![Round::new(vec![Exercise::reps("pull_up", 15)])],
        );
        let mut fatigue = FatigueState::default();
        fatigue.local.insert(PatternBucket::Pull, 9.8);

        let inputs = SimulationInputs::new(athlete(), wod)
            .with_rpe(7.0)
            .with_initial_fatigue(fatigue);
        let result = run(&inputs).unwrap();

        let first = &result.timeline[0];
        assert_eq!(first.kind, EventKind::Rep);
        assert_eq!(
            first.note,
            Some(EventNote::CeilingReached {
                bucket: PatternBucket::Pull
            })
        );
        assert_eq!(first.fatigue.local(PatternBucket::Pull), 10.0);
        assert_eq!(result.timeline[1].kind, EventKind::Rest);

        // No set ever exceeds the unbroken cap
        let mut streak = 0;
        for event in &result.timeline {
            match event.kind {
                EventKind::Rep => {
                    streak += 1;
                    assert!(streak <= 20);
                }
                _ => streak = 0,
            }
        }
        assert!(result.completed);
        assert_eq!(result.total_reps, 15);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let wod = Wod::for_time(
            "mixed",
            vec![Round::repeated(
                3,
                vec![
                    Exercise::distance("row", 500.0),
                    Exercise::reps("thruster", 12).with_load(43.0),
                    Exercise::reps("pull_up", 12),
                ],
            )],
        );
        let inputs = SimulationInputs::new(athlete(), wod).with_rpe(8.0);

        let a = run(&inputs).unwrap();
        let b = run(&inputs).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.total_time.to_bits(), b.total_time.to_bits());
    }

    #[test]
    fn test_empty_workout() {
        let inputs = SimulationInputs::new(athlete(), Wod::for_time("nothing", vec![]));
        let result = run(&inputs).unwrap();
        assert_eq!(result.total_time, 0.0);
        assert!(result.completed);
        assert!(result.timeline.is_empty());
        assert_eq!(result.rounds_completed, 0);
    }

    #[test]
    fn test_for_time_cap_marks_incomplete() {
        let wod = Wod::for_time(
            "too long",
            vec![Round::new(vec![Exercise::reps("burpee", 200)])],
        )
        .with_time_cap(120.0);
        let result = run(&SimulationInputs::new(athlete(), wod)).unwrap();

        assert!(!result.completed);
        assert_eq!(result.total_time, 120.0);
        assert_eq!(result.rounds_completed, 0);
        assert!(result.partial_reps > 0);
        assert_eq!(result.partial_reps, result.total_reps);
        assert!(result.round_splits.is_empty());
    }

    #[test]
    fn test_missing_capability_fails_fast() {
        let wod = Wod::for_time(
            "snatches",
            vec![Round::new(vec![Exercise::reps("snatch", 30).with_load(60.0)])],
        );
        let err = run(&SimulationInputs::new(athlete(), wod)).unwrap_err();
        assert!(matches!(err, Error::InvalidCapability { ref movement, .. } if movement == "snatch"));

        let wod = Wod::for_time(
            "unknown",
            vec![Round::new(vec![Exercise::reps("sled_drag", 1)])],
        );
        assert!(matches!(
            run(&SimulationInputs::new(athlete(), wod)),
            Err(Error::InvalidCapability { .. })
        ));
    }

    #[test]
    fn test_invalid_workouts_rejected() {
        let no_cap = Wod {
            time_cap_seconds: None,
            ..cindy(600.0)
        };
        assert!(matches!(
            run(&SimulationInputs::new(athlete(), no_cap)),
            Err(Error::InvalidWorkout(_))
        ));

        let rowed_reps = Wod::for_time("bad", vec![Round::new(vec![Exercise::reps("row", 10)])]);
        assert!(matches!(
            run(&SimulationInputs::new(athlete(), rowed_reps)),
            Err(Error::InvalidWorkout(_))
        ));

        let run_calories = Wod::for_time(
            "bad",
            vec![Round::new(vec![Exercise::calories("run", 20.0)])],
        );
        assert!(matches!(
            run(&SimulationInputs::new(athlete(), run_calories)),
            Err(Error::InvalidCapability { .. })
        ));
    }

    #[test]
    fn test_out_of_range_rpe_rejected() {
        let inputs = SimulationInputs::new(athlete(), thrusters()).with_rpe(11.0);
        assert!(matches!(
            run(&inputs),
            Err(Error::OutOfRangeConstraint { .. })
        ));
    }

    #[test]
    fn test_heavy_prescription_is_scaled() {
        let wod = Wod::for_time(
            "heavy",
            vec![Round::new(vec![Exercise::reps("deadlift", 3).with_load(175.0)])],
        );
        let result = run(&SimulationInputs::new(athlete(), wod).with_rpe(5.0)).unwrap();
        let first = result
            .timeline
            .iter()
            .find(|e| e.kind == EventKind::Rep)
            .unwrap();
        match &first.note {
            Some(EventNote::LoadScaled { from_kg, to_kg }) => {
                assert_eq!(*from_kg, 175.0);
                assert!((*to_kg - 126.0).abs() < 1e-9);
            }
            other => panic!("expected load scaling note, got {:?}", other),
        }
    }

    #[test]
    fn test_cardio_piece() {
        let wod = Wod::for_time(
            "2k row",
            vec![Round::new(vec![Exercise::distance("row", 2000.0)])],
        );
        let result = run(&SimulationInputs::new(athlete(), wod).with_rpe(8.0)).unwrap();

        assert!(result.completed);
        let meters: f64 = result
            .timeline
            .iter()
            .filter(|e| e.kind == EventKind::Rep)
            .map(|e| e.units)
            .sum();
        assert!((meters - 2000.0).abs() < 1e-6);
        // (250 / 2.8)^(1/3) ≈ 4.47 m/s at CP
        assert!(result.total_time < 2000.0 / 4.4);
        assert!(result.total_time > 300.0);
        assert_eq!(result.total_reps, 0);
        assert_in_domain(&result);
    }

    #[test]
    fn test_station_window_counts_max_reps() {
        let wod = Wod::for_time(
            "burpee minute",
            vec![Round::new(vec![Exercise::duration("burpee", 60.0)])],
        );
        let result = run(&SimulationInputs::new(athlete(), wod).with_rpe(9.0)).unwrap();
        assert!(result.completed);
        assert!((result.total_time - 60.0).abs() < 1e-9);
        assert!(result.total_reps >= 10);
        assert!(result.total_reps <= 20);
    }

    #[test]
    fn test_transitions_and_round_rest() {
        let mut wod = Wod::for_time(
            "two rounds",
            vec![Round::repeated(
                2,
                vec![Exercise::reps("pull_up", 3), Exercise::reps("box_jump", 3)],
            )],
        );
        wod.rest_between_rounds_s = 30.0;
        let result = run(&SimulationInputs::new(athlete(), wod)).unwrap();

        let transitions = result
            .timeline
            .iter()
            .filter(|e| e.kind == EventKind::Transition)
            .count();
        assert_eq!(transitions, 3);
        let round_rest = result
            .timeline
            .iter()
            .filter(|e| e.kind == EventKind::Rest && e.movement.is_none())
            .count();
        assert_eq!(round_rest, 1);
        assert_eq!(result.round_splits.len(), 2);
        assert_eq!(result.round_splits[1].round, 2);
    }

    #[test]
    fn test_benchmarks_simulate() {
        let caps = athlete()
            .with_gym_skill("push_up", GymSkill::new(1.2, 40))
            .with_gym_skill("air_squat", GymSkill::new(1.0, 60))
            .with_gym_skill("kettlebell_swing", GymSkill::new(1.6, 30));

        for name in crate::BENCHMARKS {
            let wod = Wod::benchmark(name).unwrap();
            let result = run(&SimulationInputs::new(caps.clone(), wod).with_rpe(7.0)).unwrap();
            assert!(result.completed, "{}", name);
            assert!(result.diagnostics.is_empty(), "{}", name);
            assert_in_domain(&result);
            assert_ordered(&result);
        }

        let fran = run(&SimulationInputs::new(caps.clone(), Wod::fran()).with_rpe(7.0)).unwrap();
        assert_eq!(fran.total_reps, 90);
        let cindy = run(&SimulationInputs::new(caps, Wod::cindy()).with_rpe(7.0)).unwrap();
        assert_eq!(cindy.total_time, 1200.0);
        assert!(cindy.rounds_completed >= 5);
    }

    #[test]
    fn test_higher_rpe_finishes_faster() {
        let easy = run(&SimulationInputs::new(athlete(), fran()).with_rpe(4.0)).unwrap();
        let hard = run(&SimulationInputs::new(athlete(), fran()).with_rpe(9.0)).unwrap();

        assert!(easy.completed && hard.completed);
        assert!(
            hard.total_time < easy.total_time,
            "RPE 9 {:.1}s vs RPE 4 {:.1}s",
            hard.total_time,
            easy.total_time
        );
    }

    #[test]
    fn test_transition_rest_follows_each_transition() {
        let result = run(&SimulationInputs::new(athlete(), fran()).with_rpe(9.0)).unwrap();

        let mut transitions = 0;
        for pair in result.timeline.windows(2) {
            if pair[0].kind == EventKind::Transition {
                transitions += 1;
                assert_eq!(pair[1].kind, EventKind::Rest);
                assert!(pair[1].movement.is_some());
                assert!(pair[1].timestamp - pair[0].timestamp >= 7.5 - 1e-9);
            }
        }
        assert_eq!(transitions, 5);
    }

    #[test]
    fn test_window_ending_on_cap_completes() {
        let settings = SimulationSettings::default();
        for exercise in [
            Exercise::duration("burpee", 60.0),
            Exercise::duration("row", 60.0),
        ] {
            let wod = Wod::for_time("one minute", vec![Round::new(vec![exercise])])
                .with_time_cap(60.0);
            let result = run(&SimulationInputs::new(athlete(), wod).with_rpe(8.0)).unwrap();

            assert!(result.completed);
            assert_eq!(result.rounds_completed, 1);
            assert_eq!(result.round_splits.len(), 1);
            assert!((result.total_time - 60.0).abs() < settings.min_rep_s);
            assert!(result
                .timeline
                .iter()
                .all(|e| e.note != Some(EventNote::TimeCap)));
        }
    }

    #[test]
    fn test_window_closing_mid_rest_finishes_exercise() {
        let caps = athlete();
        let calibration = Calibration::default();
        let settings = SimulationSettings::default();
        let constraints = RpeConstraints::from_rpe(7.0, &calibration.rpe).unwrap();
        let mut fatigue = FatigueState::default();
        fatigue.local.insert(PatternBucket::Pull, 9.8);

        let planner = StrategyEngine::new(&constraints, &settings);
        let planned = plan_exercise(
            &Exercise::duration("pull_up", 30.0),
            get_default_catalog(),
            &caps,
            &planner,
        )
        .unwrap();

        let mut run = bare_run(&caps, &constraints, &settings, &calibration, &fatigue);
        // The first rep fills the pull bucket and the forced rest outlasts the window
        assert_eq!(run.run_exercise(&planned), Flow::Continue);
        assert_eq!(run.total_reps, 1);
        assert_eq!(run.clock, 30.0);
        assert_eq!(run.timeline.last().map(|e| e.kind), Some(EventKind::Rest));
        assert_eq!(run.strategy.state(), StrategyState::Done);
    }

    #[test]
    fn test_wbal_exhaustion_forces_rest() {
        let caps = athlete();
        let calibration = Calibration::default();
        let settings = SimulationSettings::default();
        let constraints = RpeConstraints::new(7.0, 0.8, 0.5, 10.0, 0.0)
            .unwrap()
            .with_cardio_intensity_cap(1.2)
            .unwrap();
        let mut fatigue = FatigueState::default();
        fatigue.wbal.insert("row".to_string(), 0.0);
        let row = get_default_catalog().get("row").unwrap();

        let mut run = bare_run(&caps, &constraints, &settings, &calibration, &fatigue);
        run.strategy.begin_exercise();
        let outcome = UpdateOutcome {
            wbal_exhausted: Some("row".to_string()),
            ..UpdateOutcome::default()
        };

        assert_eq!(run.forced_cardio_rest(row, "row", &outcome), Flow::Continue);
        assert_eq!(run.strategy.state(), StrategyState::Working);
        assert_eq!(run.clock, 10.0);
        assert_eq!(run.timeline.len(), 1);
        let rest = &run.timeline[0];
        assert_eq!(rest.kind, EventKind::Rest);
        assert_eq!(rest.movement.as_deref(), Some("row"));
        assert!(rest.fatigue.wbal["row"] > 0.0);
    }

    #[test]
    fn test_row_from_empty_wbal_without_reserve() {
        let constraints = RpeConstraints::new(7.0, 0.8, 0.5, 10.0, 0.0)
            .unwrap()
            .with_cardio_intensity_cap(1.2)
            .unwrap();
        let mut fatigue = FatigueState::default();
        fatigue.wbal.insert("row".to_string(), 0.0);
        let wod = Wod::for_time(
            "2k row",
            vec![Round::new(vec![Exercise::distance("row", 2000.0)])],
        );
        let inputs = SimulationInputs::new(athlete(), wod)
            .with_constraints(constraints)
            .with_initial_fatigue(fatigue);
        let result = run(&inputs).unwrap();

        assert!(result.completed);
        let meters: f64 = result
            .timeline
            .iter()
            .filter(|e| e.kind == EventKind::Rep)
            .map(|e| e.units)
            .sum();
        assert!((meters - 2000.0).abs() < 1e-6);

        // Draining to zero mid-piece is always followed by a rest
        let events = &result.timeline;
        for (i, event) in events.iter().enumerate() {
            if matches!(event.note, Some(EventNote::WbalExhausted { .. })) && i + 1 < events.len() {
                assert_eq!(events[i + 1].kind, EventKind::Rest);
            }
        }
        assert!(result.diagnostics.is_empty());
        assert_in_domain(&result);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_fatigue_stays_in_domain(
            rpe in 0.0..=10.0f64,
            temperature in -5.0..45.0f64,
            reps in 1u32..40,
        ) {
            let wod = Wod::amrap(
                "mix",
                300.0,
                vec![Round::new(vec![
                    Exercise::calories("row", 15.0),
                    Exercise::reps("toes_to_bar", reps),
                    Exercise::reps("deadlift", reps).with_load(100.0),
                ])],
            );
            let inputs = SimulationInputs::new(athlete(), wod)
                .with_rpe(rpe)
                .with_context(ContextParams { temperature_c: temperature, ..ContextParams::default() });
            let result = run(&inputs).unwrap();

            prop_assert_eq!(result.total_time, 300.0);
            prop_assert!(result.diagnostics.is_empty());
            for event in &result.timeline {
                for wbal in event.fatigue.wbal.values() {
                    prop_assert!(*wbal >= 0.0);
                }
                for bucket in PatternBucket::ALL {
                    let v = event.fatigue.local(bucket);
                    prop_assert!((0.0..=10.0).contains(&v));
                }
            }
        }
    }
}
