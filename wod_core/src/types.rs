//! Core domain types for the workout simulator.
//!
//! This module defines the fundamental types used throughout the system:
//! - Movements, movement kinds and pattern buckets
//! - Athlete capabilities (1RM, gymnastics skills, critical power profiles)
//! - Context and day state
//! - Workout structure
//! - Fatigue state, timeline events and simulation results

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// Movement Types
// ============================================================================

/// Timing family of a movement
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Barbell,
    Gymnastic,
    Cardio,
}

/// Local-fatigue accumulator a movement loads
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PatternBucket {
    Pull,
    Push,
    Squat,
    Hinge,
    Core,
    Grip,
}

impl PatternBucket {
    pub const ALL: [PatternBucket; 6] = [
        PatternBucket::Pull,
        PatternBucket::Push,
        PatternBucket::Squat,
        PatternBucket::Hinge,
        PatternBucket::Core,
        PatternBucket::Grip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternBucket::Pull => "pull",
            PatternBucket::Push => "push",
            PatternBucket::Squat => "squat",
            PatternBucket::Hinge => "hinge",
            PatternBucket::Core => "core",
            PatternBucket::Grip => "grip",
        }
    }
}

/// Share of a movement's local load that lands in one bucket
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct PatternWeight {
    pub bucket: PatternBucket,
    pub weight: f64,
}

impl PatternWeight {
    pub fn new(bucket: PatternBucket, weight: f64) -> Self {
        Self { bucket, weight }
    }
}

/// A movement definition (e.g., "Thruster")
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MovementSpec {
    pub id: String,
    pub name: String,
    pub kind: MovementKind,
    pub patterns: Vec<PatternWeight>,
    /// 1RM lookup chain, tried after the movement id itself
    #[serde(default)]
    pub load_reference: Vec<String>,
    /// Cardio profile key (cardio movements only)
    #[serde(default)]
    pub modality: Option<String>,
}

impl MovementSpec {
    pub fn buckets(&self) -> impl Iterator<Item = PatternBucket> + '_ {
        self.patterns.iter().map(|p| p.bucket)
    }

    /// Primary bucket: the one with the largest weight
    pub fn primary_bucket(&self) -> Option<PatternBucket> {
        self.patterns
            .iter()
            .fold(None::<&PatternWeight>, |best, p| match best {
                Some(b) if b.weight >= p.weight => Some(b),
                _ => Some(p),
            })
            .map(|p| p.bucket)
    }
}

// ============================================================================
// Capability Types
// ============================================================================

/// Load → rep-time curve shared by all barbell movements
///
/// `rep_time = base_cycle_s * (1 + load_fraction^load_exp) + transition_s`
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BarbellProfile {
    pub base_cycle_s: f64,
    pub load_exp: f64,
    pub transition_s: f64,
    /// Relative slow-down at a full local-fatigue bucket
    #[serde(default = "default_barbell_fatigue_slope")]
    pub fatigue_slope: f64,
}

impl Default for BarbellProfile {
    fn default() -> Self {
        Self {
            base_cycle_s: 1.7,
            load_exp: 2.0,
            transition_s: 0.4,
            fatigue_slope: default_barbell_fatigue_slope(),
        }
    }
}

impl BarbellProfile {
    /// Fresh rep time at a given fraction of 1RM (clamped to [0, 1.2])
    pub fn rep_time(&self, load_fraction: f64) -> f64 {
        let ratio = if load_fraction.is_finite() {
            load_fraction.clamp(0.0, 1.2)
        } else {
            0.0
        };
        self.base_cycle_s * (1.0 + ratio.powf(self.load_exp)) + self.transition_s
    }
}

fn default_barbell_fatigue_slope() -> f64 {
    0.4
}

/// Gymnastics skill profile
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GymSkill {
    /// Seconds per rep when fresh
    pub cycle_s: f64,
    /// Max unbroken reps when fresh
    pub unbroken_cap: u32,
    #[serde(default = "default_gym_fatigue_slope")]
    pub fatigue_slope: f64,
}

impl GymSkill {
    pub fn new(cycle_s: f64, unbroken_cap: u32) -> Self {
        Self {
            cycle_s,
            unbroken_cap,
            fatigue_slope: default_gym_fatigue_slope(),
        }
    }
}

fn default_gym_fatigue_slope() -> f64 {
    0.35
}

/// Unit the critical-power profile is expressed in
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CardioUnit {
    /// CP in watts, W′ in joules (row, bike, ski)
    #[default]
    Watts,
    /// Critical speed in m/s, D′ in meters (run, swim)
    MetersPerSecond,
}

/// Critical power / W′ profile for one cardio modality
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CardioProfile {
    pub cp: f64,
    pub w_prime: f64,
    #[serde(default)]
    pub unit: CardioUnit,
}

impl CardioProfile {
    pub fn watts(cp: f64, w_prime: f64) -> Self {
        Self {
            cp,
            w_prime,
            unit: CardioUnit::Watts,
        }
    }

    pub fn speed(cs: f64, d_prime: f64) -> Self {
        Self {
            cp: cs,
            w_prime: d_prime,
            unit: CardioUnit::MetersPerSecond,
        }
    }

    /// Sustainable output for an all-out effort of `duration_s` (P = CP + W′/t)
    pub fn power_for_duration(&self, duration_s: f64) -> f64 {
        if duration_s <= 0.0 {
            return self.cp;
        }
        self.cp + self.w_prime / duration_s
    }
}

/// Everything the engine needs to know about what the athlete can do
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct AthleteCapabilities {
    #[serde(default)]
    pub one_rm: BTreeMap<String, f64>,
    #[serde(default)]
    pub gym_skills: BTreeMap<String, GymSkill>,
    #[serde(default)]
    pub cardio_profiles: BTreeMap<String, CardioProfile>,
    #[serde(default)]
    pub barbell_profile: BarbellProfile,
}

impl AthleteCapabilities {
    /// Resolve the 1RM for a movement, walking its load-reference chain
    pub fn one_rm_for(&self, spec: &MovementSpec) -> Option<f64> {
        std::iter::once(&spec.id)
            .chain(spec.load_reference.iter())
            .find_map(|id| self.one_rm.get(id).copied())
    }

    pub fn with_one_rm(mut self, movement: &str, kg: f64) -> Self {
        self.one_rm.insert(movement.to_string(), kg);
        self
    }

    pub fn with_gym_skill(mut self, movement: &str, skill: GymSkill) -> Self {
        self.gym_skills.insert(movement.to_string(), skill);
        self
    }

    pub fn with_cardio(mut self, modality: &str, profile: CardioProfile) -> Self {
        self.cardio_profiles.insert(modality.to_string(), profile);
        self
    }
}

// ============================================================================
// Context and Day State
// ============================================================================

/// Environmental conditions for the run
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextParams {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub altitude_m: f64,
}

impl Default for ContextParams {
    fn default() -> Self {
        Self {
            temperature_c: 20.0,
            humidity_pct: 50.0,
            altitude_m: 0.0,
        }
    }
}

/// How the athlete arrives on the day
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DayState {
    pub sleep_h: f64,
    pub water_l: f64,
    pub rpe_intended: f64,
}

impl Default for DayState {
    fn default() -> Self {
        Self {
            sleep_h: 7.5,
            water_l: 2.5,
            rpe_intended: 5.0,
        }
    }
}

// ============================================================================
// Workout Types
// ============================================================================

/// Amount of work an exercise prescribes
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkTarget {
    Reps { reps: u32 },
    Distance { meters: f64 },
    Calories { calories: f64 },
    /// Max-reps window for rep movements, paced effort for cardio
    Duration { seconds: f64 },
}

/// A single exercise within a round
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub movement: String,
    pub work: WorkTarget,
    #[serde(default)]
    pub load_kg: Option<f64>,
}

impl Exercise {
    pub fn reps(movement: &str, reps: u32) -> Self {
        Self {
            movement: movement.to_string(),
            work: WorkTarget::Reps { reps },
            load_kg: None,
        }
    }

    pub fn distance(movement: &str, meters: f64) -> Self {
        Self {
            movement: movement.to_string(),
            work: WorkTarget::Distance { meters },
            load_kg: None,
        }
    }

    pub fn calories(movement: &str, calories: f64) -> Self {
        Self {
            movement: movement.to_string(),
            work: WorkTarget::Calories { calories },
            load_kg: None,
        }
    }

    pub fn duration(movement: &str, seconds: f64) -> Self {
        Self {
            movement: movement.to_string(),
            work: WorkTarget::Duration { seconds },
            load_kg: None,
        }
    }

    pub fn with_load(mut self, kg: f64) -> Self {
        self.load_kg = Some(kg);
        self
    }
}

/// An ordered block of exercises, optionally repeated
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub exercises: Vec<Exercise>,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

impl Round {
    pub fn new(exercises: Vec<Exercise>) -> Self {
        Self {
            exercises,
            repeat: 1,
        }
    }

    pub fn repeated(repeat: u32, exercises: Vec<Exercise>) -> Self {
        Self { exercises, repeat }
    }
}

fn default_repeat() -> u32 {
    1
}

/// Scoring style of a workout
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutKind {
    ForTime,
    Amrap,
}

/// A complete workout of the day
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Wod {
    pub name: String,
    pub kind: WorkoutKind,
    pub rounds: Vec<Round>,
    #[serde(default)]
    pub time_cap_seconds: Option<f64>,
    #[serde(default)]
    pub rest_between_rounds_s: f64,
}

impl Wod {
    pub fn for_time(name: &str, rounds: Vec<Round>) -> Self {
        Self {
            name: name.to_string(),
            kind: WorkoutKind::ForTime,
            rounds,
            time_cap_seconds: None,
            rest_between_rounds_s: 0.0,
        }
    }

    pub fn amrap(name: &str, time_cap_seconds: f64, rounds: Vec<Round>) -> Self {
        Self {
            name: name.to_string(),
            kind: WorkoutKind::Amrap,
            rounds,
            time_cap_seconds: Some(time_cap_seconds),
            rest_between_rounds_s: 0.0,
        }
    }

    pub fn with_time_cap(mut self, seconds: f64) -> Self {
        self.time_cap_seconds = Some(seconds);
        self
    }

    /// True when no round contains any exercise (or every round repeats zero times)
    pub fn is_empty(&self) -> bool {
        self.rounds
            .iter()
            .all(|r| r.exercises.is_empty() || r.repeat == 0)
    }

    pub fn exercises(&self) -> impl Iterator<Item = &Exercise> {
        self.rounds.iter().flat_map(|r| r.exercises.iter())
    }

    /// Look up a benchmark workout by name (case-insensitive)
    pub fn benchmark(name: &str) -> Option<Wod> {
        match name.to_ascii_lowercase().as_str() {
            "fran" => Some(Self::fran()),
            "helen" => Some(Self::helen()),
            "cindy" => Some(Self::cindy()),
            _ => None,
        }
    }

    /// 21-15-9 thrusters (42.5 kg) and pull-ups
    pub fn fran() -> Wod {
        let rounds: Vec<Round> = [21, 15, 9]
            .iter()
            .map(|&reps| {
                Round::new(vec![
                    Exercise::reps("thruster", reps).with_load(42.5),
                    Exercise::reps("pull_up", reps),
                ])
            })
            .collect();
        Self::for_time("Fran", rounds)
    }

    /// 3 rounds of 400 m run, 21 kettlebell swings, 12 pull-ups
    pub fn helen() -> Wod {
        Self::for_time(
            "Helen",
            vec![Round::repeated(
                3,
                vec![
                    Exercise::distance("run", 400.0),
                    Exercise::reps("kettlebell_swing", 21),
                    Exercise::reps("pull_up", 12),
                ],
            )],
        )
    }

    /// 20 minute AMRAP of 5 pull-ups, 10 push-ups, 15 air squats
    pub fn cindy() -> Wod {
        Self::amrap(
            "Cindy",
            1200.0,
            vec![Round::new(vec![
                Exercise::reps("pull_up", 5),
                Exercise::reps("push_up", 10),
                Exercise::reps("air_squat", 15),
            ])],
        )
    }
}

/// Names accepted by [`Wod::benchmark`]
pub const BENCHMARKS: [&str; 3] = ["fran", "helen", "cindy"];

// ============================================================================
// Fatigue State
// ============================================================================

/// Physiological state of the athlete at an instant
///
/// `wbal` is keyed by cardio modality; `local` holds one value per pattern
/// bucket. Both use ordered maps so snapshots compare and serialize
/// deterministically.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FatigueState {
    #[serde(default)]
    pub wbal: BTreeMap<String, f64>,
    #[serde(default = "fresh_local")]
    pub local: BTreeMap<PatternBucket, f64>,
}

impl Default for FatigueState {
    fn default() -> Self {
        Self {
            wbal: BTreeMap::new(),
            local: fresh_local(),
        }
    }
}

impl FatigueState {
    pub fn local(&self, bucket: PatternBucket) -> f64 {
        self.local.get(&bucket).copied().unwrap_or(0.0)
    }

    pub fn wbal(&self, modality: &str) -> Option<f64> {
        self.wbal.get(modality).copied()
    }
}

fn fresh_local() -> BTreeMap<PatternBucket, f64> {
    PatternBucket::ALL.iter().map(|b| (*b, 0.0)).collect()
}

// ============================================================================
// Timeline and Result Types
// ============================================================================

/// What happened during a timeline event
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Rep,
    Rest,
    Transition,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Rep => "rep",
            EventKind::Rest => "rest",
            EventKind::Transition => "transition",
        }
    }
}

/// Why an event ended the way it did
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventNote {
    /// Set cut short because a bucket hit its ceiling
    CeilingReached { bucket: PatternBucket },
    /// W′ balance ran out; rest was forced
    WbalExhausted { modality: String },
    /// Prescribed load exceeded the strategy's load ceiling
    LoadScaled { from_kg: f64, to_kg: f64 },
    /// The clock stopped at the time cap
    TimeCap,
}

impl std::fmt::Display for EventNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventNote::CeilingReached { bucket } => write!(f, "ceiling:{}", bucket.as_str()),
            EventNote::WbalExhausted { modality } => write!(f, "wbal_exhausted:{}", modality),
            EventNote::LoadScaled { from_kg, to_kg } => {
                write!(f, "load_scaled:{:.1}->{:.1}", from_kg, to_kg)
            }
            EventNote::TimeCap => write!(f, "time_cap"),
        }
    }
}

/// One entry of the simulation timeline
///
/// `timestamp` is the clock when the event ended. For rep events `units`
/// counts reps; for cardio intervals it is the meters, calories or seconds
/// covered.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SimulationEvent {
    pub timestamp: f64,
    pub kind: EventKind,
    pub movement: Option<String>,
    pub round: u32,
    pub units: f64,
    pub note: Option<EventNote>,
    pub fatigue: FatigueState,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    NumericDivergence,
}

/// Non-fatal record of a value clamped back into its domain
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Diagnostic {
    pub at_seconds: f64,
    pub kind: DiagnosticKind,
    pub context: String,
    pub value: f64,
    pub clamped_to: f64,
}

/// Timing of one completed round
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RoundSplit {
    pub round: u32,
    pub start: f64,
    pub end: f64,
    pub reps: u32,
}

impl RoundSplit {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Final, immutable outcome of one simulation run
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SimulationResult {
    pub total_time: f64,
    pub completed: bool,
    pub rounds_completed: u32,
    /// Reps across all rep-based exercises
    pub total_reps: u32,
    /// Reps done in the round that was in progress when the clock stopped
    pub partial_reps: u32,
    pub timeline: Vec<SimulationEvent>,
    pub final_fatigue_state: FatigueState,
    pub round_splits: Vec<RoundSplit>,
    pub diagnostics: Vec<Diagnostic>,
}

// ============================================================================
// Catalog Type
// ============================================================================

/// The set of movements the engine knows how to time and fatigue
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub movements: HashMap<String, MovementSpec>,
}
