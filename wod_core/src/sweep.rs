//! Parameter sweeps over independent runs.
//!
//! A [`SweepPlan`] is a deterministic list of variants, each owning its own
//! copy of the inputs. Variants run on the rayon pool with no shared mutable
//! state, and the summary is computed only after every run has returned.

use crate::calibration::{Calibration, SimulationSettings};
use crate::engine::{simulate, SimulationInputs};
use crate::{AthleteCapabilities, Catalog, Result, SimulationResult};
use rayon::prelude::*;
use serde::Serialize;

/// One point of a sweep
#[derive(Clone, Debug)]
pub struct Variant {
    pub label: String,
    pub inputs: SimulationInputs,
}

#[derive(Clone, Debug, Default)]
pub struct SweepPlan {
    pub variants: Vec<Variant>,
}

impl SweepPlan {
    /// Scale every capability of the base athlete by each factor
    pub fn capability_scales(base: &SimulationInputs, scales: &[f64]) -> Self {
        let variants = scales
            .iter()
            .map(|&scale| Variant {
                label: format!("x{:.2}", scale),
                inputs: SimulationInputs {
                    capabilities: scale_capabilities(&base.capabilities, scale),
                    ..base.clone()
                },
            })
            .collect();
        Self { variants }
    }

    /// Run the base inputs at each target RPE
    ///
    /// Explicit constraints on the base are dropped so the RPE takes effect.
    pub fn rpe_grid(base: &SimulationInputs, rpes: &[f64]) -> Self {
        let variants = rpes
            .iter()
            .map(|&rpe| {
                let mut inputs = base.clone().with_rpe(rpe);
                inputs.constraints = None;
                Variant {
                    label: format!("rpe {:.1}", rpe),
                    inputs,
                }
            })
            .collect();
        Self { variants }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// Uniformly stronger (`scale > 1`) or weaker athlete
///
/// Loads, critical power and W′ scale up; gymnastic cycle times shrink and
/// unbroken capacity grows.
pub fn scale_capabilities(base: &AthleteCapabilities, scale: f64) -> AthleteCapabilities {
    let mut caps = base.clone();
    for one_rm in caps.one_rm.values_mut() {
        *one_rm *= scale;
    }
    for skill in caps.gym_skills.values_mut() {
        skill.cycle_s /= scale;
        skill.unbroken_cap = ((skill.unbroken_cap as f64 * scale).round() as u32).max(1);
    }
    for profile in caps.cardio_profiles.values_mut() {
        profile.cp *= scale;
        profile.w_prime *= scale;
    }
    caps
}

/// Result of one variant
#[derive(Debug)]
pub struct SweepRun {
    pub label: String,
    pub outcome: Result<SimulationResult>,
}

/// Distribution of total time over the successful runs
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TimeStats {
    pub mean: f64,
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct SweepSummary {
    pub runs: usize,
    pub completed: usize,
    /// Runs rejected by validation
    pub failed: usize,
    pub time: Option<TimeStats>,
    pub mean_total_reps: Option<f64>,
}

impl SweepSummary {
    pub fn from_runs(runs: &[SweepRun]) -> Self {
        let results: Vec<&SimulationResult> =
            runs.iter().filter_map(|r| r.outcome.as_ref().ok()).collect();

        let mut times: Vec<f64> = results.iter().map(|r| r.total_time).collect();
        times.sort_by(f64::total_cmp);

        let time = if times.is_empty() {
            None
        } else {
            Some(TimeStats {
                mean: times.iter().sum::<f64>() / times.len() as f64,
                median: percentile(&times, 50.0),
                p10: percentile(&times, 10.0),
                p90: percentile(&times, 90.0),
                min: times[0],
                max: times[times.len() - 1],
            })
        };
        let mean_total_reps = if results.is_empty() {
            None
        } else {
            Some(results.iter().map(|r| r.total_reps as f64).sum::<f64>() / results.len() as f64)
        };

        Self {
            runs: runs.len(),
            completed: results.iter().filter(|r| r.completed).count(),
            failed: runs.len() - results.len(),
            time,
            mean_total_reps,
        }
    }
}

/// Linear-interpolated percentile of sorted, non-empty values
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Runs in plan order plus their summary
#[derive(Debug)]
pub struct SweepReport {
    pub runs: Vec<SweepRun>,
    pub summary: SweepSummary,
}

/// Execute every variant in parallel, then aggregate
pub fn run_sweep(
    plan: &SweepPlan,
    catalog: &Catalog,
    settings: &SimulationSettings,
    calibration: &Calibration,
) -> SweepReport {
    tracing::info!("Running sweep of {} variants", plan.len());

    let runs: Vec<SweepRun> = plan
        .variants
        .par_iter()
        .map(|variant| SweepRun {
            label: variant.label.clone(),
            outcome: simulate(&variant.inputs, catalog, settings, calibration),
        })
        .collect();

    for run in &runs {
        if let Err(e) = &run.outcome {
            tracing::warn!("Variant '{}' rejected: {}", run.label, e);
        }
    }

    let summary = SweepSummary::from_runs(&runs);
    tracing::info!(
        "Sweep finished: {} runs, {} completed, {} failed",
        summary.runs,
        summary.completed,
        summary.failed
    );

    SweepReport { runs, summary }
}
