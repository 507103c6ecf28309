//! Environmental and day-state modifiers.
//!
//! A pure function of the run's context: conditions outside the comfort band
//! slow reps down and make fatigue accumulate faster, while sleep and
//! hydration deficits slow recovery. The resulting multipliers are fixed for
//! the whole run and applied multiplicatively wherever time or fatigue is
//! computed.

use crate::calibration::EnvironmentCalibration;
use crate::{ContextParams, DayState};
use serde::{Deserialize, Serialize};

/// Scalars applied to every timing and fatigue computation in a run
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentMultipliers {
    /// ≥ 1; scales rep and interval durations
    pub rep_time: f64,
    /// ≥ 1; scales local-fatigue contributions and W′ depletion
    pub fatigue_accum: f64,
    /// In (0, 1]; scales recovery speed
    pub recovery: f64,
}

impl EnvironmentMultipliers {
    /// Multipliers inside the comfort band with no deficits
    pub const NEUTRAL: EnvironmentMultipliers = EnvironmentMultipliers {
        rep_time: 1.0,
        fatigue_accum: 1.0,
        recovery: 1.0,
    };
}

impl Default for EnvironmentMultipliers {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Distance of `value` outside `[low, high]` (0 inside, 0 for non-finite input)
fn excess(value: f64, low: f64, high: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (low - value).max(0.0) + (value - high).max(0.0)
}

/// Compute the run's multipliers from context and day state
pub fn environment_multipliers(
    context: &ContextParams,
    day: &DayState,
    calibration: &EnvironmentCalibration,
) -> EnvironmentMultipliers {
    let temp_dev = excess(
        context.temperature_c,
        calibration.comfort_temp_low_c,
        calibration.comfort_temp_high_c,
    );
    let heat = 1.0 + calibration.temp_coeff * temp_dev * temp_dev;

    let humidity = 1.0
        + calibration.humidity_coeff
            * excess(
                context.humidity_pct,
                f64::NEG_INFINITY,
                calibration.comfort_humidity_high_pct,
            );

    let altitude = 1.0
        + calibration.altitude_coeff
            * excess(
                context.altitude_m,
                f64::NEG_INFINITY,
                calibration.altitude_threshold_m,
            );

    // Thin air mostly costs aerobic output; rep cadence sees half of it
    let rep_time = heat * humidity * (1.0 + 0.5 * (altitude - 1.0));
    let fatigue_accum = heat * humidity * altitude;

    let sleep_deficit = excess(day.sleep_h, calibration.sleep_target_h, f64::INFINITY);
    let water_deficit = excess(day.water_l, calibration.water_target_l, f64::INFINITY);
    let sleep_factor = (1.0 - calibration.sleep_coeff * sleep_deficit).max(0.0);
    let water_factor = (1.0 - calibration.water_coeff * water_deficit).max(0.0);
    let recovery = (sleep_factor * water_factor).clamp(calibration.recovery_floor, 1.0);

    let multipliers = EnvironmentMultipliers {
        rep_time,
        fatigue_accum,
        recovery,
    };

    tracing::debug!(
        "Environment multipliers: rep_time={:.3}, fatigue_accum={:.3}, recovery={:.3}",
        multipliers.rep_time,
        multipliers.fatigue_accum,
        multipliers.recovery
    );

    multipliers
}
