//! CSV export of a run's timeline.
//!
//! One row per event: timestamp, kind, movement, round, units and note,
//! followed by every local-fatigue bucket and one `wbal_<modality>` column
//! per cardio modality seen in the run.

use crate::{PatternBucket, Result, SimulationEvent, SimulationResult};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

const FIXED_COLUMNS: [&str; 6] = ["timestamp", "kind", "movement", "round", "units", "note"];

fn modalities(result: &SimulationResult) -> BTreeSet<&str> {
    result
        .timeline
        .iter()
        .flat_map(|event| event.fatigue.wbal.keys())
        .chain(result.final_fatigue_state.wbal.keys())
        .map(String::as_str)
        .collect()
}

fn header(modalities: &BTreeSet<&str>) -> Vec<String> {
    FIXED_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(PatternBucket::ALL.iter().map(|b| format!("local_{}", b.as_str())))
        .chain(modalities.iter().map(|m| format!("wbal_{}", m)))
        .collect()
}

fn record(event: &SimulationEvent, modalities: &BTreeSet<&str>) -> Vec<String> {
    let mut row = vec![
        format!("{:.3}", event.timestamp),
        event.kind.as_str().to_string(),
        event.movement.clone().unwrap_or_default(),
        event.round.to_string(),
        format!("{:.3}", event.units),
        event.note.as_ref().map(|n| n.to_string()).unwrap_or_default(),
    ];
    row.extend(
        PatternBucket::ALL
            .iter()
            .map(|b| format!("{:.4}", event.fatigue.local(*b))),
    );
    row.extend(modalities.iter().map(|m| {
        event
            .fatigue
            .wbal(m)
            .map(|w| format!("{:.1}", w))
            .unwrap_or_default()
    }));
    row
}

/// Write the timeline as CSV to any writer
pub fn write_timeline<W: Write>(result: &SimulationResult, writer: W) -> Result<()> {
    let modalities = modalities(result);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    writer.write_record(header(&modalities))?;
    for event in &result.timeline {
        writer.write_record(record(event, &modalities))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the timeline to a CSV file, replacing any existing file
pub fn write_timeline_csv(result: &SimulationResult, path: &Path) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = std::fs::File::create(path)?;
    write_timeline(result, &file)?;
    file.sync_all()?;

    tracing::info!(
        "Wrote {} timeline events to {:?}",
        result.timeline.len(),
        path
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{Calibration, SimulationSettings};
    use crate::catalog::get_default_catalog;
    use crate::engine::{simulate, SimulationInputs};
    use crate::{AthleteCapabilities, CardioProfile, Exercise, GymSkill, Round, Wod};

    fn result() -> SimulationResult {
        let caps = AthleteCapabilities::default()
            .with_gym_skill("burpee", GymSkill::new(3.0, 30))
            .with_cardio("row", CardioProfile::watts(250.0, 18_000.0))
            .with_cardio("bike", CardioProfile::watts(220.0, 15_000.0));
        let wod = Wod::for_time(
            "row and burpees",
            vec![Round::new(vec![
                Exercise::distance("row", 250.0),
                Exercise::reps("burpee", 5),
            ])],
        );
        simulate(
            &SimulationInputs::new(caps, wod),
            get_default_catalog(),
            &SimulationSettings::default(),
            &Calibration::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_header_and_rows() {
        let result = result();
        let mut buf = Vec::new();
        write_timeline(&result, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next().unwrap(),
            "timestamp,kind,movement,round,units,note,local_pull,local_push,local_squat,\
             local_hinge,local_core,local_grip,wbal_bike,wbal_row"
        );
        assert_eq!(lines.count(), result.timeline.len());
        assert!(text.contains(",transition,,1,"));
        assert!(text.contains(",rep,burpee,1,1.000,"));
    }

    #[test]
    fn test_write_file_creates_parent() {
        let result = result();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("timeline.csv");

        write_timeline_csv(&result, &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), result.timeline.len());
        assert_eq!(&rows[0][1], "rep");
        assert_eq!(&rows[0][2], "row");
    }
}
