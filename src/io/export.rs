//! CSV export for simulation trajectories.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::trajectory::Trajectory;
use crate::sim::types::{DecisionSignals, StepRecord};

/// Schema v2 column header for CSV telemetry export.
///
/// v2 adds calendar features, decision signals and their thresholded
/// categories, and the generation/consumption/battery/islanding totals.
pub const HEADER: &str = "step,time_hr,dt_hr,day_index,hour_of_day,day_of_week,is_weekend,\
                          month_progress,solar_kw,load_kw,price,grid_available,\
                          soc_before,requested_battery_kw,requested_grid_kw,\
                          signal_load_shift,signal_battery,signal_grid_usage,\
                          load_shift,grid_usage,\
                          battery_kw,shortfall_kw,grid_import_kw,grid_export_kw,\
                          unserved_kw,curtailed_kw,soc,capacity_kwh,efficiency,\
                          voltage_v,current_a,instant_cost,instant_export_income,\
                          cum_generated_kwh,cum_consumed_kwh,cum_charged_kwh,\
                          cum_discharged_kwh,cum_imported_kwh,cum_exported_kwh,\
                          cum_unserved_kwh,cum_curtailed_kwh,cum_cost,cum_export_income,\
                          reason,source,explanation";

/// Exports a trajectory to a CSV file at the given path.
///
/// Writes a header row followed by one data row per step using the schema v2
/// column layout. Produces deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(trajectory: &Trajectory, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(trajectory.records(), buf)
}

/// Writes step records as CSV to any writer.
///
/// Signal columns are empty for policies that do not compute signals.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(records: &[StepRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in records {
        let signal = |pick: fn(&DecisionSignals) -> f64| {
            r.signals.as_ref().map_or_else(String::new, |s| format!("{:.4}", pick(s)))
        };
        let cal = &r.calendar;
        let t = &r.totals;

        wtr.write_record(&[
            r.step.to_string(),
            format!("{:.4}", r.time_hours),
            format!("{:.4}", r.dt_hours),
            cal.day_index.to_string(),
            format!("{:.4}", cal.hour_of_day),
            cal.day_of_week.to_string(),
            cal.is_weekend.to_string(),
            format!("{:.4}", cal.month_progress),
            format!("{:.4}", r.solar_kw),
            format!("{:.4}", r.load_kw),
            format!("{:.4}", r.price),
            r.grid_available.to_string(),
            format!("{:.6}", r.soc_before),
            format!("{:.4}", r.requested_battery_kw),
            format!("{:.4}", r.requested_grid_kw),
            signal(|s| s.load_shift),
            signal(|s| s.battery),
            signal(|s| s.grid_usage),
            r.load_shift.as_str().to_string(),
            r.grid_usage.as_str().to_string(),
            format!("{:.4}", r.battery_kw),
            format!("{:.4}", r.shortfall_kw),
            format!("{:.4}", r.grid_import_kw),
            format!("{:.4}", r.grid_export_kw),
            format!("{:.4}", r.unserved_kw),
            format!("{:.4}", r.curtailed_kw),
            format!("{:.6}", r.soc),
            format!("{:.4}", r.capacity_kwh),
            format!("{:.4}", r.efficiency),
            format!("{:.3}", r.voltage_v),
            format!("{:.3}", r.current_a),
            format!("{:.4}", r.instant_cost),
            format!("{:.4}", r.instant_export_income),
            format!("{:.4}", t.generated_kwh),
            format!("{:.4}", t.consumed_kwh),
            format!("{:.4}", t.charged_kwh),
            format!("{:.4}", t.discharged_kwh),
            format!("{:.4}", t.imported_kwh),
            format!("{:.4}", t.exported_kwh),
            format!("{:.4}", t.unserved_kwh),
            format!("{:.4}", t.curtailed_kwh),
            format!("{:.4}", t.cost),
            format!("{:.4}", t.export_income),
            r.reason.to_string(),
            r.source.as_str().to_string(),
            r.explanation.clone(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Signals;
    use crate::sim::battery::{BatteryParams, BatterySimulator};
    use crate::sim::engine::{Engine, EngineConfig};
    use crate::sim::policy::{CalendarAwarePolicy, DispatchPolicy, PolicyThresholds, RuleBasedPolicy};

    const COLUMNS: usize = 46;

    fn trajectory_with<P: DispatchPolicy>(policy: P, n: usize) -> Trajectory {
        let engine = Engine::new(
            EngineConfig::default(),
            BatterySimulator::new(BatteryParams::default()).expect("valid"),
            policy,
        )
        .expect("valid engine");
        let solar: Vec<f64> = (0..n).map(|i| (i % 4) as f64).collect();
        let price: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 3.0 } else { 25.0 }).collect();
        let signals = Signals::uniform(0.25, solar, vec![1.5; n], price, vec![true; n]);
        engine
            .run(&signals, engine.battery().initial_state())
            .expect("run")
    }

    fn trajectory(n: usize) -> Trajectory {
        trajectory_with(RuleBasedPolicy::new(PolicyThresholds::default()), n)
    }

    fn render(records: &[StepRecord]) -> String {
        let mut buf = Vec::new();
        write_csv(records, &mut buf).expect("write");
        String::from_utf8(buf).expect("utf8")
    }

    fn column(headers: &csv::StringRecord, name: &str) -> usize {
        headers
            .iter()
            .position(|h| h == name)
            .unwrap_or_else(|| panic!("missing column {name}"))
    }

    #[test]
    fn header_matches_schema_v2() {
        let output = render(trajectory(1).records());
        let first_line = output.lines().next().unwrap_or("");
        assert!(first_line.starts_with("step,time_hr,dt_hr,day_index,hour_of_day,"));
        assert!(first_line.ends_with(",reason,source,explanation"));
        assert_eq!(first_line.split(',').count(), COLUMNS);
    }

    #[test]
    fn row_count_matches_step_count() {
        let traj = trajectory(24);
        let rendered = render(traj.records());
        let mut rdr = csv::ReaderBuilder::new().from_reader(rendered.as_bytes());
        assert_eq!(rdr.records().count(), 24);
    }

    #[test]
    fn deterministic_output() {
        let traj = trajectory(8);
        assert_eq!(render(traj.records()), render(traj.records()));
    }

    #[test]
    fn rows_parse_back() {
        let traj = trajectory(6);
        let text = render(traj.records());
        let mut rdr = csv::ReaderBuilder::new().from_reader(text.as_bytes());
        let headers = rdr.headers().cloned().expect("headers");
        assert_eq!(headers.len(), COLUMNS);
        let reason = column(&headers, "reason");
        let explanation = column(&headers, "explanation");
        let weekend = column(&headers, "is_weekend");
        let generated = column(&headers, "cum_generated_kwh");

        for (record, step) in rdr.records().zip(traj.records()) {
            let rec = record.expect("every row should parse");
            // explanation may contain commas and must be quoted
            assert_eq!(rec.len(), COLUMNS);
            for i in 1..3 {
                assert!(rec[i].parse::<f64>().is_ok(), "column {i} should parse as f64");
            }
            assert!(rec[weekend].parse::<bool>().is_ok());
            assert_eq!(rec[generated], format!("{:.4}", step.totals.generated_kwh));
            assert_eq!(&rec[reason], step.reason.as_str());
            assert_eq!(&rec[explanation], step.explanation);
        }
    }

    #[test]
    fn signal_columns_follow_the_policy() {
        let rules = render(trajectory(4).records());
        let mut rdr = csv::ReaderBuilder::new().from_reader(rules.as_bytes());
        let headers = rdr.headers().cloned().expect("headers");
        let battery_signal = column(&headers, "signal_battery");
        let load_shift = column(&headers, "load_shift");
        for record in rdr.records() {
            let rec = record.expect("row");
            assert_eq!(&rec[battery_signal], "");
            assert_eq!(&rec[load_shift], "neutral");
        }

        let traj = trajectory_with(CalendarAwarePolicy::new(PolicyThresholds::default()), 4);
        let calendar = render(traj.records());
        let mut rdr = csv::ReaderBuilder::new().from_reader(calendar.as_bytes());
        for (record, step) in rdr.records().zip(traj.records()) {
            let rec = record.expect("row");
            assert!(rec[battery_signal].parse::<f64>().is_ok());
            assert_eq!(&rec[load_shift], step.load_shift.as_str());
        }
    }

    #[test]
    fn export_to_file() {
        let traj = trajectory(4);
        let path = std::env::temp_dir().join(format!("pv_dispatch_export_{}.csv", std::process::id()));
        export_csv(&traj, &path).expect("export");
        let text = std::fs::read_to_string(&path).expect("read back");
        std::fs::remove_file(&path).ok();
        assert_eq!(text.lines().count(), 5);
    }
}
