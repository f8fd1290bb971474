//! Command orchestration through the analyzer

mod common;

use common::{builder, cluster};
use std::sync::atomic::Ordering;
use tempfile::TempDir;
use usage_report::analyzer::{PeriodSelection, Report, ReportCommand, ReportOptions};
use usage_report::display::DisplayManager;
use usage_report::export::read_rows_csv;
use usage_report::{GroupBy, MemoryCacheStore, PartitionSet, UsageAnalyzer, UsageTotals};

fn june() -> ReportOptions {
    ReportOptions {
        period: PeriodSelection::Month("2025-06".to_string()),
        ..ReportOptions::default()
    }
}

fn cached_analyzer() -> (UsageAnalyzer, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
    let (accounting, groups) = cluster();
    let calls = accounting.calls.clone();
    let analyzer = UsageAnalyzer::new(
        builder(accounting, groups),
        Some(Box::new(MemoryCacheStore::new())),
        DisplayManager::default(),
        vec!["bob".to_string()],
    );
    (analyzer, calls)
}

#[test]
fn test_active_rows_are_cached_per_month() {
    let (analyzer, calls) = cached_analyzer();

    let first = analyzer.compute(&ReportCommand::Active, &june()).unwrap();
    let queries = calls.load(Ordering::SeqCst);
    let second = analyzer.compute(&ReportCommand::Active, &june()).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), queries);
    match (first, second) {
        (Report::Rows(a), Report::Rows(b)) => {
            assert_eq!(a.len(), 2);
            assert_eq!(a.iter().map(|r| r.usage).collect::<Vec<_>>(), b.iter().map(|r| r.usage).collect::<Vec<_>>());
        }
        other => panic!("expected row reports, got {other:?}"),
    }

    let listed = analyzer.list_cache().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].month, "2025-06");
}

#[test]
fn test_date_range_bypasses_cache() {
    let (analyzer, calls) = cached_analyzer();
    let options = ReportOptions {
        period: PeriodSelection::Dates {
            start: "2025-06-01".to_string(),
            end: Some("2025-06-15".to_string()),
        },
        ..ReportOptions::default()
    };

    analyzer.compute(&ReportCommand::Active, &options).unwrap();
    analyzer.compute(&ReportCommand::Active, &options).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(analyzer.list_cache().unwrap().is_empty());
}

#[test]
fn test_total_ignores_configured_users() {
    let (analyzer, _) = cached_analyzer();
    match analyzer.compute(&ReportCommand::Total, &june()).unwrap() {
        Report::Total(total) => {
            assert_eq!(total.key, "*");
            assert_eq!(total.usage, UsageTotals::new(20.0, 2.0, 40.0));
        }
        other => panic!("expected total, got {other:?}"),
    }
}

#[test]
fn test_group_and_partition_commands() {
    let (analyzer, _) = cached_analyzer();

    match analyzer.compute(&ReportCommand::Group, &june()).unwrap() {
        Report::Aggregates { group_by, rows } => {
            assert_eq!(group_by, GroupBy::Group);
            assert_eq!(rows.len(), 2);
        }
        other => panic!("expected aggregates, got {other:?}"),
    }

    let sets = vec![PartitionSet::default(), PartitionSet::from_key("mcml*")];
    match analyzer.compute(&ReportCommand::Partitions { sets }, &june()).unwrap() {
        Report::Partitions(rows) => {
            let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
            assert_eq!(keys, vec!["*", "mcml*"]);
            // bob is ignored, alice has 16 cpu hours on mcml-cpu
            assert_eq!(rows[1].usage.cpu_hours, 16.0);
        }
        other => panic!("expected partition totals, got {other:?}"),
    }
    assert_eq!(analyzer.list_cache().unwrap().len(), 2);
}

#[test]
fn test_range_sums_months() {
    let (analyzer, _) = cached_analyzer();
    let command = ReportCommand::Range {
        from: "2025-05".to_string(),
        to: "2025-06".to_string(),
        group_by: GroupBy::User,
    };

    match analyzer.compute(&command, &ReportOptions::default()).unwrap() {
        Report::Aggregates { rows, .. } => {
            assert_eq!(rows[0].key, "alice");
            assert_eq!(rows[0].usage, UsageTotals::new(40.0, 4.0, 80.0));
            assert_eq!(rows[0].period_start.as_deref(), Some("2025-05-01"));
            assert_eq!(rows[0].period_end.as_deref(), Some("2025-06-30"));
        }
        other => panic!("expected aggregates, got {other:?}"),
    }
    assert_eq!(analyzer.list_cache().unwrap().len(), 2);

    let reversed = ReportCommand::Range {
        from: "2025-06".to_string(),
        to: "2025-05".to_string(),
        group_by: GroupBy::User,
    };
    assert!(analyzer.compute(&reversed, &ReportOptions::default()).is_err());
}

#[test]
fn test_user_report_errors_are_not_swallowed() {
    let (analyzer, _) = cached_analyzer();
    let command = ReportCommand::User {
        user_id: "unknown3".to_string(),
    };
    let err = analyzer.compute(&command, &june()).unwrap_err();
    assert!(format!("{err:#}").contains("unknown3"));
}

#[test]
fn test_run_command_appends_csv() {
    let (analyzer, _) = cached_analyzer();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("usage.csv");
    let options = ReportOptions {
        csv: Some(path.clone()),
        json_output: true,
        partitions: PartitionSet::new(["lrz*"]),
        ..june()
    };

    analyzer.run_command(&ReportCommand::Group, &options).unwrap();
    analyzer.run_command(&ReportCommand::Group, &options).unwrap();

    let rows = read_rows_csv(&path).unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].ai_c_group.as_deref(), Some("nlp-ai-c"));
    assert_eq!(rows[0].usage, UsageTotals::new(4.0, 2.0, 8.0));

    let header = std::fs::read_to_string(&path).unwrap();
    assert!(header.lines().next().unwrap().ends_with(",partitions"));
}

#[test]
fn test_relative_csv_lands_in_output_directory() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("output");
    let (analyzer, _) = cached_analyzer();
    let analyzer = analyzer.with_output_directory(&output);

    let absolute = dir.path().join("elsewhere.csv");
    assert_eq!(analyzer.csv_path(&absolute), absolute);

    let options = ReportOptions {
        csv: Some("reports/2025-06.csv".into()),
        json_output: true,
        ..june()
    };
    analyzer.run_command(&ReportCommand::Active, &options).unwrap();

    let written = output.join("reports").join("2025-06.csv");
    assert_eq!(read_rows_csv(&written).unwrap().len(), 2);
}
