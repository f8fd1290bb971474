//! End-to-end tests from accounting text to aggregated reports

mod common;

use common::{builder, cluster, sacct, FakeAccounting, FakeGroups};
use usage_report::aggregate::{aggregate_partitions, combine};
use usage_report::{
    aggregate, parse_job_records, reduce_usage, sum_all, GroupBy, PartitionFilter, PartitionSet,
    Period, ReportError, UsageTotals,
};

fn month(m: &str) -> Period {
    Period::month(m).unwrap()
}

#[test]
fn test_job_step_is_not_double_counted() {
    let text = sacct(&[
        ("123", "gpu", "01:00:00", "4", "cpu=4,mem=8000M,gres/gpu=2"),
        ("123.batch", "gpu", "01:00:00", "4", "cpu=4,mem=8000M,gres/gpu=2"),
    ]);
    let usage = reduce_usage(&parse_job_records(&text), &PartitionFilter::default()).unwrap();

    assert_eq!(usage.cpu_hours, 4.0);
    assert_eq!(usage.gpu_hours, 2.0);
    assert!((usage.ram_gb_hours - 7.8125).abs() < 1e-9);
}

#[test]
fn test_gpu_count_with_type_suffix() {
    let text = sacct(&[("9", "gpu", "02:00:00", "1", "cpu=1,gres/gpu=4(S:0-1),mem=0")]);
    let usage = reduce_usage(&parse_job_records(&text), &PartitionFilter::default()).unwrap();
    assert_eq!(usage.gpu_hours, 8.0);
}

#[test]
fn test_single_user_report_with_partition_filter() {
    let (accounting, groups) = cluster();
    let builder = builder(accounting, groups);

    let row = builder
        .create_report("alice", &month("2025-06"), &PartitionSet::new(["lrz*"]))
        .unwrap();

    assert_eq!(row.usage, UsageTotals::new(4.0, 2.0, 8.0));
    assert_eq!(row.email.as_deref(), Some("max.alice@example.com"));
    assert_eq!(row.projekt.as_deref(), Some("pn-alice"));
    assert_eq!(row.ai_c_group.as_deref(), Some("vision-ai-c|nlp-ai-c"));
    assert_eq!(row.period_start.as_deref(), Some("2025-06-01"));
    assert_eq!(row.period_end.as_deref(), Some("2025-06-30"));
}

#[test]
fn test_single_user_report_surfaces_identity_failure() {
    let accounting = FakeAccounting::new(&[]).with_jobs("unknown1", sacct(&[]));
    let builder = builder(accounting, FakeGroups::default());

    let result = builder.create_report("unknown1", &month("2025-06"), &PartitionSet::default());
    assert!(matches!(result, Err(ReportError::Lookup(_))));
}

#[test]
fn test_batch_excludes_failing_users() {
    let (accounting, groups) = cluster();
    let accounting = FakeAccounting {
        active: common::login_table(&["alice", "unknown7", "bob", "nojobs"]),
        ..accounting
    };
    let builder = builder(accounting, groups);

    let rows = builder
        .create_active_reports(&month("2025-06"), &PartitionSet::default())
        .unwrap();
    let users: Vec<_> = rows.iter().filter_map(|r| r.user_id()).collect();
    assert_eq!(users, vec!["alice", "bob"]);
}

#[test]
fn test_group_report_fans_out() {
    let (accounting, groups) = cluster();
    let builder = builder(accounting, groups);
    let partitions = PartitionSet::default();
    let rows = builder.create_active_reports(&month("2025-06"), &partitions).unwrap();

    let by_group = aggregate(&rows, GroupBy::Group, &partitions);
    let keys: Vec<_> = by_group.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["nlp-ai-c", "vision-ai-c"]);

    // alice's full usage lands in both of her groups
    assert_eq!(by_group[0].usage, UsageTotals::new(20.0, 2.0, 40.0));
    assert_eq!(by_group[1].usage, UsageTotals::new(44.0, 26.0, 64.0));
    assert_eq!(by_group[1].rows, 2);
}

#[test]
fn test_total_and_partition_sets() {
    let (accounting, groups) = cluster();
    let builder = builder(accounting, groups);
    let period = month("2025-06");

    let all = builder.create_active_reports(&period, &PartitionSet::default()).unwrap();
    let total = sum_all(&all, &["bob".to_string()], &PartitionSet::default());
    assert_eq!(total.usage, UsageTotals::new(20.0, 2.0, 40.0));
    assert_eq!(total.partition, "*");

    let gpu = PartitionSet::new(["lrz*"]);
    let gpu_rows = builder.create_active_reports(&period, &gpu).unwrap();
    let per_set = aggregate_partitions(&[(PartitionSet::default(), all), (gpu, gpu_rows)], &[]);

    assert_eq!(per_set[0].key, "*");
    assert_eq!(per_set[0].usage.cpu_hours, 44.0);
    assert_eq!(per_set[1].key, "lrz*");
    assert_eq!(per_set[1].usage.cpu_hours, 28.0);
}

#[test]
fn test_multi_month_combine_equals_single_pass() {
    let (accounting, groups) = cluster();
    let builder = builder(accounting, groups);
    let partitions = PartitionSet::default();

    let june = builder.create_active_reports(&month("2025-06"), &partitions).unwrap();
    let july = builder.create_active_reports(&month("2025-07"), &partitions).unwrap();

    let combined = combine([
        aggregate(&june, GroupBy::User, &partitions),
        aggregate(&july, GroupBy::User, &partitions),
    ]);
    let concatenated: Vec<_> = june.into_iter().chain(july).collect();
    let single = aggregate(&concatenated, GroupBy::User, &partitions);

    assert_eq!(combined, single);
    for row in &combined {
        assert_eq!(row.period_start.as_deref(), Some("2025-06-01"));
        assert_eq!(row.period_end.as_deref(), Some("2025-07-31"));
        assert!(row.period_start <= row.period_end);
    }
}
