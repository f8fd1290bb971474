//! Performance benchmarks for accounting text parsing and reduction
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use usage_report::{
    aggregate, parse_job_records, reduce_usage, GroupBy, PartitionFilter, PartitionSet,
    ReportRow, UsageTotals,
};

/// Generate `sacct --parsable2` output with the given number of jobs
fn generate_sacct(num_jobs: usize, include_malformed: bool) -> String {
    let mut lines = vec!["JobID|Partition|Elapsed|NCPUS|AllocTRES".to_string()];

    for i in 0..num_jobs {
        let partition = if i % 2 == 0 { "lrz-gpu" } else { "mcml-cpu" };
        if include_malformed && i % 10 == 5 {
            lines.push(format!("{i}|{partition}|garbage|x|cpu=?"));
            continue;
        }
        lines.push(format!(
            "{i}|{partition}|{:02}:{:02}:00|{}|cpu={},mem={}G,gres/gpu={}",
            i % 24,
            i % 60,
            1 + i % 16,
            1 + i % 16,
            4 * (1 + i % 8),
            i % 4
        ));
        lines.push(format!("{i}.batch|{partition}|00:10:00|1|cpu=1,mem=1G"));
    }

    lines.join("\n")
}

fn benchmark_parse_and_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_and_reduce");
    let filter = PartitionFilter::default();

    for size in [10, 100, 1000, 10000].iter() {
        let text = generate_sacct(*size, false);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let records = parse_job_records(black_box(&text));
                reduce_usage(&records, &filter)
            });
        });
    }

    group.finish();
}

fn benchmark_partition_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition_filter");
    let records = parse_job_records(&generate_sacct(1000, false));
    let filter = PartitionFilter::new(&PartitionSet::new(["lrz*", "mcml-gpu"])).unwrap();

    group.bench_function("two_patterns", |b| {
        b.iter(|| reduce_usage(black_box(&records), &filter));
    });

    group.finish();
}

fn benchmark_malformed_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("malformed_lines");
    let text = generate_sacct(1000, true);

    group.bench_function("ten_percent_malformed", |b| {
        b.iter(|| parse_job_records(black_box(&text)));
    });

    group.finish();
}

fn benchmark_group_aggregation(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_aggregation");
    let partitions = PartitionSet::default();

    for size in [100, 5000].iter() {
        let rows: Vec<ReportRow> = (0..*size)
            .map(|i| {
                let mut row = ReportRow::for_user(format!("u{i}"), UsageTotals::new(1.0, 0.5, 2.0));
                row.ai_c_group = Some(format!("g{}-ai-c|shared-ai-c", i % 20));
                row
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("rows", size), size, |b, _| {
            b.iter(|| aggregate(black_box(&rows), GroupBy::Group, &partitions));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_parse_and_reduce,
    benchmark_partition_filter,
    benchmark_malformed_lines,
    benchmark_group_aggregation
);
criterion_main!(benches);
