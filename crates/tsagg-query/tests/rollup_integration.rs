use tsagg_aggregation::{AggregatorSpec, TimeSpec};
use tsagg_core::{
    AggType, EngineConfig, FieldType, FloatArray, FunctionType, SlotRange, TimeRange, ONE_SECOND_NANOS, SUMMARY_COUNT,
    SUMMARY_MAX, SUMMARY_SUM,
};
use tsagg_query::{AggregateExecutor, RollupInput, RollupJob, RollupRow};

const S: i64 = ONE_SECOND_NANOS;
const HOUR: i64 = 3600 * S;

/// Two hours of 10s slots rolled up to one point per minute
fn job() -> RollupJob {
    let time = TimeSpec::new(TimeRange::new(0, 2 * HOUR - 1), 10 * S, 6, HOUR);
    RollupJob::new(
        time,
        vec![
            AggregatorSpec::new("requests", FieldType::Sum),
            AggregatorSpec::new("latency", FieldType::Summary)
                .function(FunctionType::Avg)
                .function(FunctionType::Max),
        ],
    )
}

fn input(tags: &str, field: &str, family: i64, field_id: u8, streams: Vec<Option<FloatArray>>) -> RollupInput {
    RollupInput {
        tags: tags.to_string(),
        field_name: field.to_string(),
        family_time: family,
        field_id,
        source: SlotRange::new(0, 359).unwrap(),
        streams,
    }
}

fn values(row: &RollupRow) -> Vec<(i64, u8, AggType, f64)> {
    row.points.iter().map(|p| (p.timestamp, p.field_id, p.agg_type, p.value)).collect()
}

#[test]
fn rollup_merges_segments_into_minutes() {
    let inputs = vec![
        input(
            "host=a",
            "requests",
            0,
            1,
            vec![
                Some(FloatArray::from_pairs(360, [(0, 1.0), (5, 2.0), (6, 4.0)])),
                None,
                Some(FloatArray::from_pairs(360, [(1, 8.0)])),
            ],
        ),
        input("host=a", "requests", HOUR, 1, vec![Some(FloatArray::from_pairs(360, [(359, 3.0)]))]),
        input("host=b", "requests", 0, 1, vec![Some(FloatArray::from_pairs(360, [(12, 7.0)]))]),
    ];

    let result = AggregateExecutor::new(EngineConfig::default()).rollup(&job(), inputs).unwrap();
    assert_eq!(result.total_groups, 2);
    assert_eq!(result.rows.len(), 2);

    let a = &result.rows[0];
    assert_eq!((a.tags.as_str(), a.field_name.as_str()), ("host=a", "requests"));
    assert_eq!(
        values(a),
        vec![
            (0, 1, AggType::Sum, 11.0),
            (60 * S, 1, AggType::Sum, 4.0),
            (HOUR + 59 * 60 * S, 1, AggType::Sum, 3.0),
        ]
    );

    let b = &result.rows[1];
    assert_eq!(b.tags, "host=b");
    assert_eq!(values(b), vec![(120 * S, 1, AggType::Sum, 7.0)]);
}

#[test]
fn rollup_reduces_each_summary_primitive() {
    let inputs = vec![
        input("host=a", "latency", 0, SUMMARY_SUM, vec![Some(FloatArray::from_pairs(360, [(0, 3.0), (1, 5.0)]))]),
        input("host=a", "latency", 0, SUMMARY_COUNT, vec![Some(FloatArray::from_pairs(360, [(0, 1.0), (1, 1.0)]))]),
        input(
            "host=a",
            "latency",
            0,
            SUMMARY_MAX,
            vec![
                Some(FloatArray::from_pairs(360, [(0, 3.0)])),
                Some(FloatArray::from_pairs(360, [(1, 5.0)])),
            ],
        ),
    ];

    let result = AggregateExecutor::new(EngineConfig::default()).rollup(&job(), inputs).unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].field_name, "latency");
    assert_eq!(
        values(&result.rows[0]),
        vec![
            (0, SUMMARY_SUM, AggType::Sum, 8.0),
            (0, SUMMARY_COUNT, AggType::Count, 2.0),
            (0, SUMMARY_MAX, AggType::Max, 5.0),
        ]
    );
}

#[test]
fn rollup_skips_inputs_past_group_limit() {
    let config = EngineConfig::from_yaml("aggregation:\n  max_groups: 1\n").unwrap();
    let stream = || vec![Some(FloatArray::from_pairs(360, [(0, 1.0)]))];
    let inputs = vec![
        input("host=b", "requests", 0, 1, stream()),
        input("host=a", "requests", 0, 1, stream()),
        input("host=b", "unknown", 0, 1, stream()),
        input("host=b", "requests", 3 * HOUR, 1, stream()),
    ];

    let result = AggregateExecutor::new(config).rollup(&job(), inputs).unwrap();
    assert_eq!(result.total_groups, 1);
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].tags, "host=b");
    assert_eq!(values(&result.rows[0]), vec![(0, 1, AggType::Sum, 1.0)]);
}

#[test]
fn rollup_rejects_job_without_fields() {
    let time = TimeSpec::new(TimeRange::new(0, HOUR - 1), 10 * S, 6, HOUR);
    let result = AggregateExecutor::new(EngineConfig::default()).rollup(&RollupJob::new(time, Vec::new()), Vec::new());
    assert!(result.is_err());
}
