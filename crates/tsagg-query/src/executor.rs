//! Aggregate query executor
//!
//! Runs the whole pipeline for one query shard: grouping aggregation,
//! per-group field preparation, expression evaluation, then ordering or
//! limiting of the resulting rows. Rollup jobs share the grouping stage but
//! feed decoded streams through down-sampling aggregators.

use crate::error::Result;
use crate::evaluator::ExpressionEvaluator;
use crate::field::FieldStore;
use crate::model::{AggregateQuery, QueryResult, ResultRow, RollupInput, RollupJob, RollupResult, RollupRow};
use crate::order::{OrderByRow, ResultLimiter, TopNHeap};
use std::sync::Arc;
use std::time::Instant;
use tsagg_aggregation::{
    DownSamplingFieldAggregator, GroupingAggregator, IncrementalFieldAggregator, SeriesIterator, SeriesPoint,
    ValueGetter,
};
use tsagg_core::{EngineConfig, FloatArrayPool};

/// Executes aggregate queries over series iterators
#[derive(Debug, Clone)]
pub struct AggregateExecutor {
    config: EngineConfig,
    pool: Arc<FloatArrayPool>,
}

impl AggregateExecutor {
    /// Create an executor with its own array pool
    pub fn new(config: EngineConfig) -> Self {
        let pool = Arc::new(FloatArrayPool::new(config.pool.clone()));
        Self { config, pool }
    }

    /// Create an executor sharing `pool`
    pub fn with_pool(config: EngineConfig, pool: Arc<FloatArrayPool>) -> Self {
        Self { config, pool }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<FloatArrayPool> {
        &self.pool
    }

    /// Execute a query
    pub fn execute<I>(&self, query: &AggregateQuery, series: I) -> Result<QueryResult>
    where
        I: IntoIterator,
        I::Item: SeriesIterator,
    {
        let start = Instant::now();

        query.validate()?;

        let factory = IncrementalFieldAggregator::factory(Arc::clone(&self.pool));
        let mut grouping = GroupingAggregator::new(query.specs.clone(), query.time, factory)
            .with_settings(&self.config.aggregation);

        let mut series_count = 0usize;
        let mut skipped = 0usize;
        for mut s in series {
            series_count += 1;
            if !grouping.aggregate(&mut s) {
                skipped += 1;
            }
        }

        let groups = grouping.into_groups();
        let total_groups = groups.len();
        let mut evaluator = ExpressionEvaluator::new(query.select_items.clone(), query.time.query_interval());
        let limit = query.limit.unwrap_or(usize::MAX);

        let rows: Vec<ResultRow> = if query.order_by.is_empty() {
            let mut limiter = ResultLimiter::new(limit);
            for (tags, aggregates) in groups {
                if limiter.is_full() {
                    break;
                }
                evaluator.prepare(FieldStore::from_aggregates(&aggregates));
                evaluator.eval();
                let fields = evaluator.take_results();
                if !fields.is_empty() {
                    limiter.try_insert(ResultRow { tags, fields });
                }
            }
            limiter.into_vec()
        } else {
            let mut heap = TopNHeap::new(limit, query.order_by.clone());
            for (tags, aggregates) in groups {
                evaluator.prepare(FieldStore::from_aggregates(&aggregates));
                evaluator.eval();
                let fields = evaluator.take_results();
                if !fields.is_empty() {
                    heap.try_insert(OrderByRow::new(tags, fields));
                }
            }
            heap.into_sorted_vec().into_iter().map(ResultRow::from).collect()
        };

        let execution_time_ns = start.elapsed().as_nanos() as u64;
        tracing::info!(
            "Aggregate query: {} series ({} skipped), {} groups, {} rows in {}ns",
            series_count,
            skipped,
            total_groups,
            rows.len(),
            execution_time_ns
        );

        Ok(QueryResult {
            rows,
            point_count: query.point_count(),
            total_groups,
            execution_time_ns,
        })
    }

    /// Run a rollup job over decoded source streams
    pub fn rollup<I>(&self, job: &RollupJob, inputs: I) -> Result<RollupResult>
    where
        I: IntoIterator<Item = RollupInput>,
    {
        let start = Instant::now();

        job.validate()?;

        let factory = DownSamplingFieldAggregator::factory(Arc::clone(&self.pool));
        let mut grouping = GroupingAggregator::new(job.specs.clone(), job.time, factory)
            .with_settings(&self.config.aggregation);

        let mut input_count = 0usize;
        let mut skipped = 0usize;
        for input in inputs {
            input_count += 1;
            let streams: Vec<Option<&dyn ValueGetter>> = input
                .streams
                .iter()
                .map(|stream| stream.as_ref().map(|array| array as &dyn ValueGetter))
                .collect();
            let used = grouping.down_sample(
                &input.tags,
                input.family_time,
                &input.field_name,
                input.field_id,
                input.source,
                &streams,
            )?;
            if !used {
                skipped += 1;
            }
        }

        let groups = grouping.into_groups();
        let total_groups = groups.len();
        let mut rows = Vec::new();
        for (tags, aggregates) in groups {
            for series in aggregates.iter() {
                let points: Vec<SeriesPoint> = series.points().collect();
                if !points.is_empty() {
                    rows.push(RollupRow {
                        tags: tags.clone(),
                        field_name: series.field_name().to_string(),
                        points,
                    });
                }
            }
        }

        let execution_time_ns = start.elapsed().as_nanos() as u64;
        tracing::info!(
            "Rollup: {} inputs ({} skipped), {} groups, {} rows in {}ns",
            input_count,
            skipped,
            total_groups,
            rows.len(),
            execution_time_ns
        );

        Ok(RollupResult {
            rows,
            total_groups,
            execution_time_ns,
        })
    }
}
