use std::collections::BTreeSet;
use std::sync::Arc;
use chrono::NaiveDateTime;
use tracing::{debug, instrument, warn};
use crate::bitmap::bsi::RangeOp;
use crate::bitmap::row::Row;
use crate::cluster::coordinator::{Coordinator, ExecContext, Partial};
use crate::cluster::merge;
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{ColumnId, RowId, ShardId, ValCount};
use crate::index::field::Field;
use crate::index::index::Index;
use crate::query::ast::{Arg, Call, CondOp, Value};
use crate::query::cache::{CacheStats, ParseCache};
use crate::query::results::{PairResult, QueryResponse, QueryResult, RowResult, StatementOutcome};
use crate::query::types::{QueryValidator, ValidationConfig};
use crate::schema::field::{FieldType, DEFAULT_CACHE_SIZE};
use crate::schema::time_quantum::{parse_timestamp, range_ceiling, range_floor};

const TIME_ARGS: &[&str] = &["from", "to"];

/// A row expression with every name and key already resolved, ready to be
/// evaluated shard by shard.
#[derive(Clone)]
pub enum RowPlan {
    Empty,
    All,
    Bits { field: Arc<Field>, row: RowId },
    TimeBits { field: Arc<Field>, row: RowId, from: NaiveDateTime, to: NaiveDateTime },
    Range { field: Arc<Field>, op: RangeOp, value: i64 },
    Between { field: Arc<Field>, low: i64, high: i64 },
    NotNull(Arc<Field>),
    IsNull(Arc<Field>),
    Const(Row),
    Union(Vec<RowPlan>),
    Intersect(Vec<RowPlan>),
    Difference(Vec<RowPlan>),
    Xor(Vec<RowPlan>),
    Not(Box<RowPlan>),
}

impl RowPlan {
    pub fn evaluate(&self, index: &Index, shard: ShardId) -> Result<Row> {
        match self {
            RowPlan::Empty => Ok(Row::new()),
            RowPlan::All => index.existing_columns(shard),
            RowPlan::Bits { field, row } => field.row(shard, *row),
            RowPlan::TimeBits { field, row, from, to } => field.row_between(shard, *row, *from, *to),
            RowPlan::Range { field, op, value } => field.range(shard, *op, *value),
            RowPlan::Between { field, low, high } => field.between(shard, *low, *high),
            RowPlan::NotNull(field) => field.not_null(shard),
            RowPlan::IsNull(field) => Ok(index.existing_columns(shard)?.difference(&field.not_null(shard)?)),
            RowPlan::Const(columns) => Ok(columns
                .columns()
                .filter(|&column| index.shard_for(column) == shard)
                .collect()),
            RowPlan::Union(plans) => {
                let mut result = Row::new();
                for plan in plans {
                    result.union_in_place(&plan.evaluate(index, shard)?);
                }
                Ok(result)
            }
            RowPlan::Intersect(plans) => {
                let mut plans = plans.iter();
                let Some(first) = plans.next() else {
                    return Ok(Row::new());
                };
                let mut result = first.evaluate(index, shard)?;
                for plan in plans {
                    if result.is_empty() {
                        break;
                    }
                    result.intersect_in_place(&plan.evaluate(index, shard)?);
                }
                Ok(result)
            }
            RowPlan::Difference(plans) => {
                let mut plans = plans.iter();
                let Some(first) = plans.next() else {
                    return Ok(Row::new());
                };
                let mut result = first.evaluate(index, shard)?;
                for plan in plans {
                    result = result.difference(&plan.evaluate(index, shard)?);
                }
                Ok(result)
            }
            RowPlan::Xor(plans) => {
                let mut result = Row::new();
                for plan in plans {
                    result = result.xor(&plan.evaluate(index, shard)?);
                }
                Ok(result)
            }
            RowPlan::Not(plan) => Ok(index.existing_columns(shard)?.difference(&plan.evaluate(index, shard)?)),
        }
    }
}

/// Evaluates PQL statements against one index.
pub struct Executor {
    coordinator: Arc<Coordinator>,
    cache: ParseCache,
    validator: QueryValidator,
    topn_default: usize,
}

impl Executor {
    pub fn new(coordinator: Arc<Coordinator>, config: &Config) -> Self {
        Executor {
            coordinator,
            cache: ParseCache::new(config.parse_cache_size),
            validator: QueryValidator::new(ValidationConfig {
                max_call_depth: config.max_call_depth,
                max_call_args: config.max_call_args,
            }),
            topn_default: config.topn_default,
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Parses and runs a request. A parse error fails the whole request;
    /// any other statement error is reported in that statement's slot and
    /// later statements still run. Timeouts, and strict reads that hit an
    /// unavailable shard, abort the request.
    #[instrument(skip(self, index, text, ctx), fields(index = %index.name()))]
    pub fn execute(&self, index: &Index, text: &str, ctx: &ExecContext) -> Result<QueryResponse> {
        let calls = self.cache.parse(text)?;
        self.execute_calls(index, &calls, ctx)
    }

    pub fn execute_calls(&self, index: &Index, calls: &[Call], ctx: &ExecContext) -> Result<QueryResponse> {
        let mut results = Vec::with_capacity(calls.len());
        let mut missing = BTreeSet::new();
        for call in calls {
            ctx.deadline.check()?;
            match self.execute_call(index, call, ctx) {
                Ok(partial) => {
                    missing.extend(partial.missing_shards);
                    results.push(StatementOutcome::Ok(partial.value));
                }
                Err(err) if aborts_request(&err, ctx) => {
                    warn!(statement = %call, error = %err, "request aborted");
                    return Err(err);
                }
                Err(err) => {
                    debug!(statement = %call, error = %err, "statement failed");
                    results.push(StatementOutcome::failed(&err));
                }
            }
        }
        Ok(QueryResponse::new(results, missing))
    }

    pub fn execute_call(&self, index: &Index, call: &Call, ctx: &ExecContext) -> Result<Partial<QueryResult>> {
        self.validator.validate(call)?;
        index.ensure_active()?;
        debug!(statement = %call, "executing");
        match call.name.as_str() {
            "Set" => Ok(Partial::complete(QueryResult::Bool(self.set(index, call, ctx)?))),
            "Clear" => Ok(Partial::complete(QueryResult::Bool(self.clear(index, call, ctx)?))),
            "ClearRow" => self.clear_row(index, call, ctx).map(|p| p.map(QueryResult::Bool)),
            "Count" => self.count(index, call, ctx).map(|p| p.map(QueryResult::Count)),
            "TopN" => self.top_n(index, call, ctx),
            "Sum" | "Min" | "Max" => self.aggregate(index, call, ctx).map(|p| p.map(QueryResult::ValCount)),
            _ => {
                let plan = compile_row(index, call)?;
                let partial = self.evaluate_row(index, &plan, ctx)?;
                Ok(partial.map(|row| QueryResult::Row(row_result(index, row))))
            }
        }
    }

    /// Fans a row plan out to every shard and unions the parts.
    pub fn evaluate_row(&self, index: &Index, plan: &RowPlan, ctx: &ExecContext) -> Result<Partial<Row>> {
        let parts = self
            .coordinator
            .fan_out(index.name(), &index.all_shards(), ctx, |shard| plan.evaluate(index, shard))?;
        Ok(parts.map(merge::union_rows))
    }

    fn set(&self, index: &Index, call: &Call, ctx: &ExecContext) -> Result<bool> {
        let (column_arg, timestamp) = record_args(call)?;
        let (field, value) = single_field_arg(index, call, &[])?;
        // Values are checked before a column key is allocated.
        let int = if field.field_type() == FieldType::Int {
            if timestamp.is_some() {
                return Err(Error::schema(format!("int field '{}' does not accept timestamps", field.name())));
            }
            let int = int_value(&field, value)?;
            field.options().check_value(int)?;
            Some(int)
        } else {
            if timestamp.is_some() && field.options().time_quantum.is_none() {
                return Err(Error::schema(format!("field '{}' does not accept timestamps", field.name())));
            }
            resolve_row(&field, value, false)?;
            None
        };
        let column = resolve_column(index, column_arg, true)?
            .ok_or_else(|| Error::internal("column key was not allocated"))?;
        let shard = index.shard_for(column);
        self.coordinator.route_write(index.name(), shard, ctx)?;

        let changed = match int {
            Some(int) => field.set_value(shard, column, int)?,
            None => {
                let row = resolve_row(&field, value, true)?
                    .ok_or_else(|| Error::internal("row key was not allocated"))?;
                field.set_bit(shard, row, column, timestamp)?
            }
        };
        index.note_column(column)?;
        Ok(changed)
    }

    fn clear(&self, index: &Index, call: &Call, ctx: &ExecContext) -> Result<bool> {
        let (column_arg, _) = record_args(call)?;
        let (field, value) = single_field_arg(index, call, &[])?;
        let Some(column) = resolve_column(index, column_arg, false)? else {
            return Ok(false);
        };
        let shard = index.shard_for(column);
        self.coordinator.route_write(index.name(), shard, ctx)?;

        if field.field_type() == FieldType::Int {
            return field.clear_value(shard, column);
        }
        match resolve_row(&field, value, false)? {
            Some(row) => field.clear_bit(shard, row, column),
            None => Ok(false),
        }
    }

    fn clear_row(&self, index: &Index, call: &Call, ctx: &ExecContext) -> Result<Partial<bool>> {
        let (field, value) = single_field_arg(index, call, &[])?;
        if field.field_type() == FieldType::Int {
            return Err(Error::schema(format!("ClearRow is not supported on int field '{}'", field.name())));
        }
        let Some(row) = resolve_row(&field, value, false)? else {
            return Ok(Partial::complete(false));
        };
        let shards = index.all_shards();
        for &shard in &shards {
            self.coordinator.route_write(index.name(), shard, ctx)?;
        }
        let parts = self
            .coordinator
            .fan_out(index.name(), &shards, ctx, |shard| field.clear_row(shard, row))?;
        Ok(parts.map(|changed| changed.into_iter().any(|c| c)))
    }

    fn count(&self, index: &Index, call: &Call, ctx: &ExecContext) -> Result<Partial<u64>> {
        let plan = match call.children.as_slice() {
            [child] => compile_row(index, child)?,
            _ => return Err(Error::invalid("Count expects exactly one row argument")),
        };
        let parts = self.coordinator.fan_out(index.name(), &index.all_shards(), ctx, |shard| {
            Ok(plan.evaluate(index, shard)?.count())
        })?;
        Ok(parts.map(|counts| merge::sum_counts(&counts)))
    }

    fn top_n(&self, index: &Index, call: &Call, ctx: &ExecContext) -> Result<Partial<QueryResult>> {
        let field = named_field(index, call)?;
        if field.field_type() == FieldType::Int {
            return Err(Error::schema(format!("TopN is not supported on int field '{}'", field.name())));
        }
        let n = match call.keyed("n") {
            Some(Value::Int(n)) if *n >= 0 => *n as usize,
            Some(other) => return Err(Error::invalid(format!("TopN n must be a non-negative int, got {}", other))),
            None => self.topn_default,
        };
        let filter = optional_filter(index, call)?;
        let cap = field.options().cache_size.unwrap_or(DEFAULT_CACHE_SIZE) as usize;

        let parts = self.coordinator.fan_out(index.name(), &index.all_shards(), ctx, |shard| {
            let filter_row = match &filter {
                Some(plan) => Some(plan.evaluate(index, shard)?),
                None => None,
            };
            let mut counts = field.row_counts(shard, filter_row.as_ref())?;
            if counts.len() > cap {
                counts = merge::top_n(counts, cap);
                counts.sort_unstable_by_key(|&(row, _)| row);
            }
            Ok(counts)
        })?;

        Ok(parts.map(|parts| {
            let merged = merge::merge_pairs(parts);
            let limit = if n == 0 { merged.len() } else { n };
            let pairs = merge::top_n(merged, limit)
                .into_iter()
                .map(|(id, count)| PairResult {
                    id,
                    key: field.row_keys().and_then(|keys| keys.key_of(id)),
                    count,
                })
                .collect();
            QueryResult::Pairs(pairs)
        }))
    }

    fn aggregate(&self, index: &Index, call: &Call, ctx: &ExecContext) -> Result<Partial<ValCount>> {
        let field = named_field(index, call)?;
        if field.field_type() != FieldType::Int {
            return Err(Error::schema(format!("{} requires an int field, '{}' is {}", call.name, field.name(), field.field_type())));
        }
        let filter = optional_filter(index, call)?;
        let shards = index.all_shards();
        let filter_for = |shard: ShardId| -> Result<Option<Row>> {
            match &filter {
                Some(plan) => Ok(Some(plan.evaluate(index, shard)?)),
                None => Ok(None),
            }
        };

        match call.name.as_str() {
            "Sum" => {
                let parts = self.coordinator.fan_out(index.name(), &shards, ctx, |shard| {
                    field.sum(shard, filter_for(shard)?.as_ref())
                })?;
                let missing = parts.missing_shards;
                let (total, count) = merge::sum_val_counts(&parts.value);
                let value = i64::try_from(total)
                    .map_err(|_| Error::range(format!("sum {} overflows a 64-bit integer", total)))?;
                Ok(Partial { value: ValCount::new(value, count), missing_shards: missing })
            }
            "Min" => {
                let parts = self.coordinator.fan_out(index.name(), &shards, ctx, |shard| {
                    field.min(shard, filter_for(shard)?.as_ref())
                })?;
                Ok(parts.map(|parts| merge::min_val_count(&parts).unwrap_or_default()))
            }
            _ => {
                let parts = self.coordinator.fan_out(index.name(), &shards, ctx, |shard| {
                    field.max(shard, filter_for(shard)?.as_ref())
                })?;
                Ok(parts.map(|parts| merge::max_val_count(&parts).unwrap_or_default()))
            }
        }
    }
}

fn aborts_request(err: &Error, ctx: &ExecContext) -> bool {
    match err.kind {
        ErrorKind::Timeout => true,
        ErrorKind::Degraded => ctx.strict,
        _ => false,
    }
}

fn row_result(index: &Index, row: Row) -> RowResult {
    let columns = row.to_vec();
    let keys = index.column_keys().map(|keys| keys.keys_of(&columns));
    RowResult { columns, keys }
}

/// Resolves a row-returning call into a plan.
pub fn compile_row(index: &Index, call: &Call) -> Result<RowPlan> {
    let children = || -> Result<Vec<RowPlan>> {
        call.children.iter().map(|child| compile_row(index, child)).collect()
    };
    match call.name.as_str() {
        "Row" | "Range" => compile_row_args(index, call),
        "Union" => Ok(RowPlan::Union(children()?)),
        "Xor" => Ok(RowPlan::Xor(children()?)),
        "Intersect" | "Difference" => {
            if call.children.is_empty() {
                return Err(Error::invalid(format!("{} expects at least one row argument", call.name)));
            }
            if call.name == "Intersect" {
                Ok(RowPlan::Intersect(children()?))
            } else {
                Ok(RowPlan::Difference(children()?))
            }
        }
        "Not" => match call.children.as_slice() {
            [child] => Ok(RowPlan::Not(Box::new(compile_row(index, child)?))),
            _ => Err(Error::invalid("Not expects exactly one row argument")),
        },
        "All" => Ok(RowPlan::All),
        "ConstRow" => {
            let Some(Value::List(values)) = call.keyed("columns") else {
                return Err(Error::invalid("ConstRow expects columns=[...]"));
            };
            let mut row = Row::new();
            for value in values {
                if let Some(column) = resolve_column(index, value, false)? {
                    row.insert(column);
                }
            }
            Ok(RowPlan::Const(row))
        }
        other => Err(Error::invalid(format!("{} does not return a row", other))),
    }
}

fn compile_row_args(index: &Index, call: &Call) -> Result<RowPlan> {
    let from = call.keyed("from").map(timestamp_value).transpose()?;
    let to = call.keyed("to").map(timestamp_value).transpose()?;
    let predicates: Vec<&Arg> = call
        .args
        .iter()
        .filter(|arg| !matches!(arg, Arg::Keyed { key, .. } if TIME_ARGS.contains(&key.as_str())))
        .collect();
    let [predicate] = predicates.as_slice() else {
        return Err(Error::invalid(format!("{} expects exactly one field predicate", call.name)));
    };
    if !call.children.is_empty() {
        return Err(Error::invalid(format!("{} does not take nested calls", call.name)));
    }

    let plan = match *predicate {
        Arg::Keyed { key, value } => {
            let field = index.field(key)?;
            let timed = from.is_some() || to.is_some();
            if timed && field.field_type() != FieldType::Time {
                return Err(Error::schema(format!("field '{}' is not a time field", key)));
            }
            match (field.field_type(), value) {
                (FieldType::Int, Value::Null) => RowPlan::IsNull(field),
                (FieldType::Int, _) => {
                    let value = int_value(&field, value)?;
                    RowPlan::Range { field, op: RangeOp::Eq, value }
                }
                _ => match resolve_row(&field, value, false)? {
                    None => RowPlan::Empty,
                    Some(row) if timed => RowPlan::TimeBits {
                        field,
                        row,
                        from: from.unwrap_or_else(range_floor),
                        to: to.unwrap_or_else(range_ceiling),
                    },
                    Some(row) => RowPlan::Bits { field, row },
                },
            }
        }
        Arg::Condition { field, op: CondOp::Neq, value: Value::Null } => RowPlan::NotNull(index.field(field)?),
        Arg::Condition { field, op: CondOp::Eq, value: Value::Null } => RowPlan::IsNull(index.field(field)?),
        Arg::Condition { field, op, value } => {
            let field = int_field(index, field)?;
            let value = int_value(&field, value)?;
            RowPlan::Range { field, op: (*op).into(), value }
        }
        Arg::Between { low, low_op, field, high_op, high } => {
            let field = int_field(index, field)?;
            let mut low = int_value(&field, low)?;
            let mut high = int_value(&field, high)?;
            if *low_op == CondOp::Lt {
                let Some(next) = low.checked_add(1) else {
                    return Ok(RowPlan::Empty);
                };
                low = next;
            }
            if *high_op == CondOp::Lt {
                let Some(prev) = high.checked_sub(1) else {
                    return Ok(RowPlan::Empty);
                };
                high = prev;
            }
            RowPlan::Between { field, low, high }
        }
        Arg::Positional(value) => {
            return Err(Error::invalid(format!("{} expects field=value, got {}", call.name, value)));
        }
    };
    if (from.is_some() || to.is_some()) && !matches!(plan, RowPlan::TimeBits { .. } | RowPlan::Empty) {
        return Err(Error::schema("from/to only apply to time fields"));
    }
    Ok(plan)
}

fn int_field(index: &Index, name: &str) -> Result<Arc<Field>> {
    let field = index.field(name)?;
    if field.field_type() != FieldType::Int {
        return Err(Error::schema(format!(
            "comparison on '{}' requires an int field, not {}",
            name,
            field.field_type()
        )));
    }
    Ok(field)
}

fn int_value(field: &Field, value: &Value) -> Result<i64> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(Error::schema(format!(
            "int field '{}' cannot take a {} value",
            field.name(),
            other.type_name()
        ))),
    }
}

fn timestamp_value(value: &Value) -> Result<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Ok(*ts),
        Value::Str(text) => parse_timestamp(text),
        other => Err(Error::invalid(format!("expected a timestamp, got {}", other))),
    }
}

/// The column and optional timestamp of `Set`/`Clear`.
fn record_args(call: &Call) -> Result<(&Value, Option<NaiveDateTime>)> {
    match call.positional().as_slice() {
        [column] => Ok((*column, None)),
        [column, ts] => Ok((*column, Some(timestamp_value(ts)?))),
        _ => Err(Error::invalid(format!("{} expects a column and an optional timestamp", call.name))),
    }
}

fn single_field_arg<'a>(index: &Index, call: &'a Call, reserved: &[&str]) -> Result<(Arc<Field>, &'a Value)> {
    match call.field_args(reserved).as_slice() {
        [(name, value)] => Ok((index.field(name)?, *value)),
        _ => Err(Error::invalid(format!("{} expects exactly one field=value argument", call.name))),
    }
}

/// The field of TopN/Sum/Min/Max: `field=name` or a bare positional name.
fn named_field(index: &Index, call: &Call) -> Result<Arc<Field>> {
    let named = call.keyed("field").or_else(|| call.positional().first().copied());
    match named {
        Some(Value::Ident(name)) | Some(Value::Str(name)) => index.field(name),
        _ => Err(Error::invalid(format!("{} expects a field name", call.name))),
    }
}

fn optional_filter(index: &Index, call: &Call) -> Result<Option<RowPlan>> {
    match call.children.as_slice() {
        [] => Ok(None),
        [child] => Ok(Some(compile_row(index, child)?)),
        _ => Err(Error::invalid(format!("{} takes at most one row filter", call.name))),
    }
}

/// Column id for a record reference. Keys are allocated only on writes;
/// an unknown key on a read resolves to `None`.
pub fn resolve_column(index: &Index, value: &Value, allocate: bool) -> Result<Option<ColumnId>> {
    match value {
        Value::Int(n) if index.column_keys().is_none() => {
            if *n < 0 {
                return Err(Error::range(format!("column id {} is negative", n)));
            }
            Ok(Some(*n as ColumnId))
        }
        Value::Str(key) if index.column_keys().is_some() => index.column_for_key(key, allocate),
        Value::Int(_) => Err(Error::schema(format!("index '{}' uses string keys", index.name()))),
        Value::Str(_) => Err(Error::schema(format!("index '{}' uses integer columns", index.name()))),
        other => Err(Error::schema(format!("invalid column reference {}", other))),
    }
}

/// Row id for a field value. Keys are allocated only on writes.
pub fn resolve_row(field: &Field, value: &Value, allocate: bool) -> Result<Option<RowId>> {
    match (field.field_type(), value) {
        (FieldType::Bool, Value::Bool(b)) => Ok(Some(*b as RowId)),
        (FieldType::Bool, other) => Err(Error::schema(format!(
            "bool field '{}' cannot take a {} value",
            field.name(),
            other.type_name()
        ))),
        (_, Value::Str(key)) => match field.row_keys() {
            Some(keys) if allocate => Ok(Some(keys.translate_key(key))),
            Some(keys) => Ok(keys.find_id(key)),
            None => Err(Error::schema(format!("field '{}' does not use string keys", field.name()))),
        },
        (_, Value::Int(n)) if field.row_keys().is_none() => {
            if *n < 0 {
                return Err(Error::range(format!("row id {} is negative", n)));
            }
            Ok(Some(*n as RowId))
        }
        (_, Value::Int(_)) => Err(Error::schema(format!("field '{}' uses string keys", field.name()))),
        (_, other) => Err(Error::schema(format!(
            "field '{}' cannot take a {} value",
            field.name(),
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::shard::LocalCluster;
    use crate::index::index::{IndexOptions, IndexOptionsRequest};
    use crate::schema::field::FieldOptionsRequest;

    struct Fixture {
        executor: Executor,
        cluster: Arc<LocalCluster>,
        index: Index,
    }

    fn fixture(options: IndexOptions) -> Fixture {
        let cluster = Arc::new(LocalCluster::default());
        let coordinator = Arc::new(Coordinator::new(2, cluster.clone()).unwrap());
        let executor = Executor::new(coordinator, &Config::default());
        let index = Index::new("i", options).unwrap();
        index.create_field("stats", FieldOptionsRequest::default()).unwrap();
        index
            .create_field("age", FieldOptionsRequest::of_type(FieldType::Int).with_bounds(-100, 100))
            .unwrap();
        index.create_field("color", FieldOptionsRequest::of_type(FieldType::Mutex).with_keys(true)).unwrap();
        index.create_field("active", FieldOptionsRequest::of_type(FieldType::Bool)).unwrap();
        Fixture { executor, cluster, index }
    }

    fn plain() -> Fixture {
        fixture(IndexOptions { keys: false, shard_count: 4 })
    }

    impl Fixture {
        fn run(&self, text: &str) -> Vec<StatementOutcome> {
            self.executor.execute(&self.index, text, &ExecContext::unbounded()).unwrap().results
        }

        fn one(&self, text: &str) -> QueryResult {
            self.run(text).remove(0).result().cloned().unwrap()
        }
    }

    #[test]
    fn set_reports_first_write_only() {
        let fx = plain();
        let results = fx.run("Set(10, stats=1) Set(10, stats=1)");
        assert_eq!(results[0].result(), Some(&QueryResult::Bool(true)));
        assert_eq!(results[1].result(), Some(&QueryResult::Bool(false)));
        assert_eq!(fx.one("Row(stats=1)").columns(), Some(&[10][..]));
    }

    #[test]
    fn boolean_combinators() {
        let fx = plain();
        fx.run("Set(1, stats=1) Set(2, stats=1) Set(2, stats=2) Set(3, stats=2) Set(7, age=4)");
        assert_eq!(fx.one("Union(Row(stats=1), Row(stats=2))").columns(), Some(&[1, 2, 3][..]));
        assert_eq!(fx.one("Intersect(Row(stats=1), Row(stats=2))").columns(), Some(&[2][..]));
        assert_eq!(fx.one("Difference(Row(stats=1), Row(stats=2))").columns(), Some(&[1][..]));
        assert_eq!(fx.one("Xor(Row(stats=1), Row(stats=2))").columns(), Some(&[1, 3][..]));
        assert_eq!(fx.one("Not(Row(stats=1))").columns(), Some(&[3, 7][..]));
        assert_eq!(fx.one("All()").columns(), Some(&[1, 2, 3, 7][..]));
        assert_eq!(fx.one("ConstRow(columns=[3, 9])").columns(), Some(&[3, 9][..]));
        assert_eq!(fx.one("Count(Row(stats=1))"), QueryResult::Count(2));
    }

    #[test]
    fn int_ranges_and_aggregates() {
        let fx = plain();
        fx.run("Set(1, age=-5) Set(2, age=10) Set(3, age=10) Set(4, age=99) Set(2, stats=1) Set(3, stats=1)");
        assert_eq!(fx.one("Row(age=10)").columns(), Some(&[2, 3][..]));
        assert_eq!(fx.one("Row(age > 9)").columns(), Some(&[2, 3, 4][..]));
        assert_eq!(fx.one("Row(-5 < age < 99)").columns(), Some(&[2, 3][..]));
        assert_eq!(fx.one("Row(age != null)").columns(), Some(&[1, 2, 3, 4][..]));
        assert_eq!(fx.one("Row(age == null)").columns(), Some(&[][..]));
        assert_eq!(fx.one("Sum(field=age)"), QueryResult::ValCount(ValCount::new(114, 4)));
        assert_eq!(fx.one("Sum(Row(stats=1), field=age)"), QueryResult::ValCount(ValCount::new(20, 2)));
        assert_eq!(fx.one("Min(field=age)"), QueryResult::ValCount(ValCount::new(-5, 1)));
        assert_eq!(fx.one("Max(age)"), QueryResult::ValCount(ValCount::new(99, 1)));
    }

    #[test]
    fn out_of_range_write_keeps_prior_value() {
        let fx = plain();
        let results = fx.run("Set(1, age=50) Set(1, age=101) Row(age=50)");
        assert_eq!(results[1].error().map(|e| e.kind), Some("RangeError"));
        assert_eq!(results[2].result().and_then(QueryResult::columns), Some(&[1][..]));
    }

    #[test]
    fn statement_errors_do_not_stop_the_request() {
        let fx = plain();
        let results = fx.run("Set(1, stats=1) Row(nope=1) Frob() Set(2, stats=1) Row(stats=1)");
        assert_eq!(results[1].error().map(|e| e.kind), Some("SchemaError"));
        assert_eq!(results[2].error().map(|e| e.kind), Some("UnknownCallError"));
        assert_eq!(results[4].result().and_then(QueryResult::columns), Some(&[1, 2][..]));
    }

    #[test]
    fn parse_error_runs_nothing() {
        let fx = plain();
        let err = fx.executor.execute(&fx.index, "Set(1, stats=1) Row(", &ExecContext::unbounded()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(fx.one("Count(Row(stats=1))"), QueryResult::Count(0));
    }

    #[test]
    fn mutex_and_bool_fields() {
        let fx = plain();
        fx.run(r#"Set(1, color="red") Set(1, color="blue") Set(2, active=true) Set(2, active=false)"#);
        assert_eq!(fx.one(r#"Row(color="red")"#).columns(), Some(&[][..]));
        assert_eq!(fx.one(r#"Row(color="blue")"#).columns(), Some(&[1][..]));
        assert_eq!(fx.one(r#"Row(color="green")"#).columns(), Some(&[][..]));
        assert_eq!(fx.one("Row(active=false)").columns(), Some(&[2][..]));
        assert_eq!(fx.one("Row(active=true)").columns(), Some(&[][..]));
        assert_eq!(fx.one("Row(color != null)").columns(), Some(&[1][..]));
        assert_eq!(fx.one("Row(active == null)").columns(), Some(&[1][..]));
        assert_eq!(fx.one("Row(stats != null)").columns(), Some(&[][..]));
    }

    #[test]
    fn top_n_ranks_across_shards() {
        let fx = plain();
        fx.run("Set(1, stats=5) Set(2, stats=5) Set(3, stats=5) Set(1, stats=6) Set(2, stats=6) Set(9, stats=7)");
        let QueryResult::Pairs(pairs) = fx.one("TopN(stats, n=2)") else {
            panic!("expected pairs");
        };
        let ranked: Vec<(u64, u64)> = pairs.iter().map(|p| (p.id, p.count)).collect();
        assert_eq!(ranked, vec![(5, 3), (6, 2)]);

        let QueryResult::Pairs(filtered) = fx.one("TopN(stats, Row(stats=7), n=5)") else {
            panic!("expected pairs");
        };
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, 7);
    }

    #[test]
    fn clear_and_clear_row() {
        let fx = plain();
        fx.run("Set(1, stats=1) Set(2, stats=1) Set(3, age=7)");
        let results = fx.run("Clear(1, stats=1) Clear(1, stats=1) ClearRow(stats=1) Clear(3, age=0) Row(stats=1)");
        let bools: Vec<_> = results[..4].iter().map(|r| r.result().cloned()).collect();
        assert_eq!(
            bools,
            vec![
                Some(QueryResult::Bool(true)),
                Some(QueryResult::Bool(false)),
                Some(QueryResult::Bool(true)),
                Some(QueryResult::Bool(true)),
            ]
        );
        assert_eq!(results[4].result().and_then(QueryResult::columns), Some(&[][..]));
    }

    #[test]
    fn keyed_index_reports_keys() {
        let fx = fixture(IndexOptionsRequest::keyed().validate(4).unwrap());
        fx.run(r#"Set("alice", stats=1) Set("bob", stats=1)"#);
        let QueryResult::Row(row) = fx.one("Row(stats=1)") else {
            panic!("expected a row");
        };
        assert_eq!(row.keys, Some(vec!["alice".to_string(), "bob".to_string()]));
        assert_eq!(fx.run("Set(3, stats=1)")[0].error().map(|e| e.kind), Some("SchemaError"));
    }

    #[test]
    fn rejected_set_allocates_no_column_key() {
        let fx = fixture(IndexOptionsRequest::keyed().validate(4).unwrap());
        let results = fx.run(r#"Set("zed", age=999) Set("zed", age="old") Set("zed", active=3) Set("zed", stats=1, 2024-01-01T00:00)"#);
        assert_eq!(results[0].error().map(|e| e.kind), Some("RangeError"));
        assert_eq!(results[1].error().map(|e| e.kind), Some("SchemaError"));
        assert_eq!(results[2].error().map(|e| e.kind), Some("SchemaError"));
        assert_eq!(results[3].error().map(|e| e.kind), Some("SchemaError"));
        let keys = fx.index.column_keys().unwrap();
        assert_eq!(keys.find_id("zed"), None);
        assert_eq!(fx.one("Count(All())"), QueryResult::Count(0));

        fx.run(r#"Set("zed", color="red")"#);
        assert!(keys.find_id("zed").is_some());
    }

    #[test]
    fn degraded_reads_and_strict_mode() {
        let fx = plain();
        fx.run("Set(1, stats=1) Set(2, stats=1)");
        fx.cluster.mark_unavailable(2);

        let response = fx.executor.execute(&fx.index, "Row(stats=1)", &ExecContext::unbounded()).unwrap();
        assert_eq!(response.degraded.as_ref().map(|d| d.missing_shards.clone()), Some(vec![2]));
        assert_eq!(response.results[0].result().and_then(QueryResult::columns), Some(&[1][..]));

        let write = fx.run("Set(6, stats=1)");
        assert_eq!(write[0].error().map(|e| e.kind), Some("Degraded"));

        let strict = ExecContext { strict: true, ..ExecContext::unbounded() };
        let err = fx.executor.execute(&fx.index, "Row(stats=1)", &strict).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Degraded);
    }

    #[test]
    fn time_ranges() {
        let fx = plain();
        fx.index
            .create_field("seen", FieldOptionsRequest::of_type(FieldType::Time).with_time_quantum("YMD"))
            .unwrap();
        fx.run("Set(1, seen=1, 2024-01-05T10:00) Set(2, seen=1, 2024-03-01T00:00) Set(3, seen=1)");
        assert_eq!(
            fx.one("Row(seen=1, from=2024-01-01T00:00, to=2024-02-01T00:00)").columns(),
            Some(&[1][..])
        );
        assert_eq!(fx.one("Row(seen=1, from='2024-02-01')").columns(), Some(&[2][..]));
        assert_eq!(fx.one("Row(seen=1)").columns(), Some(&[1, 2, 3][..]));
        assert_eq!(fx.run("Row(stats=1, from='2024-02-01')")[0].error().map(|e| e.kind), Some("SchemaError"));
    }
}
