use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use crate::cluster::coordinator::ExecContext;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::ColumnId;
use crate::index::field::Field;
use crate::index::holder::Holder;
use crate::index::index::{Index, IndexOptionsRequest};
use crate::query::ast::Call;
use crate::query::executor::{compile_row, resolve_column, Executor, RowPlan};
use crate::query::results::QueryResult;
use crate::schema::field::FieldType;
use crate::sql::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::sql::parser::parse;
use crate::sql::planner::{AggregateOutput, InsertRow, Output, Plan, Planner, ID_COLUMN};
use crate::sql::types::{ColumnInfo, ResultSet, SqlType, SqlValue};

/// Runs SQL statements by translating them onto the PQL executor.
pub struct SqlEngine {
    holder: Arc<Holder>,
    executor: Arc<Executor>,
}

impl SqlEngine {
    pub fn new(holder: Arc<Holder>, executor: Arc<Executor>) -> Self {
        SqlEngine { holder, executor }
    }

    #[instrument(skip(self, sql, ctx))]
    pub fn execute(&self, sql: &str, ctx: &ExecContext) -> Result<ResultSet> {
        let statement = parse(sql)?;
        let plan = Planner::new(&self.holder).plan(statement)?;
        ctx.deadline.check()?;
        self.run(plan, ctx)
    }

    fn run(&self, plan: Plan, ctx: &ExecContext) -> Result<ResultSet> {
        match plan {
            Plan::Constant { outputs, filter, limit } => run_constant(outputs, filter, limit),
            Plan::Scan { index, outputs, filter, limit } => self.scan(&index, &outputs, filter, limit, ctx),
            Plan::Aggregate { index, outputs, limit } => self.aggregate(&index, &outputs, limit, ctx),
            Plan::CreateTable { name, if_not_exists, keyed, fields } => {
                if if_not_exists && self.holder.contains(&name) {
                    return Ok(ResultSet::empty());
                }
                let request = IndexOptionsRequest { keys: Some(keyed), shard_count: None };
                let index = self.holder.create_index(&name, request)?;
                for (column, options) in fields {
                    if let Err(err) = index.create_field(&column, options) {
                        self.holder.delete_index(&name)?;
                        return Err(err);
                    }
                }
                Ok(ResultSet::empty())
            }
            Plan::DropTable { name, if_exists } => match self.holder.delete_index(&name) {
                Err(err) if if_exists && err.kind == ErrorKind::NotFound => Ok(ResultSet::empty()),
                Err(err) if err.kind == ErrorKind::NotFound => {
                    Err(Error::not_found(format!("table '{}' not found", name)))
                }
                other => other.map(|_| ResultSet::empty()),
            },
            Plan::ShowTables => Ok(self.show_tables()),
            Plan::ShowColumns { index } => Ok(show_columns(&index)),
            Plan::Insert { index, rows } => self.insert(&index, &rows, ctx),
        }
    }

    fn scan(
        &self,
        index: &Index,
        outputs: &[Output],
        filter: Option<Call>,
        limit: Option<u64>,
        ctx: &ExecContext,
    ) -> Result<ResultSet> {
        let plan = match &filter {
            Some(call) => compile_row(index, call)?,
            None => RowPlan::All,
        };
        let partial = self.executor.evaluate_row(index, &plan, ctx)?;
        if partial.is_degraded() {
            warn!(table = %index.name(), missing = ?partial.missing_shards, "scan is missing shards");
        }

        let fields: HashMap<String, Arc<Field>> =
            index.fields().into_iter().map(|field| (field.name().to_string(), field)).collect();

        let mut result = ResultSet::new(outputs.iter().map(|o| o.column.clone()).collect());
        result.mark_missing(partial.missing_shards.iter().copied());
        let limit = limit.map(|l| l as usize).unwrap_or(usize::MAX);
        for column in partial.value.columns().take(limit) {
            ctx.deadline.check()?;
            let lookup = |name: &str| -> Result<SqlValue> { read_cell(index, &fields, column, name) };
            let mut row = Vec::with_capacity(outputs.len());
            for output in outputs {
                row.push(evaluate(&output.expr, &lookup)?);
            }
            result.push(row);
        }
        debug!(table = %index.name(), rows = result.len(), "scan finished");
        Ok(result)
    }

    fn aggregate(
        &self,
        index: &Index,
        outputs: &[AggregateOutput],
        limit: Option<u64>,
        ctx: &ExecContext,
    ) -> Result<ResultSet> {
        let mut result = ResultSet::new(outputs.iter().map(|o| o.column.clone()).collect());
        let mut row = Vec::with_capacity(outputs.len());
        for output in outputs {
            ctx.deadline.check()?;
            let partial = self.executor.execute_call(index, &output.call, ctx)?;
            if partial.is_degraded() {
                warn!(table = %index.name(), missing = ?partial.missing_shards, "aggregate is missing shards");
                result.mark_missing(partial.missing_shards.iter().copied());
            }
            let value = match (output.func, partial.value) {
                (_, QueryResult::Count(count)) => SqlValue::Int(count as i64),
                (_, QueryResult::ValCount(vc)) if vc.is_empty() => SqlValue::Null,
                (_, QueryResult::ValCount(vc)) => SqlValue::Int(vc.value),
                (func, other) => {
                    return Err(Error::internal(format!("{} produced an unexpected result {:?}", func.name(), other)));
                }
            };
            row.push(value);
        }
        if limit != Some(0) {
            result.push(row);
        }
        Ok(result)
    }

    fn insert(&self, index: &Index, rows: &[InsertRow], ctx: &ExecContext) -> Result<ResultSet> {
        let mut writes = 0usize;
        for row in rows {
            ctx.deadline.check()?;
            if row.calls.is_empty() {
                let column = resolve_column(index, &row.id, true)?
                    .ok_or_else(|| Error::internal("record key was not allocated"))?;
                self.executor.coordinator().route_write(index.name(), index.shard_for(column), ctx)?;
                index.note_column(column)?;
                continue;
            }
            for call in &row.calls {
                self.executor.execute_call(index, call, ctx)?;
                writes += 1;
            }
        }
        info!(table = %index.name(), rows = rows.len(), writes, "insert finished");
        Ok(ResultSet::empty())
    }

    fn show_tables(&self) -> ResultSet {
        let mut result = ResultSet::new(vec![
            ColumnInfo::new("name", SqlType::String),
            ColumnInfo::new("keys", SqlType::Bool),
            ColumnInfo::new("shard_count", SqlType::Int),
        ]);
        for index in self.holder.indexes() {
            result.push(vec![
                SqlValue::String(index.name().to_string()),
                SqlValue::Bool(index.options().keys),
                SqlValue::Int(index.shard_count() as i64),
            ]);
        }
        result
    }
}

fn show_columns(index: &Index) -> ResultSet {
    let mut result = ResultSet::new(vec![
        ColumnInfo::new("name", SqlType::String),
        ColumnInfo::new("type", SqlType::String),
        ColumnInfo::new("internal_type", SqlType::String),
    ]);
    let (id_type, id_internal) = if index.column_keys().is_some() { ("STRING", "string") } else { ("ID", "id") };
    result.push(vec![
        SqlValue::String(ID_COLUMN.to_string()),
        SqlValue::String(id_type.to_string()),
        SqlValue::String(id_internal.to_string()),
    ]);
    for field in index.fields() {
        result.push(vec![
            SqlValue::String(field.name().to_string()),
            SqlValue::String(SqlType::of_field(field.options()).name().to_string()),
            SqlValue::String(field.field_type().as_str().to_string()),
        ]);
    }
    result
}

fn run_constant(outputs: Vec<Output>, filter: Option<Expr>, limit: Option<u64>) -> Result<ResultSet> {
    let no_columns = |name: &str| -> Result<SqlValue> {
        Err(Error::not_found(format!("column '{}' not found", name)))
    };
    let mut result = ResultSet::new(outputs.iter().map(|o| o.column.clone()).collect());
    if let Some(filter) = &filter {
        if evaluate(filter, &no_columns)? != SqlValue::Bool(true) {
            return Ok(result);
        }
    }
    if limit == Some(0) {
        return Ok(result);
    }
    let mut row = Vec::with_capacity(outputs.len());
    for output in &outputs {
        row.push(evaluate(&output.expr, &no_columns)?);
    }
    result.push(row);
    Ok(result)
}

/// Reads one cell of a record.
fn read_cell(index: &Index, fields: &HashMap<String, Arc<Field>>, column: ColumnId, name: &str) -> Result<SqlValue> {
    if name == ID_COLUMN {
        return Ok(match index.column_keys() {
            Some(keys) => SqlValue::String(keys.key_of(column).unwrap_or_else(|| column.to_string())),
            None => SqlValue::Int(column as i64),
        });
    }
    let field = fields
        .get(name)
        .ok_or_else(|| Error::not_found(format!("column '{}' not found in table '{}'", name, index.name())))?;
    let shard = index.shard_for(column);

    if field.field_type() == FieldType::Int {
        return Ok(field.value(shard, column)?.map(SqlValue::Int).unwrap_or(SqlValue::Null));
    }
    let rows = field.rows_for_column(shard, column)?;
    if rows.is_empty() {
        return Ok(SqlValue::Null);
    }
    let key = |row: u64| -> String {
        field.row_keys().and_then(|keys| keys.key_of(row)).unwrap_or_else(|| row.to_string())
    };
    Ok(match field.field_type() {
        FieldType::Bool => SqlValue::Bool(rows.contains(&1)),
        FieldType::Mutex if field.row_keys().is_some() => SqlValue::String(key(rows[0])),
        FieldType::Mutex => SqlValue::Int(rows[0] as i64),
        _ if field.row_keys().is_some() => SqlValue::StringSet(rows.into_iter().map(key).collect()),
        _ => SqlValue::IdSet(rows),
    })
}

fn literal(lit: &Literal) -> SqlValue {
    match lit {
        Literal::Null => SqlValue::Null,
        Literal::Bool(b) => SqlValue::Bool(*b),
        Literal::Int(n) => SqlValue::Int(*n),
        Literal::Decimal(d) => SqlValue::Decimal(*d),
        Literal::Str(s) => SqlValue::String(s.clone()),
    }
}

fn as_decimal(value: &SqlValue) -> Option<f64> {
    match value {
        SqlValue::Int(n) => Some(*n as f64),
        SqlValue::Decimal(d) => Some(*d),
        _ => None,
    }
}

fn compare(left: &SqlValue, right: &SqlValue) -> Result<Option<Ordering>> {
    Ok(match (left, right) {
        (SqlValue::Null, _) | (_, SqlValue::Null) => None,
        (SqlValue::Int(a), SqlValue::Int(b)) => Some(a.cmp(b)),
        (SqlValue::String(a), SqlValue::String(b)) => Some(a.cmp(b)),
        (SqlValue::Bool(a), SqlValue::Bool(b)) => Some(a.cmp(b)),
        (SqlValue::IdSet(a), SqlValue::IdSet(b)) if a == b => Some(Ordering::Equal),
        (SqlValue::StringSet(a), SqlValue::StringSet(b)) if a == b => Some(Ordering::Equal),
        (a, b) => match (as_decimal(a), as_decimal(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => {
                return Err(Error::schema(format!("cannot compare {} with {}", a.type_name(), b.type_name())));
            }
        },
    })
}

fn arithmetic(left: SqlValue, op: BinaryOp, right: SqlValue) -> Result<SqlValue> {
    if left.is_null() || right.is_null() {
        return Ok(SqlValue::Null);
    }
    let overflow = || Error::range(format!("integer overflow in {} {} {}", describe(&left), op.symbol(), describe(&right)));
    if let (SqlValue::Int(a), SqlValue::Int(b)) = (&left, &right) {
        let (a, b) = (*a, *b);
        if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0 {
            return Err(Error::range("division by zero"));
        }
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => a.checked_div(b),
            _ => a.checked_rem(b),
        };
        return result.map(SqlValue::Int).ok_or_else(overflow);
    }
    let (Some(a), Some(b)) = (as_decimal(&left), as_decimal(&right)) else {
        return Err(Error::schema(format!(
            "operator {} is not defined for {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        )));
    };
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0.0 {
        return Err(Error::range("division by zero"));
    }
    Ok(SqlValue::Decimal(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        _ => a % b,
    }))
}

fn describe(value: &SqlValue) -> String {
    match value {
        SqlValue::Int(n) => n.to_string(),
        SqlValue::Decimal(d) => d.to_string(),
        other => other.type_name().to_string(),
    }
}

fn truth(value: &SqlValue) -> Result<Option<bool>> {
    match value {
        SqlValue::Null => Ok(None),
        SqlValue::Bool(b) => Ok(Some(*b)),
        other => Err(Error::schema(format!("expected BOOL, found {}", other.type_name()))),
    }
}

fn from_truth(value: Option<bool>) -> SqlValue {
    value.map(SqlValue::Bool).unwrap_or(SqlValue::Null)
}

/// Evaluates an expression for one record; `lookup` supplies column values.
pub fn evaluate(expr: &Expr, lookup: &dyn Fn(&str) -> Result<SqlValue>) -> Result<SqlValue> {
    match expr {
        Expr::Literal(lit) => Ok(literal(lit)),
        Expr::Column(name) => lookup(name),
        Expr::List(items) => {
            let mut ids = Vec::new();
            let mut keys = Vec::new();
            for item in items {
                match evaluate(item, lookup)? {
                    SqlValue::Int(n) => ids.push(
                        u64::try_from(n).map_err(|_| Error::range(format!("set member {} is negative", n)))?,
                    ),
                    SqlValue::String(s) => keys.push(s),
                    other => {
                        return Err(Error::schema(format!("sets cannot hold {} values", other.type_name())));
                    }
                }
            }
            match (ids.is_empty(), keys.is_empty()) {
                (_, true) => Ok(SqlValue::IdSet(ids)),
                (true, false) => Ok(SqlValue::StringSet(keys)),
                (false, false) => Err(Error::schema("set mixes INT and STRING values")),
            }
        }
        Expr::Unary { op: UnaryOp::Neg, expr } => match evaluate(expr, lookup)? {
            SqlValue::Null => Ok(SqlValue::Null),
            SqlValue::Int(n) => n
                .checked_neg()
                .map(SqlValue::Int)
                .ok_or_else(|| Error::range(format!("integer overflow negating {}", n))),
            SqlValue::Decimal(d) => Ok(SqlValue::Decimal(-d)),
            other => Err(Error::schema(format!("unary minus is not defined for {}", other.type_name()))),
        },
        Expr::Unary { op: UnaryOp::Not, expr } => Ok(from_truth(truth(&evaluate(expr, lookup)?)?.map(|b| !b))),
        Expr::Binary { left, op: BinaryOp::And, right } => {
            let l = truth(&evaluate(left, lookup)?)?;
            if l == Some(false) {
                return Ok(SqlValue::Bool(false));
            }
            let r = truth(&evaluate(right, lookup)?)?;
            Ok(from_truth(match (l, r) {
                (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            }))
        }
        Expr::Binary { left, op: BinaryOp::Or, right } => {
            let l = truth(&evaluate(left, lookup)?)?;
            if l == Some(true) {
                return Ok(SqlValue::Bool(true));
            }
            let r = truth(&evaluate(right, lookup)?)?;
            Ok(from_truth(match (l, r) {
                (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            }))
        }
        Expr::Binary { left, op: BinaryOp::Concat, right } => {
            match (evaluate(left, lookup)?, evaluate(right, lookup)?) {
                (SqlValue::Null, _) | (_, SqlValue::Null) => Ok(SqlValue::Null),
                (SqlValue::String(a), SqlValue::String(b)) => Ok(SqlValue::String(a + &b)),
                (a, b) => Err(Error::schema(format!("operator || is not defined for {} and {}", a.type_name(), b.type_name()))),
            }
        }
        Expr::Binary { left, op, right } if op.is_arithmetic() => {
            arithmetic(evaluate(left, lookup)?, *op, evaluate(right, lookup)?)
        }
        Expr::Binary { left, op, right } => {
            let ordering = compare(&evaluate(left, lookup)?, &evaluate(right, lookup)?)?;
            Ok(from_truth(ordering.map(|ord| match op {
                BinaryOp::Eq => ord == Ordering::Equal,
                BinaryOp::NotEq => ord != Ordering::Equal,
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            })))
        }
        Expr::Between { expr, low, high, negated } => {
            let value = evaluate(expr, lookup)?;
            let above = compare(&value, &evaluate(low, lookup)?)?.map(|o| o != Ordering::Less);
            let below = compare(&value, &evaluate(high, lookup)?)?.map(|o| o != Ordering::Greater);
            let inside = match (above, below) {
                (Some(a), Some(b)) => Some(a && b),
                (Some(false), _) | (_, Some(false)) => Some(false),
                _ => None,
            };
            Ok(from_truth(inside.map(|b| b != *negated)))
        }
        Expr::InList { expr, list, negated } => {
            let value = evaluate(expr, lookup)?;
            let mut found = Some(false);
            for item in list {
                match compare(&value, &evaluate(item, lookup)?)? {
                    Some(Ordering::Equal) => {
                        found = Some(true);
                        break;
                    }
                    Some(_) => {}
                    None => found = None,
                }
            }
            Ok(from_truth(found.map(|b| b != *negated)))
        }
        Expr::IsNull { expr, negated } => Ok(SqlValue::Bool(evaluate(expr, lookup)?.is_null() != *negated)),
        Expr::Aggregate { func, .. } => {
            Err(Error::unsupported(format!("{} is not allowed here", func.name())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::coordinator::Coordinator;
    use crate::cluster::shard::LocalCluster;
    use crate::core::config::Config;
    use serde_json::json;

    fn engine() -> SqlEngine {
        let holder = Arc::new(Holder::new(4));
        let coordinator = Arc::new(Coordinator::new(2, Arc::new(LocalCluster::default())).unwrap());
        let executor = Arc::new(Executor::new(coordinator, &Config::default()));
        SqlEngine::new(holder, executor)
    }

    fn run(engine: &SqlEngine, sql: &str) -> ResultSet {
        engine.execute(sql, &ExecContext::unbounded()).unwrap()
    }

    fn fail(engine: &SqlEngine, sql: &str) -> Error {
        engine.execute(sql, &ExecContext::unbounded()).unwrap_err()
    }

    fn seeded() -> SqlEngine {
        let engine = engine();
        run(
            &engine,
            "CREATE TABLE people (_id ID, age INT MIN 0 MAX 150, city STRING, tags IDSET, active BOOL)",
        );
        run(
            &engine,
            "INSERT INTO people (_id, age, city, tags, active) VALUES \
             (1, 30, 'paris', [1, 2], true), \
             (2, 45, 'rome', [2], false), \
             (3, NULL, 'paris', [], true), \
             (10, 18, NULL, [3], NULL)",
        );
        engine
    }

    #[test]
    fn select_one_without_table() {
        let result = run(&engine(), "select 1");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"schema": {"fields": [{"name": "", "type": "INT"}]}, "data": [[1]]})
        );
    }

    #[test]
    fn constant_expressions() {
        let engine = engine();
        let result = run(&engine, "SELECT 7 / 2, 7.0 / 2, -3 % 2, 'a' || 'b' AS s, 2 > 1, NULL + 1");
        let types: Vec<SqlType> = result.schema.fields.iter().map(|f| f.sql_type).collect();
        assert_eq!(
            types,
            vec![SqlType::Int, SqlType::Decimal, SqlType::Int, SqlType::String, SqlType::Bool, SqlType::Int]
        );
        assert_eq!(
            result.data,
            vec![vec![
                SqlValue::Int(3),
                SqlValue::Decimal(3.5),
                SqlValue::Int(-1),
                SqlValue::String("ab".into()),
                SqlValue::Bool(true),
                SqlValue::Null,
            ]]
        );
        assert_eq!(result.schema.fields[3].name, "s");
        assert_eq!(fail(&engine, "SELECT 1 / 0").kind, ErrorKind::Range);
        assert_eq!(fail(&engine, "SELECT 1.5 % 0").kind, ErrorKind::Range);
        assert!(run(&engine, "SELECT 1 WHERE 1 > 2").is_empty());
    }

    #[test]
    fn select_star_reads_every_column() {
        let engine = seeded();
        let result = run(&engine, "SELECT * FROM people");
        assert_eq!(result.len(), 4);
        assert_eq!(
            result.data[0],
            vec![
                SqlValue::Int(1),
                SqlValue::Int(30),
                SqlValue::String("paris".into()),
                SqlValue::IdSet(vec![1, 2]),
                SqlValue::Bool(true),
            ]
        );
        assert_eq!(
            result.data[3],
            vec![SqlValue::Int(10), SqlValue::Int(18), SqlValue::Null, SqlValue::IdSet(vec![3]), SqlValue::Null]
        );
    }

    #[test]
    fn where_and_limit() {
        let engine = seeded();
        let ids = |sql: &str| -> Vec<SqlValue> { run(&engine, sql).data.into_iter().map(|r| r[0].clone()).collect() };
        assert_eq!(ids("SELECT _id FROM people WHERE age > 20"), vec![SqlValue::Int(1), SqlValue::Int(2)]);
        assert_eq!(ids("SELECT _id FROM people WHERE city = 'paris' AND active"), vec![SqlValue::Int(1), SqlValue::Int(3)]);
        assert_eq!(ids("SELECT _id FROM people WHERE tags = 2 OR _id = 10"), vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(10)]);
        assert_eq!(ids("SELECT _id FROM people WHERE age BETWEEN 18 AND 30"), vec![SqlValue::Int(1), SqlValue::Int(10)]);
        assert_eq!(ids("SELECT _id FROM people WHERE age IS NULL"), vec![SqlValue::Int(3)]);
        assert_eq!(ids("SELECT _id FROM people WHERE city = 'nowhere'"), Vec::<SqlValue>::new());
        assert_eq!(ids("SELECT _id FROM people LIMIT 2"), vec![SqlValue::Int(1), SqlValue::Int(2)]);
        assert_eq!(ids("SELECT _id FROM people WHERE _id IN (2, 3, 99)"), vec![SqlValue::Int(2), SqlValue::Int(3)]);
    }

    #[test]
    fn negation_leaves_out_null_values() {
        let engine = seeded();
        let ids = |sql: &str| -> Vec<i64> {
            run(&engine, sql)
                .data
                .into_iter()
                .filter_map(|r| match r[0] {
                    SqlValue::Int(id) => Some(id),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(ids("SELECT _id FROM people WHERE age != 30"), vec![2, 10]);
        assert_eq!(ids("SELECT _id FROM people WHERE NOT age = 30"), vec![2, 10]);
        assert_eq!(ids("SELECT _id FROM people WHERE NOT (age > 20)"), vec![10]);
        assert_eq!(ids("SELECT _id FROM people WHERE NOT age BETWEEN 18 AND 30"), vec![2]);
        assert_eq!(ids("SELECT _id FROM people WHERE city != 'paris'"), vec![2]);
        assert_eq!(ids("SELECT _id FROM people WHERE NOT city = 'paris'"), vec![2]);
        assert_eq!(ids("SELECT _id FROM people WHERE NOT active"), vec![2]);
        assert_eq!(ids("SELECT _id FROM people WHERE tags NOT IN (2)"), vec![10]);
        assert_eq!(ids("SELECT _id FROM people WHERE NOT (age > 40 AND active)"), vec![1, 2, 10]);
        assert_eq!(ids("SELECT _id FROM people WHERE NOT NOT age = 30"), vec![1]);
        assert_eq!(ids("SELECT _id FROM people WHERE NOT _id = 1"), vec![2, 3, 10]);
    }

    #[test]
    fn projected_expressions_use_column_values() {
        let engine = seeded();
        let result = run(&engine, "SELECT _id, age + 1 AS next FROM people WHERE _id = 2");
        assert_eq!(result.schema.fields[1], ColumnInfo::new("next", SqlType::Int));
        assert_eq!(result.data, vec![vec![SqlValue::Int(2), SqlValue::Int(46)]]);
    }

    #[test]
    fn aggregates() {
        let engine = seeded();
        let result = run(&engine, "SELECT COUNT(*), SUM(age), MIN(age), MAX(age), COUNT(age) FROM people");
        assert_eq!(
            result.data,
            vec![vec![SqlValue::Int(4), SqlValue::Int(93), SqlValue::Int(18), SqlValue::Int(45), SqlValue::Int(3)]]
        );
        let result = run(&engine, "SELECT COUNT(*) AS n, MAX(age) FROM people WHERE city = 'nowhere'");
        assert_eq!(result.schema.fields[0].name, "n");
        assert_eq!(result.data, vec![vec![SqlValue::Int(0), SqlValue::Null]]);
    }

    #[test]
    fn ddl_lifecycle() {
        let engine = seeded();
        assert_eq!(fail(&engine, "CREATE TABLE people (_id ID)").kind, ErrorKind::Conflict);
        run(&engine, "CREATE TABLE IF NOT EXISTS people (_id ID)");

        let tables = run(&engine, "SHOW TABLES");
        assert_eq!(tables.data, vec![vec![SqlValue::String("people".into()), SqlValue::Bool(false), SqlValue::Int(4)]]);

        let columns = run(&engine, "SHOW COLUMNS FROM people");
        let names: Vec<SqlValue> = columns.data.iter().map(|r| r[1].clone()).collect();
        assert_eq!(
            names,
            ["ID", "INT", "STRING", "IDSET", "BOOL"].iter().map(|s| SqlValue::String(s.to_string())).collect::<Vec<_>>()
        );

        run(&engine, "DROP TABLE people");
        assert_eq!(fail(&engine, "SELECT * FROM people").kind, ErrorKind::NotFound);
        assert_eq!(fail(&engine, "DROP TABLE people").kind, ErrorKind::NotFound);
        run(&engine, "DROP TABLE IF EXISTS people");
    }

    #[test]
    fn keyed_tables_use_string_ids() {
        let engine = engine();
        run(&engine, "CREATE TABLE users (_id STRING, labels STRINGSET)");
        run(&engine, "INSERT INTO users (_id, labels) VALUES ('ann', ['a', 'b']), ('bob', NULL)");
        let result = run(&engine, "SELECT * FROM users WHERE _id = 'ann'");
        assert_eq!(
            result.data,
            vec![vec![SqlValue::String("ann".into()), SqlValue::StringSet(vec!["a".into(), "b".into()])]]
        );
        assert_eq!(run(&engine, "SELECT COUNT(*) FROM users").data, vec![vec![SqlValue::Int(2)]]);
        assert!(fail(&engine, "INSERT INTO users (_id, labels) VALUES (1, ['a'])").is_schema());
    }

    #[test]
    fn insert_out_of_range_fails() {
        let engine = seeded();
        assert_eq!(fail(&engine, "INSERT INTO people (_id, age) VALUES (4, 200)").kind, ErrorKind::Range);
        let result = run(&engine, "SELECT age FROM people WHERE _id = 1");
        assert_eq!(result.data, vec![vec![SqlValue::Int(30)]]);
    }

    #[test]
    fn unsupported_column_type_creates_nothing() {
        let engine = engine();
        let err = fail(&engine, "CREATE TABLE t (_id ID, bad TIMESTAMP)");
        assert_eq!(err.kind, ErrorKind::Unsupported);
        assert!(run(&engine, "SHOW TABLES").is_empty());
    }
}
