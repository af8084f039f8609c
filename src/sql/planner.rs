use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use crate::core::error::{Error, ErrorKind, Result};
use crate::index::field::Field;
use crate::index::holder::Holder;
use crate::index::index::Index;
use crate::query::ast::{Arg, Call, CondOp, Value};
use crate::schema::field::{FieldOptionsRequest, FieldType};
use crate::schema::naming::validate_name;
use crate::sql::ast::{
    AggregateFunc, BinaryOp, ColumnConstraint, ColumnDef, CreateTable, Expr, Insert, Literal, Projection, Select,
    Statement, UnaryOp,
};
use crate::sql::executor::evaluate;
use crate::sql::types::{ColumnInfo, SqlType, SqlValue};

pub const ID_COLUMN: &str = "_id";

/// A projected column and the expression that computes it per record.
#[derive(Debug, Clone)]
pub struct Output {
    pub column: ColumnInfo,
    pub expr: Expr,
}

/// An aggregate projection, already translated to a PQL call.
#[derive(Debug, Clone)]
pub struct AggregateOutput {
    pub column: ColumnInfo,
    pub func: AggregateFunc,
    pub call: Call,
}

/// The writes for one `INSERT` tuple.
#[derive(Debug, Clone)]
pub struct InsertRow {
    pub id: Value,
    pub calls: Vec<Call>,
}

pub enum Plan {
    /// `SELECT` without `FROM`.
    Constant { outputs: Vec<Output>, filter: Option<Expr>, limit: Option<u64> },
    Scan { index: Arc<Index>, outputs: Vec<Output>, filter: Option<Call>, limit: Option<u64> },
    Aggregate { index: Arc<Index>, outputs: Vec<AggregateOutput>, limit: Option<u64> },
    CreateTable { name: String, if_not_exists: bool, keyed: bool, fields: Vec<(String, FieldOptionsRequest)> },
    DropTable { name: String, if_exists: bool },
    ShowTables,
    ShowColumns { index: Arc<Index> },
    Insert { index: Arc<Index>, rows: Vec<InsertRow> },
}

/// Resolves statements against the current schema.
pub struct Planner<'a> {
    holder: &'a Holder,
}

impl<'a> Planner<'a> {
    pub fn new(holder: &'a Holder) -> Self {
        Planner { holder }
    }

    pub fn plan(&self, statement: Statement) -> Result<Plan> {
        match statement {
            Statement::Select(select) => self.plan_select(select),
            Statement::CreateTable(create) => plan_create_table(create),
            Statement::DropTable { name, if_exists } => Ok(Plan::DropTable { name, if_exists }),
            Statement::ShowTables => Ok(Plan::ShowTables),
            Statement::ShowColumns { table } => Ok(Plan::ShowColumns { index: self.table(&table)? }),
            Statement::Insert(insert) => self.plan_insert(insert),
        }
    }

    fn table(&self, name: &str) -> Result<Arc<Index>> {
        self.holder.index(name).map_err(|err| match err.kind {
            ErrorKind::NotFound => Error::not_found(format!("table '{}' not found", name)),
            _ => err,
        })
    }

    fn plan_select(&self, select: Select) -> Result<Plan> {
        let Select { projections, from, selection, limit } = select;
        let aggregates = projections
            .iter()
            .filter(|p| matches!(p, Projection::Expr { expr, .. } if expr.contains_aggregate()))
            .count();

        let Some(table) = from else {
            if aggregates > 0 {
                return Err(Error::unsupported("aggregates require a FROM clause"));
            }
            let scope = |name: &str| -> Result<SqlType> {
                Err(Error::not_found(format!("column '{}' not found", name)))
            };
            if let Some(filter) = &selection {
                expect_bool(infer_type(filter, &scope)?)?;
            }
            let mut outputs = Vec::new();
            for projection in projections {
                let Projection::Expr { expr, alias } = projection else {
                    return Err(Error::schema("SELECT * requires a FROM clause"));
                };
                let sql_type = infer_type(&expr, &scope)?;
                outputs.push(Output { column: ColumnInfo::new(output_name(&expr, alias), sql_type), expr });
            }
            return Ok(Plan::Constant { outputs, filter: selection, limit });
        };

        let index = self.table(&table)?;
        let filter = selection.as_ref().map(|expr| filter_call(&index, expr)).transpose()?;
        if let Some(call) = &filter {
            debug!(table = %table, pql = %call, "translated WHERE clause");
        }

        if aggregates > 0 {
            if aggregates != projections.len() {
                return Err(Error::unsupported("aggregates cannot be mixed with plain columns without GROUP BY"));
            }
            let mut outputs = Vec::new();
            for projection in projections {
                let Projection::Expr { expr, alias } = projection else {
                    return Err(Error::unsupported("aggregates cannot be mixed with plain columns"));
                };
                outputs.push(aggregate_output(&index, expr, alias, filter.as_ref())?);
            }
            return Ok(Plan::Aggregate { index, outputs, limit });
        }

        let scope = |name: &str| column_type(&index, name);
        let mut outputs = Vec::new();
        for projection in projections {
            match projection {
                Projection::Wildcard => {
                    outputs.push(Output {
                        column: ColumnInfo::new(ID_COLUMN, id_type(&index)),
                        expr: Expr::Column(ID_COLUMN.to_string()),
                    });
                    for field in index.fields() {
                        outputs.push(Output {
                            column: ColumnInfo::new(field.name(), SqlType::of_field(field.options())),
                            expr: Expr::Column(field.name().to_string()),
                        });
                    }
                }
                Projection::Expr { expr, alias } => {
                    let sql_type = infer_type(&expr, &scope)?;
                    outputs.push(Output { column: ColumnInfo::new(output_name(&expr, alias), sql_type), expr });
                }
            }
        }
        Ok(Plan::Scan { index, outputs, filter, limit })
    }

    fn plan_insert(&self, insert: Insert) -> Result<Plan> {
        let Insert { table, columns, rows } = insert;
        let index = self.table(&table)?;

        let mut seen = BTreeSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(Error::invalid(format!("column '{}' listed twice", column)));
            }
        }
        let Some(id_position) = columns.iter().position(|c| c == ID_COLUMN) else {
            return Err(Error::invalid("INSERT requires an _id column"));
        };
        let mut fields = Vec::with_capacity(columns.len());
        for column in &columns {
            fields.push(if column == ID_COLUMN { None } else { Some(field_for(&index, column)?) });
        }

        let mut planned = Vec::with_capacity(rows.len());
        for tuple in rows {
            if tuple.len() != columns.len() {
                return Err(Error::invalid(format!(
                    "INSERT expects {} values per row, got {}",
                    columns.len(),
                    tuple.len()
                )));
            }
            let id = pql_value(constant(&tuple[id_position])?)?;
            if id == Value::Null {
                return Err(Error::invalid("_id cannot be NULL"));
            }

            let mut calls = Vec::new();
            for (expr, field) in tuple.iter().zip(&fields) {
                let Some(field) = field else {
                    continue;
                };
                let values = match pql_value(constant(expr)?)? {
                    Value::Null => continue,
                    Value::List(items) if is_set_field(field) => items,
                    Value::List(_) => {
                        return Err(Error::schema(format!("column '{}' does not accept a set value", field.name())));
                    }
                    value => vec![value],
                };
                for value in values {
                    calls.push(Call::new("Set").with_positional(id.clone()).with_keyed(field.name(), value));
                }
            }
            planned.push(InsertRow { id, calls });
        }
        Ok(Plan::Insert { index, rows: planned })
    }
}

fn plan_create_table(create: CreateTable) -> Result<Plan> {
    let CreateTable { name, if_not_exists, columns } = create;
    validate_name(&name)?;

    let mut keyed = None;
    let mut names = BTreeSet::new();
    let mut fields = Vec::new();
    for column in columns {
        if !names.insert(column.name.clone()) {
            return Err(Error::conflict(format!("column '{}' defined twice", column.name)));
        }
        if column.name == ID_COLUMN {
            if !column.constraints.is_empty() {
                return Err(Error::schema("_id does not take constraints"));
            }
            keyed = match SqlType::from_name(&column.type_name) {
                Some(SqlType::Id) => Some(false),
                Some(SqlType::String) => Some(true),
                _ => return Err(Error::schema(format!("_id must be ID or STRING, not {}", column.type_name))),
            };
            continue;
        }
        validate_name(&column.name)?;
        let request = column_request(&column)?;
        request.clone().validate()?;
        fields.push((column.name, request));
    }
    let Some(keyed) = keyed else {
        return Err(Error::schema("CREATE TABLE requires an _id column"));
    };
    Ok(Plan::CreateTable { name, if_not_exists, keyed, fields })
}

/// Field options for one column definition.
fn column_request(column: &ColumnDef) -> Result<FieldOptionsRequest> {
    let sql_type = SqlType::from_name(&column.type_name).ok_or_else(|| {
        Error::unsupported(format!("column type {} is not supported", column.type_name.to_ascii_uppercase()))
    })?;
    let mut request = match sql_type {
        SqlType::Int => FieldOptionsRequest::of_type(FieldType::Int),
        SqlType::Bool => FieldOptionsRequest::of_type(FieldType::Bool),
        SqlType::Id => FieldOptionsRequest::of_type(FieldType::Mutex),
        SqlType::String => FieldOptionsRequest::of_type(FieldType::Mutex).with_keys(true),
        SqlType::IdSet => FieldOptionsRequest::of_type(FieldType::Set),
        SqlType::StringSet => FieldOptionsRequest::of_type(FieldType::Set).with_keys(true),
        SqlType::IdSetQuantum => FieldOptionsRequest::of_type(FieldType::Time),
        SqlType::StringSetQuantum => FieldOptionsRequest::of_type(FieldType::Time).with_keys(true),
        other => return Err(Error::unsupported(format!("column type {} is not supported", other))),
    };
    for constraint in &column.constraints {
        match constraint {
            ColumnConstraint::Min(min) => request.min = Some(*min),
            ColumnConstraint::Max(max) => request.max = Some(*max),
            ColumnConstraint::CacheSize(size) => request.cache_size = Some(*size),
            ColumnConstraint::TimeQuantum(quantum) => request.time_quantum = Some(quantum.clone()),
        }
    }
    Ok(request)
}

fn output_name(expr: &Expr, alias: Option<String>) -> String {
    match (alias, expr) {
        (Some(alias), _) => alias,
        (None, Expr::Column(name)) => name.clone(),
        (None, _) => String::new(),
    }
}

fn id_type(index: &Index) -> SqlType {
    if index.column_keys().is_some() { SqlType::String } else { SqlType::Id }
}

fn field_for(index: &Index, name: &str) -> Result<Arc<Field>> {
    index.field(name).map_err(|err| match err.kind {
        ErrorKind::NotFound => Error::not_found(format!("column '{}' not found in table '{}'", name, index.name())),
        _ => err,
    })
}

fn column_type(index: &Index, name: &str) -> Result<SqlType> {
    if name == ID_COLUMN {
        return Ok(id_type(index));
    }
    Ok(SqlType::of_field(field_for(index, name)?.options()))
}

fn is_set_field(field: &Field) -> bool {
    matches!(field.field_type(), FieldType::Set | FieldType::Time)
}

/// Evaluates an expression that must not reference any column.
fn constant(expr: &Expr) -> Result<SqlValue> {
    if expr.references_columns() || expr.contains_aggregate() {
        return Err(Error::unsupported(format!("'{}' is not a constant", expr)));
    }
    evaluate(expr, &|name: &str| -> Result<SqlValue> {
        Err(Error::not_found(format!("column '{}' not found", name)))
    })
}

fn pql_value(value: SqlValue) -> Result<Value> {
    Ok(match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(b),
        SqlValue::Int(n) => Value::Int(n),
        SqlValue::Decimal(d) => Value::Float(d),
        SqlValue::String(s) => Value::Str(s),
        SqlValue::IdSet(ids) => Value::List(
            ids.into_iter()
                .map(|id| {
                    i64::try_from(id)
                        .map(Value::Int)
                        .map_err(|_| Error::range(format!("id {} is out of range", id)))
                })
                .collect::<Result<_>>()?,
        ),
        SqlValue::StringSet(keys) => Value::List(keys.into_iter().map(Value::Str).collect()),
    })
}

fn cond_op(op: BinaryOp) -> Option<CondOp> {
    match op {
        BinaryOp::Eq => Some(CondOp::Eq),
        BinaryOp::NotEq => Some(CondOp::Neq),
        BinaryOp::Lt => Some(CondOp::Lt),
        BinaryOp::Le => Some(CondOp::Lte),
        BinaryOp::Gt => Some(CondOp::Gt),
        BinaryOp::Ge => Some(CondOp::Gte),
        _ => None,
    }
}

fn row_keyed(field: &str, value: Value) -> Call {
    Call::new("Row").with_keyed(field, value)
}

fn row_condition(field: &str, op: CondOp, value: Value) -> Call {
    Call::new("Row").with_arg(Arg::Condition { field: field.to_string(), op, value })
}

fn negate(call: Call) -> Call {
    Call::new("Not").with_child(call)
}

/// Records where the column holds a value.
fn present(field: &str) -> Call {
    row_condition(field, CondOp::Neq, Value::Null)
}

/// Records with a value in the column that do not match `call`.
fn present_except(field: &str, call: Call) -> Call {
    Call::new("Difference").with_child(present(field)).with_child(call)
}

fn const_row(values: Vec<Value>) -> Call {
    Call::new("ConstRow").with_keyed("columns", Value::List(values))
}

/// Records named by `_id`, restricted to those that exist.
fn id_match(values: Vec<Value>) -> Call {
    Call::new("Intersect").with_child(Call::new("All")).with_child(const_row(values))
}

fn nothing() -> Call {
    const_row(Vec::new())
}

/// Flattens chains of the same logical operator: `a AND b AND c` becomes
/// one `Intersect` with three children.
fn collect_chain<'e>(expr: &'e Expr, op: BinaryOp, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Binary { left, op: inner, right } if *inner == op => {
            collect_chain(left, op, out);
            collect_chain(right, op, out);
        }
        other => out.push(other),
    }
}

/// Translates a `WHERE` predicate into a PQL row call selecting the records
/// for which it is TRUE.
pub fn filter_call(index: &Index, expr: &Expr) -> Result<Call> {
    match expr {
        Expr::Binary { op: op @ (BinaryOp::And | BinaryOp::Or), .. } => {
            let name = if *op == BinaryOp::And { "Intersect" } else { "Union" };
            chain_call(index, expr, *op, name, filter_call)
        }
        Expr::Unary { op: UnaryOp::Not, expr } => false_call(index, expr),
        Expr::Binary { left, op, right } if op.is_comparison() => comparison(index, left, *op, right),
        Expr::Between { expr, low, high, negated } => between(index, expr, low, high, *negated),
        Expr::InList { expr, list, negated } => in_list(index, expr, list, *negated),
        Expr::IsNull { expr, negated } => is_null(index, expr, *negated),
        Expr::Column(name) if name != ID_COLUMN => {
            Ok(row_keyed(bool_column(index, name)?.name(), Value::Bool(true)))
        }
        Expr::Literal(Literal::Bool(true)) => Ok(Call::new("All")),
        Expr::Literal(Literal::Bool(false) | Literal::Null) => Ok(nothing()),
        other => Err(Error::unsupported(format!("WHERE condition '{}' is not supported", other))),
    }
}

/// The records for which `expr` is FALSE. A NULL operand makes a predicate
/// unknown, so those records satisfy neither `expr` nor `NOT expr`.
fn false_call(index: &Index, expr: &Expr) -> Result<Call> {
    match expr {
        Expr::Binary { op: op @ (BinaryOp::And | BinaryOp::Or), .. } => {
            let name = if *op == BinaryOp::And { "Union" } else { "Intersect" };
            chain_call(index, expr, *op, name, false_call)
        }
        Expr::Unary { op: UnaryOp::Not, expr } => filter_call(index, expr),
        Expr::Binary { left, op, right } if op.is_comparison() => match op.negated() {
            Some(op) => comparison(index, left, op, right),
            None => Err(Error::internal("comparison without a negation")),
        },
        Expr::Between { expr, low, high, negated } => between(index, expr, low, high, !*negated),
        Expr::InList { expr, list, negated } => in_list(index, expr, list, !*negated),
        Expr::IsNull { expr, negated } => is_null(index, expr, !*negated),
        Expr::Column(name) if name != ID_COLUMN => {
            Ok(row_keyed(bool_column(index, name)?.name(), Value::Bool(false)))
        }
        Expr::Literal(Literal::Bool(false)) => Ok(Call::new("All")),
        Expr::Literal(Literal::Bool(true) | Literal::Null) => Ok(nothing()),
        other => Err(Error::unsupported(format!("WHERE condition 'NOT {}' is not supported", other))),
    }
}

fn chain_call(
    index: &Index,
    expr: &Expr,
    op: BinaryOp,
    name: &str,
    translate: fn(&Index, &Expr) -> Result<Call>,
) -> Result<Call> {
    let mut operands = Vec::new();
    collect_chain(expr, op, &mut operands);
    let mut call = Call::new(name);
    for operand in operands {
        call = call.with_child(translate(index, operand)?);
    }
    Ok(call)
}

fn between(index: &Index, expr: &Expr, low: &Expr, high: &Expr, negated: bool) -> Result<Call> {
    let column = predicate_column(expr)?;
    let field = int_column(index, column, "BETWEEN")?;
    let low = pql_value(constant(low)?)?;
    let high = pql_value(constant(high)?)?;
    if negated {
        return Ok(Call::new("Union")
            .with_child(row_condition(field.name(), CondOp::Lt, low))
            .with_child(row_condition(field.name(), CondOp::Gt, high)));
    }
    Ok(Call::new("Row").with_arg(Arg::Between {
        low,
        low_op: CondOp::Lte,
        field: field.name().to_string(),
        high_op: CondOp::Lte,
        high,
    }))
}

fn in_list(index: &Index, expr: &Expr, list: &[Expr], negated: bool) -> Result<Call> {
    let column = predicate_column(expr)?;
    let mut values = Vec::with_capacity(list.len());
    for item in list {
        values.push(pql_value(constant(item)?)?);
    }
    if column == ID_COLUMN {
        let call = id_match(values.into_iter().filter(|v| *v != Value::Null).collect());
        return Ok(if negated { negate(call) } else { call });
    }
    let field = field_for(index, column)?;
    let mut union = Call::new("Union");
    for value in values {
        union = union.with_child(equality(&field, value)?);
    }
    Ok(if negated { present_except(field.name(), union) } else { union })
}

fn is_null(index: &Index, expr: &Expr, negated: bool) -> Result<Call> {
    let column = predicate_column(expr)?;
    if column == ID_COLUMN {
        return Ok(if negated { Call::new("All") } else { nothing() });
    }
    let field = int_column(index, column, "IS NULL")?;
    let op = if negated { CondOp::Neq } else { CondOp::Eq };
    Ok(row_condition(field.name(), op, Value::Null))
}

fn bool_column(index: &Index, name: &str) -> Result<Arc<Field>> {
    let field = field_for(index, name)?;
    if field.field_type() != FieldType::Bool {
        return Err(Error::schema(format!("column '{}' is not BOOL and cannot be a predicate", name)));
    }
    Ok(field)
}

fn predicate_column(expr: &Expr) -> Result<&str> {
    match expr {
        Expr::Column(name) => Ok(name),
        other => Err(Error::unsupported(format!("expected a column reference, found '{}'", other))),
    }
}

fn int_column(index: &Index, name: &str, construct: &str) -> Result<Arc<Field>> {
    if name == ID_COLUMN {
        return Err(Error::unsupported(format!("{} is not supported on _id", construct)));
    }
    let field = field_for(index, name)?;
    if field.field_type() != FieldType::Int {
        return Err(Error::unsupported(format!(
            "{} is only supported on INT columns, '{}' is {}",
            construct,
            name,
            SqlType::of_field(field.options())
        )));
    }
    Ok(field)
}

fn comparison(index: &Index, left: &Expr, op: BinaryOp, right: &Expr) -> Result<Call> {
    let (column, op, value) = match (left, right) {
        (Expr::Column(column), other) => (column, op, constant(other)?),
        (other, Expr::Column(column)) => (column, op.flipped(), constant(other)?),
        _ => {
            return Err(Error::unsupported(format!(
                "comparison '{} {} {}' must reference a column",
                left,
                op.symbol(),
                right
            )));
        }
    };
    let value = pql_value(value)?;
    // Comparing with NULL is never true.
    if value == Value::Null {
        return Ok(nothing());
    }

    if column == ID_COLUMN {
        return match op {
            BinaryOp::Eq => Ok(id_match(vec![value])),
            BinaryOp::NotEq => Ok(negate(const_row(vec![value]))),
            _ => Err(Error::unsupported(format!("operator {} is not supported on _id", op.symbol()))),
        };
    }

    let field = field_for(index, column)?;
    match (field.field_type(), op) {
        (FieldType::Int, _) => {
            let op = cond_op(op).ok_or_else(|| Error::internal("comparison without a condition operator"))?;
            Ok(row_condition(field.name(), op, value))
        }
        (_, BinaryOp::Eq) => equality(&field, value),
        (FieldType::Bool, BinaryOp::NotEq) => match value {
            Value::Bool(b) => Ok(row_keyed(field.name(), Value::Bool(!b))),
            other => Err(Error::schema(format!("BOOL column '{}' cannot be compared with {}", field.name(), other))),
        },
        (_, BinaryOp::NotEq) => Ok(present_except(field.name(), equality(&field, value)?)),
        _ => Err(Error::unsupported(format!(
            "operator {} is not supported on {} column '{}'",
            op.symbol(),
            SqlType::of_field(field.options()),
            field.name()
        ))),
    }
}

/// `column = value`: a range condition on int fields, a row read otherwise.
fn equality(field: &Field, value: Value) -> Result<Call> {
    if value == Value::Null {
        return Ok(nothing());
    }
    Ok(match field.field_type() {
        FieldType::Int => row_condition(field.name(), CondOp::Eq, value),
        _ => row_keyed(field.name(), value),
    })
}

fn aggregate_output(index: &Index, expr: Expr, alias: Option<String>, filter: Option<&Call>) -> Result<AggregateOutput> {
    let name = output_name(&expr, alias);
    let Expr::Aggregate { func, arg } = expr else {
        return Err(Error::unsupported(format!("aggregate inside expression '{}' is not supported", expr)));
    };
    let column = match arg.as_deref() {
        None => None,
        Some(Expr::Column(column)) => Some(column.as_str()),
        Some(other) => {
            return Err(Error::unsupported(format!("{} over expression '{}' is not supported", func.name(), other)));
        }
    };
    let all = || filter.cloned().unwrap_or_else(|| Call::new("All"));

    let call = match (func, column) {
        (AggregateFunc::Count, None) | (AggregateFunc::Count, Some(ID_COLUMN)) => Call::new("Count").with_child(all()),
        (AggregateFunc::Count, Some(column)) => {
            let field = int_column(index, column, "COUNT(column)")?;
            Call::new("Count").with_child(Call::new("Intersect").with_child(all()).with_child(present(field.name())))
        }
        (_, None) => return Err(Error::invalid(format!("{}(*) is not valid", func.name()))),
        (_, Some(column)) => {
            let field = field_for(index, column)?;
            if field.field_type() != FieldType::Int {
                return Err(Error::schema(format!(
                    "{} requires an INT column, '{}' is {}",
                    func.name(),
                    column,
                    SqlType::of_field(field.options())
                )));
            }
            let pql_name = match func {
                AggregateFunc::Sum => "Sum",
                AggregateFunc::Min => "Min",
                _ => "Max",
            };
            let mut call = Call::new(pql_name).with_keyed("field", Value::Ident(field.name().to_string()));
            if let Some(filter) = filter {
                call = call.with_child(filter.clone());
            }
            call
        }
    };
    Ok(AggregateOutput { column: ColumnInfo::new(name, SqlType::Int), func, call })
}

fn expect_bool(sql_type: SqlType) -> Result<()> {
    match sql_type {
        SqlType::Bool | SqlType::Void => Ok(()),
        other => Err(Error::schema(format!("expected a BOOL condition, found {}", other))),
    }
}

fn numeric_result(left: SqlType, right: SqlType) -> Option<SqlType> {
    let normalize = |t: SqlType| if t == SqlType::Id { SqlType::Int } else { t };
    match (normalize(left), normalize(right)) {
        (SqlType::Void, SqlType::Void) => Some(SqlType::Void),
        (SqlType::Int, SqlType::Int) | (SqlType::Void, SqlType::Int) | (SqlType::Int, SqlType::Void) => {
            Some(SqlType::Int)
        }
        (SqlType::Decimal, SqlType::Int | SqlType::Decimal | SqlType::Void)
        | (SqlType::Int | SqlType::Void, SqlType::Decimal) => Some(SqlType::Decimal),
        _ => None,
    }
}

fn comparable(left: SqlType, right: SqlType) -> bool {
    left == SqlType::Void
        || right == SqlType::Void
        || (left.is_numeric() && right.is_numeric())
        || left == right
}

/// Static type of an expression; `scope` resolves column names.
pub fn infer_type(expr: &Expr, scope: &dyn Fn(&str) -> Result<SqlType>) -> Result<SqlType> {
    match expr {
        Expr::Literal(Literal::Null) => Ok(SqlType::Void),
        Expr::Literal(Literal::Bool(_)) => Ok(SqlType::Bool),
        Expr::Literal(Literal::Int(_)) => Ok(SqlType::Int),
        Expr::Literal(Literal::Decimal(_)) => Ok(SqlType::Decimal),
        Expr::Literal(Literal::Str(_)) => Ok(SqlType::String),
        Expr::Column(name) => scope(name),
        Expr::List(items) => {
            let mut element = None;
            for item in items {
                let item_type = infer_type(item, scope)?;
                match element {
                    None => element = Some(item_type),
                    Some(seen) if seen == item_type => {}
                    Some(seen) => {
                        return Err(Error::schema(format!("set mixes {} and {} values", seen, item_type)));
                    }
                }
            }
            match element {
                None | Some(SqlType::Int) => Ok(SqlType::IdSet),
                Some(SqlType::String) => Ok(SqlType::StringSet),
                Some(other) => Err(Error::schema(format!("sets cannot hold {} values", other))),
            }
        }
        Expr::Unary { op: UnaryOp::Neg, expr } => {
            let inner = infer_type(expr, scope)?;
            numeric_result(inner, SqlType::Void)
                .ok_or_else(|| Error::schema(format!("unary minus is not defined for {}", inner)))
        }
        Expr::Unary { op: UnaryOp::Not, expr } => {
            expect_bool(infer_type(expr, scope)?)?;
            Ok(SqlType::Bool)
        }
        Expr::Binary { left, op, right } => {
            let lt = infer_type(left, scope)?;
            let rt = infer_type(right, scope)?;
            let mismatch = || {
                Error::schema(format!("operator {} is not defined for {} and {}", op.symbol(), lt, rt))
            };
            match op {
                BinaryOp::And | BinaryOp::Or => {
                    expect_bool(lt)?;
                    expect_bool(rt)?;
                    Ok(SqlType::Bool)
                }
                BinaryOp::Concat => match (lt, rt) {
                    (SqlType::String | SqlType::Void, SqlType::String | SqlType::Void) => Ok(SqlType::String),
                    _ => Err(mismatch()),
                },
                op if op.is_arithmetic() => numeric_result(lt, rt).ok_or_else(mismatch),
                _ if comparable(lt, rt) => Ok(SqlType::Bool),
                _ => Err(mismatch()),
            }
        }
        Expr::Between { expr, low, high, .. } => {
            let target = infer_type(expr, scope)?;
            for bound in [low, high] {
                let bound_type = infer_type(bound, scope)?;
                if !comparable(target, bound_type) {
                    return Err(Error::schema(format!("cannot compare {} with {}", target, bound_type)));
                }
            }
            Ok(SqlType::Bool)
        }
        Expr::InList { expr, list, .. } => {
            let target = infer_type(expr, scope)?;
            for item in list {
                let item_type = infer_type(item, scope)?;
                if !comparable(target, item_type) {
                    return Err(Error::schema(format!("cannot compare {} with {}", target, item_type)));
                }
            }
            Ok(SqlType::Bool)
        }
        Expr::IsNull { expr, .. } => {
            infer_type(expr, scope)?;
            Ok(SqlType::Bool)
        }
        Expr::Aggregate { .. } => Ok(SqlType::Int),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::index::IndexOptionsRequest;
    use crate::sql::parser::parse;

    fn holder() -> Holder {
        let holder = Holder::new(4);
        let index = holder.create_index("t", IndexOptionsRequest::default()).unwrap();
        index
            .create_field("age", FieldOptionsRequest::of_type(FieldType::Int).with_bounds(0, 150))
            .unwrap();
        index.create_field("tags", FieldOptionsRequest::default()).unwrap();
        index
            .create_field("color", FieldOptionsRequest::of_type(FieldType::Mutex).with_keys(true))
            .unwrap();
        index.create_field("active", FieldOptionsRequest::of_type(FieldType::Bool)).unwrap();
        holder
    }

    fn where_pql(sql: &str) -> String {
        let holder = holder();
        match Planner::new(&holder).plan(parse(sql).unwrap()).unwrap() {
            Plan::Scan { filter: Some(call), .. } => call.to_string(),
            _ => panic!("expected a filtered scan"),
        }
    }

    fn plan_err(sql: &str) -> Error {
        let holder = holder();
        match Planner::new(&holder).plan(parse(sql).unwrap()) {
            Ok(_) => panic!("expected planning to fail for {}", sql),
            Err(err) => err,
        }
    }

    #[test]
    fn where_translates_to_pql() {
        assert_eq!(where_pql("SELECT _id FROM t WHERE age > 30"), "Row(age > 30)");
        assert_eq!(where_pql("SELECT _id FROM t WHERE 30 <= age"), "Row(age >= 30)");
        assert_eq!(where_pql("SELECT _id FROM t WHERE color = 'red'"), "Row(color=\"red\")");
        assert_eq!(
            where_pql("SELECT _id FROM t WHERE tags = 1 AND tags = 2 AND active"),
            "Intersect(Row(tags=1), Row(tags=2), Row(active=true))"
        );
        assert_eq!(where_pql("SELECT _id FROM t WHERE _id IN (1, 2)"), "Intersect(All(), ConstRow(columns=[1,2]))");
        assert_eq!(where_pql("SELECT _id FROM t WHERE age BETWEEN 1 AND 5"), "Row(1 <= age <= 5)");
        assert_eq!(where_pql("SELECT _id FROM t WHERE NOT tags = 1"), "Difference(Row(tags != null), Row(tags=1))");
        assert_eq!(where_pql("SELECT _id FROM t WHERE NOT age > 6"), "Row(age <= 6)");
        assert_eq!(
            where_pql("SELECT _id FROM t WHERE NOT (age = 5 OR active)"),
            "Intersect(Row(age != 5), Row(active=false))"
        );
        assert_eq!(where_pql("SELECT _id FROM t WHERE NOT _id = 3"), "Not(ConstRow(columns=[3]))");
        assert_eq!(where_pql("SELECT _id FROM t WHERE active != true"), "Row(active=false)");
    }

    #[test]
    fn select_star_lists_columns_in_declaration_order() {
        let holder = holder();
        let Plan::Scan { outputs, .. } = Planner::new(&holder).plan(parse("SELECT * FROM t").unwrap()).unwrap() else {
            panic!("expected scan");
        };
        let names: Vec<&str> = outputs.iter().map(|o| o.column.name.as_str()).collect();
        assert_eq!(names, vec!["_id", "age", "tags", "color", "active"]);
        let types: Vec<SqlType> = outputs.iter().map(|o| o.column.sql_type).collect();
        assert_eq!(types, vec![SqlType::Id, SqlType::Int, SqlType::IdSet, SqlType::String, SqlType::Bool]);
    }

    #[test]
    fn schema_and_support_errors() {
        assert_eq!(plan_err("SELECT nope FROM t").kind, ErrorKind::NotFound);
        assert_eq!(plan_err("SELECT * FROM missing").kind, ErrorKind::NotFound);
        assert_eq!(plan_err("SELECT COUNT(*), age FROM t").kind, ErrorKind::Unsupported);
        assert_eq!(plan_err("SELECT _id FROM t WHERE color > 'a'").kind, ErrorKind::Unsupported);
        assert_eq!(plan_err("SELECT _id FROM t WHERE age + 1 > 3").kind, ErrorKind::Unsupported);
        assert_eq!(plan_err("SELECT SUM(tags) FROM t").kind, ErrorKind::Schema);
        assert_eq!(plan_err("SELECT 'a' + 1").kind, ErrorKind::Schema);
    }

    #[test]
    fn create_table_maps_column_types() {
        let holder = holder();
        let sql = "CREATE TABLE u (_id STRING, n INT MIN 0 MAX 10, s STRINGSET, q IDSETQ TIMEQUANTUM 'YM', b BOOL)";
        let Plan::CreateTable { keyed, fields, .. } = Planner::new(&holder).plan(parse(sql).unwrap()).unwrap() else {
            panic!("expected create table");
        };
        assert!(keyed);
        let types: Vec<(String, Option<FieldType>)> =
            fields.iter().map(|(name, request)| (name.clone(), request.field_type)).collect();
        assert_eq!(
            types,
            vec![
                ("n".to_string(), Some(FieldType::Int)),
                ("s".to_string(), Some(FieldType::Set)),
                ("q".to_string(), Some(FieldType::Time)),
                ("b".to_string(), Some(FieldType::Bool)),
            ]
        );
        assert_eq!(fields[0].1.min, Some(0));
        assert_eq!(fields[1].1.keys, Some(true));
    }

    #[test]
    fn create_table_rejections() {
        assert_eq!(plan_err("CREATE TABLE u (_id ID, d DECIMAL(2))").kind, ErrorKind::Unsupported);
        assert_eq!(plan_err("CREATE TABLE u (_id ID, ts TIMESTAMP)").kind, ErrorKind::Unsupported);
        assert_eq!(plan_err("CREATE TABLE u (n INT)").kind, ErrorKind::Schema);
        assert_eq!(plan_err("CREATE TABLE u (_id ID, n INT MIN 5 MAX 1)").kind, ErrorKind::Schema);
        assert_eq!(plan_err("CREATE TABLE u (_id ID, q IDSETQ)").kind, ErrorKind::Schema);
        assert_eq!(plan_err("CREATE TABLE u (_id ID, n INT, n ID)").kind, ErrorKind::Conflict);
    }

    #[test]
    fn insert_expands_sets() {
        let holder = holder();
        let sql = "INSERT INTO t (_id, age, tags) VALUES (7, 30, [1, 2]), (8, NULL, [])";
        let Plan::Insert { rows, .. } = Planner::new(&holder).plan(parse(sql).unwrap()).unwrap() else {
            panic!("expected insert");
        };
        let calls: Vec<String> = rows[0].calls.iter().map(Call::to_string).collect();
        assert_eq!(calls, vec!["Set(7, age=30)", "Set(7, tags=1)", "Set(7, tags=2)"]);
        assert!(rows[1].calls.is_empty());
        assert_eq!(plan_err("INSERT INTO t (age) VALUES (1)").kind, ErrorKind::InvalidInput);
        assert_eq!(plan_err("INSERT INTO t (_id, age) VALUES (1)").kind, ErrorKind::InvalidInput);
        assert_eq!(plan_err("INSERT INTO t (_id, age) VALUES (1, [2])").kind, ErrorKind::Schema);
    }
}
