use sqlparser::ast::{self, Expr, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Column order for `INSERT INTO bookings` without an explicit column list.
const BOOKING_COLUMNS: [&str; 6] = ["customer_name", "start", "end", "party_size", "contact", "notes"];

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    /// Windowed when both `start` and `end` are given, legacy otherwise.
    InsertBooking(BookingIntake),
    SelectBookings {
        status: Option<BookingStatus>,
        id: Option<Ulid>,
    },
    Finalize,
    SelectStaffing {
        min_staff: usize,
        start: Option<Ms>,
        end: Option<Ms>,
    },
    InsertEmployee {
        name: String,
    },
    SelectEmployees,
    InsertShift {
        employee_id: Ulid,
        start: Ms,
        end: Ms,
    },
    SelectShifts,
    SetStandby {
        employee_id: Ulid,
        standby: bool,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let columns: Vec<String> = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();

    match table.as_str() {
        "bookings" => parse_booking_values(&columns, &values).map(Command::InsertBooking),
        "employees" => {
            if values.is_empty() {
                return Err(SqlError::WrongArity("employees", 1, 0));
            }
            Ok(Command::InsertEmployee {
                name: parse_string(&values[0])?,
            })
        }
        "shifts" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("shifts", 3, values.len()));
            }
            Ok(Command::InsertShift {
                employee_id: parse_ulid(&values[0])?,
                start: parse_i64(&values[1])?,
                end: parse_i64(&values[2])?,
            })
        }
        "standby" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("standby", 2, values.len()));
            }
            Ok(Command::SetStandby {
                employee_id: parse_ulid(&values[0])?,
                standby: parse_bool(&values[1])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Map VALUES onto booking fields, by the column list if one was given.
fn parse_booking_values(columns: &[String], values: &[Expr]) -> Result<BookingIntake, SqlError> {
    if values.is_empty() {
        return Err(SqlError::WrongArity("bookings", 1, 0));
    }
    let names: Vec<&str> = if columns.is_empty() {
        BOOKING_COLUMNS.iter().take(values.len()).copied().collect()
    } else {
        if columns.len() != values.len() {
            return Err(SqlError::WrongArity("bookings", columns.len(), values.len()));
        }
        columns.iter().map(String::as_str).collect()
    };
    if values.len() > BOOKING_COLUMNS.len() {
        return Err(SqlError::WrongArity("bookings", BOOKING_COLUMNS.len(), values.len()));
    }

    let mut intake = BookingIntake::default();
    let mut has_name = false;
    for (name, expr) in names.iter().zip(values) {
        match *name {
            "customer_name" => {
                intake.customer_name = parse_string(expr)?;
                has_name = true;
            }
            "start" => intake.start = parse_i64_or_null(expr)?,
            "end" => intake.end = parse_i64_or_null(expr)?,
            "party_size" => {
                intake.party_size = parse_i64_or_null(expr)?
                    .map(|v| {
                        u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
                    })
                    .transpose()?;
            }
            "contact" => intake.contact = parse_string_or_null(expr)?,
            "notes" => intake.notes = parse_string_or_null(expr)?,
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }
    if !has_name {
        return Err(SqlError::MissingColumn("customer_name"));
    }
    Ok(intake)
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        extract_filters(selection, &mut filters)?;
    }

    match table.as_str() {
        "bookings" => {
            let status = match filters.status {
                Some(s) => Some(
                    BookingStatus::parse(&s)
                        .ok_or_else(|| SqlError::Parse(format!("unknown status: {s}")))?,
                ),
                None => None,
            };
            Ok(Command::SelectBookings {
                status,
                id: filters.id,
            })
        }
        "finalize" => Ok(Command::Finalize),
        "staffing" => {
            let min_staff = filters.min_staff.ok_or(SqlError::MissingFilter("min_staff"))?;
            let min_staff = usize::try_from(min_staff)
                .map_err(|_| SqlError::Parse(format!("bad min_staff: {min_staff}")))?;
            Ok(Command::SelectStaffing {
                min_staff,
                start: filters.start,
                end: filters.end,
            })
        }
        "employees" => Ok(Command::SelectEmployees),
        "shifts" => Ok(Command::SelectShifts),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

#[derive(Default)]
struct Filters {
    id: Option<Ulid>,
    status: Option<String>,
    min_staff: Option<i64>,
    start: Option<Ms>,
    end: Option<Ms>,
}

fn extract_filters(expr: &Expr, filters: &mut Filters) -> Result<(), SqlError> {
    if let Expr::Nested(inner) = expr {
        return extract_filters(inner, filters);
    }
    let Expr::BinaryOp { left, op, right } = expr else {
        return Ok(());
    };
    let col = expr_column_name(left);
    match op {
        ast::BinaryOperator::And => {
            extract_filters(left, filters)?;
            extract_filters(right, filters)?;
        }
        ast::BinaryOperator::Eq => match col.as_deref() {
            Some("id") => filters.id = Some(parse_ulid(right)?),
            Some("status") => filters.status = Some(parse_string(right)?),
            Some("min_staff") => filters.min_staff = Some(parse_i64(right)?),
            _ => {}
        },
        ast::BinaryOperator::GtEq if col.as_deref() == Some("start") => {
            filters.start = Some(parse_i64(right)?);
        }
        ast::BinaryOperator::LtEq if col.as_deref() == Some("end") => {
            filters.end = Some(parse_i64(right)?);
        }
        _ => {}
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            rows => Err(SqlError::Unsupported(format!(
                "multi-row INSERT ({} rows); send one row per statement",
                rows.len()
            ))),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected ULID string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64_or_null(expr: &Expr) -> Result<Option<i64>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => Ok(Some(parse_i64(expr)?)),
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => Ok(Some(parse_string(expr)?)),
    }
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
