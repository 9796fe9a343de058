use std::collections::HashMap;

use chrono::NaiveDate;
use sqlparser::ast::{
    self, AssignmentTarget, BinaryOperator, Expr, FromTable, ObjectNamePart, SetExpr, Statement,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::limits::MAX_SQL_LEN;
use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertBooking {
        id: Ulid,
        service: ServiceKind,
        date: NaiveDate,
        slot_label: String,
        tier_or_package: String,
        label: Option<String>,
    },
    UpdateBookingStatus {
        id: Ulid,
        status: BookingStatus,
    },
    DeleteBooking {
        id: Ulid,
    },
    SelectBookings {
        service: ServiceKind,
        date: NaiveDate,
    },
    SelectUnavailableSlots {
        service: ServiceKind,
        date: NaiveDate,
    },
    SelectSlots {
        service: ServiceKind,
        date: NaiveDate,
    },
    SelectAvailability {
        service: ServiceKind,
        date: NaiveDate,
        slot_label: String,
        length: SessionLength,
    },
    SelectFullyBookedDates {
        service: ServiceKind,
        from: NaiveDate,
        to: NaiveDate,
    },
}

/// Column order assumed by an INSERT without a column list.
const BOOKING_COLUMNS: [&str; 6] = ["id", "service", "date", "slot", "tier", "label"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    if sql.len() > MAX_SQL_LEN {
        return Err(SqlError::TooLong);
    }
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Table a SELECT reads from, for describing result columns before binding.
/// Placeholders such as `$1` parse fine here.
pub fn select_table(sql: &str) -> Option<String> {
    let stmts = Parser::parse_sql(&PostgreSqlDialect {}, sql).ok()?;
    let Statement::Query(query) = stmts.first()? else {
        return None;
    };
    let SetExpr::Select(select) = query.body.as_ref() else {
        return None;
    };
    table_factor_name(&select.from.first()?.relation).ok()
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    if table != "bookings" {
        return Err(SqlError::UnknownTable(table));
    }
    let values = extract_insert_row(insert)?;

    let columns: Vec<String> = if insert.columns.is_empty() {
        BOOKING_COLUMNS[..values.len().min(BOOKING_COLUMNS.len())]
            .iter()
            .map(|c| c.to_string())
            .collect()
    } else {
        insert
            .columns
            .iter()
            .map(|c| canonical_column(&c.value.to_lowercase()))
            .collect()
    };
    if columns.len() != values.len() {
        return Err(SqlError::WrongArity("bookings", columns.len(), values.len()));
    }

    let mut row: HashMap<String, Option<String>> = HashMap::new();
    for (col, expr) in columns.into_iter().zip(values) {
        if !BOOKING_COLUMNS.contains(&col.as_str()) {
            return Err(SqlError::UnknownColumn(col));
        }
        row.insert(col, value_text(expr)?);
    }
    let required = |col: &'static str| {
        row.get(col)
            .cloned()
            .flatten()
            .ok_or(SqlError::MissingColumn(col))
    };

    Ok(Command::InsertBooking {
        id: parse_ulid(&required("id")?)?,
        service: parse_service(&required("service")?)?,
        date: parse_date(&required("date")?)?,
        slot_label: required("slot")?,
        tier_or_package: required("tier")?,
        label: row.get("label").cloned().flatten(),
    })
}

/// Accept the record field names as column aliases.
fn canonical_column(col: &str) -> String {
    match col {
        "slot_label" => "slot",
        "tier_or_package" | "package" => "tier",
        other => other,
    }
    .to_string()
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let name = table_factor_name(&table.relation)?;
    if name != "bookings" {
        return Err(SqlError::UnknownTable(name));
    }
    let id = extract_where_id(selection)?;

    let mut status = None;
    for assignment in assignments {
        let col = match &assignment.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        };
        match col.as_deref() {
            Some("status") => {
                let text = value_text(&assignment.value)?.ok_or(SqlError::MissingColumn("status"))?;
                status = Some(
                    BookingStatus::parse(&text)
                        .ok_or_else(|| SqlError::Parse(format!("unknown status: {text}")))?,
                );
            }
            Some(other) => {
                return Err(SqlError::Unsupported(format!("cannot update column {other}")));
            }
            None => return Err(SqlError::Unsupported("tuple assignment".into())),
        }
    }
    Ok(Command::UpdateBookingStatus {
        id,
        status: status.ok_or(SqlError::MissingColumn("status"))?,
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "bookings" {
        return Err(SqlError::UnknownTable(table));
    }
    Ok(Command::DeleteBooking {
        id: extract_where_id(&delete.selection)?,
    })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        filters.collect(selection)?;
    }
    let service = parse_service(filters.eq("service")?)?;

    match table.as_str() {
        "bookings" => Ok(Command::SelectBookings {
            service,
            date: parse_date(filters.eq("date")?)?,
        }),
        "unavailable_slots" => Ok(Command::SelectUnavailableSlots {
            service,
            date: parse_date(filters.eq("date")?)?,
        }),
        "slots" => Ok(Command::SelectSlots {
            service,
            date: parse_date(filters.eq("date")?)?,
        }),
        "availability" => {
            let length = match (filters.eq.get("tier"), filters.eq.get("duration")) {
                (Some(tier), _) => SessionLength::Tier(tier.clone()),
                (None, Some(minutes)) => SessionLength::Minutes(
                    minutes
                        .parse()
                        .map_err(|_| SqlError::Parse(format!("bad duration: {minutes}")))?,
                ),
                (None, None) => return Err(SqlError::MissingFilter("tier or duration")),
            };
            Ok(Command::SelectAvailability {
                service,
                date: parse_date(filters.eq("date")?)?,
                slot_label: filters.eq("slot")?.to_string(),
                length,
            })
        }
        "fully_booked_dates" => {
            let (from, to) = match filters.eq.get("date") {
                Some(day) => (day.as_str(), day.as_str()),
                None => filters.date_range()?,
            };
            Ok(Command::SelectFullyBookedDates {
                service,
                from: parse_date(from)?,
                to: parse_date(to)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `col = v`, `col >= v` and `col <= v` terms joined by AND.
#[derive(Debug, Default)]
struct Filters {
    eq: HashMap<String, String>,
    ge: HashMap<String, String>,
    le: HashMap<String, String>,
}

impl Filters {
    fn collect(&mut self, expr: &Expr) -> Result<(), SqlError> {
        match expr {
            Expr::Nested(inner) => self.collect(inner),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => {
                self.collect(left)?;
                self.collect(right)
            }
            Expr::BinaryOp { left, op, right } => {
                let col = expr_column_name(left).map(|c| canonical_column(&c)).ok_or_else(|| {
                    SqlError::Unsupported(format!("filter on {left}"))
                })?;
                let value = value_text(right)?
                    .ok_or_else(|| SqlError::Unsupported(format!("NULL filter on {col}")))?;
                let target = match op {
                    BinaryOperator::Eq => &mut self.eq,
                    BinaryOperator::GtEq => &mut self.ge,
                    BinaryOperator::LtEq => &mut self.le,
                    other => return Err(SqlError::Unsupported(format!("operator {other}"))),
                };
                target.insert(col, value);
                Ok(())
            }
            other => Err(SqlError::Unsupported(format!("filter {other}"))),
        }
    }

    fn eq(&self, col: &'static str) -> Result<&str, SqlError> {
        self.eq.get(col).map(String::as_str).ok_or(SqlError::MissingFilter(col))
    }

    /// Inclusive date range bounds.
    fn date_range(&self) -> Result<(&str, &str), SqlError> {
        let from = self.ge.get("date").map(String::as_str);
        let to = self.le.get("date").map(String::as_str);
        let from = from.ok_or(SqlError::MissingFilter("date >="))?;
        let to = to.ok_or(SqlError::MissingFilter("date <="))?;
        Ok((from, to))
    }
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

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
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

fn extract_insert_row(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [row] => Ok(row.as_slice()),
            [] => Err(SqlError::Parse("empty VALUES".into())),
            _ => Err(SqlError::Unsupported("one booking per INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let mut filters = Filters::default();
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    filters.collect(sel)?;
    parse_ulid(filters.eq("id")?)
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

/// A literal as text; `None` for NULL.
fn value_text(expr: &Expr) -> Result<Option<String>, SqlError> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => match value {
            Value::Null => Ok(None),
            Value::SingleQuotedString(s) | Value::Number(s, _) => Ok(Some(s.clone())),
            other => Err(SqlError::Parse(format!("expected literal, got {other}"))),
        },
        Expr::Cast { expr, .. } => value_text(expr),
        other => Err(SqlError::Parse(format!("expected literal, got {other}"))),
    }
}

fn parse_ulid(s: &str) -> Result<Ulid, SqlError> {
    Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
}

fn parse_service(s: &str) -> Result<ServiceKind, SqlError> {
    ServiceKind::parse(s).ok_or_else(|| SqlError::Parse(format!("unknown service: {s}")))
}

fn parse_date(s: &str) -> Result<NaiveDate, SqlError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| SqlError::InvalidDate(s.to_string()))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
pub enum SqlError {
    Parse(String),
    Empty,
    TooLong,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
    InvalidDate(String),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::TooLong => write!(f, "query too long"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(col) => write!(f, "missing value for column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::InvalidDate(s) => write!(f, "invalid date '{s}': expected YYYY-MM-DD"),
        }
    }
}

impl std::error::Error for SqlError {}
