use chrono::{DateTime, NaiveDate};
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;
use crate::rules;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    Register {
        name: String,
        tel_number: String,
        email: String,
        password: String,
    },
    Login {
        email: String,
        password: String,
    },
    SetToken {
        token: String,
    },
    Logout,
    SelectMe,
    UpdateMe(UserPatch),
    SelectUsers,
    SelectHotels {
        id: Option<Ulid>,
        search: Option<String>,
    },
    InsertHotel {
        hotel: NewHotel,
        returning: bool,
    },
    UpdateHotel {
        id: Ulid,
        patch: HotelPatch,
    },
    DeleteHotel {
        id: Ulid,
    },
    SelectBookings {
        id: Option<Ulid>,
        hotel_id: Option<Ulid>,
        status: Option<ReservationStatus>,
    },
    InsertBooking {
        hotel_id: Ulid,
        start: Ms,
        end: Ms,
        returning: bool,
    },
    UpdateBooking {
        id: Ulid,
        start: Option<Ms>,
        end: Option<Ms>,
    },
    DeleteBooking {
        id: Ulid,
    },
    SelectCheckoutDates {
        start: Ms,
    },
}

const USER_COLUMNS: [&str; 4] = ["name", "tel_number", "email", "password"];
const HOTEL_COLUMNS: [&str; 8] = [
    "name",
    "building_number",
    "street",
    "district",
    "province",
    "postal_code",
    "tel",
    "image",
];
const BOOKING_COLUMNS: [&str; 3] = ["hotel_id", "start_date", "end_date"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if let Some(token) = parse_set_token(trimmed) {
        return Ok(Command::SetToken { token });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let stmt = match stmts.as_slice() {
        [] => return Err(SqlError::Empty),
        [stmt] => stmt,
        _ => return Err(SqlError::Unsupported("multiple statements".into())),
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(&table.relation, assignments, selection),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// `SET token = '..'` or `SET token TO '..'`. Other SET statements fall through.
fn parse_set_token(sql: &str) -> Option<String> {
    let upper = sql.to_ascii_uppercase();
    let rest = upper.strip_prefix("SET ")?.trim_start();
    let rest = rest.strip_prefix("TOKEN")?.trim_start();
    let value_len = if rest.starts_with('=') {
        rest.len() - 1
    } else if rest.starts_with("TO ") {
        rest.len() - 3
    } else {
        return None;
    };
    // Slice the untouched input: tokens are case-sensitive.
    let value = sql[sql.len() - value_len..].trim();
    if value.contains(';') {
        return None;
    }
    Some(value.trim_matches('\'').to_string())
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let returning = insert.returning.is_some();

    match table.as_str() {
        "users" => {
            let row = insert_row(insert, "users", &USER_COLUMNS)?;
            Ok(Command::Register {
                name: parse_text(row.required("name")?)?,
                tel_number: row.optional("tel_number").map(parse_text).transpose()?.unwrap_or_default(),
                email: parse_text(row.required("email")?)?,
                password: parse_text(row.required("password")?)?,
            })
        }
        "hotels" => {
            let row = insert_row(insert, "hotels", &HOTEL_COLUMNS)?;
            let text = |col: &'static str| row.required(col).and_then(parse_text);
            Ok(Command::InsertHotel {
                hotel: NewHotel {
                    name: text("name")?,
                    address: Address {
                        building_number: text("building_number")?,
                        street: text("street")?,
                        district: text("district")?,
                        province: text("province")?,
                        postal_code: text("postal_code")?,
                    },
                    tel: text("tel")?,
                    image: match row.optional("image") {
                        Some(expr) => parse_text_or_null(expr)?,
                        None => None,
                    },
                },
                returning,
            })
        }
        "bookings" => {
            let row = insert_row(insert, "bookings", &BOOKING_COLUMNS)?;
            Ok(Command::InsertBooking {
                hotel_id: parse_ulid(row.required("hotel_id")?)?,
                start: parse_date(row.required("start_date")?)?,
                end: parse_date(row.required("end_date")?)?,
                returning,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    let mut set = Vec::with_capacity(assignments.len());
    for a in assignments {
        let col = match &a.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        }
        .ok_or_else(|| SqlError::Unsupported("tuple assignment".into()))?;
        set.push((col, &a.value));
    }

    match table.as_str() {
        "me" => {
            let mut patch = UserPatch::default();
            for (col, value) in set {
                let value = Some(parse_text(value)?);
                match col.as_str() {
                    "name" => patch.name = value,
                    "tel_number" => patch.tel_number = value,
                    "email" => patch.email = value,
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            Ok(Command::UpdateMe(patch))
        }
        "hotels" => {
            let id = extract_where_id(selection)?;
            let mut patch = HotelPatch::default();
            for (col, value) in set {
                if col == "image" {
                    patch.image = Some(parse_text_or_null(value)?);
                    continue;
                }
                let value = Some(parse_text(value)?);
                match col.as_str() {
                    "name" => patch.name = value,
                    "building_number" => patch.building_number = value,
                    "street" => patch.street = value,
                    "district" => patch.district = value,
                    "province" => patch.province = value,
                    "postal_code" => patch.postal_code = value,
                    "tel" => patch.tel = value,
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            Ok(Command::UpdateHotel { id, patch })
        }
        "bookings" => {
            let id = extract_where_id(selection)?;
            let (mut start, mut end) = (None, None);
            for (col, value) in set {
                match col.as_str() {
                    "start_date" => start = Some(parse_date(value)?),
                    "end_date" => end = Some(parse_date(value)?),
                    _ => return Err(SqlError::UnknownColumn(col)),
                }
            }
            Ok(Command::UpdateBooking { id, start, end })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    match table.as_str() {
        "sessions" => Ok(Command::Logout),
        "hotels" => Ok(Command::DeleteHotel {
            id: extract_where_id(&delete.selection)?,
        }),
        "bookings" => Ok(Command::DeleteBooking {
            id: extract_where_id(&delete.selection)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
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

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_eq_filters(selection, &mut filters)?;
    }
    let filter = |col: &str| filters.iter().find(|(c, _)| c == col).map(|(_, e)| *e);
    let known = |cols: &[&str]| match filters.iter().find(|(c, _)| !cols.contains(&c.as_str())) {
        Some((c, _)) => Err(SqlError::UnknownColumn(c.clone())),
        None => Ok(()),
    };

    match table.as_str() {
        "login" => {
            known(&["email", "password"])?;
            Ok(Command::Login {
                email: parse_text(filter("email").ok_or(SqlError::MissingFilter("email"))?)?,
                password: parse_text(filter("password").ok_or(SqlError::MissingFilter("password"))?)?,
            })
        }
        "me" => {
            known(&[])?;
            Ok(Command::SelectMe)
        }
        "users" => {
            known(&[])?;
            Ok(Command::SelectUsers)
        }
        "hotels" => {
            known(&["id", "search"])?;
            Ok(Command::SelectHotels {
                id: filter("id").map(parse_ulid).transpose()?,
                search: filter("search").map(parse_text).transpose()?,
            })
        }
        "bookings" => {
            known(&["id", "hotel_id", "status"])?;
            let status = match filter("status") {
                Some(expr) => {
                    let s = parse_text(expr)?;
                    Some(
                        ReservationStatus::parse(&s)
                            .ok_or_else(|| SqlError::Parse(format!("unknown status: {s}")))?,
                    )
                }
                None => None,
            };
            Ok(Command::SelectBookings {
                id: filter("id").map(parse_ulid).transpose()?,
                hotel_id: filter("hotel_id").map(parse_ulid).transpose()?,
                status,
            })
        }
        "checkout_dates" => {
            known(&["start_date"])?;
            Ok(Command::SelectCheckoutDates {
                start: parse_date(filter("start_date").ok_or(SqlError::MissingFilter("start_date"))?)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a = 1 AND b = 2` into column/value pairs.
fn collect_eq_filters<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_eq_filters(left, out)?;
                collect_eq_filters(right, out)
            }
            ast::BinaryOperator::Eq => {
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
                out.push((col, right.as_ref()));
                Ok(())
            }
            _ => Err(SqlError::Unsupported(format!("operator {op}"))),
        },
        _ => Err(SqlError::Unsupported(format!("filter {expr}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

/// One VALUES row keyed by column name.
struct Row<'a> {
    cols: Vec<(String, &'a Expr)>,
}

impl<'a> Row<'a> {
    fn optional(&self, col: &str) -> Option<&'a Expr> {
        self.cols.iter().find(|(c, _)| c == col).map(|(_, e)| *e)
    }

    fn required(&self, col: &'static str) -> Result<&'a Expr, SqlError> {
        self.optional(col).ok_or(SqlError::MissingColumn(col))
    }
}

/// Pair the single VALUES row with its column list. Without a column list,
/// values are taken positionally in `defaults` order.
fn insert_row<'a>(
    insert: &'a ast::Insert,
    table: &'static str,
    defaults: &[&str],
) -> Result<Row<'a>, SqlError> {
    let values = extract_insert_values(insert)?;
    let names: Vec<String> = if insert.columns.is_empty() {
        if values.len() > defaults.len() {
            return Err(SqlError::WrongArity(table, defaults.len(), values.len()));
        }
        defaults.iter().map(|c| c.to_string()).collect()
    } else {
        if insert.columns.len() != values.len() {
            return Err(SqlError::WrongArity(table, insert.columns.len(), values.len()));
        }
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    let mut cols = Vec::with_capacity(values.len());
    for (name, value) in names.into_iter().zip(values) {
        if !defaults.contains(&name.as_str()) {
            return Err(SqlError::UnknownColumn(name));
        }
        cols.push((name, value));
    }
    Ok(Row { cols })
}

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
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
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

fn extract_insert_values(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.as_slice()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
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
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_text(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_text_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_text(expr).map(Some),
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

/// Unix milliseconds, an RFC 3339 timestamp, or `YYYY-MM-DD` (midnight UTC).
/// Casts such as `'2025-10-10'::date` are unwrapped.
fn parse_date(expr: &Expr) -> Result<Ms, SqlError> {
    match expr {
        Expr::Cast { expr, .. } | Expr::Nested(expr) => parse_date(expr),
        _ => match extract_value(expr) {
            Some(Value::SingleQuotedString(s)) => parse_date_str(s),
            _ => parse_i64(expr),
        },
    }
}

pub fn parse_date_str(s: &str) -> Result<Ms, SqlError> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.timestamp_millis());
    }
    if let Ok(day) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(rules::day_start(day));
    }
    Err(SqlError::Parse(format!("bad date: {s}")))
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
