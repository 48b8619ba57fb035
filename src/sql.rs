use chrono::NaiveDate;
use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
///
/// Minutes-of-day accept either a bare integer (`600`) or an `'HH:MM'`
/// string (`'10:00'`); dates are `'YYYY-MM-DD'` strings.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertBusinessDay {
        date: NaiveDate,
        open_min: Minute,
        close_min: Minute,
        holiday: Option<String>,
        returning: bool,
    },
    /// Upsert: a second INSERT for the same staff-day replaces the holiday.
    InsertStaffDay {
        staff_id: Ulid,
        date: NaiveDate,
        holiday: Option<String>,
    },
    InsertBlock {
        staff_id: Ulid,
        date: NaiveDate,
        start: Minute,
    },
    DeleteBlock {
        staff_id: Ulid,
        date: NaiveDate,
        start: Minute,
    },
    InsertLock {
        id: Ulid,
        staff_id: Ulid,
        date: NaiveDate,
        start: Minute,
        duration: Minute,
        session: String,
        returning: bool,
    },
    /// `UPDATE locks SET extend_ms = N WHERE id = '...'` renews a lock.
    UpdateLock {
        id: Ulid,
        extend_ms: Ms,
        returning: bool,
    },
    DeleteLock {
        id: Ulid,
    },
    InsertBooking {
        id: Ulid,
        lock_id: Ulid,
        service_ids: Vec<String>,
        returning: bool,
    },
    DeleteBooking {
        id: Ulid,
    },
    SelectStarts {
        staff_id: Ulid,
        date: NaiveDate,
        duration: Minute,
    },
    SelectGrid {
        staff_id: Ulid,
        date: NaiveDate,
    },
    SelectLocks {
        staff_id: Ulid,
        date: NaiveDate,
    },
    SelectBookings {
        staff_id: Ulid,
        date: NaiveDate,
    },
    SelectBusinessDays {
        date: Option<NaiveDate>,
    },
    Listen {
        channel: String,
    },
    Unlisten {
        channel: String,
    },
    UnlistenAll,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    let upper = trimmed.to_uppercase();
    if upper.starts_with("LISTEN ") {
        let channel = trimmed[7..].trim().trim_matches(';').to_string();
        return Ok(Command::Listen { channel });
    }
    if upper.starts_with("UNLISTEN ") {
        let target = trimmed[9..].trim().trim_matches(';');
        return Ok(if target == "*" {
            Command::UnlistenAll
        } else {
            Command::Unlisten {
                channel: target.to_string(),
            }
        });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            returning,
            ..
        } => parse_update(table, assignments, selection, returning.is_some()),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let returning = insert.returning.is_some();

    match table.as_str() {
        "business_days" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("business_days", 3, values.len()));
            }
            let holiday = if values.len() >= 4 {
                parse_string_or_null(&values[3])?
            } else {
                None
            };
            Ok(Command::InsertBusinessDay {
                date: parse_date(&values[0])?,
                open_min: parse_minute(&values[1])?,
                close_min: parse_minute(&values[2])?,
                holiday,
                returning,
            })
        }
        "staff_days" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("staff_days", 2, values.len()));
            }
            let holiday = if values.len() >= 3 {
                parse_string_or_null(&values[2])?
            } else {
                None
            };
            Ok(Command::InsertStaffDay {
                staff_id: parse_ulid(&values[0])?,
                date: parse_date(&values[1])?,
                holiday,
            })
        }
        "blocks" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("blocks", 3, values.len()));
            }
            Ok(Command::InsertBlock {
                staff_id: parse_ulid(&values[0])?,
                date: parse_date(&values[1])?,
                start: parse_minute(&values[2])?,
            })
        }
        "locks" => {
            if values.len() < 6 {
                return Err(SqlError::WrongArity("locks", 6, values.len()));
            }
            Ok(Command::InsertLock {
                id: parse_ulid(&values[0])?,
                staff_id: parse_ulid(&values[1])?,
                date: parse_date(&values[2])?,
                start: parse_minute(&values[3])?,
                duration: parse_minute(&values[4])?,
                session: parse_string(&values[5])?,
                returning,
            })
        }
        "bookings" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("bookings", 2, values.len()));
            }
            let service_ids = if values.len() >= 3 {
                parse_csv_or_null(&values[2])?
            } else {
                Vec::new()
            };
            Ok(Command::InsertBooking {
                id: parse_ulid(&values[0])?,
                lock_id: parse_ulid(&values[1])?,
                service_ids,
                returning,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
    returning: bool,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    if table != "locks" {
        return Err(SqlError::UnknownTable(table));
    }
    let mut extend_ms = None;
    for assignment in assignments {
        let col = match &assignment.target {
            ast::AssignmentTarget::ColumnName(name) => object_name_last(name),
            _ => None,
        };
        if col.as_deref() == Some("extend_ms") {
            extend_ms = Some(parse_i64_expr(&assignment.value)?);
        }
    }
    Ok(Command::UpdateLock {
        id: extract_where_id(selection)?,
        extend_ms: extend_ms.ok_or(SqlError::MissingFilter("extend_ms"))?,
        returning,
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;

    match table.as_str() {
        "locks" => Ok(Command::DeleteLock {
            id: extract_where_id(&delete.selection)?,
        }),
        "bookings" => Ok(Command::DeleteBooking {
            id: extract_where_id(&delete.selection)?,
        }),
        "blocks" => {
            let filters = extract_filters(&delete.selection)?;
            Ok(Command::DeleteBlock {
                staff_id: filters.staff_id.ok_or(SqlError::MissingFilter("staff_id"))?,
                date: filters.date.ok_or(SqlError::MissingFilter("date"))?,
                start: filters.start.ok_or(SqlError::MissingFilter("start"))?,
            })
        }
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
    let filters = extract_filters(&select.selection)?;

    let staff_and_date = || -> Result<(Ulid, NaiveDate), SqlError> {
        Ok((
            filters.staff_id.ok_or(SqlError::MissingFilter("staff_id"))?,
            filters.date.ok_or(SqlError::MissingFilter("date"))?,
        ))
    };

    match table.as_str() {
        "starts" => {
            let (staff_id, date) = staff_and_date()?;
            Ok(Command::SelectStarts {
                staff_id,
                date,
                duration: filters.duration.ok_or(SqlError::MissingFilter("duration"))?,
            })
        }
        "grid" => {
            let (staff_id, date) = staff_and_date()?;
            Ok(Command::SelectGrid { staff_id, date })
        }
        "locks" => {
            let (staff_id, date) = staff_and_date()?;
            Ok(Command::SelectLocks { staff_id, date })
        }
        "bookings" => {
            let (staff_id, date) = staff_and_date()?;
            Ok(Command::SelectBookings { staff_id, date })
        }
        "business_days" => Ok(Command::SelectBusinessDays { date: filters.date }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── WHERE clause extraction ───────────────────────────────────

#[derive(Default)]
struct Filters {
    staff_id: Option<Ulid>,
    date: Option<NaiveDate>,
    start: Option<Minute>,
    duration: Option<Minute>,
}

fn extract_filters(selection: &Option<Expr>) -> Result<Filters, SqlError> {
    let mut filters = Filters::default();
    if let Some(expr) = selection {
        walk_filters(expr, &mut filters)?;
    }
    Ok(filters)
}

fn walk_filters(expr: &Expr, filters: &mut Filters) -> Result<(), SqlError> {
    if let Expr::BinaryOp { left, op, right } = expr {
        match op {
            ast::BinaryOperator::And => {
                walk_filters(left, filters)?;
                walk_filters(right, filters)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("staff_id") => filters.staff_id = Some(parse_ulid_expr(right)?),
                Some("date") => filters.date = Some(parse_date(right)?),
                Some("start") => filters.start = Some(parse_minute(right)?),
                Some("duration") => filters.duration = Some(parse_minute(right)?),
                _ => {}
            },
            _ => {}
        }
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

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows[0].clone())
        }
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
                parse_ulid_expr(right)
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

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    parse_ulid_expr(expr)
}

/// A minute-of-day, written either as a bare integer or `'HH:MM'`.
fn parse_minute(expr: &Expr) -> Result<Minute, SqlError> {
    if let Some(Value::SingleQuotedString(s)) = extract_value(expr) {
        if s.contains(':') {
            return parse_hhmm(s).ok_or_else(|| SqlError::Parse(format!("bad time: {s}")));
        }
    }
    let v = parse_i64_expr(expr)?;
    Minute::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of minute range")))
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    if let Some(Value::SingleQuotedString(s)) = extract_value(expr) {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| SqlError::Parse(format!("bad date: {e}")))
    } else {
        Err(SqlError::Parse(format!("expected date string, got {expr:?}")))
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(Value::SingleQuotedString(s)) = extract_value(expr) {
        Ok(s.clone())
    } else {
        Err(SqlError::Parse(format!("expected string, got {expr:?}")))
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        return Ok(None);
    }
    parse_string(expr).map(Some)
}

/// Service ids arrive as one comma-separated string; NULL or '' mean none.
fn parse_csv_or_null(expr: &Expr) -> Result<Vec<String>, SqlError> {
    Ok(match parse_string_or_null(expr)? {
        None => Vec::new(),
        Some(s) if s.is_empty() => Vec::new(),
        Some(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
    })
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const U: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn parse_insert_business_day() {
        let sql = "INSERT INTO business_days (date, open, close) VALUES ('2097-03-02', '09:00', '17:00')";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::InsertBusinessDay {
                date,
                open_min,
                close_min,
                holiday,
                returning,
            } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2097, 3, 2).unwrap());
                assert_eq!(open_min, 540);
                assert_eq!(close_min, 1020);
                assert_eq!(holiday, None);
                assert!(!returning);
            }
            _ => panic!("expected InsertBusinessDay, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_business_day_holiday_and_integer_minutes() {
        let sql = "INSERT INTO business_days (date, open, close, holiday) VALUES ('2097-03-02', 540, 1020, 'public holiday')";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::InsertBusinessDay {
                open_min,
                close_min,
                holiday,
                ..
            } => {
                assert_eq!(open_min, 540);
                assert_eq!(close_min, 1020);
                assert_eq!(holiday.as_deref(), Some("public holiday"));
            }
            _ => panic!("expected InsertBusinessDay, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_staff_day_null_holiday() {
        let sql =
            format!("INSERT INTO staff_days (staff_id, date, holiday) VALUES ('{U}', '2097-03-02', NULL)");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertStaffDay { holiday, .. } => assert_eq!(holiday, None),
            _ => panic!("expected InsertStaffDay, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_block() {
        let sql = format!("INSERT INTO blocks (staff_id, date, start) VALUES ('{U}', '2097-03-02', '10:15')");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertBlock { start, .. } => assert_eq!(start, 615),
            _ => panic!("expected InsertBlock, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_delete_block_needs_all_filters() {
        let sql = format!(
            "DELETE FROM blocks WHERE staff_id = '{U}' AND date = '2097-03-02' AND start = 615"
        );
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::DeleteBlock { start: 615, .. }));

        let partial = format!("DELETE FROM blocks WHERE staff_id = '{U}' AND date = '2097-03-02'");
        assert!(matches!(
            parse_sql(&partial),
            Err(SqlError::MissingFilter("start"))
        ));
    }

    #[test]
    fn parse_insert_lock() {
        let sql = format!(
            "INSERT INTO locks (id, staff_id, date, start, duration, session) VALUES ('{U}', '{U}', '2097-03-02', '10:00', 45, 'web-123') RETURNING *"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertLock {
                start,
                duration,
                session,
                returning,
                ..
            } => {
                assert_eq!(start, 600);
                assert_eq!(duration, 45);
                assert_eq!(session, "web-123");
                assert!(returning);
            }
            _ => panic!("expected InsertLock, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_lock_extend() {
        let sql = format!("UPDATE locks SET extend_ms = 60000 WHERE id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::UpdateLock {
                id,
                extend_ms,
                returning,
            } => {
                assert_eq!(id.to_string(), U);
                assert_eq!(extend_ms, 60000);
                assert!(!returning);
            }
            _ => panic!("expected UpdateLock, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_delete_lock() {
        let sql = format!("DELETE FROM locks WHERE id = '{U}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::DeleteLock { .. }));
    }

    #[test]
    fn parse_insert_booking_with_services() {
        let sql = format!(
            "INSERT INTO bookings (id, lock_id, service_ids) VALUES ('{U}', '{U}', 'cut,color')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertBooking { service_ids, .. } => {
                assert_eq!(service_ids, vec!["cut", "color"]);
            }
            _ => panic!("expected InsertBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_booking_without_services() {
        let sql = format!("INSERT INTO bookings (id, lock_id) VALUES ('{U}', '{U}')");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertBooking { service_ids, .. } => assert!(service_ids.is_empty()),
            _ => panic!("expected InsertBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_starts() {
        let sql = format!(
            "SELECT * FROM starts WHERE staff_id = '{U}' AND date = '2097-03-02' AND duration = 45"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectStarts {
                staff_id,
                date,
                duration,
            } => {
                assert_eq!(staff_id.to_string(), U);
                assert_eq!(date, NaiveDate::from_ymd_opt(2097, 3, 2).unwrap());
                assert_eq!(duration, 45);
            }
            _ => panic!("expected SelectStarts, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_starts_missing_duration_errors() {
        let sql = format!("SELECT * FROM starts WHERE staff_id = '{U}' AND date = '2097-03-02'");
        assert!(matches!(
            parse_sql(&sql),
            Err(SqlError::MissingFilter("duration"))
        ));
    }

    #[test]
    fn parse_select_grid_locks_bookings() {
        for table in ["grid", "locks", "bookings"] {
            let sql =
                format!("SELECT * FROM {table} WHERE staff_id = '{U}' AND date = '2097-03-02'");
            assert!(parse_sql(&sql).is_ok(), "{table} should parse");
        }
    }

    #[test]
    fn parse_select_business_days_filter_optional() {
        let cmd = parse_sql("SELECT * FROM business_days").unwrap();
        assert_eq!(cmd, Command::SelectBusinessDays { date: None });

        let cmd = parse_sql("SELECT * FROM business_days WHERE date = '2097-03-02'").unwrap();
        match cmd {
            Command::SelectBusinessDays { date: Some(d) } => {
                assert_eq!(d, NaiveDate::from_ymd_opt(2097, 3, 2).unwrap());
            }
            _ => panic!("expected filtered SelectBusinessDays, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_listen_unlisten() {
        let cmd = parse_sql("LISTEN day_01ARZ3NDEKTSV4RRFFQ69G5FAV_20970302").unwrap();
        match cmd {
            Command::Listen { channel } => {
                assert_eq!(channel, "day_01ARZ3NDEKTSV4RRFFQ69G5FAV_20970302");
            }
            _ => panic!("expected Listen, got {cmd:?}"),
        }

        let cmd = parse_sql("UNLISTEN day_01ARZ3NDEKTSV4RRFFQ69G5FAV_20970302;").unwrap();
        assert!(matches!(cmd, Command::Unlisten { .. }));

        assert_eq!(parse_sql("UNLISTEN *").unwrap(), Command::UnlistenAll);
    }

    #[test]
    fn parse_bad_time_errors() {
        let sql = "INSERT INTO business_days (date, open, close) VALUES ('2097-03-02', '9am', '17:00')";
        assert!(parse_sql(sql).is_err());
    }

    #[test]
    fn parse_bad_date_errors() {
        let sql = "INSERT INTO business_days (date, open, close) VALUES ('03/02/2097', '09:00', '17:00')";
        assert!(parse_sql(sql).is_err());
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO foobar (id) VALUES ('{U}')");
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
