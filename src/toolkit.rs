//! The sqlx adapter - implementations of the gateway traits for SQLite and PostgreSQL.

use crate::{
    gateway::{ColumnDescription, Cursor, DbConnection, Driver, PreparedStatement},
    library::{DbLibError, Result},
};
use futures::{executor::block_on, stream::BoxStream, TryStreamExt};
use indoc::indoc;
use lazy_static::lazy_static;
use regex::Regex;
use sqlx::{
    any::{AnyConnectOptions, AnyConnection, AnyRow},
    postgres::PgConnectOptions,
    query as sqlx_query, Column, ConnectOptions, Connection as _, Executor, Row, Statement,
    TypeInfo, ValueRef,
};
use std::str::FromStr;

lazy_static! {
    // Matches either a quoted string (which is left alone) or a `?` placeholder.
    static ref PLACEHOLDER_RX: Regex =
        Regex::new(r#"('[^'\\]*(?:\\.[^'\\]*)*'|"[^"\\]*(?:\\.[^"\\]*)*")|\?"#).unwrap();
}

/// The database engines the adapter knows how to talk to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    Postgres,
}

/// A [Driver] that opens sqlx connections of the given kind.
#[derive(Clone, Debug)]
pub struct SqlxDriver {
    kind: DbKind,
}

impl SqlxDriver {
    pub fn new(kind: DbKind) -> Self {
        Self { kind }
    }
}

impl Driver for SqlxDriver {
    fn name(&self) -> &str {
        match self.kind {
            DbKind::Sqlite => "sqlite",
            DbKind::Postgres => "postgres",
        }
    }

    fn open(
        &self,
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Box<dyn DbConnection>> {
        let options = get_connect_options(self.kind, url, user, password)?;
        let conn = block_on(options.connect()).map_err(|e| {
            DbLibError::ConnectError(format!("Could not connect to '{}': {}", url, e))
        })?;
        log::debug!("Opened {} connection to '{}'", self.name(), url);
        Ok(Box::new(SqlxConnection::new(conn, self.kind)))
    }
}

/// Given the kind of database and a connection URL (optionally in its `jdbc:` form), return the
/// options needed to connect to it. A SQLite URL may also be a bare path to the database file,
/// which will be created if it does not exist.
pub fn get_connect_options(
    kind: DbKind,
    url: &str,
    user: Option<&str>,
    password: Option<&str>,
) -> Result<AnyConnectOptions> {
    let url = url.trim();
    let url = url.strip_prefix("jdbc:").unwrap_or(url);
    let config_error =
        |e: sqlx::Error| DbLibError::ConnectError(format!("Invalid URL '{}': {}", url, e));

    let mut options = match kind {
        DbKind::Postgres => {
            let mut pg_options = PgConnectOptions::from_str(url).map_err(config_error)?;
            if let Some(user) = user.filter(|u| !u.is_empty()) {
                pg_options = pg_options.username(user);
            }
            if let Some(password) = password.filter(|p| !p.is_empty()) {
                pg_options = pg_options.password(password);
            }
            AnyConnectOptions::from(pg_options)
        }
        DbKind::Sqlite => {
            if user.is_some_and(|u| !u.is_empty()) || password.is_some_and(|p| !p.is_empty()) {
                log::warn!("SQLite does not authenticate; ignoring the credentials given");
            }
            let connection_string;
            if !url.starts_with("sqlite:") {
                connection_string = format!("sqlite://{}?mode=rwc", url);
            } else if url.contains('?') || url.contains(":memory:") {
                connection_string = url.to_string();
            } else {
                connection_string = format!("{}?mode=rwc", url);
            }
            AnyConnectOptions::from_str(&connection_string).map_err(config_error)?
        }
    };
    options.log_statements(log::LevelFilter::Debug);
    Ok(options)
}

/// Given a SQL string with `?` placeholders, return the SQL in the syntax of the given kind of
/// database along with the number of placeholders found. SQLite keeps `?`, Postgres uses numbered
/// parameters, i.e., $1, $2, ... Placeholders within quotation marks are left alone.
pub fn local_sql_syntax(kind: DbKind, sql: &str) -> (String, usize) {
    let mut final_sql = String::from("");
    let mut param_idx = 0;
    let mut saved_start = 0;
    for m in PLACEHOLDER_RX.find_iter(sql) {
        let this_match = m.as_str();
        final_sql.push_str(&sql[saved_start..m.start()]);
        if this_match == "?" {
            param_idx += 1;
            match kind {
                DbKind::Postgres => final_sql.push_str(&format!("${}", param_idx)),
                DbKind::Sqlite => final_sql.push('?'),
            }
        } else {
            final_sql.push_str(this_match);
        }
        saved_start = m.end();
    }
    final_sql.push_str(&sql[saved_start..]);
    (final_sql, param_idx)
}

/// Given a database row and a (0-based) column index, return the value of that column as a
/// String, or None if it is NULL.
pub fn get_column_value_as_string(row: &AnyRow, idx: usize) -> Result<Option<String>> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(None);
    }

    if let Ok(value) = row.try_get::<String, _>(idx) {
        return Ok(Some(value));
    }
    if let Ok(value) = row.try_get::<i64, _>(idx) {
        return Ok(Some(value.to_string()));
    }
    if let Ok(value) = row.try_get::<i32, _>(idx) {
        return Ok(Some(value.to_string()));
    }
    if let Ok(value) = row.try_get::<i16, _>(idx) {
        return Ok(Some(value.to_string()));
    }
    if let Ok(value) = row.try_get::<f64, _>(idx) {
        return Ok(Some(value.to_string()));
    }
    if let Ok(value) = row.try_get::<f32, _>(idx) {
        return Ok(Some(value.to_string()));
    }
    if let Ok(value) = row.try_get::<bool, _>(idx) {
        return Ok(Some(value.to_string()));
    }
    // Other types (NUMERIC, DATE, TIMESTAMP, UUID, ...) arrive as the server's own text, since
    // queries without parameters use the simple (text) protocol.
    if let Ok(value) = row.try_get_unchecked::<String, _>(idx) {
        return Ok(Some(value));
    }

    let column = row.columns()[idx].name().to_string();
    Err(DbLibError::DataError(format!(
        "Unable to render the value of column '{}' as a string; cast it to text in the query",
        column
    )))
}

/// A [DbConnection] backed by a single sqlx connection. Auto-commit is emulated: while it is off
/// the first statement executed opens a transaction which stays open until [DbConnection::commit]
/// or [DbConnection::rollback] is called.
pub struct SqlxConnection {
    conn: AnyConnection,
    kind: DbKind,
    auto_commit: bool,
    in_transaction: bool,
}

impl SqlxConnection {
    pub fn new(conn: AnyConnection, kind: DbKind) -> Self {
        Self {
            conn,
            kind,
            auto_commit: true,
            in_transaction: false,
        }
    }

    pub fn kind(&self) -> DbKind {
        self.kind
    }

    fn begin_if_needed(&mut self) -> Result<()> {
        if !self.auto_commit && !self.in_transaction {
            block_on((&mut self.conn).execute("BEGIN"))?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn query_strings(&mut self, sql: &str, params: &[&str]) -> Result<Vec<String>> {
        let mut query = sqlx_query(sql);
        for param in params {
            query = query.bind(param.to_string());
        }
        let rows = block_on(query.fetch_all(&mut self.conn))?;
        let mut values = vec![];
        for row in &rows {
            if let Some(value) = get_column_value_as_string(row, 0)? {
                values.push(value);
            }
        }
        Ok(values)
    }
}

impl DbConnection for SqlxConnection {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.begin_if_needed()?;
        block_on((&mut self.conn).execute(sql))?;
        Ok(())
    }

    fn query<'c>(&'c mut self, sql: &'c str) -> Result<Box<dyn Cursor + 'c>> {
        self.begin_if_needed()?;
        let stream = (&mut self.conn).fetch(sql);
        Ok(Box::new(SqlxCursor {
            stream,
            current: None,
            columns: vec![],
        }))
    }

    fn describe_columns(&mut self, sql: &str) -> Result<Vec<ColumnDescription>> {
        let statement = block_on((&mut self.conn).prepare(sql))?;
        Ok(statement
            .columns()
            .iter()
            .map(|c| ColumnDescription {
                name: c.name().to_string(),
                type_name: c.type_info().name().to_string(),
            })
            .collect())
    }

    fn tables(&mut self, name_pattern: &str) -> Result<Vec<String>> {
        let sql = match self.kind {
            DbKind::Sqlite => indoc! {r#"
                SELECT name FROM sqlite_master
                 WHERE type IN ('table', 'view') AND name LIKE ?
                 ORDER BY name
            "#},
            DbKind::Postgres => indoc! {r#"
                SELECT table_name::TEXT FROM information_schema.tables
                 WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
                   AND LOWER(table_name) LIKE LOWER($1)
                 ORDER BY table_name
            "#},
        };
        self.query_strings(sql, &[name_pattern])
    }

    fn primary_keys(&mut self, table: &str) -> Result<Vec<String>> {
        let sql = match self.kind {
            DbKind::Sqlite => "SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY name",
            DbKind::Postgres => indoc! {r#"
                SELECT kcu.column_name::TEXT
                  FROM information_schema.table_constraints tco
                  JOIN information_schema.key_column_usage kcu
                    ON kcu.constraint_name = tco.constraint_name
                   AND kcu.constraint_schema = tco.constraint_schema
                 WHERE tco.constraint_type = 'PRIMARY KEY'
                   AND LOWER(kcu.table_name) = LOWER($1)
                 ORDER BY kcu.column_name
            "#},
        };
        self.query_strings(sql, &[table])
    }

    fn isolation_level(&mut self) -> Result<i32> {
        match self.kind {
            DbKind::Sqlite => {
                let row =
                    block_on(sqlx_query("PRAGMA read_uncommitted").fetch_one(&mut self.conn))?;
                let read_uncommitted = get_column_value_as_string(&row, 0)?;
                match read_uncommitted.as_deref() {
                    Some("1") => Ok(1),
                    _ => Ok(8),
                }
            }
            DbKind::Postgres => {
                let row =
                    block_on(sqlx_query("SHOW transaction_isolation").fetch_one(&mut self.conn))?;
                let level = get_column_value_as_string(&row, 0)?.unwrap_or_default();
                match level.to_lowercase().as_str() {
                    "read uncommitted" => Ok(1),
                    "read committed" => Ok(2),
                    "repeatable read" => Ok(4),
                    "serializable" => Ok(8),
                    _ => Ok(0),
                }
            }
        }
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        if auto_commit && self.in_transaction {
            self.commit()?;
        }
        self.auto_commit = auto_commit;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            block_on((&mut self.conn).execute("COMMIT"))?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            block_on((&mut self.conn).execute("ROLLBACK"))?;
        }
        Ok(())
    }

    fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
        let (_, parameter_count) = local_sql_syntax(self.kind, sql);
        Ok(PreparedStatement::new(sql, parameter_count))
    }

    fn execute_prepared(&mut self, statement: &PreparedStatement) -> Result<()> {
        self.begin_if_needed()?;
        let (sql, _) = local_sql_syntax(self.kind, statement.sql());
        let mut query = sqlx_query(&sql);
        for param in statement.parameters() {
            query = query.bind(param.clone());
        }
        block_on(query.execute(&mut self.conn))?;
        Ok(())
    }

    /// PostgreSQL does not assign text to typed columns implicitly, so the value is cast.
    fn text_placeholder(&self, type_name: &str) -> String {
        match self.kind {
            DbKind::Postgres if !type_name.is_empty() => format!("CAST(? AS {})", type_name),
            _ => String::from("?"),
        }
    }

    fn close(self: Box<Self>) -> Result<()> {
        let this = *self;
        if this.in_transaction {
            log::warn!("Closing connection with an open transaction; it will be rolled back");
        }
        block_on(this.conn.close())?;
        Ok(())
    }
}

/// A [Cursor] over a sqlx row stream.
pub struct SqlxCursor<'c> {
    stream: BoxStream<'c, std::result::Result<AnyRow, sqlx::Error>>,
    current: Option<AnyRow>,
    columns: Vec<String>,
}

impl Cursor for SqlxCursor<'_> {
    fn next(&mut self) -> Result<bool> {
        self.current = block_on(self.stream.try_next())?;
        match &self.current {
            Some(row) => {
                if self.columns.is_empty() {
                    self.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn get_string(&self, index: usize) -> Result<Option<String>> {
        let row = self.current.as_ref().ok_or(DbLibError::DataError(
            "The cursor is not positioned on a row".to_string(),
        ))?;
        if index == 0 || index > row.len() {
            return Err(DbLibError::DataError(format!(
                "Column index {} out of range 1..={}",
                index,
                row.len()
            )));
        }
        get_column_value_as_string(row, index - 1)
    }
}
