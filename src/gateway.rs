//! The SQL gateway - the capabilities every other part of the library consumes.
//!
//! A [Driver] opens [DbConnection]s; a connection executes statements, hands out forward-only
//! [Cursor]s over result rows, answers metadata questions and manages transactions. The only
//! implementation shipped with the crate is the sqlx adapter in [toolkit](crate::toolkit), but
//! a host may register its own drivers in a [DriverRegistry].

use crate::library::{DbLibError, Result};
use itertools::Itertools;
use std::{collections::HashMap, fmt, sync::Arc};

/// Opens connections for one kind of database.
pub trait Driver: Send + Sync {
    /// A short name for the driver, used in log messages.
    fn name(&self) -> &str;

    /// Open a new session to the database at `url`, optionally authenticating with the given
    /// credentials. Fails with [DbLibError::ConnectError] if the session cannot be established.
    fn open(
        &self,
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<Box<dyn DbConnection>>;
}

/// The name and the database's own type name of a result column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    pub type_name: String,
}

/// A live database session.
pub trait DbConnection: Send {
    /// Execute an arbitrary statement, discarding any result set.
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Execute a query and return a forward-only cursor over its rows. Database errors may be
    /// reported either here or by the first call to [Cursor::next].
    fn query<'c>(&'c mut self, sql: &'c str) -> Result<Box<dyn Cursor + 'c>>;

    /// Describe the columns the given query would produce, without fetching rows.
    fn describe_columns(&mut self, sql: &str) -> Result<Vec<ColumnDescription>>;

    /// Return the names of the tables and views matching the given (SQL `LIKE`) pattern.
    fn tables(&mut self, name_pattern: &str) -> Result<Vec<String>>;

    /// Return the primary key columns of the given table, ordered by column name.
    fn primary_keys(&mut self, table: &str) -> Result<Vec<String>>;

    /// Return the numeric transaction isolation level of the session (see [IsolationLevel]).
    fn isolation_level(&mut self) -> Result<i32>;

    fn auto_commit(&self) -> bool;

    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    /// Prepare a statement with `?` placeholders for repeated execution.
    fn prepare(&mut self, sql: &str) -> Result<PreparedStatement>;

    /// Execute a prepared statement with the parameters currently bound to it.
    fn execute_prepared(&mut self, statement: &PreparedStatement) -> Result<()>;

    /// The placeholder through which a value bound as text is stored in a column of the given
    /// type. Databases that convert text implicitly keep a plain `?`.
    fn text_placeholder(&self, _type_name: &str) -> String {
        String::from("?")
    }

    /// Warnings the driver has recorded on this session.
    fn warnings(&self) -> Vec<String> {
        vec![]
    }

    /// Close the session.
    fn close(self: Box<Self>) -> Result<()>;
}

/// A forward-only cursor over the rows of a query result.
pub trait Cursor {
    /// Advance to the next row. Returns false once the rows are exhausted.
    fn next(&mut self) -> Result<bool>;

    /// The column names of the result. Only reliable once the cursor is positioned on a row.
    fn columns(&self) -> &[String];

    /// The value of the given (1-based) column of the current row rendered as a string, or None
    /// if it is NULL.
    fn get_string(&self, index: usize) -> Result<Option<String>>;

    fn column_count(&self) -> usize {
        self.columns().len()
    }

    /// Like [Cursor::get_string], looking the column up (case-insensitively) by name.
    fn get_string_by_name(&self, name: &str) -> Result<Option<String>> {
        let name = name.trim();
        let index = self
            .columns()
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
            .ok_or(DbLibError::DataError(format!(
                "Column '{}' not found in result columns {:?}",
                name,
                self.columns()
            )))?;
        self.get_string(index + 1)
    }
}

/// A statement with `?` placeholders and the parameters currently bound to them. `None`
/// represents SQL NULL.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedStatement {
    sql: String,
    parameters: Vec<Option<String>>,
}

impl PreparedStatement {
    pub fn new(sql: &str, parameter_count: usize) -> Self {
        Self {
            sql: sql.to_string(),
            parameters: vec![None; parameter_count],
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &[Option<String>] {
        &self.parameters
    }

    /// Bind `value` to the given (1-based) parameter. The driver converts it to the column type.
    pub fn set_object(&mut self, index: usize, value: &str) -> Result<()> {
        *self.slot(index)? = Some(value.to_string());
        Ok(())
    }

    /// Bind SQL NULL to the given (1-based) parameter.
    pub fn set_null(&mut self, index: usize) -> Result<()> {
        *self.slot(index)? = None;
        Ok(())
    }

    fn slot(&mut self, index: usize) -> Result<&mut Option<String>> {
        let count = self.parameters.len();
        if index == 0 || index > count {
            return Err(DbLibError::ConfigError(format!(
                "Parameter index {} out of range 1..={} for: {}",
                index, count, self.sql
            )));
        }
        Ok(&mut self.parameters[index - 1])
    }
}

/// The standard transaction isolation levels, numbered as in JDBC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IsolationLevel {
    None,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::ReadUncommitted),
            2 => Some(Self::ReadCommitted),
            4 => Some(Self::RepeatableRead),
            8 => Some(Self::Serializable),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::None => 0,
            Self::ReadUncommitted => 1,
            Self::ReadCommitted => 2,
            Self::RepeatableRead => 4,
            Self::Serializable => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "TRANSACTION_NONE",
            Self::ReadUncommitted => "TRANSACTION_READ_UNCOMMITTED",
            Self::ReadCommitted => "TRANSACTION_READ_COMMITTED",
            Self::RepeatableRead => "TRANSACTION_REPEATABLE_READ",
            Self::Serializable => "TRANSACTION_SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Maps the driver identifiers a host passes to `connectToDatabase` to compiled-in drivers.
/// Identifiers are matched case-insensitively.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the sqlx-backed SQLite and PostgreSQL drivers under their usual
    /// identifiers (including the JDBC class names hosts tend to pass).
    pub fn with_builtin_drivers() -> Self {
        use crate::toolkit::{DbKind, SqlxDriver};

        let mut registry = Self::new();
        let sqlite: Arc<dyn Driver> = Arc::new(SqlxDriver::new(DbKind::Sqlite));
        for id in ["sqlite", "sqlite3", "org.sqlite.JDBC"] {
            registry.register_shared(id, sqlite.clone());
        }
        let postgres: Arc<dyn Driver> = Arc::new(SqlxDriver::new(DbKind::Postgres));
        for id in ["postgres", "postgresql", "org.postgresql.Driver"] {
            registry.register_shared(id, postgres.clone());
        }
        registry
    }

    pub fn register<D: Driver + 'static>(&mut self, id: &str, driver: D) {
        self.register_shared(id, Arc::new(driver));
    }

    pub fn register_shared(&mut self, id: &str, driver: Arc<dyn Driver>) {
        self.drivers.insert(id.to_lowercase(), driver);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn Driver>> {
        self.drivers
            .get(&id.trim().to_lowercase())
            .cloned()
            .ok_or_else(|| {
                DbLibError::ConnectError(format!(
                    "No driver registered for '{}' (known drivers: {})",
                    id,
                    self.ids().iter().join(", ")
                ))
            })
    }

    /// The registered identifiers, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.drivers.keys().map(|id| id.as_str()).sorted().collect()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_level_codes_round_trip() {
        for code in [0, 1, 2, 4, 8] {
            let level = IsolationLevel::from_code(code).unwrap();
            assert_eq!(level.code(), code);
        }
        assert_eq!(IsolationLevel::from_code(3), None);
        assert_eq!(
            IsolationLevel::ReadCommitted.to_string(),
            "TRANSACTION_READ_COMMITTED"
        );
    }

    #[test]
    fn prepared_statement_binds_by_position() {
        let mut statement = PreparedStatement::new("INSERT INTO t VALUES (?,?)", 2);
        statement.set_object(1, "1").unwrap();
        statement.set_null(2).unwrap();
        assert_eq!(statement.parameters(), &[Some("1".to_string()), None]);
        assert!(matches!(
            statement.set_object(3, "x"),
            Err(DbLibError::ConfigError(_))
        ));
        assert!(statement.set_null(0).is_err());
    }

    #[test]
    fn builtin_driver_ids_are_case_insensitive() {
        let registry = DriverRegistry::with_builtin_drivers();
        assert_eq!(registry.get("SQLite").unwrap().name(), "sqlite");
        assert_eq!(registry.get("org.postgresql.Driver").unwrap().name(), "postgres");
        assert!(matches!(
            registry.get("com.mysql.jdbc.Driver"),
            Err(DbLibError::ConnectError(_))
        ));
    }
}
