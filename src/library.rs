//! The keyword API: [DatabaseLibrary], its configuration and its error type.

use crate::{
    assert::{self, RowExpectation},
    gateway::{DbConnection, DriverRegistry},
    import::import_table_from_file,
    observer::Observer,
    registry::ConnectionRegistry,
    replay::{replay_file, ReplayMode},
    result_file::{compare_query_result, store_query_result},
    schema,
};
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt, fs};

/// Everything that can go wrong when running a keyword.
#[derive(Debug)]
pub enum DbLibError {
    /// An invalid argument from the host (an empty name, an unparseable number, ...):
    ConfigError(String),
    /// A connection with this name is already registered:
    AlreadyRegistered(String),
    /// No connection with this name is registered:
    UnknownConnection(String),
    /// A keyword needing a connection ran while none was active:
    NoActiveConnection,
    /// The driver could not be found or the connection could not be opened:
    ConnectError(String),
    /// An error reported by the database:
    SqlError(String),
    /// A failed assertion:
    AssertionError(String),
    /// The row with the requested number does not exist (carries the statement):
    RowNotFound(String),
    /// More than one row was fetched where only one was expected:
    MultipleRows(String),
    /// No row was fetched by a where-clause (carries the statement):
    NoRow(String),
    /// A value read from the database differs from the one expected:
    ValueMismatch {
        column: String,
        expected: String,
        actual: String,
    },
    /// The named file does not exist:
    FileNotFound(String),
    /// An error that occurred while reading or writing a file:
    IoError(std::io::Error),
    /// A statement from a replayed SQL file failed:
    ReplayError {
        mode: ReplayMode,
        statement: String,
        message: String,
    },
    /// A line of an imported file does not have one value per column of the table:
    ColumnCountMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },
    /// A value could not be read or interpreted:
    DataError(String),
    /// An error that occurred while reading a delimited file:
    CsvError(csv::Error),
}

impl DbLibError {
    /// Whether the error reports a failed check on the data, as opposed to a failure to run it.
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            Self::AssertionError(_)
                | Self::RowNotFound(_)
                | Self::MultipleRows(_)
                | Self::NoRow(_)
                | Self::ValueMismatch { .. }
        )
    }
}

impl fmt::Display for DbLibError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "{}", msg),
            Self::AlreadyRegistered(_) => write!(
                f,
                "This connection has already been established, please close it"
            ),
            Self::UnknownConnection(name) => write!(
                f,
                "Could not find connection {} please ensure the connection exists",
                name
            ),
            Self::NoActiveConnection => write!(
                f,
                "No connection open. Did you forget to run 'Connect To Database' before?"
            ),
            Self::ConnectError(msg) => write!(f, "{}", msg),
            Self::SqlError(msg) => write!(f, "{}", msg),
            Self::AssertionError(msg) => write!(f, "{}", msg),
            Self::RowNotFound(sql) => {
                write!(f, "Given rownum does not exist for statement: {}", sql)
            }
            Self::MultipleRows(msg) => write!(f, "{}", msg),
            Self::NoRow(sql) => write!(
                f,
                "No row fetched by given where-clause for statement: {}",
                sql
            ),
            Self::ValueMismatch {
                expected, actual, ..
            } => write!(f, "Value found: '{}'. Expected: '{}'", actual, expected),
            Self::FileNotFound(path) => write!(f, "{} (No such file or directory)", path),
            Self::IoError(e) => write!(f, "{}", e),
            Self::ReplayError {
                mode: ReplayMode::Strict,
                statement,
                message,
            } => write!(
                f,
                "Error executing: {} Execution from file ! {}",
                statement, message
            ),
            Self::ReplayError {
                statement, message, ..
            } => write!(
                f,
                "Error executing: {} Execution from file rolled back! {}",
                statement, message
            ),
            Self::ColumnCountMismatch {
                line,
                expected,
                found,
            } => write!(
                f,
                "Line {} has {} value(s) but the table has {} column(s)",
                line, found, expected
            ),
            Self::DataError(msg) => write!(f, "{}", msg),
            Self::CsvError(e) => write!(f, "{}", e),
        }
    }
}

impl Error for DbLibError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::IoError(e) => Some(e),
            Self::CsvError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for DbLibError {
    fn from(e: sqlx::Error) -> Self {
        match e.as_database_error() {
            Some(db_error) => Self::SqlError(db_error.message().to_string()),
            None => Self::SqlError(e.to_string()),
        }
    }
}

impl From<std::io::Error> for DbLibError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e)
    }
}

impl From<csv::Error> for DbLibError {
    fn from(e: csv::Error) -> Self {
        Self::CsvError(e)
    }
}

pub type Result<T> = std::result::Result<T, DbLibError>;

/// Library settings. Every field has a default, so a configuration file need only name the
/// settings it changes.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LibraryConfig {
    /// The number of differing rows after which a comparison with a result file stops.
    pub max_diffs: usize,
    /// How SQL NULL is written to (and expected in) result files.
    pub null_text: String,
    /// Return every primary key column, instead of only the last one, for composite keys.
    pub accumulate_primary_keys: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            max_diffs: 10,
            null_text: "null".to_string(),
            accumulate_primary_keys: false,
        }
    }
}

impl LibraryConfig {
    pub fn from_json_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DbLibError::FileNotFound(path.to_string()),
            _ => DbLibError::IoError(e),
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            DbLibError::ConfigError(format!("Invalid configuration in {}: {}", path, e))
        })?;
        if config.max_diffs == 0 {
            return Err(DbLibError::ConfigError(format!(
                "Invalid configuration in {}: max_diffs must be at least 1",
                path
            )));
        }
        Ok(config)
    }
}

/// The database keyword library. Owns the registered connections; every keyword other than
/// those managing connections runs against the active one.
#[derive(Debug)]
pub struct DatabaseLibrary {
    config: LibraryConfig,
    drivers: DriverRegistry,
    connections: ConnectionRegistry,
    observer: Observer,
}

impl Default for DatabaseLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseLibrary {
    /// A library with the default configuration and the built-in drivers, reporting to the log.
    pub fn new() -> Self {
        Self::with_config(LibraryConfig::default())
    }

    pub fn with_config(config: LibraryConfig) -> Self {
        let _ = env_logger::try_init();
        Self {
            config,
            drivers: DriverRegistry::with_builtin_drivers(),
            connections: ConnectionRegistry::new(),
            observer: Observer::default(),
        }
    }

    pub fn set_observer(&mut self, observer: Observer) {
        self.observer = observer;
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    /// The drivers `connect_to_database` can choose from. Hosts may register their own.
    pub fn drivers_mut(&mut self) -> &mut DriverRegistry {
        &mut self.drivers
    }

    fn active(&mut self) -> Result<&mut dyn DbConnection> {
        self.connections.active()
    }

    // Connection management

    pub fn connect_to_database(
        &mut self,
        name: &str,
        driver_id: &str,
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Result<()> {
        let driver = self.drivers.get(driver_id)?;
        self.connections
            .connect(name, driver.as_ref(), url, user, password)
    }

    pub fn switch_connection(&mut self, name: &str) -> Result<()> {
        self.connections.switch_active(name)
    }

    pub fn disconnect_from_database(&mut self) -> Result<()> {
        self.connections.disconnect_active(&self.observer)
    }

    pub fn disconnect_from_all_databases(&mut self) -> Result<()> {
        self.connections.disconnect_all(&self.observer)
    }

    pub fn get_current_connection_name(&self) -> Option<&str> {
        self.connections.active_name()
    }

    // Tables and rows

    pub fn table_must_exist(&mut self, table: &str) -> Result<()> {
        schema::table_must_exist(self.active()?, table)
    }

    pub fn table_must_be_empty(&mut self, table: &str) -> Result<()> {
        let observer = self.observer.clone();
        assert::table_must_be_empty(self.active()?, &observer, table)
    }

    pub fn delete_all_rows_from_table(&mut self, table: &str) -> Result<()> {
        self.active()?.execute(&format!("DELETE FROM {}", table))
    }

    pub fn table_must_contain_number_of_rows(&mut self, table: &str, rows: i64) -> Result<()> {
        let observer = self.observer.clone();
        assert::table_must_contain_number_of_rows(self.active()?, &observer, table, rows)
    }

    pub fn table_must_contain_more_than_number_of_rows(
        &mut self,
        table: &str,
        rows: i64,
    ) -> Result<()> {
        let observer = self.observer.clone();
        assert::table_must_contain_more_than(self.active()?, &observer, table, rows)
    }

    pub fn table_must_contain_less_than_number_of_rows(
        &mut self,
        table: &str,
        rows: i64,
    ) -> Result<()> {
        let observer = self.observer.clone();
        assert::table_must_contain_less_than(self.active()?, &observer, table, rows)
    }

    pub fn tables_must_contain_same_amount_of_rows(
        &mut self,
        first_table: &str,
        second_table: &str,
    ) -> Result<()> {
        let observer = self.observer.clone();
        assert::tables_must_contain_same_amount_of_rows(
            self.active()?,
            &observer,
            first_table,
            second_table,
        )
    }

    pub fn check_content_for_row_identified_by_rownum(
        &mut self,
        columns: &str,
        values: &str,
        table: &str,
        rownum: i64,
    ) -> Result<()> {
        let expectation = RowExpectation::parse(columns, values)?;
        assert::check_row_by_rownum(self.active()?, &expectation, table, rownum)
    }

    pub fn check_content_for_row_identified_by_where_clause(
        &mut self,
        columns: &str,
        values: &str,
        table: &str,
        where_clause: &str,
    ) -> Result<()> {
        let expectation = RowExpectation::parse(columns, values)?;
        assert::check_row_by_where(self.active()?, &expectation, table, where_clause)
    }

    pub fn read_single_value_from_table(
        &mut self,
        table: &str,
        column: &str,
        where_clause: &str,
    ) -> Result<String> {
        assert::read_single_value(self.active()?, table, column, where_clause)
    }

    pub fn verify_number_of_rows_matching_where(
        &mut self,
        table: &str,
        where_clause: &str,
        rows: i64,
    ) -> Result<()> {
        let observer = self.observer.clone();
        assert::verify_number_of_rows_matching_where(
            self.active()?,
            &observer,
            table,
            where_clause,
            rows,
        )
    }

    pub fn row_should_not_exist_in_table(&mut self, table: &str, where_clause: &str) -> Result<()> {
        assert::row_should_not_exist(self.active()?, table, where_clause)
    }

    // Schema

    pub fn transaction_isolation_level_must_be(&mut self, level: &str) -> Result<()> {
        schema::isolation_level_must_be(self.active()?, level)
    }

    pub fn get_transaction_isolation_level(&mut self) -> Result<String> {
        schema::isolation_level_name(self.active()?)
    }

    pub fn check_primary_key_columns_for_table(
        &mut self,
        table: &str,
        columns: &str,
    ) -> Result<()> {
        let accumulate = self.config.accumulate_primary_keys;
        schema::check_primary_key_columns(self.active()?, table, columns, accumulate)
    }

    pub fn get_primary_key_columns_for_table(&mut self, table: &str) -> Result<String> {
        let accumulate = self.config.accumulate_primary_keys;
        schema::primary_key_columns(self.active()?, table, accumulate)
    }

    // SQL execution

    pub fn execute_sql(&mut self, sql: &str) -> Result<()> {
        log::debug!("Executing: {}", sql);
        self.active()?.execute(sql)
    }

    pub fn execute_sql_from_file(&mut self, path: &str) -> Result<()> {
        self.replay(path, ReplayMode::Transactional)
    }

    pub fn execute_sql_from_file_without_transaction(&mut self, path: &str) -> Result<()> {
        self.replay(path, ReplayMode::Strict)
    }

    pub fn execute_sql_from_file_ignore_errors(&mut self, path: &str) -> Result<()> {
        self.replay(path, ReplayMode::BestEffort)
    }

    pub fn execute_sql_from_file_preserving_line_breaks(&mut self, path: &str) -> Result<()> {
        self.replay(path, ReplayMode::PreserveLineBreaks)
    }

    fn replay(&mut self, path: &str, mode: ReplayMode) -> Result<()> {
        let observer = self.observer.clone();
        replay_file(self.active()?, &observer, path, mode)
    }

    // Files

    pub fn store_query_result_to_file(&mut self, sql: &str, path: &str) -> Result<()> {
        let null_text = self.config.null_text.clone();
        store_query_result(self.active()?, sql, path, &null_text)?;
        Ok(())
    }

    pub fn compare_query_result_to_file(&mut self, sql: &str, path: &str) -> Result<()> {
        let null_text = self.config.null_text.clone();
        let max_diffs = self.config.max_diffs;
        compare_query_result(self.active()?, sql, path, &null_text, max_diffs)
    }

    pub fn import_table_from_file(&mut self, table: &str, path: &str) -> Result<usize> {
        import_table_from_file(self.active()?, table, path)
    }

    pub fn set_system_property(&mut self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() || key.contains('=') || key.contains('\0') || value.contains('\0') {
            return Err(DbLibError::ConfigError(format!(
                "Invalid system property name '{}'",
                key
            )));
        }
        std::env::set_var(key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_fields_default_individually() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"accumulate_primary_keys": true}"#).unwrap();
        let config = LibraryConfig::from_json_file(path.to_str().unwrap()).unwrap();
        assert_eq!(
            config,
            LibraryConfig {
                accumulate_primary_keys: true,
                ..LibraryConfig::default()
            }
        );
        assert_eq!(config.max_diffs, 10);
        assert_eq!(config.null_text, "null");

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            LibraryConfig::from_json_file(path.to_str().unwrap()),
            Err(DbLibError::ConfigError(_))
        ));
        fs::write(&path, r#"{"max_diffs": 0}"#).unwrap();
        assert!(matches!(
            LibraryConfig::from_json_file(path.to_str().unwrap()),
            Err(DbLibError::ConfigError(_))
        ));
        assert!(matches!(
            LibraryConfig::from_json_file("/nonexistent/dblibrary.json"),
            Err(DbLibError::FileNotFound(_))
        ));
    }

    #[test]
    fn assertion_errors_are_distinguished() {
        assert!(DbLibError::NoRow("SELECT 1".to_string()).is_assertion());
        assert!(DbLibError::ValueMismatch {
            column: "Name".to_string(),
            expected: "a".to_string(),
            actual: "b".to_string(),
        }
        .is_assertion());
        assert!(!DbLibError::NoActiveConnection.is_assertion());
        assert!(!DbLibError::SqlError("syntax error".to_string()).is_assertion());
    }

    #[test]
    fn keywords_need_an_active_connection() {
        let mut library = DatabaseLibrary::new();
        assert!(matches!(
            library.table_must_exist("t"),
            Err(DbLibError::NoActiveConnection)
        ));
        assert!(matches!(
            library.disconnect_from_database(),
            Err(DbLibError::NoActiveConnection)
        ));
        library.disconnect_from_all_databases().unwrap();
        assert_eq!(library.get_current_connection_name(), None);
    }
}
