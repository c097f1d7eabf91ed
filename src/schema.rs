//! Schema inspection: table existence, primary keys and transaction isolation levels.

use crate::{
    gateway::{DbConnection, IsolationLevel},
    library::{DbLibError, Result},
};

pub fn table_exists(conn: &mut dyn DbConnection, table: &str) -> Result<bool> {
    Ok(!conn.tables(table)?.is_empty())
}

pub fn table_must_exist(conn: &mut dyn DbConnection, table: &str) -> Result<()> {
    if !table_exists(conn, table)? {
        return Err(DbLibError::AssertionError(format!(
            "Table: {} was not found",
            table
        )));
    }
    Ok(())
}

/// Return the primary key columns of `table` as a comma-separated list. Unless `accumulate` is
/// set, each key column replaces the previous one, so that for a composite key only the last
/// column (by name) is returned.
pub fn primary_key_columns(
    conn: &mut dyn DbConnection,
    table: &str,
    accumulate: bool,
) -> Result<String> {
    let mut keys = String::from("");
    for column in conn.primary_keys(table)? {
        if accumulate {
            keys.push_str(&format!("{},", column));
        } else {
            keys = format!("{},", column);
        }
    }
    if keys.ends_with(',') {
        keys.pop();
    }
    Ok(keys)
}

/// Compare the primary key columns of `table` with the given comma-separated list, ignoring case.
pub fn check_primary_key_columns(
    conn: &mut dyn DbConnection,
    table: &str,
    column_list: &str,
    accumulate: bool,
) -> Result<()> {
    let keys = primary_key_columns(conn, table, accumulate)?.to_lowercase();
    let column_list = column_list.to_lowercase();
    if column_list != keys {
        return Err(DbLibError::AssertionError(format!(
            "Given column list: {} Keys found: {}",
            column_list, keys
        )));
    }
    Ok(())
}

/// The symbolic name of the session's isolation level, or the empty string if the driver reports
/// a level that has no name.
pub fn isolation_level_name(conn: &mut dyn DbConnection) -> Result<String> {
    let code = conn.isolation_level()?;
    Ok(IsolationLevel::from_code(code)
        .map(|level| level.name().to_string())
        .unwrap_or_default())
}

pub fn isolation_level_must_be(conn: &mut dyn DbConnection, expected: &str) -> Result<()> {
    let actual = isolation_level_name(conn)?;
    if actual != expected {
        return Err(DbLibError::AssertionError(format!(
            "Expected Transaction Isolation Level: {} Level found: {}",
            expected, actual
        )));
    }
    Ok(())
}
