//! Row and value assertions: row counts, row contents by position or where-clause, single values.

use crate::{
    count::{count_rows, UNLIMITED},
    gateway::{Cursor, DbConnection},
    library::{DbLibError, Result},
    observer::Observer,
};

/// The token that stands for an expected empty value in a pipe-separated list of values.
pub const NULL_TOKEN: &str = "(NULL)";

/// Drop the empty fields at the end of a split line, so that `a|b|` yields two fields.
pub(crate) fn drop_trailing_empty(mut fields: Vec<String>) -> Vec<String> {
    while fields.last().map_or(false, |f| f.is_empty()) {
        fields.pop();
    }
    fields
}

/// Comma-separated column names paired with the pipe-separated values expected in them.
#[derive(Clone, Debug, PartialEq)]
pub struct RowExpectation {
    pub columns: Vec<String>,
    pub values: Vec<String>,
}

impl RowExpectation {
    pub fn parse(columns: &str, values: &str) -> Result<Self> {
        let columns = columns
            .split(',')
            .map(|c| c.trim().to_string())
            .collect::<Vec<_>>();
        let values = drop_trailing_empty(values.split('|').map(|v| v.to_string()).collect())
            .into_iter()
            .map(|v| if v == NULL_TOKEN { String::from("") } else { v })
            .collect::<Vec<_>>();
        if columns.iter().any(|c| c.is_empty()) {
            return Err(DbLibError::ConfigError(format!(
                "Empty column name in column list '{}'",
                columns.join(",")
            )));
        }
        if columns.len() != values.len() {
            return Err(DbLibError::ConfigError(format!(
                "Given {} column(s) {:?} but {} value(s) {:?}",
                columns.len(),
                columns,
                values.len(),
                values
            )));
        }
        Ok(Self { columns, values })
    }

    fn select(&self, table: &str) -> String {
        format!("SELECT {} FROM {}", self.columns.join(","), table)
    }

    /// Compare the row the cursor is positioned on with the expected values. NULLs compare as the
    /// empty string.
    fn compare(&self, cursor: &dyn Cursor) -> Result<()> {
        for (column, expected) in self.columns.iter().zip(self.values.iter()) {
            let actual = cursor.get_string_by_name(column)?.unwrap_or_default();
            log::debug!("{} -> {}", column, actual);
            if &actual != expected {
                return Err(DbLibError::ValueMismatch {
                    column: column.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

pub fn table_must_contain_number_of_rows(
    conn: &mut dyn DbConnection,
    observer: &Observer,
    table: &str,
    expected: i64,
) -> Result<()> {
    let num = count_rows(conn, observer, table, None, expected.saturating_add(1))?;
    if num != expected {
        return Err(DbLibError::AssertionError(format!(
            "Expecting {} rows in table '{}', fetched: {}",
            expected, table, num
        )));
    }
    Ok(())
}

pub fn table_must_be_empty(
    conn: &mut dyn DbConnection,
    observer: &Observer,
    table: &str,
) -> Result<()> {
    table_must_contain_number_of_rows(conn, observer, table, 0)
}

pub fn table_must_contain_more_than(
    conn: &mut dyn DbConnection,
    observer: &Observer,
    table: &str,
    bound: i64,
) -> Result<()> {
    let num = count_rows(conn, observer, table, None, bound.saturating_add(1))?;
    if num <= bound {
        return Err(DbLibError::AssertionError(format!(
            "Expecting more than {} rows in table '{}', fetched: {}",
            bound, table, num
        )));
    }
    Ok(())
}

pub fn table_must_contain_less_than(
    conn: &mut dyn DbConnection,
    observer: &Observer,
    table: &str,
    bound: i64,
) -> Result<()> {
    let num = count_rows(conn, observer, table, None, bound)?;
    if num >= bound {
        return Err(DbLibError::AssertionError(format!(
            "Expecting less than {} rows in table '{}', fetched: {}",
            bound, table, num
        )));
    }
    Ok(())
}

pub fn tables_must_contain_same_amount_of_rows(
    conn: &mut dyn DbConnection,
    observer: &Observer,
    first_table: &str,
    second_table: &str,
) -> Result<()> {
    let first = count_rows(conn, observer, first_table, None, UNLIMITED)?;
    let second = count_rows(conn, observer, second_table, None, UNLIMITED)?;
    if first != second {
        return Err(DbLibError::AssertionError(format!(
            "Expecting same amount of rows, but table {} has {} rows and table {} has {} rows!",
            first_table, first, second_table, second
        )));
    }
    Ok(())
}

pub fn verify_number_of_rows_matching_where(
    conn: &mut dyn DbConnection,
    observer: &Observer,
    table: &str,
    where_clause: &str,
    expected: i64,
) -> Result<()> {
    let num = count_rows(conn, observer, table, Some(where_clause), expected.saturating_add(1))?;
    if num != expected {
        return Err(DbLibError::AssertionError(format!(
            "Expecting {} rows, fetched: {}",
            expected, num
        )));
    }
    Ok(())
}

/// Check the values of the `rownum`th (1-based) row of `SELECT <columns> FROM <table>`.
pub fn check_row_by_rownum(
    conn: &mut dyn DbConnection,
    expectation: &RowExpectation,
    table: &str,
    rownum: i64,
) -> Result<()> {
    if rownum < 1 {
        return Err(DbLibError::ConfigError(format!(
            "Row numbers start at 1, got {}",
            rownum
        )));
    }
    let sql = expectation.select(table);
    log::debug!("Checking row {} of: {}", rownum, sql);
    let mut cursor = conn.query(&sql)?;
    let mut count = 0;
    while cursor.next()? {
        count += 1;
        if count == rownum {
            return expectation.compare(cursor.as_ref());
        }
    }
    Err(DbLibError::RowNotFound(sql.to_string()))
}

/// Check the values of the single row selected by the where-clause.
pub fn check_row_by_where(
    conn: &mut dyn DbConnection,
    expectation: &RowExpectation,
    table: &str,
    where_clause: &str,
) -> Result<()> {
    let sql = format!("{} WHERE {}", expectation.select(table), where_clause);
    log::debug!("Checking row of: {}", sql);
    let mut cursor = conn.query(&sql)?;
    if !cursor.next()? {
        return Err(DbLibError::NoRow(sql.to_string()));
    }
    expectation.compare(cursor.as_ref())?;
    if cursor.next()? {
        return Err(DbLibError::MultipleRows(format!(
            "More than one row fetched by given where-clause for statement: {}",
            sql
        )));
    }
    Ok(())
}

/// Read `column` from the row of `table` selected by the where-clause. No row yields the empty
/// string, as does a NULL value.
pub fn read_single_value(
    conn: &mut dyn DbConnection,
    table: &str,
    column: &str,
    where_clause: &str,
) -> Result<String> {
    let sql = format!("SELECT {} FROM {} WHERE {}", column, table, where_clause);
    let mut cursor = conn.query(&sql)?;
    let mut value = String::from("");
    if cursor.next()? {
        value = cursor.get_string_by_name(column)?.unwrap_or_default();
    }
    if cursor.next()? {
        return Err(DbLibError::MultipleRows(format!(
            "More than one value fetched for: {}",
            sql
        )));
    }
    Ok(value)
}

pub fn row_should_not_exist(
    conn: &mut dyn DbConnection,
    table: &str,
    where_clause: &str,
) -> Result<()> {
    let sql = format!("SELECT * FROM {} WHERE {}", table, where_clause);
    let mut cursor = conn.query(&sql)?;
    if cursor.next()? {
        return Err(DbLibError::AssertionError(format!(
            "Row exists (but should not) for where-clause: {} in table: {}",
            where_clause, table
        )));
    }
    Ok(())
}
