//! Importing pipe-delimited files into tables.

use crate::{
    assert::drop_trailing_empty,
    gateway::DbConnection,
    library::{DbLibError, Result},
    replay::open_file,
};
use csv::ReaderBuilder;

/// Insert one row into `table` per line of the pipe-delimited file at `path`. The tokens `NULL`
/// and `(NULL)` (in any case) are inserted as SQL NULL; everything else is passed to the database
/// as text, through a placeholder that converts it to the column's type. Returns the number of
/// rows inserted.
pub fn import_table_from_file(
    conn: &mut dyn DbConnection,
    table: &str,
    path: &str,
) -> Result<usize> {
    let columns = conn.describe_columns(&format!("SELECT * FROM {} WHERE 1=0", table))?;
    if columns.is_empty() {
        return Err(DbLibError::DataError(format!(
            "Unable to determine the columns of table {}",
            table
        )));
    }
    let placeholders = columns
        .iter()
        .map(|c| conn.text_placeholder(&c.type_name))
        .collect::<Vec<_>>()
        .join(",");
    let mut statement = conn.prepare(&format!("INSERT INTO {} VALUES ({})", table, placeholders))?;

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'|')
        .quoting(false)
        .flexible(true)
        .from_reader(open_file(path)?);

    let mut inserted = 0;
    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        let values = drop_trailing_empty(record.iter().map(|v| v.to_string()).collect());
        if values.len() != columns.len() {
            return Err(DbLibError::ColumnCountMismatch {
                line: record.position().map_or(i + 1, |p| p.line() as usize),
                expected: columns.len(),
                found: values.len(),
            });
        }

        for (j, value) in values.iter().enumerate() {
            let upper = value.to_uppercase();
            if upper == "NULL" || upper == "(NULL)" {
                statement.set_null(j + 1)?;
            } else {
                statement.set_object(j + 1, value)?;
            }
        }
        conn.execute_prepared(&statement)?;
        inserted += 1;
    }

    log::debug!("Imported {} row(s) from {} into {}", inserted, path, table);
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ColumnDescription, Cursor, PreparedStatement};
    use pretty_assertions::assert_eq;
    use std::fs;

    /// A connection to a typed table that, like PostgreSQL, needs text cast to the column type.
    #[derive(Default)]
    struct TypedTable {
        inserted: Vec<(String, Vec<Option<String>>)>,
    }

    impl DbConnection for TypedTable {
        fn execute(&mut self, _sql: &str) -> Result<()> {
            Ok(())
        }
        fn query<'c>(&'c mut self, sql: &'c str) -> Result<Box<dyn Cursor + 'c>> {
            Err(DbLibError::SqlError(sql.to_string()))
        }
        fn describe_columns(&mut self, _sql: &str) -> Result<Vec<ColumnDescription>> {
            Ok([("id", "INT4"), ("amount", "NUMERIC"), ("note", "TEXT")]
                .iter()
                .map(|(name, type_name)| ColumnDescription {
                    name: name.to_string(),
                    type_name: type_name.to_string(),
                })
                .collect())
        }
        fn tables(&mut self, _name_pattern: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
        fn primary_keys(&mut self, _table: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
        fn isolation_level(&mut self) -> Result<i32> {
            Ok(0)
        }
        fn auto_commit(&self) -> bool {
            true
        }
        fn set_auto_commit(&mut self, _auto_commit: bool) -> Result<()> {
            Ok(())
        }
        fn commit(&mut self) -> Result<()> {
            Ok(())
        }
        fn rollback(&mut self) -> Result<()> {
            Ok(())
        }
        fn prepare(&mut self, sql: &str) -> Result<PreparedStatement> {
            Ok(PreparedStatement::new(sql, sql.matches('?').count()))
        }
        fn execute_prepared(&mut self, statement: &PreparedStatement) -> Result<()> {
            self.inserted.push((
                statement.sql().to_string(),
                statement.parameters().to_vec(),
            ));
            Ok(())
        }
        fn text_placeholder(&self, type_name: &str) -> String {
            format!("CAST(? AS {})", type_name)
        }
        fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn values_are_cast_to_the_column_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("amounts.txt");
        fs::write(&path, "1|1.50|first|\n2|null|(NULL)\n").unwrap();

        let mut conn = TypedTable::default();
        let inserted = import_table_from_file(&mut conn, "amounts", path.to_str().unwrap());
        assert_eq!(inserted.unwrap(), 2);

        let sql = concat!(
            "INSERT INTO amounts VALUES ",
            "(CAST(? AS INT4),CAST(? AS NUMERIC),CAST(? AS TEXT))"
        );
        assert_eq!(
            conn.inserted,
            vec![
                (
                    sql.to_string(),
                    vec![
                        Some("1".to_string()),
                        Some("1.50".to_string()),
                        Some("first".to_string())
                    ]
                ),
                (sql.to_string(), vec![Some("2".to_string()), None, None]),
            ]
        );
    }
}
