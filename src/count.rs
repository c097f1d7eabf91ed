//! Row counting, with a bounded fallback for databases that refuse `COUNT(*)`.

use crate::{
    gateway::DbConnection,
    library::{DbLibError, Result},
    observer::Observer,
};

/// The limit to pass to [count_rows] when no bound on the fallback scan is wanted.
pub const UNLIMITED: i64 = i64::MAX;

/// Count the rows of `table` that satisfy the optional where-clause. If `SELECT COUNT(*)` fails
/// with a SQL error the rows are counted by scanning `SELECT *` instead, stopping once `limit`
/// rows have been seen. In that case a return value equal to `limit` means "at least `limit`".
pub fn count_rows(
    conn: &mut dyn DbConnection,
    observer: &Observer,
    table: &str,
    where_clause: Option<&str>,
    limit: i64,
) -> Result<i64> {
    if table.trim().is_empty() {
        return Err(DbLibError::ConfigError("A table name is required".to_string()));
    }
    let filter = match where_clause.map(|w| w.trim()) {
        Some(w) if !w.is_empty() => format!(" WHERE {}", w),
        _ => String::from(""),
    };

    let sql = format!("SELECT COUNT(*) FROM {}{}", table, filter);
    match count_with_aggregate(conn, &sql) {
        Err(DbLibError::SqlError(e)) => {
            observer.emit(&format!(
                "Falling back to counting rows with SELECT * ({}), since COUNT(*) failed: {}",
                if limit == UNLIMITED {
                    "no limit".to_string()
                } else {
                    format!("limit {}", limit)
                },
                e
            ));
            let sql = format!("SELECT * FROM {}{}", table, filter);
            count_by_scanning(conn, &sql, limit)
        }
        result => result,
    }
}

fn count_with_aggregate(conn: &mut dyn DbConnection, sql: &str) -> Result<i64> {
    log::debug!("Counting rows: {}", sql);
    let mut cursor = conn.query(sql)?;
    if !cursor.next()? {
        return Err(DbLibError::DataError(format!("No count returned for: {}", sql)));
    }
    let count = cursor.get_string(1)?.unwrap_or_default();
    count.trim().parse::<i64>().map_err(|e| {
        DbLibError::DataError(format!("Invalid count '{}' returned for: {} ({})", count, sql, e))
    })
}

fn count_by_scanning(conn: &mut dyn DbConnection, sql: &str, limit: i64) -> Result<i64> {
    log::debug!("Counting rows by scanning: {}", sql);
    let mut cursor = conn.query(sql)?;
    let mut num = 0;
    while num < limit && cursor.next()? {
        num += 1;
    }
    Ok(num)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gateway::{ColumnDescription, Cursor, PreparedStatement};
    use std::sync::{Arc, Mutex};

    /// A cursor over rows held in memory.
    pub struct VecCursor {
        pub columns: Vec<String>,
        pub rows: Vec<Vec<Option<String>>>,
        pub position: usize,
    }

    impl Cursor for VecCursor {
        fn next(&mut self) -> Result<bool> {
            if self.position < self.rows.len() {
                self.position += 1;
                Ok(true)
            } else {
                Ok(false)
            }
        }
        fn columns(&self) -> &[String] {
            &self.columns
        }
        fn get_string(&self, index: usize) -> Result<Option<String>> {
            Ok(self.rows[self.position - 1][index - 1].clone())
        }
    }

    /// A connection holding a single table of `n` rows, which rejects `COUNT(*)` when
    /// `aggregates` is false, and records the queries it receives.
    pub struct FakeTable {
        pub rows: usize,
        pub aggregates: bool,
        pub queries: Vec<String>,
    }

    impl DbConnection for FakeTable {
        fn execute(&mut self, _sql: &str) -> Result<()> {
            Ok(())
        }
        fn query<'c>(&'c mut self, sql: &'c str) -> Result<Box<dyn Cursor + 'c>> {
            self.queries.push(sql.to_string());
            if sql.starts_with("SELECT COUNT(*)") {
                if !self.aggregates {
                    return Err(DbLibError::SqlError("COUNT not supported".to_string()));
                }
                return Ok(Box::new(VecCursor {
                    columns: vec!["count".to_string()],
                    rows: vec![vec![Some(self.rows.to_string())]],
                    position: 0,
                }));
            }
            Ok(Box::new(VecCursor {
                columns: vec!["id".to_string()],
                rows: (0..self.rows).map(|i| vec![Some(i.to_string())]).collect(),
                position: 0,
            }))
        }
        fn describe_columns(&mut self, _sql: &str) -> Result<Vec<ColumnDescription>> {
            Ok(vec![ColumnDescription {
                name: "id".to_string(),
                type_name: "INTEGER".to_string(),
            }])
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
            Ok(PreparedStatement::new(sql, 0))
        }
        fn execute_prepared(&mut self, _statement: &PreparedStatement) -> Result<()> {
            Ok(())
        }
        fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn fake_table(rows: usize, aggregates: bool) -> FakeTable {
        FakeTable {
            rows,
            aggregates,
            queries: vec![],
        }
    }

    #[test]
    fn count_uses_aggregate_when_available() {
        let lines = Arc::new(Mutex::new(vec![]));
        let observer = Observer::collecting(lines.clone());
        let mut conn = fake_table(7, true);
        assert_eq!(count_rows(&mut conn, &observer, "t", None, 3).unwrap(), 7);
        assert_eq!(conn.queries, vec!["SELECT COUNT(*) FROM t"]);
        assert!(lines.lock().unwrap().is_empty());
    }

    #[test]
    fn fallback_stops_at_limit() {
        let lines = Arc::new(Mutex::new(vec![]));
        let observer = Observer::collecting(lines.clone());
        let mut conn = fake_table(7, false);

        assert_eq!(count_rows(&mut conn, &observer, "t", Some("id > 0"), 3).unwrap(), 3);
        assert_eq!(
            conn.queries,
            vec!["SELECT COUNT(*) FROM t WHERE id > 0", "SELECT * FROM t WHERE id > 0"]
        );
        assert_eq!(count_rows(&mut conn, &observer, "t", None, 8).unwrap(), 7);
        assert_eq!(count_rows(&mut conn, &observer, "t", Some("  "), UNLIMITED).unwrap(), 7);
        assert_eq!(conn.queries.last().unwrap(), "SELECT * FROM t");
        assert_eq!(lines.lock().unwrap().len(), 3);
    }

    #[test]
    fn empty_table_name_is_not_a_sql_error() {
        let observer = Observer::new(|_| {});
        let mut conn = fake_table(1, false);
        assert!(matches!(
            count_rows(&mut conn, &observer, " ", None, 1),
            Err(DbLibError::ConfigError(_))
        ));
        assert!(conn.queries.is_empty());
    }
}
