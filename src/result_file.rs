//! Dumping query results to pipe-delimited files and comparing query results with such files.

use crate::{
    gateway::{Cursor, DbConnection},
    library::{DbLibError, Result},
    replay::open_file,
};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
};

/// Render the row the cursor is positioned on as `v1|v2|...|vN|`, writing NULLs as `null_text`.
pub fn render_row(cursor: &dyn Cursor, null_text: &str) -> Result<String> {
    let mut line = String::from("");
    for i in 1..=cursor.column_count() {
        match cursor.get_string(i)? {
            Some(value) => line.push_str(&value),
            None => line.push_str(null_text),
        }
        line.push('|');
    }
    Ok(line)
}

/// Execute `sql` and write each row of its result to the file at `path`, one line per row.
/// Returns the number of rows written.
pub fn store_query_result(
    conn: &mut dyn DbConnection,
    sql: &str,
    path: &str,
    null_text: &str,
) -> Result<usize> {
    let mut cursor = conn.query(sql)?;
    let mut writer = BufWriter::new(File::create(path)?);
    let mut rows = 0;
    while cursor.next()? {
        let line = render_row(cursor.as_ref(), null_text)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        rows += 1;
    }
    writer.flush()?;
    log::debug!("Stored {} row(s) of '{}' in {}", rows, sql, path);
    Ok(rows)
}

/// Execute `sql` and compare its result, row by row, with the lines of the file at `path`. At
/// most `max_diffs` (but at least one) differences are recorded; if there are any the comparison
/// fails with all of them.
pub fn compare_query_result(
    conn: &mut dyn DbConnection,
    sql: &str,
    path: &str,
    null_text: &str,
    max_diffs: usize,
) -> Result<()> {
    let max_diffs = max_diffs.max(1);
    let mut expected_lines = BufReader::new(open_file(path)?).lines();
    let mut cursor = conn.query(sql)?;

    let mut num_diffs = 0;
    let mut diffs = String::from("");
    let mut row = 0;
    let mut file_exhausted = false;
    while num_diffs < max_diffs && cursor.next()? {
        row += 1;
        let actual = render_row(cursor.as_ref(), null_text)?;
        let expected = match expected_lines.next() {
            Some(line) => line?,
            None => {
                num_diffs += 1;
                diffs.push_str("Fewer rows in expected file than in query result\n");
                file_exhausted = true;
                break;
            }
        };
        if actual != expected {
            num_diffs += 1;
            diffs.push_str(&format!(
                "Row {} does not match:\nexp: {}\nact: {}\n",
                row, expected, actual
            ));
        }
    }
    if !file_exhausted && num_diffs < max_diffs && expected_lines.next().is_some() {
        num_diffs += 1;
        diffs.push_str("More rows in expected file than in query result\n");
    }

    if num_diffs > 0 {
        return Err(DbLibError::AssertionError(diffs));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::count::tests::FakeTable;
    use std::fs;

    fn fake_table(rows: usize) -> FakeTable {
        FakeTable {
            rows,
            aggregates: true,
            queries: vec![],
        }
    }

    #[test]
    fn differences_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expected.txt");
        let lines = (0..12).map(|i| format!("x{}|\n", i)).collect::<String>();
        fs::write(&path, lines).unwrap();
        let path = path.to_str().unwrap();

        let mut conn = fake_table(12);
        let err =
            compare_query_result(&mut conn, "SELECT id FROM t", path, "null", 10).unwrap_err();
        let message = err.to_string();
        assert_eq!(message.matches("does not match").count(), 10);
        assert!(message.starts_with("Row 1 does not match:\nexp: x0|\nact: 0|\n"));
        assert!(!message.contains("More rows"));
    }

    #[test]
    fn a_zero_cap_still_reports_differences() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expected.txt");
        fs::write(&path, "x0|\n0|\n").unwrap();
        let path = path.to_str().unwrap();

        let mut conn = fake_table(2);
        let err = compare_query_result(&mut conn, "SELECT id FROM t", path, "null", 0).unwrap_err();
        assert_eq!(err.to_string(), "Row 1 does not match:\nexp: x0|\nact: 0|\n");

        let mut conn = fake_table(1);
        fs::write(path, "0|\n1|\n").unwrap();
        let err = compare_query_result(&mut conn, "SELECT id FROM t", path, "null", 0).unwrap_err();
        assert_eq!(err.to_string(), "More rows in expected file than in query result\n");
    }

    #[test]
    fn stored_rows_compare_equal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        let path = path.to_str().unwrap();

        let mut conn = fake_table(3);
        assert_eq!(store_query_result(&mut conn, "SELECT id FROM t", path, "null").unwrap(), 3);
        assert_eq!(fs::read_to_string(path).unwrap(), "0|\n1|\n2|\n");
        compare_query_result(&mut conn, "SELECT id FROM t", path, "null", 10).unwrap();

        let mut conn = fake_table(4);
        let err =
            compare_query_result(&mut conn, "SELECT id FROM t", path, "null", 10).unwrap_err();
        assert_eq!(err.to_string(), "Fewer rows in expected file than in query result\n");

        let mut conn = fake_table(2);
        let err =
            compare_query_result(&mut conn, "SELECT id FROM t", path, "null", 10).unwrap_err();
        assert_eq!(err.to_string(), "More rows in expected file than in query result\n");
    }
}
