//! Replaying SQL files: splitting a file into statements and executing them under one of four
//! transactional semantics.

use crate::{
    gateway::DbConnection,
    library::{DbLibError, Result},
    observer::Observer,
};
use std::{
    fs::File,
    io::{BufRead, BufReader, ErrorKind, Lines},
    path::Path,
};

/// How the statements of a file are executed and how errors are handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayMode {
    /// Execute each statement as it comes, in auto-commit mode, stopping at the first error.
    Strict,
    /// Execute all statements in one transaction, rolling it back on the first error.
    Transactional,
    /// Execute all statements in one transaction, reporting errors and carrying on.
    BestEffort,
    /// Like [ReplayMode::Transactional], but keep each statement's line breaks and treat no
    /// lines as comments.
    PreserveLineBreaks,
}

impl ReplayMode {
    fn is_transactional(&self) -> bool {
        *self != ReplayMode::Strict
    }
}

/// Given a (trimmed) line of a SQL file, determine whether it is a comment.
pub fn is_comment(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower == "rem"
        || lower.starts_with("rem ")
        || lower.starts_with("rem\t")
        || line.starts_with('#')
}

/// Splits the lines of a SQL file into statements. A statement ends when the text accumulated so
/// far ends with `;`, which is removed. Empty statements are skipped.
pub struct StatementScanner<R> {
    lines: Lines<R>,
    mode: ReplayMode,
    buffer: String,
}

impl<R: BufRead> StatementScanner<R> {
    pub fn new(reader: R, mode: ReplayMode) -> Self {
        Self {
            lines: reader.lines(),
            mode,
            buffer: String::from(""),
        }
    }

    fn append(&mut self, line: &str) {
        match self.mode {
            ReplayMode::Strict | ReplayMode::Transactional => {
                self.buffer.push(' ');
                self.buffer.push_str(line);
            }
            ReplayMode::BestEffort => self.buffer.push_str(line),
            ReplayMode::PreserveLineBreaks => {
                if !self.buffer.is_empty() {
                    self.buffer.push('\n');
                }
                self.buffer.push_str(line);
            }
        }
    }

    /// If the buffer holds a complete statement, take it.
    fn take_statement(&mut self) -> Option<String> {
        let complete = match self.mode {
            ReplayMode::PreserveLineBreaks => self.buffer.trim_end().ends_with(';'),
            _ => self.buffer.ends_with(';'),
        };
        if !complete {
            return None;
        }

        let buffer = std::mem::take(&mut self.buffer);
        let body = buffer.trim_end();
        let body = body.strip_suffix(';').unwrap_or(body);
        match self.mode {
            ReplayMode::BestEffort => Some(body.to_string()),
            _ => Some(body.trim().to_string()),
        }
    }
}

impl<R: BufRead> Iterator for StatementScanner<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Some(Err(e.into())),
                None => {
                    if !self.buffer.trim().is_empty() {
                        log::warn!(
                            "Ignoring unterminated statement at end of file: {}",
                            self.buffer.trim()
                        );
                        self.buffer.clear();
                    }
                    return None;
                }
            };

            if self.mode != ReplayMode::PreserveLineBreaks {
                let line = line.trim();
                if is_comment(line) {
                    continue;
                }
                self.append(line);
            } else {
                self.append(&line);
            }

            if let Some(statement) = self.take_statement() {
                if statement.trim().is_empty() {
                    continue;
                }
                return Some(Ok(statement));
            }
        }
    }
}

/// Open a SQL (or data) file for reading, reporting a missing file as such.
pub(crate) fn open_file(path: &str) -> Result<File> {
    File::open(Path::new(path)).map_err(|e| match e.kind() {
        ErrorKind::NotFound => DbLibError::FileNotFound(path.to_string()),
        _ => DbLibError::IoError(e),
    })
}

/// Execute the statements in the file at `path` according to the given mode.
pub fn replay_file(
    conn: &mut dyn DbConnection,
    observer: &Observer,
    path: &str,
    mode: ReplayMode,
) -> Result<()> {
    let file = open_file(path)?;
    let scanner = StatementScanner::new(BufReader::new(file), mode);
    if !mode.is_transactional() {
        return run_statements(conn, observer, scanner, mode);
    }

    conn.set_auto_commit(false)?;
    let mut result = run_statements(conn, observer, scanner, mode);
    if result.is_ok() {
        result = conn.commit();
    } else if let Err(e) = conn.rollback() {
        log::warn!("Rollback after failed replay of {} failed: {}", path, e);
    }
    let restored = conn.set_auto_commit(true);
    result.and(restored)
}

fn run_statements<R: BufRead>(
    conn: &mut dyn DbConnection,
    observer: &Observer,
    scanner: StatementScanner<R>,
    mode: ReplayMode,
) -> Result<()> {
    for statement in scanner {
        let statement = statement?;
        observer.emit(&format!("Executing: {}", statement));
        match conn.execute(&statement) {
            Ok(()) => (),
            Err(DbLibError::SqlError(message)) if mode == ReplayMode::BestEffort => {
                observer.emit(&format!("Error executing: {}\n{}", statement, message));
            }
            Err(DbLibError::SqlError(message)) => {
                return Err(DbLibError::ReplayError {
                    mode,
                    statement,
                    message,
                })
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn scan(text: &str, mode: ReplayMode) -> Vec<String> {
        StatementScanner::new(text.as_bytes(), mode)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    const SCRIPT: &str = indoc! {r#"
        REM Creates the sample table
        # another comment
        CREATE TABLE Sample (
          Id INTEGER,
          Name VARCHAR(20)
        );
        INSERT INTO Sample VALUES (1, 'Remy');
        ;
        remark: not a statement of its own
        SELECT 1;
    "#};

    #[test]
    fn strict_scanner_joins_lines_with_a_space() {
        assert_eq!(
            scan(SCRIPT, ReplayMode::Strict),
            vec![
                "CREATE TABLE Sample ( Id INTEGER, Name VARCHAR(20) )",
                "INSERT INTO Sample VALUES (1, 'Remy')",
                "remark: not a statement of its own SELECT 1",
            ]
        );
    }

    #[test]
    fn best_effort_scanner_joins_lines_without_a_space() {
        assert_eq!(
            scan(SCRIPT, ReplayMode::BestEffort),
            vec![
                "CREATE TABLE Sample (Id INTEGER,Name VARCHAR(20))",
                "INSERT INTO Sample VALUES (1, 'Remy')",
                "remark: not a statement of its ownSELECT 1",
            ]
        );
    }

    #[test]
    fn preserving_scanner_keeps_line_breaks_and_comments() {
        let text = "# header\nCREATE TABLE t (\n  a INTEGER\n);  \nSELECT 1;";
        assert_eq!(
            scan(text, ReplayMode::PreserveLineBreaks),
            vec!["# header\nCREATE TABLE t (\n  a INTEGER\n)", "SELECT 1"]
        );
    }

    #[test]
    fn unterminated_tail_is_not_returned() {
        assert_eq!(
            scan("SELECT 1;\nSELECT 2", ReplayMode::Transactional),
            vec!["SELECT 1"]
        );
    }

    #[test]
    fn comment_lines() {
        assert!(is_comment("REM"));
        assert!(is_comment("rem this is a comment"));
        assert!(is_comment("# so is this"));
        assert!(!is_comment("remove"));
        assert!(!is_comment("SELECT 1; # trailing"));
    }

    #[test]
    fn missing_file_is_reported() {
        assert!(matches!(
            open_file("/nonexistent/dblibrary/script.sql"),
            Err(DbLibError::FileNotFound(_))
        ));
    }
}
