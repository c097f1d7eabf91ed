//! Keyword dispatch: maps the string-typed calls of a test host onto [DatabaseLibrary].

use crate::library::{DatabaseLibrary, DbLibError, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;

/// A keyword and the names of its arguments. Optional arguments end with `=`.
#[derive(Clone, Debug, PartialEq)]
pub struct KeywordSpec {
    pub name: &'static str,
    pub args: &'static [&'static str],
}

impl KeywordSpec {
    fn required_args(&self) -> usize {
        self.args.iter().filter(|a| !a.ends_with('=')).count()
    }
}

macro_rules! keywords {
    ($($name:literal => [$($arg:literal),*]),* $(,)?) => {
        &[$(KeywordSpec { name: $name, args: &[$($arg),*] }),*]
    };
}

/// Every keyword the library offers.
pub const KEYWORDS: &[KeywordSpec] = keywords![
    "connectToDatabase" => ["name", "driverId", "url", "user=", "password="],
    "switchConnection" => ["name"],
    "disconnectFromDatabase" => [],
    "disconnectFromAllDatabases" => [],
    "getCurrentConnectionName" => [],
    "tableMustExist" => ["tableName"],
    "tableMustBeEmpty" => ["tableName"],
    "deleteAllRowsFromTable" => ["tableName"],
    "tableMustContainNumberOfRows" => ["tableName", "rowNumValue"],
    "tableMustContainMoreThanNumberOfRows" => ["tableName", "rowNumValue"],
    "tableMustContainLessThanNumberOfRows" => ["tableName", "rowNumValue"],
    "tablesMustContainSameAmountOfRows" => ["firstTableName", "secondTableName"],
    "checkContentForRowIdentifiedByRownum" =>
        ["columnNames", "expectedValues", "tableName", "rowNumValue"],
    "checkContentForRowIdentifiedByWhereClause" =>
        ["columnNames", "expectedValues", "tableName", "whereClause"],
    "readSingleValueFromTable" => ["tableName", "columnName", "whereClause"],
    "transactionIsolationLevelMustBe" => ["levelName"],
    "getTransactionIsolationLevel" => [],
    "checkPrimaryKeyColumnsForTable" => ["tableName", "columnList"],
    "getPrimaryKeyColumnsForTable" => ["tableName"],
    "executeSql" => ["sqlString"],
    "executeSqlFromFile" => ["fileName"],
    "executeSqlFromFileWithoutTransaction" => ["fileName"],
    "executeSqlFromFileIgnoreErrors" => ["fileName"],
    "executeSqlFromFilePreservingLineBreaks" => ["fileName"],
    "verifyNumberOfRowsMatchingWhere" => ["tableName", "where", "rowNumValue"],
    "rowShouldNotExistInTable" => ["tableName", "whereClause"],
    "storeQueryResultToFile" => ["sqlString", "fileName"],
    "compareQueryResultToFile" => ["sqlString", "fileName"],
    "importTableFromFile" => ["tableName", "file"],
    "setSystemProperty" => ["key", "value"],
];

lazy_static! {
    static ref KEYWORD_INDEX: HashMap<String, &'static KeywordSpec> = KEYWORDS
        .iter()
        .map(|spec| (normalize_keyword_name(spec.name), spec))
        .collect();
}

/// Normalize a keyword name so that `tableMustExist`, `Table Must Exist` and `table_must_exist`
/// all refer to the same keyword.
pub fn normalize_keyword_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(|c| c.to_lowercase())
        .collect()
}

pub fn find_keyword(name: &str) -> Option<&'static KeywordSpec> {
    KEYWORD_INDEX.get(&normalize_keyword_name(name)).copied()
}

/// Parse a decimal row count (or row number) given by the host.
pub fn parse_count(value: &str) -> Result<i64> {
    value.trim().parse::<i64>().map_err(|_| {
        DbLibError::ConfigError(format!("'{}' is not a valid number", value))
    })
}

/// Run the named keyword with the given arguments. Returns the keyword's result for those
/// keywords that have one.
pub fn run_keyword(
    library: &mut DatabaseLibrary,
    name: &str,
    args: &[String],
) -> Result<Option<String>> {
    let spec = find_keyword(name)
        .ok_or(DbLibError::ConfigError(format!("No keyword with name '{}' found", name)))?;
    if args.len() < spec.required_args() || args.len() > spec.args.len() {
        return Err(DbLibError::ConfigError(format!(
            "Keyword '{}' expects {} argument(s) ({}), got {}",
            spec.name,
            if spec.required_args() == spec.args.len() {
                spec.args.len().to_string()
            } else {
                format!("{} to {}", spec.required_args(), spec.args.len())
            },
            spec.args.join(", "),
            args.len()
        )));
    }
    let arg = |i: usize| args[i].as_str();
    let optional = |i: usize| args.get(i).map(|a| a.as_str()).filter(|a| !a.is_empty());

    log::debug!("Running keyword {} {:?}", spec.name, args);
    match spec.name {
        "connectToDatabase" => library
            .connect_to_database(arg(0), arg(1), arg(2), optional(3), optional(4))
            .map(|_| None),
        "switchConnection" => library.switch_connection(arg(0)).map(|_| None),
        "disconnectFromDatabase" => library.disconnect_from_database().map(|_| None),
        "disconnectFromAllDatabases" => library.disconnect_from_all_databases().map(|_| None),
        "getCurrentConnectionName" => Ok(Some(
            library.get_current_connection_name().unwrap_or_default().to_string(),
        )),
        "tableMustExist" => library.table_must_exist(arg(0)).map(|_| None),
        "tableMustBeEmpty" => library.table_must_be_empty(arg(0)).map(|_| None),
        "deleteAllRowsFromTable" => library.delete_all_rows_from_table(arg(0)).map(|_| None),
        "tableMustContainNumberOfRows" => library
            .table_must_contain_number_of_rows(arg(0), parse_count(arg(1))?)
            .map(|_| None),
        "tableMustContainMoreThanNumberOfRows" => library
            .table_must_contain_more_than_number_of_rows(arg(0), parse_count(arg(1))?)
            .map(|_| None),
        "tableMustContainLessThanNumberOfRows" => library
            .table_must_contain_less_than_number_of_rows(arg(0), parse_count(arg(1))?)
            .map(|_| None),
        "tablesMustContainSameAmountOfRows" => library
            .tables_must_contain_same_amount_of_rows(arg(0), arg(1))
            .map(|_| None),
        "checkContentForRowIdentifiedByRownum" => library
            .check_content_for_row_identified_by_rownum(
                arg(0),
                arg(1),
                arg(2),
                parse_count(arg(3))?,
            )
            .map(|_| None),
        "checkContentForRowIdentifiedByWhereClause" => library
            .check_content_for_row_identified_by_where_clause(arg(0), arg(1), arg(2), arg(3))
            .map(|_| None),
        "readSingleValueFromTable" => library
            .read_single_value_from_table(arg(0), arg(1), arg(2))
            .map(Some),
        "transactionIsolationLevelMustBe" => library
            .transaction_isolation_level_must_be(arg(0))
            .map(|_| None),
        "getTransactionIsolationLevel" => library.get_transaction_isolation_level().map(Some),
        "checkPrimaryKeyColumnsForTable" => library
            .check_primary_key_columns_for_table(arg(0), arg(1))
            .map(|_| None),
        "getPrimaryKeyColumnsForTable" => {
            library.get_primary_key_columns_for_table(arg(0)).map(Some)
        }
        "executeSql" => library.execute_sql(arg(0)).map(|_| None),
        "executeSqlFromFile" => library.execute_sql_from_file(arg(0)).map(|_| None),
        "executeSqlFromFileWithoutTransaction" => library
            .execute_sql_from_file_without_transaction(arg(0))
            .map(|_| None),
        "executeSqlFromFileIgnoreErrors" => library
            .execute_sql_from_file_ignore_errors(arg(0))
            .map(|_| None),
        "executeSqlFromFilePreservingLineBreaks" => library
            .execute_sql_from_file_preserving_line_breaks(arg(0))
            .map(|_| None),
        "verifyNumberOfRowsMatchingWhere" => library
            .verify_number_of_rows_matching_where(arg(0), arg(1), parse_count(arg(2))?)
            .map(|_| None),
        "rowShouldNotExistInTable" => library
            .row_should_not_exist_in_table(arg(0), arg(1))
            .map(|_| None),
        "storeQueryResultToFile" => library
            .store_query_result_to_file(arg(0), arg(1))
            .map(|_| None),
        "compareQueryResultToFile" => library
            .compare_query_result_to_file(arg(0), arg(1))
            .map(|_| None),
        "importTableFromFile" => library
            .import_table_from_file(arg(0), arg(1))
            .map(|_| None),
        "setSystemProperty" => library.set_system_property(arg(0), arg(1)).map(|_| None),
        _ => Err(DbLibError::ConfigError(format!(
            "Keyword '{}' is not implemented",
            spec.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn keyword_names_are_normalized() {
        assert_eq!(normalize_keyword_name("Table Must Exist"), "tablemustexist");
        assert_eq!(
            find_keyword("table_must_contain_number_of_rows").map(|k| k.name),
            Some("tableMustContainNumberOfRows")
        );
        assert_eq!(
            find_keyword("Execute SQL From File").map(|k| k.name),
            Some("executeSqlFromFile")
        );
        assert_eq!(find_keyword("Drop Database"), None);
    }

    #[test]
    fn every_keyword_is_indexed() {
        assert_eq!(KEYWORDS.len(), 30);
        assert_eq!(KEYWORD_INDEX.len(), KEYWORDS.len());
        for spec in KEYWORDS {
            assert_eq!(find_keyword(spec.name), Some(spec));
        }
    }

    #[test]
    fn counts_are_parsed_as_signed_integers() {
        assert_eq!(parse_count(" 42 ").unwrap(), 42);
        assert_eq!(parse_count("-1").unwrap(), -1);
        assert!(matches!(parse_count("two"), Err(DbLibError::ConfigError(_))));
        assert!(parse_count("").is_err());
    }

    #[test]
    fn argument_counts_are_checked() {
        let mut library = DatabaseLibrary::new();
        let result = run_keyword(&mut library, "Table Must Exist", &[]);
        assert!(matches!(result, Err(DbLibError::ConfigError(_))));
        let result = run_keyword(&mut library, "connectToDatabase", &strings(&["a", "sqlite"]));
        assert!(matches!(result, Err(DbLibError::ConfigError(_))));
        let result = run_keyword(&mut library, "No Such Keyword", &[]);
        assert!(matches!(result, Err(DbLibError::ConfigError(_))));

        assert_eq!(
            run_keyword(&mut library, "Get Current Connection Name", &[]).unwrap(),
            Some(String::from(""))
        );
        let result = run_keyword(&mut library, "Table Must Exist", &strings(&["t"]));
        assert!(matches!(result, Err(DbLibError::NoActiveConnection)));
    }
}
