//! Runs only when DBLIB_TEST_POSTGRES holds the URL of a PostgreSQL database to test against.

use dblibrary::{DatabaseLibrary, LibraryConfig};
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::fs;

fn connect() -> Option<DatabaseLibrary> {
    let url = std::env::var("DBLIB_TEST_POSTGRES")
        .ok()
        .filter(|url| !url.trim().is_empty())?;
    let mut library = DatabaseLibrary::with_config(LibraryConfig::default());
    library
        .connect_to_database("pg", "org.postgresql.Driver", &url, None, None)
        .unwrap();
    Some(library)
}

#[test]
fn typed_values_render_as_text() {
    let mut library = match connect() {
        Some(library) => library,
        None => return,
    };

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("typed.txt");
    let file = file.to_str().unwrap();
    library
        .store_query_result_to_file(
            indoc! {"
                SELECT CAST(1.50 AS NUMERIC) AS amount,
                       DATE '2010-02-26' AS day,
                       TIMESTAMP '2010-02-26 12:42:58' AS posted,
                       CAST(NULL AS DATE) AS missing
            "},
            file,
        )
        .unwrap();
    assert_eq!(
        fs::read_to_string(file).unwrap(),
        "1.50|2010-02-26|2010-02-26 12:42:58|null|\n"
    );
    library.disconnect_from_all_databases().unwrap();
}

#[test]
fn import_converts_text_to_column_types() {
    let mut library = match connect() {
        Some(library) => library,
        None => return,
    };
    let table = format!("dblib_import_{}", std::process::id());
    library
        .execute_sql(&format!("DROP TABLE IF EXISTS {}", table))
        .unwrap();
    library
        .execute_sql(&format!(
            "CREATE TABLE {} (id INTEGER, amount NUMERIC, day DATE, name TEXT)",
            table
        ))
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("rows.txt");
    fs::write(&data, "1|1.50|2010-02-26|Donny Darko|\n2|NULL|(null)|Darth Vader\n").unwrap();
    let imported = library.import_table_from_file(&table, data.to_str().unwrap());

    let checked = imported.and_then(|count| {
        assert_eq!(count, 2);
        library.table_must_contain_number_of_rows(&table, 2)?;
        library.check_content_for_row_identified_by_where_clause(
            "amount,day,name",
            "1.50|2010-02-26|Donny Darko",
            &table,
            "id = 1",
        )?;
        library.verify_number_of_rows_matching_where(&table, "amount IS NULL AND day IS NULL", 1)
    });
    library
        .execute_sql(&format!("DROP TABLE {}", table))
        .unwrap();
    library.disconnect_from_all_databases().unwrap();
    checked.unwrap();
}
