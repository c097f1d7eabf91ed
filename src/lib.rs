//! # dblibrary
//! Database keywords for acceptance testing.
//!
//! A test host registers one or more database connections by name and then runs keywords against
//! the active one: checking that tables exist and hold the expected number of rows, that given
//! rows hold the expected values, replaying SQL files, and exchanging query results with
//! pipe-delimited files.
//!
//! ## Library usage
//! ```no_run
//! use dblibrary::DatabaseLibrary;
//!
//! let mut library = DatabaseLibrary::new();
//! library.connect_to_database("main", "sqlite", "build/sample.db", None, None)?;
//! library.execute_sql_from_file("setup.sql")?;
//! library.table_must_contain_number_of_rows("MySampleTable", 2)?;
//! library.disconnect_from_all_databases()?;
//! # Ok::<(), dblibrary::DbLibError>(())
//! ```
//!
//! Keywords can also be run by name with string arguments, as a test host would:
//! ```no_run
//! use dblibrary::{keywords::run_keyword, DatabaseLibrary};
//!
//! let mut library = DatabaseLibrary::new();
//! let args = ["main", "sqlite", "build/sample.db"].map(String::from);
//! run_keyword(&mut library, "Connect To Database", &args)?;
//! # Ok::<(), dblibrary::DbLibError>(())
//! ```
//!
//! ## Command line usage
//! Run:
//! ```text
//! dblibrary --help
//! ```
//! to see command line options.

pub mod assert;
pub mod count;
pub mod gateway;
pub mod import;
pub mod keywords;
pub mod library;
pub mod observer;
pub mod registry;
pub mod replay;
pub mod result_file;
pub mod schema;
pub mod toolkit;

pub use crate::library::{DatabaseLibrary, DbLibError, LibraryConfig, Result};
