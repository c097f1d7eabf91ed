use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, Subcommand};
use csv::ReaderBuilder;
use dblibrary::{
    keywords::{run_keyword, KEYWORDS},
    library::{DatabaseLibrary, LibraryConfig},
    observer::Observer,
};

/// The name under which the connection given by --database is registered.
static DEFAULT_CONNECTION: &str = "default";

#[derive(Parser)]
#[command(version,
          about = "dblibrary: database keywords for acceptance testing -- command line interface",
          long_about = None)]
pub struct Cli {
    /// Read library settings from the given JSON file. If unspecified, the settings file is read
    /// from the environment variable DBLIB_CONFIG, if it is defined.
    #[arg(long, action = ArgAction::Set, env = "DBLIB_CONFIG")]
    pub config: Option<String>,

    /// Connect to this database, as the connection named 'default', before running any keyword.
    /// Can be a URL (optionally prefixed with `jdbc:`) or the path to a sqlite database.
    #[arg(long, action = ArgAction::Set, env = "DBLIB_DATABASE")]
    pub database: Option<String>,

    /// The driver to use for --database.
    #[arg(long, action = ArgAction::Set, env = "DBLIB_DRIVER", default_value = "sqlite")]
    pub driver: String,

    /// Report every keyword that passes, not only those that fail.
    #[arg(long, action = ArgAction::SetTrue)]
    pub verbose: bool,

    // Subcommands:
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a script of keywords. Each line of SCRIPT holds a keyword followed by its arguments,
    /// separated by tabs. Lines starting with '#' are ignored.
    Run {
        #[arg(long, action = ArgAction::SetTrue,
              help = "Keep running the script after a keyword fails")]
        continue_on_failure: bool,

        #[arg(value_name = "SCRIPT", action = ArgAction::Set,
              help = "A tab-separated keyword script")]
        script: String,
    },

    /// Run a single keyword.
    Exec {
        #[arg(value_name = "KEYWORD", action = ArgAction::Set,
              help = "A keyword name, e.g. 'Table Must Exist' or tableMustExist")]
        keyword: String,

        #[arg(value_name = "ARGS", action = ArgAction::Append, allow_hyphen_values = true,
              help = "The arguments to the keyword")]
        args: Vec<String>,
    },

    /// List the available keywords and their arguments.
    Keywords {},
}

/// Run a keyword, printing its result if it has one. Returns whether the keyword passed.
fn run_and_report(
    library: &mut DatabaseLibrary,
    keyword: &str,
    args: &[String],
    verbose: bool,
) -> bool {
    match run_keyword(library, keyword, args) {
        Ok(result) => {
            if let Some(result) = result {
                println!("{}", result);
            }
            if verbose {
                println!("PASS {} {}", keyword, args.join(" | "));
            }
            true
        }
        Err(e) => {
            let kind = if e.is_assertion() { "FAIL" } else { "ERROR" };
            eprintln!("{} {} {}: {}", kind, keyword, args.join(" | "), e);
            false
        }
    }
}

fn run_script(
    library: &mut DatabaseLibrary,
    script: &str,
    continue_on_failure: bool,
    verbose: bool,
) -> Result<usize> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .flexible(true)
        .quoting(false)
        .comment(Some(b'#'))
        .from_path(script)
        .map_err(|e| anyhow!("Unable to read {}: {}", script, e))?;

    let mut failures = 0;
    for result in rdr.records() {
        let record = result?;
        let mut fields = record.iter().map(|f| f.to_string());
        let keyword = match fields.next() {
            Some(keyword) if !keyword.trim().is_empty() => keyword,
            _ => continue,
        };
        let args = fields.collect::<Vec<_>>();
        if !run_and_report(library, keyword.trim(), &args, verbose) {
            failures += 1;
            if !continue_on_failure {
                break;
            }
        }
    }
    Ok(failures)
}

/// Process dblibrary commands and command-line options.
pub fn process_command() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Keywords {} = &cli.command {
        for spec in KEYWORDS {
            println!("{}\t{}", spec.name, spec.args.join("\t"));
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => LibraryConfig::from_json_file(path)?,
        None => LibraryConfig::default(),
    };
    let mut library = DatabaseLibrary::with_config(config);
    library.set_observer(Observer::stdout());
    if let Some(database) = &cli.database {
        library.connect_to_database(DEFAULT_CONNECTION, &cli.driver, database, None, None)?;
    }

    let failures = match &cli.command {
        Commands::Run {
            continue_on_failure,
            script,
        } => run_script(&mut library, script, *continue_on_failure, cli.verbose)?,
        Commands::Exec { keyword, args } => {
            match run_and_report(&mut library, keyword, args, cli.verbose) {
                true => 0,
                false => 1,
            }
        }
        Commands::Keywords {} => 0,
    };

    if let Err(e) = library.disconnect_from_all_databases() {
        log::warn!("Error disconnecting: {}", e);
    }

    // Set the exit status:
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
