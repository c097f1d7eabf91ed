mod cli;

use anyhow::Result;

fn main() -> Result<()> {
    let _ = env_logger::try_init();
    cli::process_command()
}
