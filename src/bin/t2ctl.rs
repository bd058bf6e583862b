use clap::Parser;
use t2engine::cli::{run_cli, Cli};
use t2engine::telemetry;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log.as_deref(), cli.json)?;
    let found = run_cli(cli, &mut std::io::stdout().lock())?;
    if !found {
        std::process::exit(1);
    }
    Ok(())
}
