use clap::Parser;
use recurrence::Cli;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cmd: Cli = Cli::parse();
    if let Err(e) = cmd.run_program() {
        tracing::error!("{e}");
        std::process::exit(e.exit_code());
    }
}
