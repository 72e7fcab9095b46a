use crate::demo::{run_demo, run_emi, DemoArgs, EmiArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use lendflow::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Lendflow Loan Desk",
    about = "Run the personal-loan pipeline service or exercise it from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print EMI, FOIR and the underwriting decision for the given numbers
    Emi(EmiArgs),
    /// Run a scripted end-to-end loan conversation over in-memory stores
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Emi(args) => run_emi(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
