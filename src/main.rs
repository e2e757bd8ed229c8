use clap::Parser;
use restack_cli::cli::output::Output;
use restack_cli::cli::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(err) = cli.run() {
        Output::error(&err);
        std::process::exit(err.exit_code());
    }
}
