use clap::Parser;

use mountcheck_cli::cli::HarnessCli;
use mountcheck_cli::commands::harness;

fn main() {
    let cli = HarnessCli::parse();
    let code = match harness::run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}
