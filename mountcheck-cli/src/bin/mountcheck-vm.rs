use clap::Parser;

use mountcheck_cli::cli::VmCli;
use mountcheck_cli::commands::vm;

fn main() {
    let cli = VmCli::parse();
    let code = match vm::run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            e.exit_code()
        }
    };
    std::process::exit(code);
}
