use std::process;

use clap::Parser;

use mockwire::cli::Args;

fn main() {
    let args = Args::parse();
    match mockwire::run(args) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(3);
        }
    }
}
