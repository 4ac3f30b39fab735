//! StanzaFlow CLI
//!
//! Compiles `.sf.md` workflows to IR and validates IR documents.

use stanzaflow::cli;

fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = cli::run_cli() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
