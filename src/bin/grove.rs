//! One-shot entrypoint: run every configured instance once, then exit.

use clap::Parser;
use rustc_hash::FxHashMap;

use grove::connectors::ConnectorRegistry;
use grove::runtime::entry::{self, Mode};

/// Run every configured collection instance once and exit.
///
/// All configuration is environmental; see the GROVE_* variables in the
/// crate documentation.
#[derive(Parser)]
#[command(name = "grove", version)]
struct Cli {}

#[tokio::main]
async fn main() {
    let _cli = Cli::parse();
    grove::telemetry::init();

    // Deployments register their connector bodies here before dispatch.
    let connectors = ConnectorRegistry::new();

    let mut runtime = FxHashMap::default();
    runtime.insert("entrypoint".to_string(), "grove".to_string());
    runtime.insert("pid".to_string(), std::process::id().to_string());

    let code = entry::run(Mode::OneShot, connectors, runtime).await;
    std::process::exit(code);
}
