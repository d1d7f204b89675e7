use clap::Parser;
use tokio::io::BufReader;
use tracing::Level;

use mysql_rest_plugin::{MysqlPlugin, serve};

/// MySQL plugin: serves CRUD/RPC requests as line-delimited JSON on stdin/stdout.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {}

#[tokio::main]
async fn main() {
    let _args = Args::parse();

    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let plugin: MysqlPlugin = MysqlPlugin::new();
    let input = BufReader::new(tokio::io::stdin());
    if let Err(err) = serve(plugin, input, tokio::io::stdout()).await {
        tracing::error!(error = %err, "plugin server stopped");
        std::process::exit(1);
    }
}
