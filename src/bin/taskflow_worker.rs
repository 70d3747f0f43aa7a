use clap::Parser;
use taskflow::actions::demos;
use taskflow::runtime::resolver::UnitCache;
use taskflow::runtime::worker::serve_stdio;
use std::sync::Arc;
use anyhow::Result;

/// Process-isolation worker: reads one task message per stdin line and
/// answers on stdout until stdin closes.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Worker Name (for logging)
    #[arg(long, default_value = "worker")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is the protocol channel
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let args = Args::parse();

    // Units are resolved here, independently of the parent process.
    let units = Arc::new(UnitCache::new(Arc::new(demos::catalog())));
    serve_stdio(units, &args.name).await
}
