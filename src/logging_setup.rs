//! tracing subscriber for the binary.

use anyhow::{Context, Result};
use tracing_subscriber::{
    filter::{Directive, EnvFilter},
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer,
};

/// Install a stderr subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init(level: &str) -> Result<()> {
    let directive: Directive = level
        .parse()
        .with_context(|| format!("Invalid log level: {}", level))?;

    let filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr) // stdout stays free for output
        .with_target(false)
        .with_filter(filter);

    tracing_subscriber::registry().with(console_layer).init();
    Ok(())
}
