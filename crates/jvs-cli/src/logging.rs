//! `tracing-subscriber` initialization, controlled by `JVS_LOG` (falling
//! back to `RUST_LOG`). Default: `warn` for the library target, `info`
//! for this binary's own target.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = std::env::var("JVS_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new("warn,jvs_cli=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
