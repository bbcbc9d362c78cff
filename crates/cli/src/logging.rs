//! Tracing subscriber setup.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over `filter`; output goes
/// to `log_file` when given, else stderr.
pub fn init(filter: &str, log_file: Option<&Path>) -> Result<(), String> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => parse_filter(filter)?,
    };
    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match log_file {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| format!("could not open log file '{}': {}", path.display(), e))?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
                .try_init()
        }
        None => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.map_err(|e| format!("could not install logger: {e}"))
}

fn parse_filter(filter: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(filter).map_err(|e| format!("invalid log filter '{filter}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_are_validated() {
        assert!(parse_filter("info").is_ok());
        assert!(parse_filter("harbor_lsp=debug,warn").is_ok());
        let err = parse_filter("harbor_lsp=loud").unwrap_err();
        assert!(err.contains("harbor_lsp=loud"));
    }
}
