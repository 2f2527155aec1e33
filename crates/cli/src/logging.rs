//! Log output for the command line
//!
//! Progress goes to stderr so `status` and `script` output on stdout stays
//! clean. `RUST_LOG` overrides the level chosen by the flags.

use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level filter such as "info" or "chronicle=debug"
    pub level: String,
    /// Emit JSON lines instead of plain text
    pub json_format: bool,
}

impl LoggingConfig {
    pub fn from_flags(trace: bool, json_format: bool) -> Self {
        Self {
            level: if trace { "debug" } else { "info" }.to_string(),
            json_format,
        }
    }
}

pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stderr).with_target(false))
            .try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_flag_lowers_level() {
        assert_eq!(LoggingConfig::from_flags(true, false).level, "debug");
        assert_eq!(LoggingConfig::from_flags(false, true).level, "info");
        assert!(LoggingConfig::from_flags(false, true).json_format);
    }
}
