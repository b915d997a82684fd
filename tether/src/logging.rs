///
/// Logging setup for hosts that do not install their own subscriber.
///
/// Output goes to stderr so it never mixes with a host's own stdout
/// protocol. Installing twice is harmless: the second call reports
/// `false` and leaves the first subscriber in place.
///

use crate::config::{ConfigError, LoggingConfig};

pub fn init_logging(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let level = config.level_filter()?;
    let installed = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .is_ok();
    Ok(installed)
}
