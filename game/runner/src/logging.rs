use slog::Logger;
use sloggers::{Config, LoggerConfig};

/// Build the root terminal logger. The configuration is kept as a TOML
/// snippet so it can later move into a config file unchanged.
pub fn init(level: &str) -> Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(&format!(
        r#"
type = "terminal"
level = "{}"
destination = "stderr"
"#,
        level
    ))
    .expect("invalid logger configuration");

    config.build_logger().expect("failed to build logger")
}
