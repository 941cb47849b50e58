mod settings;

use config::{Config, Environment, File};

use crate::config::settings::PartialSettings;
use crate::utils::error::Result;

pub use settings::{ClientSettings, LogSettings, RelaySettings, Settings};

/// Loads the configuration from `config/default` and the environment.
/// See [`load_config_from`].
pub fn load_config() -> Result<Settings> {
    load_config_from("config/default")
}

/// Loads the configuration from an optional file (any format the `config`
/// crate recognises by extension) overlaid with `BARKER_*` environment
/// variables, e.g. `BARKER_RELAY__ACK_TIMEOUT_MS=2000`.
/// Values missing from both are filled from `Settings::default()`.
pub fn load_config_from(file: &str) -> Result<Settings> {
    let builder = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix("BARKER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge_with_defaults())
}
