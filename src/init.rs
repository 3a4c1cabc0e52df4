use crate::config::{development_config, production_config, BuildError, Config};
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Error returned when the global subscriber cannot be installed.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("global subscriber already set: {0}")]
    SetGlobal(#[from] SetGlobalDefaultError),
}

/// Build the layer described by `config` and install it, on top of a
/// [`Registry`], as the global default subscriber.
///
/// Can succeed only once per process.
pub fn init_logging(config: &Config) -> Result<(), InitError> {
    let layer = config.build()?;
    let subscriber = Registry::default().with(layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// [`init_logging`] with [`production_config`].
pub fn init_production() -> Result<(), InitError> {
    init_logging(&production_config())
}

/// [`init_logging`] with [`development_config`].
pub fn init_development() -> Result<(), InitError> {
    init_logging(&development_config())
}
