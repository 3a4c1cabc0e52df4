use crate::encoder::{development_encoder_config, production_encoder_config, EncoderConfig};
use crate::layer::CloudLoggingLayer;
use crate::level::Level;
use crate::sampler::Sampler;
use crate::sink::{open_outputs, OpenOutputError, STDERR};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

/// Sampling policy applied per second, per level and message.
///
/// The first `initial` matching records in each second are written, then
/// one of every `thereafter`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub initial: u64,
    pub thereafter: u64,
}

/// Record layout written to the outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// One JSON object per line, nested values allowed.
    Json,
    /// Tab-separated text for humans; nested values fall back to strings.
    Console,
}

/// Complete description of a logger.
///
/// Start from [`production_config`] or [`development_config`], adjust the
/// public fields if needed, then call [`Config::build`] or hand it to
/// [`init_logging`](crate::init::init_logging).
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Minimum level written.
    pub level: Level,
    /// Development mode lowers the stacktrace threshold from `ERROR` to `WARN`.
    pub development: bool,
    pub disable_caller: bool,
    pub disable_stacktrace: bool,
    /// `None` disables sampling.
    pub sampling: Option<SamplingConfig>,
    pub encoding: Encoding,
    pub encoder_config: EncoderConfig,
    /// `"stderr"`, `"stdout"`, or file paths.
    pub output_paths: Vec<String>,
    /// Where internal errors, such as failed writes, are reported.
    pub error_output_paths: Vec<String>,
    /// Added to every record.
    pub initial_fields: Map<String, Value>,
}

/// Error returned by [`Config::build`].
#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("cannot open output: {0}")]
    Output(#[source] OpenOutputError),

    #[error("cannot open error output: {0}")]
    ErrorOutput(#[source] OpenOutputError),
}

const SAMPLING_TICK: Duration = Duration::from_secs(1);

/// Config for production: `INFO` and above, JSON to stderr, sampled.
pub fn production_config() -> Config {
    Config {
        level: Level::INFO,
        development: false,
        disable_caller: false,
        disable_stacktrace: false,
        sampling: Some(SamplingConfig {
            initial: 100,
            thereafter: 100,
        }),
        encoding: Encoding::Json,
        encoder_config: production_encoder_config(),
        output_paths: vec![STDERR.to_string()],
        error_output_paths: vec![STDERR.to_string()],
        initial_fields: Map::new(),
    }
}

/// Config for development: like [`production_config`] but at `DEBUG` and
/// in development mode.
pub fn development_config() -> Config {
    Config {
        level: Level::DEBUG,
        development: true,
        disable_caller: false,
        disable_stacktrace: false,
        sampling: Some(SamplingConfig {
            initial: 100,
            thereafter: 100,
        }),
        encoding: Encoding::Json,
        encoder_config: development_encoder_config(),
        output_paths: vec![STDERR.to_string()],
        error_output_paths: vec![STDERR.to_string()],
        initial_fields: Map::new(),
    }
}

impl Config {
    /// Open the configured outputs and build the layer.
    pub fn build(&self) -> Result<CloudLoggingLayer, BuildError> {
        let out = open_outputs(self.output_paths.as_slice()).map_err(BuildError::Output)?;
        let err = open_outputs(self.error_output_paths.as_slice()).map_err(BuildError::ErrorOutput)?;
        Ok(self.build_with_writers(out, err))
    }

    /// Build the layer around the given writers, ignoring the configured
    /// output paths.
    pub fn build_with_writers<W, E>(&self, writer: W, error_writer: E) -> CloudLoggingLayer
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
        E: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let mut layer = CloudLoggingLayer::new(self.encoder_config.clone(), writer, error_writer)
            .with_level(self.level)
            .with_encoding(self.encoding)
            .with_caller(!self.disable_caller)
            .with_stacktrace_level(self.stacktrace_level())
            .with_initial_fields(self.initial_fields.clone());
        if let Some(sampling) = self.sampling {
            layer = layer.with_sampler(Sampler::new(
                SAMPLING_TICK,
                sampling.initial,
                sampling.thereafter,
            ));
        }
        layer
    }

    fn stacktrace_level(&self) -> Option<Level> {
        match (self.disable_stacktrace, self.development) {
            (true, _) => None,
            (false, true) => Some(Level::WARN),
            (false, false) => Some(Level::ERROR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_defaults() {
        let config = production_config();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.development);
        assert_eq!(
            config.sampling,
            Some(SamplingConfig {
                initial: 100,
                thereafter: 100
            })
        );
        assert_eq!(config.encoding, Encoding::Json);
        assert_eq!(config.output_paths, vec!["stderr"]);
        assert_eq!(config.error_output_paths, vec!["stderr"]);
        assert_eq!(config.encoder_config, production_encoder_config());
    }

    #[test]
    fn development_differs_only_in_level_and_flag() {
        let dev = development_config();
        assert_eq!(dev.level, Level::DEBUG);
        assert!(dev.development);

        let mut prod = production_config();
        prod.level = Level::DEBUG;
        prod.development = true;
        assert_eq!(prod, dev);
    }

    #[test]
    fn builders_are_idempotent_and_independent() {
        assert_eq!(production_config(), production_config());
        assert_eq!(development_config(), development_config());

        let mut first = production_config();
        first.output_paths.push("stdout".to_string());
        assert_eq!(production_config().output_paths, vec!["stderr"]);
    }

    #[test]
    fn stacktrace_threshold_follows_mode() {
        assert_eq!(production_config().stacktrace_level(), Some(Level::ERROR));
        assert_eq!(development_config().stacktrace_level(), Some(Level::WARN));

        let mut quiet = development_config();
        quiet.disable_stacktrace = true;
        assert_eq!(quiet.stacktrace_level(), None);
    }

    #[test]
    fn build_reports_bad_output_path() {
        let mut config = production_config();
        config.error_output_paths = vec!["/nonexistent-dir/cloud-logging/err.log".to_string()];
        match config.build() {
            Err(BuildError::ErrorOutput(err)) => {
                assert_eq!(err.path, "/nonexistent-dir/cloud-logging/err.log")
            }
            other => panic!("expected error output failure, got {:?}", other.err()),
        }
    }

    #[test]
    fn sampling_and_encoding_deserialize() {
        let sampling: SamplingConfig =
            serde_json::from_str(r#"{"initial": 10, "thereafter": 5}"#).unwrap();
        assert_eq!(sampling, SamplingConfig { initial: 10, thereafter: 5 });
        let encoding: Encoding = serde_json::from_str(r#""console""#).unwrap();
        assert_eq!(encoding, Encoding::Console);
    }
}
