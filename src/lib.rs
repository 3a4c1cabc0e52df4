//! Google Cloud Logging structured JSON for `tracing`.
//!
//! [`production_config`] and [`development_config`] describe a logger whose
//! records carry `severity`, a `{seconds, nanos}` `timestamp` and a
//! `logging.googleapis.com/sourceLocation` object, the layout the Cloud
//! Logging agent recognizes. Build them into a [`CloudLoggingLayer`] or
//! install them globally with [`init::init_logging`].

pub mod config;
pub mod encoder;
pub mod init;
pub mod layer;
pub mod level;
pub mod record;
pub mod sampler;
pub mod sink;

pub use config::{development_config, production_config, Config, Encoding, SamplingConfig};
pub use encoder::{
    development_encoder_config, production_encoder_config, CallerEncoding, DurationEncoding,
    EncoderConfig, LevelEncoding, TimeEncoding,
};
pub use layer::CloudLoggingLayer;
pub use level::Level;
