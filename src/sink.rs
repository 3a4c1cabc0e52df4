use std::fs::{File, OpenOptions};
use std::io;
use std::sync::Arc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

/// Output path naming the process's standard error.
pub const STDERR: &str = "stderr";
/// Output path naming the process's standard output.
pub const STDOUT: &str = "stdout";

/// Error returned when an output path cannot be opened.
#[derive(thiserror::Error, Debug)]
#[error("failed to open log output {path:?}: {source}")]
pub struct OpenOutputError {
    pub path: String,
    #[source]
    pub source: io::Error,
}

/// Open every path and combine them into one writer that copies each record
/// to all of them, in order.
///
/// `"stderr"` and `"stdout"` name the standard streams; anything else is a
/// file opened for appending and created if missing. No paths yields a
/// writer that discards output.
pub fn open_outputs<P: AsRef<str>>(paths: &[P]) -> Result<BoxMakeWriter, OpenOutputError> {
    let mut combined: Option<BoxMakeWriter> = None;
    for path in paths {
        let next = open_output(path.as_ref())?;
        combined = Some(match combined {
            Some(prev) => BoxMakeWriter::new(prev.and(next)),
            None => next,
        });
    }
    Ok(combined.unwrap_or_else(|| BoxMakeWriter::new(io::sink)))
}

fn open_output(path: &str) -> Result<BoxMakeWriter, OpenOutputError> {
    match path {
        STDERR => Ok(BoxMakeWriter::new(io::stderr)),
        STDOUT => Ok(BoxMakeWriter::new(io::stdout)),
        _ => {
            let file: File = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| OpenOutputError {
                    path: path.to_string(),
                    source,
                })?;
            Ok(BoxMakeWriter::new(Arc::new(file)))
        }
    }
}
