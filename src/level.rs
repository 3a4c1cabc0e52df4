use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Severity written when a level has no Cloud Logging counterpart.
pub const DEFAULT_SEVERITY: &str = "DEFAULT";

/// Logging level, ordered from least to most severe.
///
/// The seven named constants are the recognized levels. Any other value
/// (for example [`Level::TRACE`], which is what `tracing::Level::TRACE`
/// converts to) is still a valid, comparable level but has no severity of
/// its own and encodes as [`DEFAULT_SEVERITY`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(i8);

impl Level {
    pub const TRACE: Level = Level(-2);
    pub const DEBUG: Level = Level(-1);
    pub const INFO: Level = Level(0);
    pub const WARN: Level = Level(1);
    pub const ERROR: Level = Level(2);
    /// Logged as critical; in development it signals a bug that should have panicked.
    pub const DPANIC: Level = Level(3);
    pub const PANIC: Level = Level(4);
    pub const FATAL: Level = Level(5);

    pub const fn from_i8(level: i8) -> Self {
        Level(level)
    }

    pub const fn as_i8(self) -> i8 {
        self.0
    }

    /// Cloud Logging `LogSeverity` name for this level.
    ///
    /// <https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#logseverity>
    pub const fn severity(self) -> &'static str {
        match self.0 {
            -1 => "DEBUG",
            0 => "INFO",
            1 => "WARNING",
            2 => "ERROR",
            3 => "CRITICAL",
            4 => "ALERT",
            5 => "EMERGENCY",
            _ => DEFAULT_SEVERITY,
        }
    }

    fn name(self) -> Option<&'static str> {
        match self.0 {
            -2 => Some("trace"),
            -1 => Some("debug"),
            0 => Some("info"),
            1 => Some("warn"),
            2 => Some("error"),
            3 => Some("dpanic"),
            4 => Some("panic"),
            5 => Some("fatal"),
            _ => None,
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Level::ERROR,
            tracing::Level::WARN => Level::WARN,
            tracing::Level::INFO => Level::INFO,
            tracing::Level::DEBUG => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Level({})", self.0),
        }
    }
}

/// Returned when a string does not name a known level.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized level: {0:?}")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" | "" => Ok(Level::INFO),
            "warn" | "warning" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            "dpanic" => Ok(Level::DPANIC),
            "panic" => Ok(Level::PANIC),
            "fatal" => Ok(Level::FATAL),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.name() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_i8(self.0),
        }
    }
}

struct LevelVisitor;

impl<'de> Visitor<'de> for LevelVisitor {
    type Value = Level;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a level name or an integer level")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Level, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Level, E> {
        i8::try_from(v)
            .map(Level::from_i8)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Level, E> {
        i8::try_from(v)
            .map(Level::from_i8)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LevelVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_levels_map_to_cloud_logging_severities() {
        let table = [
            (Level::DEBUG, "DEBUG"),
            (Level::INFO, "INFO"),
            (Level::WARN, "WARNING"),
            (Level::ERROR, "ERROR"),
            (Level::DPANIC, "CRITICAL"),
            (Level::PANIC, "ALERT"),
            (Level::FATAL, "EMERGENCY"),
        ];
        for (level, severity) in table {
            assert_eq!(level.severity(), severity, "level {level}");
        }
    }

    #[test]
    fn unmapped_levels_fall_back_to_default() {
        assert_eq!(Level::TRACE.severity(), DEFAULT_SEVERITY);
        assert_eq!(Level::from_i8(42).severity(), "DEFAULT");
        assert_eq!(Level::from_i8(i8::MIN).severity(), "DEFAULT");
    }

    #[test]
    fn tracing_levels_convert_in_order() {
        assert_eq!(Level::from(tracing::Level::ERROR), Level::ERROR);
        assert_eq!(Level::from(tracing::Level::WARN), Level::WARN);
        assert_eq!(Level::from(tracing::Level::INFO), Level::INFO);
        assert_eq!(Level::from(tracing::Level::DEBUG), Level::DEBUG);
        assert_eq!(Level::from(tracing::Level::TRACE), Level::TRACE);
        assert!(Level::TRACE < Level::DEBUG);
        assert!(Level::ERROR < Level::FATAL);
    }

    #[test]
    fn parse_and_display() {
        assert_eq!("warn".parse::<Level>(), Ok(Level::WARN));
        assert_eq!("DPANIC".parse::<Level>(), Ok(Level::DPANIC));
        assert!("verbose".parse::<Level>().is_err());
        assert_eq!(Level::FATAL.to_string(), "fatal");
        assert_eq!(Level::from_i8(9).to_string(), "Level(9)");
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Level::INFO).unwrap(), "\"info\"");
        let level: Level = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(level, Level::ERROR);
        assert!(serde_json::from_str::<Level>("\"loud\"").is_err());
    }

    #[test]
    fn unnamed_levels_round_trip_as_integers() {
        let odd = Level::from_i8(9);
        let encoded = serde_json::to_string(&odd).unwrap();
        assert_eq!(encoded, "9");
        assert_eq!(serde_json::from_str::<Level>(&encoded).unwrap(), odd);

        let negative = Level::from_i8(-7);
        let encoded = serde_json::to_string(&negative).unwrap();
        assert_eq!(serde_json::from_str::<Level>(&encoded).unwrap(), negative);

        assert_eq!(serde_json::from_str::<Level>("2").unwrap(), Level::ERROR);
        assert!(serde_json::from_str::<Level>("300").is_err());
        assert!(serde_json::from_str::<Level>("true").is_err());
    }
}
