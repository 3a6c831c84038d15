//! Byte transform applied between the dump and the load.

use std::fmt;
use std::str::FromStr;

use crate::bail;
use crate::error::{BackfillError, ErrorKind};

/// Codec used for the stream between the dump and the load.
///
/// The destination picks the codec from the conduit name, so every mode also fixes the
/// conduit suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMode {
    #[default]
    None,
    Lz4,
    Gzip,
}

impl CompressionMode {
    /// Program run as the compression stage.
    pub fn program(&self) -> &'static str {
        match self {
            CompressionMode::None => "cat",
            CompressionMode::Lz4 => "lz4",
            CompressionMode::Gzip => "gzip",
        }
    }

    /// Arguments making [`CompressionMode::program`] read stdin and write stdout.
    pub fn args(&self) -> &'static [&'static str] {
        match self {
            CompressionMode::None => &[],
            CompressionMode::Lz4 => &["-z", "-c"],
            CompressionMode::Gzip => &["-c"],
        }
    }

    /// Suffix appended to the conduit name.
    pub fn conduit_suffix(&self) -> &'static str {
        match self {
            CompressionMode::None => "",
            CompressionMode::Lz4 => ".lz4",
            CompressionMode::Gzip => ".gz",
        }
    }

    /// Name used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionMode::None => "none",
            CompressionMode::Lz4 => "lz4",
            CompressionMode::Gzip => "gz",
        }
    }
}

impl FromStr for CompressionMode {
    type Err = BackfillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(CompressionMode::None),
            "lz4" => Ok(CompressionMode::Lz4),
            "gz" => Ok(CompressionMode::Gzip),
            other => bail!(
                ErrorKind::ConfigError,
                "Invalid compression mode",
                format!("`{other}` is not one of `none`, `lz4`, `gz`")
            ),
        }
    }
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_names_parse() {
        assert_eq!("none".parse::<CompressionMode>().unwrap(), CompressionMode::None);
        assert_eq!("lz4".parse::<CompressionMode>().unwrap(), CompressionMode::Lz4);
        assert_eq!("gz".parse::<CompressionMode>().unwrap(), CompressionMode::Gzip);
    }

    #[test]
    fn unknown_names_are_config_errors() {
        for name in ["gzip", "zstd", "", "LZ4"] {
            let err = name.parse::<CompressionMode>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConfigError);
        }
    }

    #[test]
    fn suffix_and_program_follow_the_codec() {
        assert_eq!(CompressionMode::None.conduit_suffix(), "");
        assert_eq!(CompressionMode::None.program(), "cat");
        assert_eq!(CompressionMode::Lz4.conduit_suffix(), ".lz4");
        assert_eq!(CompressionMode::Gzip.conduit_suffix(), ".gz");
        assert_eq!(CompressionMode::Gzip.program(), "gzip");
    }
}
