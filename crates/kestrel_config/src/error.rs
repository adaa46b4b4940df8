//! Why a `kestrel.toml` could not be turned into a router configuration.

use std::path::PathBuf;

/// Failure to load a router configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read, or does not exist at all.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// The file that was looked up.
        path: PathBuf,
        /// The underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Not valid TOML, or a value of the wrong type (including an unknown
    /// strategy name).
    #[error("malformed router configuration: {0}")]
    Malformed(#[from] toml::de::Error),

    /// A setting parsed but cannot drive the router.
    #[error("router setting `{key}` {reason}")]
    Invalid {
        /// Dotted key of the offending setting.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    /// Dotted key of the rejected setting, for [`ConfigError::Invalid`].
    pub fn key(&self) -> Option<&'static str> {
        match self {
            ConfigError::Invalid { key, .. } => Some(key),
            _ => None,
        }
    }
}
