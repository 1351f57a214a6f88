//! Error types reported by the loader and its collaborators.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while turning a resource locator into pixel or shader data.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("resource {0} has no locator to read from")]
    MissingLocator(String),
    #[error("unsupported data in {}: {reason}", path.display())]
    Unsupported { path: PathBuf, reason: String },
}

impl DecodeError {
    /// True when the failure came from the I/O layer rather than the data itself.
    pub fn is_io(&self) -> bool {
        matches!(self, DecodeError::Io { .. })
    }
}

/// Shader pipeline stage, used to attribute compile failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
    Link,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Link => "link",
        };
        f.write_str(name)
    }
}

/// Failure reported by the graphics context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphicsError {
    #[error("failed to create {object}: {reason}")]
    Creation { object: &'static str, reason: String },
    #[error("framebuffer incomplete: {0}")]
    IncompleteFramebuffer(String),
    #[error("{stage} shader failed to compile: {log}")]
    Compile { stage: ShaderStage, log: String },
    #[error("cannot set uniform {name}: {reason}")]
    Uniform { name: String, reason: String },
}

/// Top-level error for loader operations.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Graphics(#[from] GraphicsError),
    #[error("inconsistent use of the loader: {0}")]
    Consistency(String),
    #[error("invalid value for option {name}: {value}")]
    InvalidOption { name: String, value: String },
}

/// Errors raised while reading or writing loader configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type Result<T, E = LoaderError> = std::result::Result<T, E>;
