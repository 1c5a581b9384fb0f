use std::{io, time::Duration};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

const TIMED_OUT: &str = "timed out after";

#[derive(Debug, Error)]
pub enum Error {
    #[error("container {container} is not configured, call configure() before run()")]
    NotConfigured { container: String },

    #[error("image {image} is not ready, check its build status")]
    ImageNotReady { image: String },

    /// The runtime failed, answered unexpectedly or did not answer in time.
    #[error("`{command}` failed: {message}")]
    Runtime { command: String, message: String },

    #[error("multiple containers match {name}: {ids:?}")]
    AmbiguousContainerId { name: String, ids: Vec<String> },

    #[error("{name:?} has no version suffix of the form `:v<number>`")]
    MalformedVersion { name: String },

    #[error("container {name} does not exist")]
    ContainerNotFound { name: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn runtime<C, M>(command: C, message: M) -> Error
    where
        C: Into<String>,
        M: Into<String>,
    {
        Error::Runtime {
            command: command.into(),
            message: message.into(),
        }
    }

    pub(crate) fn timeout<C: Into<String>>(command: C, timeout: Duration) -> Error {
        Error::runtime(command, format!("{} {:?}", TIMED_OUT, timeout))
    }

    /// Timeouts are runtime failures carrying a fixed message prefix.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Runtime { message, .. } if message.starts_with(TIMED_OUT))
    }
}
