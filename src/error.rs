use std::{fmt, io, net::SocketAddr, num::ParseIntError};

use tokio::task::JoinError;

/// Errors that stop the service
#[derive(Debug)]
pub enum Error {
    /// The environment couldn't be read into a [`crate::Config`]
    Env(envy::Error),
    /// `PORT` isn't a port number
    Port {
        /// Value of the variable
        value: String,
        /// Underlying cause
        source: ParseIntError,
    },
    /// The listener couldn't be bound
    Bind {
        /// Address we tried to listen on
        addr: SocketAddr,
        /// Underlying cause
        source: io::Error,
    },
    /// The accept loop ended on its own
    Listener(io::Error),
    /// The accept loop task panicked or was cancelled
    ListenerTask(JoinError),
    /// A connection failed while being closed forcibly
    ForceClose(JoinError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env(err) => write!(f, "invalid configuration: {err}"),
            Self::Port { value, source } => write!(f, "invalid PORT {value:?}: {source}"),
            Self::Bind { addr, source } => write!(f, "can't listen on {addr}: {source}"),
            Self::Listener(err) => write!(f, "listener failed: {err}"),
            Self::ListenerTask(err) => write!(f, "listener task failed: {err}"),
            Self::ForceClose(err) => write!(f, "could not stop server: {err}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Env(err) => Some(err),
            Self::Port { source, .. } => Some(source),
            Self::Bind { source, .. } => Some(source),
            Self::Listener(err) => Some(err),
            Self::ListenerTask(err) | Self::ForceClose(err) => Some(err),
        }
    }
}
