use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use serde::Deserialize;

use crate::Error;

/// Port used when `PORT` is absent or empty
pub const DEFAULT_PORT: u16 = 8080;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Listen address
    pub addr: SocketAddr,
    /// Time allowed for a client to send the request head
    pub read_timeout: Duration,
    /// Time allowed for producing a response
    pub write_timeout: Duration,
    /// Keep-alive connections without requests for this long are closed
    pub idle_timeout: Duration,
    /// How long in-flight requests may take to finish once shutdown starts
    pub shutdown_timeout: Duration,
}

/// Raw environment, as read by `envy`
#[derive(Deserialize)]
struct Env {
    port: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_port(DEFAULT_PORT)
    }
}

impl Config {
    /// Default configuration listening on all IPv4 interfaces at `port`
    pub fn with_port(port: u16) -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    /// Reads the `PORT` environment variable
    ///
    /// # Errors
    ///
    /// Fails if `PORT` is set to something other than a port number.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_env_iter(std::env::vars())
    }

    /// Same as [`Config::from_env`] but with variables from the given iterator
    ///
    /// # Errors
    ///
    /// Fails if `PORT` is set to something other than a port number.
    pub fn from_env_iter<I>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let env: Env = envy::from_iter(vars).map_err(Error::Env)?;
        match env.port.as_deref().map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(port) => port
                .parse()
                .map(Self::with_port)
                .map_err(|source| Error::Port {
                    value: port.to_owned(),
                    source,
                }),
        }
    }
}
