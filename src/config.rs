//! Client configuration.
//!
//! Host, port and socket deadlines. Loaded from a JSON file, overridden on the command line.

use std::fs;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Replay server host name or address.
    /// Default: 127.0.0.1
    pub host: String,

    /// Replay server port.
    /// Default: 3000
    pub port: u16,

    /// Deadline for establishing each connection.
    /// Default: 5 s
    #[serde(with = "millis")]
    pub connect_timeout: Duration,

    /// Deadline for each blocking read.
    /// Default: 5 s
    #[serde(with = "millis")]
    pub read_timeout: Duration,

    /// Deadline for each blocking write.
    /// Default: 5 s
    #[serde(with = "millis")]
    pub write_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| Error::Config(format!("read {}: {err}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|err| Error::Config(format!("parse {}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host is empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".into()));
        }
        // Zero durations are rejected by the socket timeout setters.
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }

    /// Resolves `host:port` to the first socket address.
    pub fn resolve(&self) -> Result<SocketAddr> {
        self.validate()?;
        let target = (self.host.as_str(), self.port);
        let mut addrs = target
            .to_socket_addrs()
            .map_err(|err| Error::Config(format!("resolve {}:{}: {err}", self.host, self.port)))?;
        addrs.next().ok_or_else(|| {
            Error::Config(format!("{}:{} resolved to no address", self.host, self.port))
        })
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
