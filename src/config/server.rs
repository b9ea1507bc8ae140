use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// OTLP receiver HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on. OTLP's conventional HTTP port is 4318.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request body size limit in bytes; oversized requests get 413.
    #[serde(default = "default_max_request_size")]
    pub max_request_size_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_request_size_bytes: default_max_request_size(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().expect("static address")
}

fn default_port() -> u16 {
    4318
}

fn default_max_request_size() -> usize {
    10 * 1024 * 1024 // 10 MiB
}
