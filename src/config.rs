//! Service configuration from command-line flags and the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// 10 MiB
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Adaptive image and PDF compression service
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ServiceConfig {
    /// Address to bind
    #[arg(long, env = "YUKOMP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "YUKOMP_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Maximum request body size in bytes
    #[arg(long, env = "YUKOMP_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Directory for scratch copies of PDF uploads (system temp dir if unset)
    #[arg(long, env = "YUKOMP_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            temp_dir: None,
        }
    }
}

impl ServiceConfig {
    pub fn bind_address(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// Where scratch files go.
    pub fn scratch_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
