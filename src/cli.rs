//! Command-line flags. Flags override values loaded from the config file.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{TlsConfig, TunnelConfig};

#[derive(Debug, Parser)]
#[command(name = "cdn-tunnel")]
#[command(about = "Carries TCP streams inside HTTP(S) requests relayed by a CDN", long_about = None)]
pub struct Cli {
    /// Listen origin, e.g. http://0.0.0.0:8080 or https://0.0.0.0:443
    #[arg(short = 'o', long)]
    pub origin: Option<String>,

    /// PEM certificate chain (HTTPS only)
    #[arg(short = 'c', long)]
    pub cert: Option<String>,

    /// PEM private key (HTTPS only)
    #[arg(short = 'k', long)]
    pub key: Option<String>,

    /// Run this command per session instead of dialing the destination
    #[arg(short = 'a', long = "app")]
    pub app_command: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Serve requests that did not come through the CDN
    #[arg(long)]
    pub allow_direct: bool,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Apply flags on top of a loaded configuration.
    pub fn apply(self, mut config: TunnelConfig) -> TunnelConfig {
        if let Some(origin) = self.origin {
            config.listener.origin = origin;
        }

        if self.cert.is_some() || self.key.is_some() {
            let current = config.listener.tls.take().unwrap_or_default();
            config.listener.tls = Some(TlsConfig {
                cert_path: self.cert.unwrap_or(current.cert_path),
                key_path: self.key.unwrap_or(current.key_path),
            });
        }

        if let Some(command) = self.app_command {
            config.upstream.app_command = Some(command);
        }
        if self.debug {
            config.observability.log_level = "debug".to_string();
        }
        if self.allow_direct {
            config.access.allow_direct = true;
        }
        config
    }
}
