//! Dual Mode Proxy Command Line Tool
//!
//! This binary is the command-line interface for Dual Mode Proxy.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

use dual_mode_proxy::common::{init_logger, Result};
use dual_mode_proxy::config::{ClientCertMode, ProxyConfig};
use dual_mode_proxy::protocol::SniffPolicy;
use dual_mode_proxy::tls::{cert_fingerprint, cert_subject, load_cert};
use dual_mode_proxy::{ProxyService, APP_NAME, VERSION};

/// Dual Mode Proxy: TLS ports that also accept plaintext
///
/// Flags override the configuration file and `DUAL_MODE_PROXY_*`
/// environment variables.
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Load configuration from a JSON file (default: ./config.json if present)
    #[clap(long)]
    config_file: Option<PathBuf>,

    /// Port list, e.g. "8080 8443:ssl:allow-plain"
    #[clap(long)]
    server_ports: Option<String>,

    /// Origin address (host:port)
    #[clap(short, long)]
    target: Option<String>,

    /// Server certificate path
    #[clap(long)]
    cert: Option<PathBuf>,

    /// Server private key path
    #[clap(long)]
    key: Option<PathBuf>,

    /// CA certificate path (for client certificate validation)
    #[clap(long)]
    ca_cert: Option<PathBuf>,

    /// Client certificate verification mode (required, optional, none)
    #[clap(long)]
    client_cert_mode: Option<String>,

    /// Log level
    #[clap(long)]
    log_level: Option<String>,

    /// First-byte policy on dual-mode ports (lenient, strict)
    #[clap(long)]
    sniff_policy: Option<String>,
}

impl Args {
    /// Apply the flags that were given on top of `config`
    fn apply(self, config: &mut ProxyConfig) -> Result<()> {
        if let Some(server_ports) = self.server_ports {
            config.server_ports = server_ports;
        }
        if let Some(target) = self.target {
            config.target = target;
        }
        if let Some(cert) = self.cert {
            config.cert_path = cert;
        }
        if let Some(key) = self.key {
            config.key_path = key;
        }
        if let Some(ca_cert) = self.ca_cert {
            config.ca_cert_path = Some(ca_cert);
        }
        if let Some(mode) = self.client_cert_mode {
            config.client_cert_mode = ClientCertMode::from_str(&mode)?;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        if let Some(policy) = self.sniff_policy {
            config.sniff_policy = SniffPolicy::from_str(&policy)?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ProxyConfig::load(args.config_file.as_deref())?;
    args.apply(&mut config)?;

    init_logger(&config.log_level);

    info!("Starting {} v{}", APP_NAME, VERSION);

    config.validate()?;

    for port in config.ports()? {
        info!("Port {}", port);
    }
    info!("Target service: {}", config.target);
    info!("Sniff policy: {}", config.sniff_policy);

    if config.has_tls_ports()? {
        info!("Using certificate: {}", config.cert_path.display());
        match load_cert(&config.cert_path) {
            Ok(cert) => {
                info!("Certificate subject: {}", cert_subject(&cert));
                match cert_fingerprint(&cert) {
                    Ok(fingerprint) => info!("Certificate fingerprint: {}", fingerprint),
                    Err(e) => warn!("Unable to get certificate fingerprint: {}", e),
                }
            }
            Err(e) => warn!("Unable to read certificate: {}", e),
        }
        info!("Client certificate mode: {}", config.client_cert_mode);
    }

    let mut handle = ProxyService::start(Arc::new(config)).await?;

    info!("Proxy service ready, press Ctrl+C to stop");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Received Ctrl+C");
        }
        result = handle.wait() => {
            if let Err(e) = result {
                error!("Listener stopped: {}", e);
            }
        }
    }

    handle.shutdown().await
}
