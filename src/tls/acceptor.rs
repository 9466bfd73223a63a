//! TLS acceptor creation

use log::info;
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod, SslVerifyMode};
use std::path::Path;

use crate::common::Result;
use crate::config::ClientCertMode;

/// Create the TLS acceptor shared by every TLS port
///
/// # Example
///
/// ```no_run
/// # use std::path::Path;
/// # use dual_mode_proxy::tls::create_tls_acceptor;
/// # use dual_mode_proxy::config::ClientCertMode;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let acceptor = create_tls_acceptor(
///     Path::new("certs/server.crt"),
///     Path::new("certs/server.key"),
///     None,
///     &ClientCertMode::None,
/// )?;
/// # Ok(())
/// # }
/// ```
pub fn create_tls_acceptor(
    cert_path: &Path,
    key_path: &Path,
    ca_cert_path: Option<&Path>,
    client_cert_mode: &ClientCertMode,
) -> Result<SslAcceptor> {
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;

    acceptor.set_certificate_chain_file(cert_path)?;
    acceptor.set_private_key_file(key_path, SslFiletype::PEM)?;
    acceptor.check_private_key()?;

    if let Some(ca_cert_path) = ca_cert_path {
        acceptor.set_ca_file(ca_cert_path)?;
    }

    match client_cert_mode {
        ClientCertMode::Required => {
            info!("Client certificates required (will be verified)");
            acceptor.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
        }
        ClientCertMode::Optional => {
            info!("Client certificates optional (will be verified if provided)");
            acceptor.set_verify(SslVerifyMode::PEER);
        }
        ClientCertMode::None => {
            info!("Client certificates not requested");
            acceptor.set_verify(SslVerifyMode::NONE);
        }
    }

    Ok(acceptor.build())
}
