//! PEM loading
//!
//! 🔐 Builds a rustls server configuration from certificate files on disk.

use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

/// TLS loading errors
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("💥 Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("🔍 No certificates found in PEM")]
    NoCertificates,

    #[error("🔍 No private key found in PEM")]
    NoPrivateKey,

    #[error("⚠️ Invalid PEM: {0}")]
    Pem(String),

    #[error("🔐 TLS error: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Load a certificate chain and key from disk into an acceptor.
///
/// When `key_path` is `None` the key is read from the certificate file,
/// which then has to hold both PEM blocks.
pub fn load_acceptor(cert_path: &Path, key_path: Option<&Path>) -> Result<TlsAcceptor, TlsError> {
    let cert_path = clean_path(cert_path);
    let key_path = key_path.map(clean_path).unwrap_or_else(|| cert_path.clone());

    tracing::info!("🔐 Loading certificate from {}", cert_path.display());
    if key_path != cert_path {
        tracing::info!("🔑 Loading private key from {}", key_path.display());
    }

    let cert_pem = read(&cert_path)?;
    let key_pem = if key_path == cert_path {
        cert_pem.clone()
    } else {
        read(&key_path)?
    };

    let config = build_server_config(&cert_pem, &key_pem)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Build server configuration from PEM bytes
pub fn build_server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<ServerConfig, TlsError> {
    let chain: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut &cert_pem[..])
        .collect::<Result<_, _>>()
        .map_err(|e| TlsError::Pem(e.to_string()))?;

    if chain.is_empty() {
        return Err(TlsError::NoCertificates);
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut &key_pem[..])
        .map_err(|e| TlsError::Pem(e.to_string()))?
        .ok_or(TlsError::NoPrivateKey)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(chain, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    tracing::debug!("🔒 TLS config built");
    Ok(config)
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// Batch files and service managers sometimes pass paths with their quotes
fn clean_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(s.trim().trim_matches(|c| c == '"' || c == '\'')),
        None => path.to_path_buf(),
    }
}
