//! Dirserve TLS Module
//!
//! Turns externally provisioned PEM material (certificate chain and private
//! key) into a TLS acceptor for the listening socket. Certificate issuance
//! and renewal happen outside of dirserve.

pub mod loader;

pub use loader::{TlsError, build_server_config, load_acceptor};
pub use tokio_rustls::TlsAcceptor;
