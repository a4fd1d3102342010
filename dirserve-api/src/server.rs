//! Connection handling
//!
//! One tokio task per accepted connection. The TLS handshake, when enabled,
//! runs inside that task so a slow client never holds up `accept`.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dirserve_core::{Error, Result};
use dirserve_tls::TlsAcceptor;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use http_body_util::BodyExt;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::AppState;
use crate::router::{ResponseBody, handle_request};

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Idle or slow connections are closed if a request head takes longer
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for a TLS handshake
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Listener options
#[derive(Clone, Default)]
pub struct ServerOptions {
    /// Wrap connections in TLS when set
    pub tls: Option<TlsAcceptor>,
    /// Maximum requests served at once (None = unbounded). Idle keep-alive
    /// connections do not count against it.
    pub max_connections: Option<usize>,
}

/// Bind the listening socket
pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Server(format!("Failed to bind {}: {}", addr, e)))
}

/// Accept connections until `shutdown` resolves
pub async fn run_server<F>(
    listener: TcpListener,
    state: Arc<AppState>,
    options: ServerOptions,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let local = listener.local_addr()?;
    let scheme = if options.tls.is_some() { "https" } else { "http" };
    tracing::info!("🌐 Serving {} on {}", scheme.to_uppercase(), local);
    tracing::info!("📁 Content root: {}", state.files.config().root.path().display());
    match options.max_connections {
        Some(limit) => tracing::info!("🔧 Concurrent request limit: {}", limit),
        None => tracing::info!("🔧 Concurrent request limit: unbounded"),
    }

    let limit = options.max_connections.map(|n| Arc::new(Semaphore::new(n)));
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Cannot set TCP_NODELAY for {}: {}", peer, e);
        }

        let state = state.clone();
        let tls = options.tls.clone();
        let limit = limit.clone();

        tokio::spawn(async move {
            match tls {
                Some(acceptor) => {
                    match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                        Ok(Ok(tls_stream)) => serve_connection(tls_stream, peer, state, limit).await,
                        Ok(Err(e)) => tracing::debug!("🔐 TLS handshake with {} failed: {}", peer, e),
                        Err(_) => tracing::debug!("🔐 TLS handshake with {} timed out", peer),
                    }
                }
                None => serve_connection(stream, peer, state, limit).await,
            }
        });
    }

    tracing::info!("👋 Listener on {} stopped", local);
    Ok(())
}

async fn serve_connection<S>(
    stream: S,
    peer: SocketAddr,
    state: Arc<AppState>,
    limit: Option<Arc<Semaphore>>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let state = state.clone();
        let limit = limit.clone();
        async move {
            // Idle keep-alive connections hold no permit; only a request does
            let permit = match limit {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            let response = handle_request(req, &state, peer).await;
            Ok::<_, Infallible>(match permit {
                Some(permit) => response.map(|body| hold_permit(body, permit)),
                None => response,
            })
        }
    });

    // Client disconnects and aborted transfers end up here; they only
    // affect this connection.
    if let Err(err) = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT)
        .keep_alive(true)
        .serve_connection(io, service)
        .await
    {
        tracing::debug!("Connection from {} closed: {}", peer, err);
    }
}

/// Keep `permit` until the body has been fully sent or dropped
fn hold_permit(body: ResponseBody, permit: OwnedSemaphorePermit) -> ResponseBody {
    body.map_frame(move |frame| {
        let _held = &permit;
        frame
    })
    .boxed_unsync()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CorsPolicy;
    use dirserve_static::{ContentRoot, FileServer};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Running {
        addr: SocketAddr,
        stop: Option<tokio::sync::oneshot::Sender<()>>,
        handle: tokio::task::JoinHandle<Result<()>>,
    }

    async fn start(root: &std::path::Path, options: ServerOptions) -> Running {
        let files = FileServer::serve_dir(ContentRoot::new(root).unwrap());
        let state = Arc::new(AppState::new(files, CorsPolicy::default()));
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(run_server(listener, state, options, async {
            let _ = rx.await;
        }));
        Running {
            addr,
            stop: Some(tx),
            handle,
        }
    }

    fn content_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("media")).unwrap();
        for i in 0..5 {
            let body: Vec<u8> = (0..(100_000 + i * 7_919)).map(|b| (b % 253) as u8).collect();
            std::fs::write(dir.path().join(format!("media/clip{}.mp4", i)), body).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_concurrent_requests() {
        let dir = content_root();
        let server = start(dir.path(), ServerOptions::default()).await;
        let client = reqwest::Client::new();

        let mut tasks = Vec::new();
        for i in 0..50 {
            let client = client.clone();
            let base = format!("http://{}", server.addr);
            let media = dir.path().join("media");
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    let resp = client.get(format!("{}/media/", base)).send().await.unwrap();
                    assert_eq!(resp.status(), 200);
                    let json: serde_json::Value = resp.json().await.unwrap();
                    assert_eq!(json["total_items"], 5);
                } else {
                    let name = format!("clip{}.mp4", i % 5);
                    let expected = std::fs::read(media.join(&name)).unwrap();
                    let resp = client
                        .get(format!("{}/media/{}", base, name))
                        .send()
                        .await
                        .unwrap();
                    assert_eq!(resp.status(), 200);
                    assert_eq!(
                        resp.headers()["content-length"],
                        expected.len().to_string().as_str()
                    );
                    assert_eq!(resp.bytes().await.unwrap().as_ref(), &expected[..]);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_connection_limit_still_serves_everyone() {
        let dir = content_root();
        let options = ServerOptions {
            tls: None,
            max_connections: Some(2),
        };
        let server = start(dir.path(), options).await;

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let url = format!("http://{}/media/clip0.mp4", server.addr);
            tasks.push(tokio::spawn(async move {
                // fresh client per task, so each request uses its own connection
                let resp = reqwest::Client::new().get(url).send().await.unwrap();
                assert_eq!(resp.status(), 200);
                resp.bytes().await.unwrap().len()
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), 100_000);
        }
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_hold_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"served").unwrap();
        let options = ServerOptions {
            tls: None,
            max_connections: Some(1),
        };
        let server = start(dir.path(), options).await;

        // connected but silent
        let _idle = tokio::net::TcpStream::connect(server.addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // a pooled keep-alive connection left open after its request
        let keep_alive = reqwest::Client::new();
        let resp = keep_alive
            .get(format!("http://{}/a.txt", server.addr))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.text().await.unwrap(), "served");

        let other = tokio::time::timeout(
            Duration::from_secs(5),
            reqwest::get(format!("http://{}/a.txt", server.addr)),
        )
        .await
        .expect("second client stalled behind idle connections")
        .unwrap();
        assert_eq!(other.status(), 200);
        assert_eq!(other.text().await.unwrap(), "served");
    }

    #[tokio::test]
    async fn test_client_disconnect_mid_transfer() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.mov"), vec![0u8; 8 * 1024 * 1024]).unwrap();
        std::fs::write(dir.path().join("small.txt"), b"still here").unwrap();
        let server = start(dir.path(), ServerOptions::default()).await;

        let mut stream = tokio::net::TcpStream::connect(server.addr).await.unwrap();
        stream
            .write_all(b"GET /big.mov HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 1024];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0);
        drop(stream);

        let resp = reqwest::get(format!("http://{}/small.txt", server.addr))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "still here");
    }

    #[tokio::test]
    async fn test_shutdown_stops_accept_loop() {
        let dir = content_root();
        let mut server = start(dir.path(), ServerOptions::default()).await;
        if let Some(stop) = server.stop.take() {
            stop.send(()).unwrap();
        }
        let result = tokio::time::timeout(Duration::from_secs(5), server.handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_tls_round_trip() {
        use rustls::pki_types::ServerName;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("deck.pptx"), b"secure slides").unwrap();

        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let server_config =
            dirserve_tls::build_server_config(cert.pem().as_bytes(), key_pair.serialize_pem().as_bytes())
                .unwrap();
        let options = ServerOptions {
            tls: Some(TlsAcceptor::from(Arc::new(server_config))),
            max_connections: None,
        };
        let server = start(dir.path(), options).await;

        let mut roots = rustls::RootCertStore::empty();
        roots.add(cert.der().clone()).unwrap();
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let client_config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));

        let tcp = tokio::net::TcpStream::connect(server.addr).await.unwrap();
        let domain = ServerName::try_from("localhost").unwrap();
        let mut tls = connector.connect(domain, tcp).await.unwrap();
        tls.write_all(b"GET /deck.pptx HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        tls.flush().await.unwrap();

        let mut response = Vec::new();
        // the server may close without close_notify once the body is sent
        let _ = tls.read_to_end(&mut response).await;
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 200 OK"), "{}", text);
        assert!(text.contains("content-disposition: attachment; filename=\"deck.pptx\""));
        assert!(text.ends_with("secure slides"));
    }
}
