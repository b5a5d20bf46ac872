use std::{io, net::SocketAddr, time::Duration};

use axum::serve::Listener;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::timeout,
};
use tokio_native_tls::{TlsAcceptor, TlsStream, native_tls};
use tracing::debug;

use crate::config::TlsFiles;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const READY_BACKLOG: usize = 64;

/// Build an acceptor from a PEM certificate chain and a PEM PKCS#8 key.
pub async fn acceptor(files: &TlsFiles) -> anyhow::Result<TlsAcceptor> {
    let cert = tokio::fs::read(&files.certfile).await.map_err(|e| {
        anyhow::anyhow!("failed to read certfile {}: {e}", files.certfile.display())
    })?;
    let key = tokio::fs::read(&files.keyfile).await.map_err(|e| {
        anyhow::anyhow!("failed to read keyfile {}: {e}", files.keyfile.display())
    })?;

    let identity = native_tls::Identity::from_pkcs8(&cert, &key)?;
    Ok(native_tls::TlsAcceptor::new(identity)?.into())
}

type Ready = (TlsStream<TcpStream>, SocketAddr);

/// TCP listener that only yields connections with a completed TLS handshake.
///
/// Connections are accepted by a background task and every handshake runs in
/// its own task, so a slow client never holds up the others.
pub struct TlsListener {
    local_addr: SocketAddr,
    ready: mpsc::Receiver<Ready>,
}

impl TlsListener {
    pub fn new(inner: TcpListener, acceptor: TlsAcceptor) -> io::Result<Self> {
        let local_addr = inner.local_addr()?;
        let (tx, ready) = mpsc::channel(READY_BACKLOG);
        tokio::spawn(accept_loop(inner, acceptor, tx));
        Ok(Self { local_addr, ready })
    }
}

async fn accept_loop(mut inner: TcpListener, acceptor: TlsAcceptor, tx: mpsc::Sender<Ready>) {
    loop {
        let (stream, addr) = tokio::select! {
            conn = Listener::accept(&mut inner) => conn,
            // listener dropped
            _ = tx.closed() => return,
        };

        let acceptor = acceptor.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            match timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                Ok(Ok(stream)) => {
                    let _ = tx.send((stream, addr)).await;
                }
                Ok(Err(e)) => debug!(%addr, "TLS handshake failed: {e}"),
                Err(_) => debug!(%addr, "TLS handshake timed out"),
            }
        });
    }
}

impl Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.ready.recv().await {
            Some(conn) => conn,
            // the accept task only stops once this listener is gone
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use axum::{Router, routing::get};

    use super::*;

    fn test_files() -> TlsFiles {
        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata");
        TlsFiles {
            certfile: dir.join("cert.pem"),
            keyfile: dir.join("key.pem"),
        }
    }

    async fn serve_https() -> SocketAddr {
        let acceptor = acceptor(&test_files()).await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let listener = TlsListener::new(listener, acceptor).unwrap();
        let addr = listener.local_addr().unwrap();

        let app = Router::new().route("/health", get(|| async { "ok" }));
        tokio::spawn(async move { axum::serve(listener, app).await });
        addr
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(3))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn serves_over_tls() {
        let addr = serve_https().await;

        let res = client()
            .get(format!("https://{addr}/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
        assert_eq!(res.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn plain_http_is_dropped() {
        let addr = serve_https().await;

        let res = client().get(format!("http://{addr}/health")).send().await;
        assert!(res.is_err());

        // the listener keeps serving afterwards
        let res = client()
            .get(format!("https://{addr}/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn silent_client_does_not_block_others() {
        let addr = serve_https().await;

        // connects but never starts a handshake
        let _silent = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let res = client()
            .get(format!("https://{addr}/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_certificate_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let files = TlsFiles {
            certfile: dir.path().join("cert.pem"),
            keyfile: dir.path().join("key.pem"),
        };

        let err = acceptor(&files).await.err().expect("no certificate");
        assert!(err.to_string().contains("certfile"));
    }

    #[tokio::test]
    async fn garbage_certificate_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let files = TlsFiles {
            certfile: dir.path().join("cert.pem"),
            keyfile: dir.path().join("key.pem"),
        };
        std::fs::write(&files.certfile, "not a certificate").unwrap();
        std::fs::write(&files.keyfile, "not a key").unwrap();

        assert!(acceptor(&files).await.is_err());
    }
}
