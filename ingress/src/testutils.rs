use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;

/// Starts a stub webhook on an ephemeral port. Each request gets the next
/// status from `statuses` (the last one repeats) and bumps the hit count.
pub(crate) async fn start_stub_webhook(statuses: Vec<u16>) -> (u16, Arc<AtomicUsize>) {
    assert!(!statuses.is_empty());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let hits = Arc::new(AtomicUsize::new(0));
    let statuses = Arc::new(statuses);

    let hits_for_server = hits.clone();
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);
            let hits = hits_for_server.clone();
            let statuses = statuses.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let hits = hits.clone();
                    let statuses = statuses.clone();
                    async move {
                        // Drain the body so keep-alive connections stay usable
                        let _ = req.into_body().collect().await;
                        let n = hits.fetch_add(1, Ordering::SeqCst);
                        let status = statuses[n.min(statuses.len() - 1)];
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::new()))
                                .unwrap(),
                        )
                    }
                });

                let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await;
            });
        }
    });

    (port, hits)
}
