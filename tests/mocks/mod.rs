
use std::net::TcpListener;

use axum::Router;

/// Serve `router` on a free local port and return its base url.
pub fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(router.into_make_service());
    tokio::spawn(async move {
        let _ = server.await;
    });
    format!("http://{address}")
}
