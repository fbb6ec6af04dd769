// Boots one shared battlemap server per test binary, on an ephemeral port.

use std::net::TcpStream;
use std::sync::{OnceLock, mpsc};
use std::thread;
use std::time::Duration;

static BASE_URL: OnceLock<String> = OnceLock::new();

/// Returns the base URL of the shared test server, starting it on first use.
/// The server lives on its own OS thread with its own runtime so it outlives
/// the per-test runtimes `#[tokio::test]` creates and tears down.
pub fn ensure_server() -> &'static str {
    BASE_URL.get_or_init(|| {
        let (addr_tx, addr_rx) = mpsc::channel();
        thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                // An ephemeral port avoids colliding with local services or
                // another test binary's server.
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("local addr");
                addr_tx.send(addr).expect("publish test server address");
                battlemap_server::run(listener).await.expect("server failed");
            });
        });

        let addr = addr_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("server should bind within the timeout");
        wait_until_accepting(&addr.to_string());
        format!("http://{addr}")
    })
}

// The address arrives as soon as the listener binds, which can be slightly
// before the server accepts; probe with plain TCP until it does.
fn wait_until_accepting(addr: &str) {
    for _ in 0..100 {
        if TcpStream::connect(addr).is_ok() {
            return;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("server did not become ready in time");
}
