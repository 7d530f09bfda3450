//! Minimal echo server: one queue broker bound to a port, a handful of
//! clients, every message echoed back.
//!
//! Run with:
//!   cargo run --example echo-server --features peer

use std::sync::mpsc;
use std::time::Duration;

use simsock::frame::{MessageQueue, QueueEvent};
use simsock::peer::QueueBroker;
use simsock::transport::{Executor, Registry};

const PORT: u16 = 7;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let executor = Executor::spawn("echo-example")?;
    let registry = Registry::new();

    let server = QueueBroker::new("server", &registry, executor.clone())?;
    server.bind(PORT, |queue: MessageQueue| {
        eprintln!("Client connected: {}", queue.remote_name());
        let echo = queue.clone();
        queue.set_listener(move |event| match event {
            QueueEvent::Received(payload) => {
                eprintln!("Echoing {} bytes to {}", payload.len(), echo.remote_name());
                let _ = echo.send(&payload);
            }
            QueueEvent::Closed => eprintln!("Client left: {}", echo.remote_name()),
        });
    })?;

    let (tx, rx) = mpsc::channel();
    for name in ["alice", "bob"] {
        let client = QueueBroker::new(name, &registry, executor.clone())?;
        let tx = tx.clone();
        client.connect("server", PORT, move |result| {
            let Ok(queue) = result else {
                return;
            };
            let reply = queue.clone();
            queue.set_listener(move |event| {
                if let QueueEvent::Received(payload) = event {
                    let _ = tx.send(String::from_utf8_lossy(&payload).into_owned());
                    reply.close();
                }
            });
            let _ = queue.send(format!("hello from {}", queue.local_name()).as_bytes());
        })?;
    }
    drop(tx);

    for _ in 0..2 {
        let echoed = rx.recv_timeout(Duration::from_secs(5))?;
        println!("{echoed}");
    }

    server.unbind(PORT)?;
    executor.shutdown();
    Ok(())
}
