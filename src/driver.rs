//! The async event loop binding UDP sockets to a [`RipManager`] (spec §5).
//!
//! Single-threaded cooperative execution, matching the original Python
//! daemon's one-process-per-router model: every input port gets its own
//! `UdpSocket` read on its own task, forwarding datagrams to the main
//! loop over an mpsc channel so `tokio::select!` only ever waits on one
//! receiver regardless of how many ports are configured.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::Duration;

use crate::config::Config;
use crate::error::{RouteError, RouteResult};
use crate::manager::RipManager;

const PRINT_INTERVAL: Duration = Duration::from_secs(1);
const MAX_UDP_PAYLOAD: usize = 4096;
const CHANNEL_CAPACITY: usize = 256;

/// Output mode for the periodic table dump (spec §6 `--autotesting`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    HumanReadable,
    Json,
}

async fn bind_inputs(config: &Config) -> RouteResult<Vec<Arc<UdpSocket>>> {
    let mut sockets = Vec::with_capacity(config.input_ports.len());
    for &port in &config.input_ports {
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| RouteError::Network(format!("binding input port {port}: {e}")))?;
        sockets.push(Arc::new(socket));
    }
    Ok(sockets)
}

/// Run the daemon loop forever (until the process receives SIGINT/SIGTERM).
pub async fn run(config: Config, dump_format: DumpFormat) -> RouteResult<()> {
    let router_id = config.router_id;
    let sockets = bind_inputs(&config).await?;
    let send_socket = Arc::clone(&sockets[0]);

    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(CHANNEL_CAPACITY);
    for socket in &sockets {
        let socket = Arc::clone(socket);
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_UDP_PAYLOAD];
            loop {
                match socket.recv(&mut buf).await {
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        log::warn!("recv error: {e}");
                        return;
                    }
                }
            }
        });
    }
    drop(tx);

    let mut manager = RipManager::new(&config);
    let mut next_print = Instant::now() + PRINT_INTERVAL;

    log::info!("router {router_id} listening on {} port(s)", sockets.len());

    loop {
        let now = Instant::now();
        let sleep_for = manager
            .next_timeout(now)
            .min(next_print.saturating_duration_since(now));

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            received = rx.recv() => {
                match received {
                    Some(bytes) => manager.incoming_message(&bytes, Instant::now()),
                    None => {
                        log::error!("all input sockets closed unexpectedly");
                        return Err(RouteError::Network("all input sockets closed".to_string()));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("router {router_id} shutting down");
                return Ok(());
            }
        }

        let now = Instant::now();
        for packet in manager.send_any_updates(now) {
            send_to_port(&send_socket, packet.port, &packet.bytes).await?;
        }

        if now >= next_print {
            dump_table(&manager, dump_format);
            next_print = now + PRINT_INTERVAL;
        }
    }
}

async fn send_to_port(socket: &UdpSocket, port: u16, bytes: &[u8]) -> RouteResult<()> {
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    socket
        .send_to(bytes, addr)
        .await
        .map_err(|e| RouteError::Network(format!("sending to port {port}: {e}")))?;
    Ok(())
}

fn dump_table(manager: &RipManager, format: DumpFormat) {
    match format {
        DumpFormat::HumanReadable => println!("{manager}"),
        DumpFormat::Json => {
            use std::io::Write;

            let rows: Vec<(u16, u16, u8, bool)> = manager
                .table_rows()
                .into_iter()
                .map(|row| (row.destination, row.next_hop, row.metric, row.deletion_in_progress))
                .collect();
            match serde_json::to_string(&rows) {
                Ok(json) => {
                    println!("{json}");
                    let _ = std::io::stdout().flush();
                }
                Err(e) => log::error!("failed to serialize table dump: {e}"),
            }
        }
    }
}
