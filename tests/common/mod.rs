//! In-process fleet harness for convergence tests.
//!
//! The in-process analogue of `automatic_testing.py`'s `ProcessManager`:
//! instead of spawning daemon subprocesses and reading their stdout JSON,
//! each node here is a tokio task driving a real `RipManager` over real
//! loopback UDP sockets, publishing its table snapshot into a shared slot
//! the test polls directly.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_route::config::{Config, Output};
use rust_route::manager::RipManager;
use rust_route::table::TableRow;
use rust_route::wire::INFINITY;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const FAST_PERIODIC: Duration = Duration::from_millis(150);
const FAST_TRIGGERED: Duration = Duration::from_millis(40);
const FAST_TIMEOUT: Duration = Duration::from_millis(700);
const FAST_GC: Duration = Duration::from_millis(350);

pub const CONVERGENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// A free loopback port, obtained by binding to port 0 and releasing it.
/// Small TOCTOU race, acceptable for test setup.
pub fn free_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub struct FleetNode {
    pub router_id: u16,
    pub outputs: HashMap<u16, Output>,
    snapshot: Arc<Mutex<Vec<TableRow>>>,
    handle: JoinHandle<()>,
}

impl FleetNode {
    pub async fn snapshot(&self) -> Vec<TableRow> {
        self.snapshot.lock().await.clone()
    }

    /// Simulate a neighbour crashing: no shutdown message, the peers
    /// learn of the outage only once their entry timeout fires.
    pub fn kill(&self) {
        self.handle.abort();
    }
}

pub fn spawn_node(config: Config) -> FleetNode {
    let router_id = config.router_id;
    let outputs = config.outputs.clone();
    let snapshot = Arc::new(Mutex::new(Vec::new()));
    let snapshot_task = Arc::clone(&snapshot);

    let handle = tokio::spawn(async move {
        run_node(config, snapshot_task).await;
    });

    FleetNode {
        router_id,
        outputs,
        snapshot,
        handle,
    }
}

async fn run_node(config: Config, snapshot: Arc<Mutex<Vec<TableRow>>>) {
    let addr: SocketAddr = ([127, 0, 0, 1], config.input_ports[0]).into();
    let socket = UdpSocket::bind(addr)
        .await
        .expect("bind fleet node socket");

    let mut manager =
        RipManager::with_timings(&config, FAST_PERIODIC, FAST_TRIGGERED, FAST_TIMEOUT, FAST_GC);
    let mut buf = vec![0u8; 4096];

    loop {
        let now = Instant::now();
        let sleep_for = manager.next_timeout(now);
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            result = socket.recv(&mut buf) => {
                if let Ok(n) = result {
                    manager.incoming_message(&buf[..n], Instant::now());
                }
            }
        }

        let now = Instant::now();
        for packet in manager.send_any_updates(now) {
            let dest: SocketAddr = ([127, 0, 0, 1], packet.port).into();
            let _ = socket.send_to(&packet.bytes, dest).await;
        }

        *snapshot.lock().await = manager.table_rows();
    }
}

/// Build a `Config` for one router in a topology, given the already
/// chosen ports/metrics for its neighbours.
pub fn config_for(router_id: u16, own_port: u16, outputs: HashMap<u16, Output>) -> Config {
    Config {
        router_id,
        input_ports: vec![own_port],
        outputs,
    }
}

/// Single-source shortest paths over the fleet's declared topology,
/// ported from `automatic_testing.py`'s `dijkstras`. `topology` maps a
/// router-id to its direct neighbours and link metrics.
pub fn dijkstra(topology: &HashMap<u16, HashMap<u16, u8>>, source: u16) -> HashMap<u16, u8> {
    let mut dist: HashMap<u16, u32> = topology.keys().map(|&id| (id, u32::MAX)).collect();
    let mut queue: Vec<u16> = topology.keys().copied().collect();
    dist.insert(source, 0);

    while !queue.is_empty() {
        let u = *queue
            .iter()
            .min_by_key(|&&v| dist[&v])
            .expect("queue non-empty");
        queue.retain(|&v| v != u);

        if dist[&u] == u32::MAX {
            continue;
        }

        for (&v, &metric) in &topology[&u] {
            if !queue.contains(&v) {
                continue;
            }
            let cost = dist[&u] + metric as u32;
            if cost < dist[&v] {
                dist.insert(v, cost);
            }
        }
    }

    dist.into_iter()
        .map(|(id, cost)| (id, cost.min(INFINITY as u32) as u8))
        .collect()
}

/// Poll every node's snapshot until it matches the Dijkstra reference
/// for the given topology, or panic after `CONVERGENCE_TIMEOUT`.
pub async fn wait_for_convergence(nodes: &[FleetNode], topology: &HashMap<u16, HashMap<u16, u8>>) {
    let deadline = Instant::now() + CONVERGENCE_TIMEOUT;
    loop {
        if all_converged(nodes, topology).await {
            return;
        }
        if Instant::now() >= deadline {
            let mut report = String::new();
            for node in nodes {
                report.push_str(&format!(
                    "router {}: {:?}\n",
                    node.router_id,
                    node.snapshot().await
                ));
            }
            panic!("fleet did not converge within {CONVERGENCE_TIMEOUT:?}:\n{report}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn all_converged(nodes: &[FleetNode], topology: &HashMap<u16, HashMap<u16, u8>>) -> bool {
    for node in nodes {
        if !topology.contains_key(&node.router_id) {
            continue; // already killed, excluded from the reference topology
        }
        let expected = dijkstra(topology, node.router_id);
        let actual = node.snapshot().await;
        let actual: HashMap<u16, u8> = actual.into_iter().map(|r| (r.destination, r.metric)).collect();

        for (&destination, &metric) in &expected {
            if destination == node.router_id || metric >= INFINITY {
                continue;
            }
            match actual.get(&destination) {
                Some(&actual_metric) if actual_metric == metric => {}
                _ => return false,
            }
        }
    }
    true
}
