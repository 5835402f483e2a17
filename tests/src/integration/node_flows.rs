//! # Node Flows
//!
//! Two configured nodes with on-disk state: the master invites, the client
//! joins with the bootstrap text and later reconnects on its own.

use super::harness::eventually;
use node_runtime::{Node, NodeConfig, Role};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

fn free_port() -> u16 {
    let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

fn master_config(dir: &Path, port: u16) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.node.name = "hub".to_string();
    config.node.role = Role::Master;
    config.network.listen_addr = SocketAddr::from(([127, 0, 0, 1], port));
    config.storage.data_dir = dir.to_path_buf();
    config
}

fn client_config(dir: &Path) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.node.name = "thermostat".to_string();
    config.node.role = Role::Client;
    config.storage.data_dir = dir.to_path_buf();
    config
}

struct Running {
    node: Arc<Node>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl Running {
    fn spawn(config: NodeConfig) -> Self {
        let node = Arc::new(Node::open(config).unwrap());
        let (shutdown, rx) = watch::channel(false);
        let runner = node.clone();
        let task = tokio::spawn(async move { runner.run(rx).await });
        Self {
            node,
            shutdown,
            task,
        }
    }

    async fn stop(self) {
        let _ = self.shutdown.send(true);
        tokio::time::timeout(Duration::from_secs(3), self.task)
            .await
            .expect("node stops")
            .expect("node task")
            .expect("node result");
        self.node.shutdown();
    }
}

async fn wait_listening(port: u16) {
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("master never started listening on {port}");
}

#[tokio::test]
async fn test_invite_join_and_reconnect() {
    let master_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    let port = free_port();

    let master = Running::spawn(master_config(master_dir.path(), port));
    wait_listening(port).await;
    let invitation = master.node.invite().unwrap().encode();

    // first start: join with the bootstrap text
    let mut config = client_config(client_dir.path());
    config.network.connect_info = Some(invitation);
    let client = Running::spawn(config);
    let client_id = client.node.local_id();

    let log = master.node.device_log().clone();
    assert!(eventually(|| log.has_seen(&client_id)).await);
    let seen = log.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].name, "thermostat");
    assert!(seen[0].is_connection_local);
    client.stop().await;

    // second start: no token, only the address and the pinned master
    let mut config = client_config(client_dir.path());
    config.network.master_addr = Some(SocketAddr::from(([127, 0, 0, 1], port)));
    let client = Running::spawn(config);
    assert_eq!(client.node.local_id(), client_id);
    assert!(eventually(|| log.seen().len() == 2).await);
    client.stop().await;

    master.stop().await;
}

#[tokio::test]
async fn test_uninvited_client_is_refused() {
    let master_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    let port = free_port();

    let master = Running::spawn(master_config(master_dir.path(), port));
    wait_listening(port).await;

    let mut config = client_config(client_dir.path());
    config.network.master_addr = Some(SocketAddr::from(([127, 0, 0, 1], port)));
    let client = Node::open(config).unwrap();
    let (_shutdown, rx) = watch::channel(false);

    let result = tokio::time::timeout(Duration::from_secs(3), client.run(rx))
        .await
        .expect("client gives up");
    assert!(result.is_err());
    assert!(master.node.device_log().seen().is_empty());
    client.shutdown();

    master.stop().await;
}
