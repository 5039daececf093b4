use capsule_control::ControlServer;
use capsule_daemon::{NodeState, Result};
use capsule_discovery::DiscoverySocket;
use capsule_keystore::load_or_generate_identity;
use capsule_settings::Config;
use capsule_storage::{FileStore, PeerStore};
use capsule_transport::UdpTransport;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    capsule_logging::init("info");

    if let Err(e) = run().await {
        error!(error = %e, "capsule node exited with an error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::load_or_default()?;

    std::fs::create_dir_all(&config.storage.data_dir)?;

    let identity = load_or_generate_identity(&config.identity_key_path())?;
    info!(
        node_id = %capsule_core::node_id_to_hex(&identity.node_id()),
        data_dir = %config.storage.data_dir.display(),
        "identity loaded"
    );

    let bind_addr: std::net::SocketAddr = format!("0.0.0.0:{}", config.network.port)
        .parse()
        .expect("valid bind address");
    let transport = UdpTransport::bind(bind_addr, 3600).await?;
    info!(local_addr = ?transport.local_addr(), "transport bound");

    let discovery = DiscoverySocket::bind(config.network.port).await?;
    let control = ControlServer::bind(config.control_socket_path())?;
    let store = FileStore::new(config.storage.data_dir.clone());

    let state = NodeState::new(identity, config, transport, discovery, control, store);

    for node in state.store.load_peers().unwrap_or_default() {
        state
            .routing_table
            .lock()
            .expect("routing table mutex poisoned")
            .update(node);
    }

    capsule_daemon::run(state).await
}
