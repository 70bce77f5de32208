use clap::Parser;

use chaincoin_core::config::{Cli, NodeConfig};
use chaincoin_core::node::Node;

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let config = NodeConfig::from_cli(&cli);
    let api_host = config.host.clone();
    let api_port = config.api_port;

    let node = Node::new(config);
    node.start();

    let api_node = node.clone();
    let api_thread = std::thread::spawn(move || {
        if let Err(e) = chaincoin_core::api::serve(api_node, &api_host, api_port) {
            log::error!("api: failed to start: {}", e);
        }
    });

    ctrlc_or_join(&node, api_thread);
}

/// Runs until interrupted, then shuts the node down cleanly.
fn ctrlc_or_join(node: &std::sync::Arc<Node>, api_thread: std::thread::JoinHandle<()>) {
    let node = node.clone();
    let result = ctrlc::set_handler(move || {
        node.stop();
        std::process::exit(0);
    });
    if result.is_err() {
        log::warn!("main: could not install signal handler; run until the API thread exits");
    }
    let _ = api_thread.join();
}
