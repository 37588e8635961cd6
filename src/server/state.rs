use std::sync::Arc;

use tokio::sync::watch;

use crate::client::StageClient;
use crate::runtime::{Forwarder, ForwardingChain};

/// Shared manager state: the read-only chain plus the shutdown signal
#[derive(Clone)]
pub struct ManagerState {
    pub forwarder: Arc<Forwarder>,
    pub shutdown: watch::Receiver<bool>,
    pub max_payload_bytes: usize,
}

impl ManagerState {
    pub fn new(
        client: Arc<dyn StageClient>,
        chain: ForwardingChain,
        shutdown: watch::Receiver<bool>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            forwarder: Arc::new(Forwarder::new(client, chain)),
            shutdown,
            max_payload_bytes,
        }
    }

    pub fn chain(&self) -> &ForwardingChain {
        self.forwarder.chain()
    }
}
