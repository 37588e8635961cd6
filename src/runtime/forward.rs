//! The forwarding walk
//!
//! One inbound payload visits every stage of the chain in producer-first
//! order. Each stage's response body becomes the next stage's request body.
//! The first failure ends the walk; no partial result is ever returned.

use std::sync::Arc;

use axum::body::Bytes;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use crate::client::{StageClient, StageClientError};

#[derive(Error, Debug, PartialEq)]
pub enum ForwardError {
    #[error("Stage {stage} ({url}) returned {status}: {body}")]
    Stage {
        stage: usize,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Stage {stage} ({url}) unreachable: {message}")]
    Unreachable {
        stage: usize,
        url: String,
        message: String,
    },

    #[error("Stage {stage} ({url}) response exceeds {limit} bytes")]
    PayloadTooLarge {
        stage: usize,
        url: String,
        limit: usize,
    },

    #[error("Forwarding cancelled by shutdown")]
    Cancelled,
}

impl ForwardError {
    fn from_client(stage: usize, url: &str, err: StageClientError) -> Self {
        let url = url.to_string();
        match err {
            StageClientError::Status { status, body } => ForwardError::Stage {
                stage,
                url,
                status,
                body,
            },
            StageClientError::TooLarge { limit } => ForwardError::PayloadTooLarge { stage, url, limit },
            StageClientError::Http(message) => ForwardError::Unreachable { stage, url, message },
        }
    }

    /// Short machine-readable kind for error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Stage { .. } | ForwardError::Unreachable { .. } => "forward_failure",
            ForwardError::PayloadTooLarge { .. } => "payload_too_large",
            ForwardError::Cancelled => "cancelled",
        }
    }

    /// Index of the failing stage, if one failed
    pub fn stage(&self) -> Option<usize> {
        match self {
            ForwardError::Stage { stage, .. }
            | ForwardError::Unreachable { stage, .. }
            | ForwardError::PayloadTooLarge { stage, .. } => Some(*stage),
            ForwardError::Cancelled => None,
        }
    }
}

/// Producer-first list of stage base URLs, fixed for the manager's lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingChain(Arc<[String]>);

impl ForwardingChain {
    pub fn new(addresses: Vec<String>) -> Self {
        Self(addresses.into())
    }

    pub fn addresses(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Walks a payload through a [`ForwardingChain`]
pub struct Forwarder {
    client: Arc<dyn StageClient>,
    chain: ForwardingChain,
}

impl Forwarder {
    pub fn new(client: Arc<dyn StageClient>, chain: ForwardingChain) -> Self {
        Self { client, chain }
    }

    pub fn chain(&self) -> &ForwardingChain {
        &self.chain
    }

    /// Forward `body` through every stage, returning the last stage's response.
    ///
    /// A shutdown signal abandons the walk at whichever stage it is waiting on.
    pub async fn forward(
        &self,
        mut body: Bytes,
        request_id: &str,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<Bytes, ForwardError> {
        for (stage, url) in self.chain.addresses().iter().enumerate() {
            debug!("[{}] stage {} -> {} ({} bytes)", request_id, stage, url, body.len());
            let call = self.client.post(url, body, request_id);
            body = tokio::select! {
                result = call => result.map_err(|e| ForwardError::from_client(stage, url, e))?,
                _ = wait_for_shutdown(&mut shutdown) => return Err(ForwardError::Cancelled),
            };
        }
        Ok(body)
    }
}

/// Resolve once the shutdown flag is raised; never resolves if the sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
