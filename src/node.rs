// src/node.rs

//! Remote execution endpoints.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::errors::{HopdagError, Result};
use crate::transport::{BoxFuture, SessionRef, Transport};

/// Identity of an execution endpoint, possibly reached through a gateway.
///
/// Nodes are immutable; jobs share them through `Arc<Node>`. The gateway is
/// itself a node, so a chain of jump hosts is a linked list of `Arc`s
/// terminating in a directly reachable node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    host: String,
    user: Option<String>,
    port: Option<u16>,
    local: bool,
    gateway: Option<Arc<Node>>,
}

impl Node {
    /// A node reached directly.
    pub fn new(host: impl Into<String>, user: Option<&str>) -> Self {
        Self {
            host: host.into(),
            user: user.map(str::to_string),
            port: None,
            local: false,
            gateway: None,
        }
    }

    /// The machine running the orchestrator.
    pub fn local() -> Self {
        Self {
            host: "localhost".to_string(),
            user: None,
            port: None,
            local: true,
            gateway: None,
        }
    }

    /// A node reached through `gateway`.
    ///
    /// Fails with `ConfigError` when this node's identity already appears in
    /// the gateway chain, which would make resolution loop forever.
    pub fn via(host: impl Into<String>, user: Option<&str>, gateway: Arc<Node>) -> Result<Self> {
        let node = Self {
            gateway: Some(gateway),
            ..Self::new(host, user)
        };
        node.check_gateways()?;
        Ok(node)
    }

    /// Set the ssh port. The port is part of the node's identity, so the
    /// gateway chain is checked again.
    pub fn with_port(mut self, port: u16) -> Result<Self> {
        self.port = Some(port);
        self.check_gateways()?;
        Ok(self)
    }

    fn check_gateways(&self) -> Result<()> {
        if let Some(hop) = self.gateways().find(|hop| hop.same_endpoint(self)) {
            let chain: Vec<String> = std::iter::once(self.destination())
                .chain(self.gateways().map(Node::destination))
                .collect();
            return Err(HopdagError::ConfigError(format!(
                "gateway cycle: {} reaches itself through {}",
                hop.destination(),
                chain.join(" -> ")
            )));
        }
        Ok(())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn gateway(&self) -> Option<&Arc<Node>> {
        self.gateway.as_ref()
    }

    /// `user@host[:port]`, the form OpenSSH accepts for `-J` hops.
    pub fn destination(&self) -> String {
        let mut dest = match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        };
        if let Some(port) = self.port {
            dest.push_str(&format!(":{port}"));
        }
        dest
    }

    /// Gateways from the nearest to the outermost (the one reached first).
    pub fn gateways(&self) -> impl Iterator<Item = &Node> {
        std::iter::successors(self.gateway.as_deref(), |n| n.gateway.as_deref())
    }

    /// Establish a session, resolving the gateway chain first.
    pub fn resolve<'a>(&'a self, transport: &'a dyn Transport) -> BoxFuture<'a, Result<SessionRef>> {
        Box::pin(async move {
            let via = match &self.gateway {
                Some(gateway) => Some(gateway.resolve(transport).await?),
                None => None,
            };
            debug!(node = %self, via = via.is_some(), "connecting");
            transport.connect(self, via).await
        })
    }

    fn same_endpoint(&self, other: &Node) -> bool {
        self.host == other.host && self.user == other.user && self.port == other.port
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.destination())?;
        for hop in self.gateways() {
            write!(f, " via {}", hop.destination())?;
        }
        Ok(())
    }
}
