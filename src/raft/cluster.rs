//! Cluster membership: bootstrap-vs-join startup and the join-acceptance
//! protocol.

use crate::raft::consensus::{Consensus, ConsensusError, Role, ServerAddress, ServerId};
use crate::raft::errors::KvError;
use async_trait::async_trait;
use slog::{debug, info, Logger};
use std::fmt;
use std::sync::Arc;

/// Call to an existing cluster leader asking it to accept this node. The
/// transport behind it (RPC client, test double) is a collaborator concern.
#[async_trait]
pub trait JoinClient: Send + Sync {
    async fn join(&self, id: ServerId, address: ServerAddress) -> Result<(), KvError>;
}

/// Static identity and startup mode of this node.
#[derive(Clone, Debug)]
pub struct ClusterNodeConfig {
    /// Stable, unique id for the lifetime of the node.
    pub id: ServerId,

    /// Address this node listens on.
    pub real_address: ServerAddress,

    /// Address other members are told to reach this node at.
    pub advertised_address: ServerAddress,

    /// Whether this node originates a fresh cluster instead of joining one.
    pub bootstrap_cluster: bool,
}

/// Errors from membership-manager construction and startup.
#[derive(Debug)]
pub enum ClusterError {
    /// A required configuration field is empty or missing.
    InvalidConfig(&'static str),

    /// Installing the initial single-voter configuration failed.
    Bootstrap(ConsensusError),

    /// The existing leader rejected or failed the join request.
    Join(KvError),

    /// Graceful shutdown of the consensus collaborator failed.
    Shutdown(ConsensusError),
}

impl fmt::Display for ClusterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterError::InvalidConfig(what) => write!(f, "invalid cluster config: {}", what),
            ClusterError::Bootstrap(err) => write!(f, "cannot bootstrap cluster: {}", err),
            ClusterError::Join(err) => write!(f, "cannot join cluster: {}", err),
            ClusterError::Shutdown(err) => write!(f, "cannot shut down: {}", err),
        }
    }
}

impl std::error::Error for ClusterError {}

/// Manages this node's place in the cluster: bootstrap or join on startup,
/// accept joiners while leader, graceful shutdown.
pub struct ClusterNode {
    logger: Logger,
    consensus: Arc<dyn Consensus>,
    join_client: Option<Arc<dyn JoinClient>>,
    id: ServerId,
    real_address: ServerAddress,
    advertised_address: ServerAddress,
    is_first_node: bool,
}

impl ClusterNode {
    /// Build the membership manager.
    ///
    /// A join client is required on a joining node; a bootstrapping node has
    /// no existing leader to talk to.
    pub fn new(
        logger: Logger,
        consensus: Arc<dyn Consensus>,
        join_client: Option<Arc<dyn JoinClient>>,
        config: ClusterNodeConfig,
    ) -> Result<Self, ClusterError> {
        let logger = logger.new(slog::o!("component" => "raft.ClusterNode"));

        if config.id.is_empty() {
            return Err(ClusterError::InvalidConfig("node id required"));
        }
        if config.real_address.is_empty() {
            return Err(ClusterError::InvalidConfig("real address required"));
        }
        if config.advertised_address.is_empty() {
            return Err(ClusterError::InvalidConfig("advertised address required"));
        }
        if !config.bootstrap_cluster && join_client.is_none() {
            return Err(ClusterError::InvalidConfig(
                "join client required when joining an existing cluster",
            ));
        }

        debug!(logger, "cluster node created";
            "id" => &config.id,
            "advertised_address" => &config.advertised_address,
            "bootstrap" => config.bootstrap_cluster,
        );

        Ok(Self {
            logger,
            consensus,
            join_client,
            id: config.id,
            real_address: config.real_address,
            advertised_address: config.advertised_address,
            is_first_node: config.bootstrap_cluster,
        })
    }

    /// Bring this node into a cluster.
    ///
    /// The cluster originator installs a single-voter configuration holding
    /// only itself, skipped when the node is recovering from persisted
    /// state and is already part of a configuration. A joining node asks the
    /// existing leader to accept it. No internal retry on failure; restart
    /// and backoff policy belong to the operator.
    pub async fn run(&self, recovered: bool) -> Result<(), ClusterError> {
        info!(self.logger, "starting"; "address" => &self.real_address);

        if recovered && self.is_first_node {
            return Ok(());
        }

        if self.is_first_node {
            return self.bootstrap_cluster().await;
        }

        self.join_cluster().await
    }

    /// Handle a join request from another node.
    ///
    /// Membership changes must flow through the leader so they are
    /// themselves replicated. A joiner whose id or address is already in the
    /// configuration is refused with `NodeExists` and the configuration is
    /// left untouched; a duplicate join is a no-op failure, not corruption.
    pub async fn accept_join(
        &self,
        joiner_id: ServerId,
        joiner_address: ServerAddress,
    ) -> Result<(), KvError> {
        info!(self.logger, "got join request";
            "joiner_id" => &joiner_id,
            "joiner_address" => &joiner_address,
        );

        if self.consensus.role() != Role::Leader {
            return Err(KvError::NotLeader {
                leader: self.consensus.leader_hint(),
            });
        }

        let configuration = self.consensus.configuration().await.map_err(KvError::from)?;
        for server in &configuration.servers {
            if server.id == joiner_id || server.address == joiner_address {
                return Err(KvError::NodeExists {
                    id: joiner_id,
                    address: joiner_address,
                });
            }
        }

        self.consensus
            .add_voter(joiner_id.clone(), joiner_address)
            .await
            .map_err(KvError::from)?;

        info!(self.logger, "accepted new voter"; "joiner_id" => &joiner_id);

        Ok(())
    }

    /// Gracefully stop participating in the cluster.
    pub async fn shutdown(&self) -> Result<(), ClusterError> {
        info!(self.logger, "shutting down");

        self.consensus
            .shutdown()
            .await
            .map_err(ClusterError::Shutdown)?;

        info!(self.logger, "shut down gracefully");

        Ok(())
    }

    async fn bootstrap_cluster(&self) -> Result<(), ClusterError> {
        self.consensus
            .bootstrap(self.id.clone(), self.advertised_address.clone())
            .await
            .map_err(ClusterError::Bootstrap)?;

        debug!(self.logger, "bootstrapped cluster");

        Ok(())
    }

    async fn join_cluster(&self) -> Result<(), ClusterError> {
        let Some(client) = self.join_client.as_ref() else {
            // Unreachable after construction-time validation.
            return Err(ClusterError::InvalidConfig(
                "join client required when joining an existing cluster",
            ));
        };

        client
            .join(self.id.clone(), self.advertised_address.clone())
            .await
            .map_err(ClusterError::Join)?;

        debug!(self.logger, "joined cluster");

        Ok(())
    }
}
