//! # cairn-types: Core types for `Cairn`
//!
//! This crate contains the shared vocabulary of the placement controller:
//! - Entity IDs ([`RegionId`], [`StoreId`], [`PeerId`])
//! - Replica layout ([`Peer`], [`PeerRole`])
//! - Storage nodes ([`StoreInfo`], [`StoreState`])
//! - Region snapshots ([`RegionInfo`], [`RegionEpoch`])
//! - Corrective actions ([`Operator`], [`OperatorKind`], [`OperatorStep`])

use std::fmt::{Debug, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

mod operator;

pub use operator::{Operator, OperatorKind, OperatorPriority, OperatorStep};

// ============================================================================
// Entity IDs - All Copy (cheap 8-byte values)
// ============================================================================

/// Unique identifier for a region (a contiguous, replicated key range).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct RegionId(u64);

impl RegionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the region ID as a `u64`.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RegionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<RegionId> for u64 {
    fn from(id: RegionId) -> Self {
        id.0
    }
}

/// Unique identifier for a storage node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct StoreId(u64);

impl StoreId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for StoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StoreId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<StoreId> for u64 {
    fn from(id: StoreId) -> Self {
        id.0
    }
}

/// Unique identifier for a single replica of a region.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct PeerId(u64);

impl PeerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PeerId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<PeerId> for u64 {
    fn from(id: PeerId) -> Self {
        id.0
    }
}

// ============================================================================
// Peers - Copy
// ============================================================================

/// Raft role of a replica.
///
/// `IncomingVoter` and `DemotingVoter` only appear while the region is in a
/// joint configuration: the former is a learner being promoted, the latter
/// a voter being demoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PeerRole {
    #[default]
    Voter,
    Learner,
    IncomingVoter,
    DemotingVoter,
}

impl PeerRole {
    /// Returns true if the peer votes in the current (outgoing) configuration.
    pub fn is_voter(self) -> bool {
        matches!(self, PeerRole::Voter | PeerRole::DemotingVoter)
    }

    /// Returns true if the role only exists inside a joint configuration.
    pub fn is_joint(self) -> bool {
        matches!(self, PeerRole::IncomingVoter | PeerRole::DemotingVoter)
    }
}

impl Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerRole::Voter => write!(f, "voter"),
            PeerRole::Learner => write!(f, "learner"),
            PeerRole::IncomingVoter => write!(f, "incoming-voter"),
            PeerRole::DemotingVoter => write!(f, "demoting-voter"),
        }
    }
}

/// A single replica of a region, placed on one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub store_id: StoreId,
    pub role: PeerRole,
}

impl Peer {
    pub fn new(id: PeerId, store_id: StoreId, role: PeerRole) -> Self {
        Self { id, store_id, role }
    }

    pub fn voter(id: u64, store_id: u64) -> Self {
        Self::new(PeerId::new(id), StoreId::new(store_id), PeerRole::Voter)
    }

    pub fn learner(id: u64, store_id: u64) -> Self {
        Self::new(PeerId::new(id), StoreId::new(store_id), PeerRole::Learner)
    }

    pub fn is_learner(&self) -> bool {
        self.role == PeerRole::Learner
    }
}

// ============================================================================
// Stores - Clone (labels are owned strings)
// ============================================================================

/// Lifecycle state of a storage node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StoreState {
    #[default]
    Up,
    /// Being drained; its replicas should move elsewhere.
    Offline,
    /// Unreachable for longer than the down threshold.
    Down,
    /// Removed from the cluster for good.
    Tombstone,
}

/// A label attached to a store, e.g. `zone=z1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreLabel {
    pub key: String,
    pub value: String,
}

impl StoreLabel {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Snapshot of a storage node as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub id: StoreId,
    pub state: StoreState,
    pub labels: Vec<StoreLabel>,
    /// Number of region replicas currently hosted.
    pub region_count: u64,
}

impl StoreInfo {
    /// Creates an up store with no labels and no regions.
    pub fn new(id: u64) -> Self {
        Self {
            id: StoreId::new(id),
            state: StoreState::Up,
            labels: Vec::new(),
            region_count: 0,
        }
    }

    pub fn with_state(mut self, state: StoreState) -> Self {
        self.state = state;
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push(StoreLabel::new(key, value));
        self
    }

    pub fn with_region_count(mut self, count: u64) -> Self {
        self.region_count = count;
        self
    }

    /// Returns true if the store can accept new replicas.
    pub fn is_up(&self) -> bool {
        self.state == StoreState::Up
    }

    /// Returns true if replicas on this store must be moved away.
    pub fn is_removing(&self) -> bool {
        matches!(self.state, StoreState::Offline | StoreState::Tombstone)
    }

    /// Returns the value of the label with the given key.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|label| label.key == key)
            .map(|label| label.value.as_str())
    }
}

// ============================================================================
// Regions - Clone (owns its key range and peer list)
// ============================================================================

/// Version pair that changes whenever a region's membership or range changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct RegionEpoch {
    /// Bumped on every membership change.
    pub conf_ver: u64,
    /// Bumped on every split or merge.
    pub version: u64,
}

/// Read-only snapshot of a region handed to the checkers.
///
/// An empty `end_key` means the region extends to +infinity; an empty
/// `start_key` means it starts at -infinity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    id: RegionId,
    start_key: Bytes,
    end_key: Bytes,
    epoch: RegionEpoch,
    peers: Vec<Peer>,
    leader: Option<PeerId>,
    down_peers: Vec<PeerId>,
    pending_peers: Vec<PeerId>,
    /// Approximate size in MiB.
    approximate_size: u64,
    approximate_keys: u64,
}

impl RegionInfo {
    /// Creates a region covering `[start_key, end_key)` with the given peers.
    ///
    /// The first voter becomes the leader.
    pub fn new(
        id: RegionId,
        start_key: impl Into<Bytes>,
        end_key: impl Into<Bytes>,
        peers: Vec<Peer>,
    ) -> Self {
        let leader = peers.iter().find(|p| p.role.is_voter()).map(|p| p.id);
        Self {
            id,
            start_key: start_key.into(),
            end_key: end_key.into(),
            epoch: RegionEpoch::default(),
            peers,
            leader,
            down_peers: Vec::new(),
            pending_peers: Vec::new(),
            approximate_size: 0,
            approximate_keys: 0,
        }
    }

    pub fn with_leader(mut self, leader: PeerId) -> Self {
        self.leader = Some(leader);
        self
    }

    pub fn with_epoch(mut self, epoch: RegionEpoch) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn with_down_peers(mut self, down: Vec<PeerId>) -> Self {
        self.down_peers = down;
        self
    }

    pub fn with_pending_peers(mut self, pending: Vec<PeerId>) -> Self {
        self.pending_peers = pending;
        self
    }

    pub fn with_approximate_size(mut self, size_mib: u64, keys: u64) -> Self {
        self.approximate_size = size_mib;
        self.approximate_keys = keys;
        self
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn start_key(&self) -> &[u8] {
        &self.start_key
    }

    pub fn end_key(&self) -> &[u8] {
        &self.end_key
    }

    pub fn epoch(&self) -> RegionEpoch {
        self.epoch
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn down_peers(&self) -> &[PeerId] {
        &self.down_peers
    }

    pub fn pending_peers(&self) -> &[PeerId] {
        &self.pending_peers
    }

    pub fn approximate_size(&self) -> u64 {
        self.approximate_size
    }

    pub fn approximate_keys(&self) -> u64 {
        self.approximate_keys
    }

    /// Returns the leader peer, if one is known.
    pub fn leader(&self) -> Option<&Peer> {
        let leader = self.leader?;
        self.peers.iter().find(|p| p.id == leader)
    }

    /// Returns peers that vote in the current configuration.
    pub fn voters(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| p.role.is_voter())
    }

    /// Returns plain learners (not incoming voters).
    pub fn learners(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter().filter(|p| p.is_learner())
    }

    pub fn peer_on_store(&self, store_id: StoreId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.store_id == store_id)
    }

    pub fn store_ids(&self) -> impl Iterator<Item = StoreId> + '_ {
        self.peers.iter().map(|p| p.store_id)
    }

    pub fn is_down_peer(&self, peer: PeerId) -> bool {
        self.down_peers.contains(&peer)
    }

    pub fn is_pending_peer(&self, peer: PeerId) -> bool {
        self.pending_peers.contains(&peer)
    }

    /// Returns true if any peer carries a joint-configuration role.
    pub fn is_in_joint_state(&self) -> bool {
        self.peers.iter().any(|p| p.role.is_joint())
    }

    /// Returns true if no peer is down or pending.
    pub fn is_healthy(&self) -> bool {
        self.down_peers.is_empty() && self.pending_peers.is_empty()
    }

    /// Returns true if `key` falls within `[start_key, end_key)`.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        key >= self.start_key() && (self.end_key.is_empty() || key < self.end_key())
    }
}
