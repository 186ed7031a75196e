//! Process-level negotiation state
//!
//! A [`NegotiationEngine`] holds what every call of a user agent shares:
//! the platform configuration, the collaborator set, the global media
//! capability table and the counter that hands out media line handles.
//! Sessions keep an `Arc` to the engine that created them.
//!
//! ```rust
//! use std::sync::Arc;
//! use rvoip_sdp_negotiation::{NegotiationConfig, NegotiationEngine};
//!
//! let engine = Arc::new(NegotiationEngine::new(NegotiationConfig::default())?);
//! let mut session = engine.new_session();
//! session.create_local_sdp()?;
//! assert_eq!(session.local_sdp().num_media_lines(), 2);
//! # Ok::<(), rvoip_sdp_negotiation::NegotiationError>(())
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::builder::LocalSdpBuilder;
use crate::capability::CapabilityTable;
use crate::collaborators::Collaborators;
use crate::config::NegotiationConfig;
use crate::error::Result;
use crate::session::NegotiationSession;
use crate::types::MediaRefId;

/// Shared negotiation state for all calls of a user agent
#[derive(Debug)]
pub struct NegotiationEngine {
    config: NegotiationConfig,
    collaborators: Collaborators,
    capability: RwLock<CapabilityTable>,
    ref_counter: AtomicU32,
}

impl NegotiationEngine {
    /// Create an engine with the default collaborators
    pub fn new(config: NegotiationConfig) -> Result<Self> {
        Self::with_collaborators(config, Collaborators::default())
    }

    /// Create an engine with explicit collaborators
    ///
    /// Fails when the configuration does not validate.
    pub fn with_collaborators(config: NegotiationConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        info!(ip_mode = ?config.ip_mode, dtmf = ?config.dtmf_policy, "negotiation engine created");
        Ok(Self {
            config,
            collaborators,
            capability: RwLock::new(CapabilityTable::default()),
            ref_counter: AtomicU32::new(1),
        })
    }

    /// Platform configuration
    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Collaborator set
    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// A local SDP builder over this engine's configuration
    pub fn builder(&self) -> LocalSdpBuilder<'_> {
        LocalSdpBuilder::new(&self.config, &self.collaborators)
    }

    /// Next media line handle
    ///
    /// Handles wrap past `u32::MAX` back to 1 and are never 0.
    pub fn next_ref_id(&self) -> MediaRefId {
        let id = self
            .ref_counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(if current == u32::MAX { 1 } else { current + 1 })
            })
            .unwrap_or_else(|current| current);
        MediaRefId(id)
    }

    /// Snapshot of the global capability table
    pub fn capability_table(&self) -> CapabilityTable {
        self.capability.read().clone()
    }

    /// Identifier of the current global capability table
    pub fn capability_id(&self) -> u32 {
        self.capability.read().id
    }

    /// Replace the global capability entries
    ///
    /// The table identifier is bumped so sessions pick up the change on
    /// their next negotiation or capability update.
    pub fn set_capability_table(&self, table: CapabilityTable) {
        let mut current = self.capability.write();
        let id = current.id.wrapping_add(1);
        *current = CapabilityTable { id, ..table };
        debug!(id, entries = current.entries.len(), "capability table replaced");
    }

    /// Modify the global capability table in place, bumping its identifier
    pub fn update_capability_table<F>(&self, update: F)
    where
        F: FnOnce(&mut CapabilityTable),
    {
        let mut current = self.capability.write();
        update(&mut current);
        current.id = current.id.wrapping_add(1);
        debug!(id = current.id, "capability table updated");
    }

    /// Start a negotiation session for a new call
    pub fn new_session(self: &Arc<Self>) -> NegotiationSession {
        NegotiationSession::new(Arc::clone(self))
    }
}
