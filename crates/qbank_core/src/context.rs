//! Process-wide store context.
//!
//! # Responsibility
//! - Own the single `Provisioner` (and with it the migration lock).
//! - Carry the typed role-event channel.
//! - Hand out repositories that borrow the context per call.
//!
//! # Invariants
//! - Construct once per process and share it (`Arc<StoreContext>`) instead of
//!   creating several contexts for the same database file.

use crate::config::StoreConfig;
use crate::db::Provisioner;
use crate::model::role::RoleRecord;
use crate::repo::bank_repo::SqliteQuestionBankRepository;
use crate::repo::role_repo::SqliteRoleRepository;
use tokio::sync::broadcast;

const ROLE_EVENT_CAPACITY: usize = 64;

/// Notification emitted after a role save commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleEvent {
    Created(RoleRecord),
    Updated(RoleRecord),
}

pub struct StoreContext {
    provisioner: Provisioner,
    role_events: broadcast::Sender<RoleEvent>,
}

impl StoreContext {
    pub fn new(config: StoreConfig) -> Self {
        let (role_events, _) = broadcast::channel(ROLE_EVENT_CAPACITY);
        Self {
            provisioner: Provisioner::new(config),
            role_events,
        }
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.provisioner
    }

    pub fn roles(&self) -> SqliteRoleRepository<'_> {
        SqliteRoleRepository::new(self)
    }

    pub fn banks(&self) -> SqliteQuestionBankRepository<'_> {
        SqliteQuestionBankRepository::new(self)
    }

    /// Subscribes to role events published after this call.
    pub fn subscribe_roles(&self) -> broadcast::Receiver<RoleEvent> {
        self.role_events.subscribe()
    }

    pub(crate) fn publish_role(&self, event: RoleEvent) {
        // No subscribers is the common case.
        let _ = self.role_events.send(event);
    }
}
