//! Shared application state passed to every handler as `Arc<AppState>`.

use std::sync::Arc;

use genhub_core::broadcast::BroadcastScheduler;
use genhub_core::gateway::Gateway;
use genhub_core::ledger::Ledger;
use genhub_core::poller::PollerContext;
use genhub_core::store::{BroadcastRepo, GenerationRepo, UserRepo};

pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub ledger: Ledger,
    pub broadcasts: Arc<BroadcastScheduler>,
    pub broadcast_repo: BroadcastRepo,
    pub generations: GenerationRepo,
    pub users: UserRepo,
    pub poller: Arc<PollerContext>,
}
