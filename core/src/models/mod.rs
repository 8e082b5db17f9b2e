//! Data model for the generation orchestration core.
//!
//! One Rust type per entity named in the data model: [`User`], [`LedgerEntry`],
//! [`Model`], [`ModelPrice`], [`GenerationRequest`], [`GenerationReference`],
//! [`GenerationResult`], [`GenerationJob`], [`TrialUse`], [`Broadcast`],
//! [`BroadcastRecipient`].

mod broadcast;
mod generation;
mod ledger_entry;
mod model;
mod user;

pub use broadcast::{
    Broadcast, BroadcastRecipient, BroadcastStatus, ContentType, FilterTag, InlineButton, RecipientStatus,
};
pub use generation::{
    ChatCoords, GenerationJob, GenerationParams, GenerationReference, GenerationRequest,
    GenerationResult, GenerationStatus, JobStatus, TrialUse,
};
pub use ledger_entry::{EntryType, LedgerEntry};
pub use model::{Model, ModelPrice};
pub use user::User;
