//! Wire types for Portwarden.
//!
//! This crate defines the shapes that cross a process boundary:
//!
//! - **Identity** ([`RootIdentity`]): the canonical player name a grant
//!   is tracked under.
//! - **Requests** ([`GrantRequest`], [`PlayerEvent`], [`ReconcileRequest`]):
//!   JSON bodies accepted by the supervisor's HTTP surface.
//! - **Replies** ([`Outcome`], [`EntrySnapshot`], [`StatusReport`],
//!   [`ReconcileReport`]): what the supervisor sends back.
//! - **Collaborator payloads** ([`OnlinePlayers`], [`FirewallRequest`],
//!   [`FirewallReply`]): what the game-server probe and the firewall
//!   endpoint speak.
//!
//! # Architecture
//!
//! ```text
//! HTTP surface (portwarden) → Protocol (this crate) → Access / Idle layers
//!                                   ↕
//!                     Actuators (firewall, probe, stop)
//! ```
//!
//! Nothing in here knows about timers or sockets. It only knows how the
//! data is shaped.

mod error;
mod types;

pub use error::ProtocolError;
pub use types::{
    EntrySnapshot, FirewallAction, FirewallReply, FirewallRequest,
    GrantRequest, OnlinePlayer, OnlinePlayers, Outcome, PendingTimer,
    PlayerEvent, ReconcileReport, ReconcileRequest, RootIdentity,
    SlotSnapshot, StatusReport,
};
