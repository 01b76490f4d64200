//! Player access grants for Portwarden.
//!
//! This crate is the authorization state machine:
//!
//! 1. **Alias resolution**: splitting a login name into a root identity
//!    and a slot ([`resolve`])
//! 2. **Grant tracking**: which roots hold open access, from which
//!    address, and which of their slots are logged in ([`AccessRegistry`])
//! 3. **Expiry**: grant and grace timers that close access when nobody
//!    shows up or everybody has left
//!
//! # How it fits in the stack
//!
//! ```text
//! HTTP surface (portwarden)    ← calls grant / confirm_login / disconnect
//!     ↕
//! Access layer (this crate)    ← owns entries and timers
//!     ↕                 ↘
//! Actuators             Idle layer ← reads has_activity() only
//! ```

mod alias;
mod config;
mod entry;
mod error;
mod registry;
mod timer;

pub use alias::{AliasSlot, ResolvedIdentity, resolve};
pub use config::AccessConfig;
pub use error::AccessError;
pub use registry::{AccessRegistry, DisconnectOutcome, GrantReceipt, LoginOutcome};
pub use timer::TimerKind;
