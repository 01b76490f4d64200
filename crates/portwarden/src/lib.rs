//! # Portwarden
//!
//! Opens a self-hosted game server's firewall to one player address at a
//! time, tracks who actually logged in, and stops the server once nobody
//! has been around for a while.
//!
//! This meta crate ties the layers together:
//!
//! ```text
//! auth server ──signed POST /authorize──┐
//! game plugin ──POST /logged, /deauthorize (loopback)──┐
//!                                        ▼              ▼
//!                              HTTP surface (this crate)
//!                                        │
//!                    AccessRegistry (portwarden-access) ──→ firewall
//!                                        ▲
//!          IdlenessAggregator (portwarden-idle) ──→ presence probe, stop
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use portwarden::prelude::*;
//!
//! # async fn demo() -> Result<(), PortwardenError> {
//! let config = SupervisorConfig::from_env()?;
//! portwarden::run(config, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await
//! # }
//! ```

mod config;
mod error;
mod handler;
pub mod logging;
mod server;
mod signature;
mod supervisor;

pub use config::SupervisorConfig;
pub use error::PortwardenError;
pub use server::{AppState, PortwardenServer, require_loopback, router};
pub use signature::{
    SIGNATURE_HEADER, SignatureError, SignatureVerifier, TIMESTAMP_HEADER, now_millis,
};
pub use supervisor::run;

pub use portwarden_access as access;
pub use portwarden_actuator as actuator;
pub use portwarden_idle as idle;
pub use portwarden_protocol as protocol;

pub mod prelude {
    pub use crate::{
        AppState, PortwardenError, PortwardenServer, SignatureVerifier, SupervisorConfig,
    };
    pub use portwarden_access::{AccessConfig, AccessRegistry};
    pub use portwarden_idle::{IdleConfig, IdlenessAggregator};
}
