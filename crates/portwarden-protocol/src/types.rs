//! Core wire types for Portwarden.
//!
//! Every type here is serialized to or from JSON somewhere: on the
//! supervisor's HTTP routes, in the game-server `/online` probe, or in
//! the firewall endpoint payload.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The canonical name a grant is tracked under.
///
/// A root identity is a non-empty token of ASCII letters, digits and
/// underscores. It never carries an alias suffix (`-1`, `-2`); splitting a
/// raw login name into root and slot is the access layer's job.
///
/// `#[serde(try_from = "String")]` routes deserialization through
/// [`RootIdentity::new`], so a malformed name in a JSON body can never
/// produce a `RootIdentity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RootIdentity(String);

impl RootIdentity {
    /// Validates `name` as a root token.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidIdentity`] if the name is empty or
    /// contains anything other than `[A-Za-z0-9_]`.
    pub fn new(name: impl Into<String>) -> Result<Self, ProtocolError> {
        let name = name.into();
        if is_root_token(&name) {
            Ok(Self(name))
        } else {
            Err(ProtocolError::InvalidIdentity(name))
        }
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `true` if `s` is a non-empty run of ASCII alphanumerics or underscores.
pub(crate) fn is_root_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

impl TryFrom<String> for RootIdentity {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RootIdentity> for String {
    fn from(value: RootIdentity) -> Self {
        value.0
    }
}

impl fmt::Display for RootIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `POST /authorize`, sent by the upstream auth server.
///
/// Fields are kept as raw strings so the handler can report a structured
/// [`Outcome`] for bad input instead of a bare JSON rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRequest {
    /// Address the player will connect from.
    #[serde(default)]
    pub ip: String,
    /// Root identity to grant.
    #[serde(default)]
    pub username: String,
}

impl GrantRequest {
    /// Parses both fields into typed values.
    ///
    /// # Errors
    /// - [`ProtocolError::MissingField`] if either field is blank
    /// - [`ProtocolError::InvalidAddress`] if `ip` doesn't parse
    /// - [`ProtocolError::InvalidIdentity`] if `username` isn't a root token
    pub fn parse(&self) -> Result<(RootIdentity, IpAddr), ProtocolError> {
        if self.ip.trim().is_empty() {
            return Err(ProtocolError::MissingField("ip"));
        }
        if self.username.trim().is_empty() {
            return Err(ProtocolError::MissingField("username"));
        }
        let address = self
            .ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|_| ProtocolError::InvalidAddress(self.ip.clone()))?;
        let root = RootIdentity::new(self.username.trim())?;
        Ok((root, address))
    }
}

/// Body of `POST /logged`, `POST /deauthorize` and `POST /revoke`.
///
/// `username` is the raw login name, which may carry an alias suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEvent {
    #[serde(default)]
    pub username: String,
}

impl PlayerEvent {
    /// Returns the trimmed username.
    ///
    /// # Errors
    /// Returns [`ProtocolError::MissingField`] if it is blank.
    pub fn username(&self) -> Result<&str, ProtocolError> {
        let name = self.username.trim();
        if name.is_empty() {
            Err(ProtocolError::MissingField("username"))
        } else {
            Ok(name)
        }
    }
}

/// Body of `POST /reconcile`: the complete list of names the game server
/// currently reports as online.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileRequest {
    #[serde(default)]
    pub players: Vec<String>,
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Structured result returned by every route.
///
/// Exactly one of `message` / `error` is set, matching `ok`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    /// A successful outcome carrying a human-readable message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: Some(message.into()),
            error: None,
        }
    }

    /// A failed outcome carrying an error description.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Which expiry timer, if any, is armed on an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingTimer {
    /// Armed at grant time; no slot has logged in yet.
    Grant,
    /// Armed after the last logged-in slot disconnected.
    Grace,
}

/// Login state of one alias slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    /// Slot index; 0 is the root itself.
    pub slot: u8,
    /// The login name that maps to this slot (`root` or `root-N`).
    pub identity: String,
    pub logged_in: bool,
}

/// Read-only view of one authorization entry, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub root: RootIdentity,
    pub address: IpAddr,
    pub slots: Vec<SlotSnapshot>,
    pub pending_timer: Option<PendingTimer>,
}

/// Counts produced by a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Slots newly marked logged in.
    pub logged_in: usize,
    /// Slots newly marked disconnected.
    pub disconnected: usize,
    /// Online names that resolved to an entry but were refused
    /// (e.g. the slot cap was reached).
    pub rejected: usize,
}

/// Body of `GET /status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub players: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Collaborator payloads
// ---------------------------------------------------------------------------

/// One entry in the game server's `/online` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlinePlayer {
    pub name: String,
    #[serde(default)]
    pub ip: String,
}

/// Response of the game server's `/online` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlinePlayers {
    #[serde(default)]
    pub players: Vec<OnlinePlayer>,
    #[serde(default)]
    pub port: Option<u16>,
}

impl OnlinePlayers {
    /// Player names, in the order the game server listed them.
    pub fn names(&self) -> Vec<String> {
        self.players.iter().map(|p| p.name.clone()).collect()
    }
}

/// Firewall rule operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallAction {
    Authorize,
    Revoke,
}

/// Payload sent to the firewall endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRequest {
    pub action: FirewallAction,
    pub ip: IpAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Reply from the firewall endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallReply {
    pub ok: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
