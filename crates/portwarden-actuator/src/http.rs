//! HTTP collaborators using `reqwest`.

use std::net::IpAddr;
use std::time::Duration;

use portwarden_protocol::{FirewallAction, FirewallReply, FirewallRequest, OnlinePlayers};

use crate::{AccessActuator, ActuatorError, PresenceProbe};

/// Opens and closes firewall rules by POSTing a [`FirewallRequest`] to a
/// fixed endpoint.
///
/// The endpoint answers with a [`FirewallReply`]; `ok: false` is mapped to
/// [`ActuatorError::Rejected`] with the endpoint's error text.
#[derive(Debug, Clone)]
pub struct HttpAccessActuator {
    client: reqwest::Client,
    url: String,
}

impl HttpAccessActuator {
    /// Creates an actuator targeting `url`. Each request is bounded by
    /// `timeout` at the client level.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ActuatorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ActuatorError::Request)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn send(&self, request: FirewallRequest) -> Result<(), ActuatorError> {
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(ActuatorError::Request)?;

        let status = response.status();
        let reply = match response.json::<FirewallReply>().await {
            Ok(reply) if status.is_success() && reply.ok => reply,
            Ok(reply) => {
                let reason = reply.error.unwrap_or_else(|| {
                    format!("firewall endpoint returned {status}")
                });
                return Err(rejected(&request, reason));
            }
            Err(e) if status.is_success() => {
                return Err(ActuatorError::Request(e));
            }
            Err(_) => {
                let reason = format!("firewall endpoint returned {status}");
                return Err(rejected(&request, reason));
            }
        };

        tracing::debug!(
            action = ?request.action,
            ip = %request.ip,
            message = reply.message.as_deref().unwrap_or(""),
            "firewall request applied"
        );
        Ok(())
    }
}

fn rejected(request: &FirewallRequest, reason: String) -> ActuatorError {
    tracing::warn!(
        action = ?request.action,
        ip = %request.ip,
        %reason,
        "firewall request rejected"
    );
    ActuatorError::Rejected(reason)
}

impl AccessActuator for HttpAccessActuator {
    async fn open(&self, address: IpAddr, label: &str) -> Result<(), ActuatorError> {
        self.send(FirewallRequest {
            action: FirewallAction::Authorize,
            ip: address,
            username: Some(label.to_string()),
        })
        .await
    }

    async fn close(&self, address: IpAddr) -> Result<(), ActuatorError> {
        self.send(FirewallRequest {
            action: FirewallAction::Revoke,
            ip: address,
            username: None,
        })
        .await
    }
}

/// Polls the game server's `/online` endpoint.
#[derive(Debug, Clone)]
pub struct HttpPresenceProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpPresenceProbe {
    /// Creates a probe for `url` (e.g. `http://127.0.0.1:27111/online`).
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ActuatorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ActuatorError::Request)?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl PresenceProbe for HttpPresenceProbe {
    async fn list_connected_players(&self) -> Result<OnlinePlayers, ActuatorError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(ActuatorError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ActuatorError::Rejected(format!(
                "presence probe returned {status}"
            )));
        }

        response.json().await.map_err(ActuatorError::Request)
    }
}
