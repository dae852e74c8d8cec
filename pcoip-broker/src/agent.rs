//! Outbound HTTPS client for workstation agents.
//!
//! Each broker session ends in a call to the agent that owns the chosen
//! resource: `POST https://{hostname}:60443/pcoip-agent/xml`. Agents present
//! self-signed, per-host certificates, so verification is a configurable
//! knob defaulting to disabled (see spec around "Disabled TLS verification
//! to agents").
use std::time::Duration;

use pcoip_proto::{codec, AgentSession, Credentials};
use thiserror::Error;

const AGENT_PORT: u16 = 60443;
const AGENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("connecting to agent: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("agent responded with HTTP {0}")]
    Endpoint(reqwest::StatusCode),

    #[error("could not parse agent response")]
    Xml,
}

/// Outcome of a `launch-session` call, before it is mapped onto the wire
/// `result_id` the client sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    Successful(AgentSession),
    FailedUserAuth,
    FailedAnotherSessionStarted,
}

pub struct AgentClient {
    http: reqwest::Client,
}

impl AgentClient {
    pub fn new(verify_tls: bool) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(AGENT_TIMEOUT)
            .build()?;
        Ok(Self { http })
    }

    pub async fn allocate(
        &self,
        agent_hostname: &str,
        resource_id: &str,
        credentials: &Credentials,
        client_name: &str,
    ) -> Result<AgentOutcome, AgentError> {
        let body = codec::serialize_launch_session(
            agent_hostname,
            &credentials.username,
            &credentials.password,
            &credentials.domain,
            client_name,
        )
        .map_err(|_| AgentError::Xml)?;

        let url = agent_url(agent_hostname);
        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/xml")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AgentError::Endpoint(response.status()));
        }

        let bytes = response.bytes().await?;
        match codec::deserialize_launch_session_response(&bytes, resource_id) {
            Some(codec::LaunchSessionResult::Successful(session)) => {
                Ok(AgentOutcome::Successful(session))
            }
            Some(codec::LaunchSessionResult::FailedUserAuth) => Ok(AgentOutcome::FailedUserAuth),
            Some(codec::LaunchSessionResult::FailedAnotherSessionStarted) => {
                Ok(AgentOutcome::FailedAnotherSessionStarted)
            }
            Some(codec::LaunchSessionResult::Unrecognized) | None => Err(AgentError::Xml),
        }
    }
}

fn agent_url(agent_hostname: &str) -> String {
    format!("https://{agent_hostname}:{AGENT_PORT}/pcoip-agent/xml")
}
