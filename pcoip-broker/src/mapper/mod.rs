//! The mapper abstraction: authentication + entitlement lookup.
//!
//! A capability, not a class hierarchy — `Mapper` only requires `map`,
//! `domains`, and `name`; `allocate_session` has a default that calls
//! through to the shared `AgentClient`, which a mapper may override to
//! proxy allocation elsewhere entirely.
pub mod hash;
pub mod simple;
pub mod webservice;

use async_trait::async_trait;
use pcoip_proto::{Credentials, Resource};

use crate::agent::{AgentClient, AgentError, AgentOutcome};
use crate::config::{Config, MapperKind};

pub use simple::{SimpleMapper, SimpleMapperSettings};
pub use webservice::SimpleWebserviceMapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperStatus {
    Success,
    AuthenticationFailed,
    NoMachine,
    ResourceUnresponsive,
    InternalError,
}

/// Result of `Mapper::map`: on `Success` the list MUST be non-empty; on any
/// other status it MUST be empty. Order is preserved end-to-end to the
/// client.
pub struct MapResult {
    pub status: MapperStatus,
    pub resources: Vec<(String, Resource)>,
}

impl MapResult {
    pub fn failed(status: MapperStatus) -> Self {
        Self {
            status,
            resources: Vec::new(),
        }
    }
}

#[async_trait]
pub trait Mapper: Send + Sync {
    /// Authenticates `credentials` and returns the ordered resources the
    /// user is entitled to. `previous_host` is part of the interface but has
    /// no defined semantics (see design notes); reference mappers ignore it.
    async fn map(&self, credentials: &Credentials, previous_host: Option<&str>) -> MapResult;

    fn domains(&self) -> Vec<String>;

    fn name(&self) -> &str;

    async fn allocate_session(
        &self,
        agent: &AgentClient,
        resource: &Resource,
        resource_id: &str,
        credentials: &Credentials,
        client_name: &str,
    ) -> Result<AgentOutcome, AgentError> {
        agent
            .allocate(&resource.hostname, resource_id, credentials, client_name)
            .await
    }
}

/// Builds the configured reference mapper.
pub fn build(config: &Config) -> Box<dyn Mapper> {
    match config.mapper {
        MapperKind::Simple => Box::new(SimpleMapper::new(SimpleMapperSettings {
            username: config.simple_username.clone(),
            password_hash: config.simple_password_hash.clone(),
            resources: config.simple_resources.clone(),
        })),
        MapperKind::Webservice => {
            Box::new(SimpleWebserviceMapper::new(config.webservice_base_url.clone()))
        }
    }
}
