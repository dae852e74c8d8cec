//! Reference "simple" mapper: one configured username + hashed password,
//! a static resource list. Grounded on `mapping/simple.py::SimpleMapper`.
use async_trait::async_trait;
use pcoip_proto::{Credentials, Resource};

use super::hash::hash_password;
use super::{MapResult, Mapper, MapperStatus};

pub struct SimpleMapperSettings {
    pub username: String,
    pub password_hash: String,
    pub resources: Vec<(String, Resource)>,
}

pub struct SimpleMapper {
    settings: SimpleMapperSettings,
}

impl SimpleMapper {
    pub fn new(settings: SimpleMapperSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Mapper for SimpleMapper {
    async fn map(&self, credentials: &Credentials, _previous_host: Option<&str>) -> MapResult {
        if credentials.username != self.settings.username
            || hash_password(&credentials.password) != self.settings.password_hash
        {
            return MapResult::failed(MapperStatus::AuthenticationFailed);
        }

        if self.settings.resources.is_empty() {
            return MapResult::failed(MapperStatus::NoMachine);
        }

        MapResult {
            status: MapperStatus::Success,
            resources: self.settings.resources.clone(),
        }
    }

    fn domains(&self) -> Vec<String> {
        Vec::new()
    }

    fn name(&self) -> &str {
        "simple"
    }
}
