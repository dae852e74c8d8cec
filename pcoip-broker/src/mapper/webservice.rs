//! Reference "webservice" mapper: HTTP Basic auth against an external
//! service returning JSON `{"hosts":[{name,hostname},...]}`. Grounded on
//! `mapping/simplewebservice.py::SimpleWebserviceMapper`.
use async_trait::async_trait;
use pcoip_proto::{Credentials, Resource};
use serde::Deserialize;

use super::{MapResult, Mapper, MapperStatus};

#[derive(Deserialize)]
struct HostsResponse {
    hosts: Vec<HostEntry>,
}

#[derive(Deserialize)]
struct HostEntry {
    name: String,
    hostname: String,
}

pub struct SimpleWebserviceMapper {
    base_url: String,
    http: reqwest::Client,
}

impl SimpleWebserviceMapper {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Mapper for SimpleWebserviceMapper {
    async fn map(&self, credentials: &Credentials, _previous_host: Option<&str>) -> MapResult {
        let url = format!(
            "{}/user={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&credentials.username)
        );

        let response = match self
            .http
            .get(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                log::warn!("webservice mapper request to {url} failed: {err}");
                return MapResult::failed(MapperStatus::InternalError);
            }
        };

        match response.status().as_u16() {
            403 => MapResult::failed(MapperStatus::AuthenticationFailed),
            200 => match response.json::<HostsResponse>().await {
                Ok(body) => {
                    let resources: Vec<(String, Resource)> = body
                        .hosts
                        .into_iter()
                        .enumerate()
                        .map(|(i, host)| (i.to_string(), Resource::new(host.name, host.hostname)))
                        .collect();

                    if resources.is_empty() {
                        MapResult::failed(MapperStatus::NoMachine)
                    } else {
                        MapResult {
                            status: MapperStatus::Success,
                            resources,
                        }
                    }
                }
                Err(err) => {
                    log::warn!("webservice mapper returned malformed JSON: {err}");
                    MapResult::failed(MapperStatus::InternalError)
                }
            },
            other => {
                log::warn!("webservice mapper returned unexpected HTTP status {other}");
                MapResult::failed(MapperStatus::InternalError)
            }
        }
    }

    fn domains(&self) -> Vec<String> {
        Vec::new()
    }

    fn name(&self) -> &str {
        "webservice"
    }
}
