//! The broker protocol state machine.
//!
//! A pure-ish function of `(request, current session) -> (new session, response)`
//! — the only side effects are the mapper call and the agent call, both
//! injected, so the state transitions themselves are deterministic. Mirrors
//! `protocol.py::BrokerProtocolHandler.__call__`'s routing-table dispatch,
//! expressed as a match over `(request, current state)` instead of a dict
//! keyed by state.
use pcoip_proto::message::{BadMessage, ProtocolSession, ProtocolState};
use pcoip_proto::{
    AllocateResourceFailure, AllocateResourceRequest, AllocateResourceSuccess,
    AuthenticateFailed, AuthenticateRequest, AuthenticateSuccess, ByeResponse, Credentials,
    GetResourceListResponse, HelloRequest, HelloResponse, Request, Response, TeradiciResource,
};

use crate::agent::{AgentClient, AgentOutcome};
use crate::mapper::{Mapper, MapperStatus};

/// Agent/mapper failures that should surface to the client as
/// `AllocateFailed{result_id: "FAILED_USER_AUTH"}` per the "any
/// library/transport/XML error" catch-all.
const FAILED_USER_AUTH: &str = "FAILED_USER_AUTH";
const FAILED_ANOTHER_SESSION_STARTED: &str = "FAILED_ANOTHER_SESION_STARTED";

pub struct Context<'a> {
    pub mapper: &'a dyn Mapper,
    pub agent: &'a AgentClient,
    pub hostname: &'a str,
    pub client_name: &'a str,
}

/// Handles one request against the current session. `request` must not be
/// `Request::BadMessage` — the HTTP layer intercepts malformed requests
/// before the protocol ever sees them (spec treats `MalformedRequest` as a
/// distinct error class from `ProtocolViolation`).
pub async fn handle(
    request: Request,
    session: Option<ProtocolSession>,
    ctx: &Context<'_>,
) -> (Option<ProtocolSession>, Option<Response>) {
    let current_state = session.as_ref().map(|s| s.state);

    match (request, current_state) {
        (Request::Bye(_), _) => (None, Some(Response::Bye(ByeResponse))),

        (Request::Hello(hello), None) => handle_hello(hello, ctx),

        (Request::Authenticate(auth), Some(ProtocolState::WaitingForAuthenticate)) => {
            handle_authenticate(auth, ctx).await
        }

        (Request::GetResourceList(_), Some(ProtocolState::WaitingForGetResourceList)) => {
            handle_get_resource_list(session.expect("state implies a session"))
        }

        (Request::AllocateResource(alloc), Some(ProtocolState::WaitingForAllocateResource)) => {
            handle_allocate_resource(alloc, session.expect("state implies a session"), ctx).await
        }

        (Request::BadMessage(BadMessage { reason }), _) => {
            unreachable!(
                "BadMessage must be rejected by the HTTP layer before reaching protocol::handle: {reason}"
            )
        }

        (other, state) => {
            log::warn!("protocol violation: {other:?} unexpected in state {state:?}");
            (None, None)
        }
    }
}

fn handle_hello(
    hello: HelloRequest,
    ctx: &Context<'_>,
) -> (Option<ProtocolSession>, Option<Response>) {
    let response = Response::Hello(HelloResponse::new(ctx.hostname, ctx.mapper.domains()));

    if hello.is_probe() {
        (None, Some(response))
    } else {
        (Some(ProtocolSession::new_authenticating()), Some(response))
    }
}

async fn handle_authenticate(
    auth: AuthenticateRequest,
    ctx: &Context<'_>,
) -> (Option<ProtocolSession>, Option<Response>) {
    let credentials = Credentials {
        username: auth.username.clone(),
        password: auth.password.clone(),
        domain: auth.domain.clone(),
    };

    let result = ctx.mapper.map(&credentials, None).await;

    match result.status {
        MapperStatus::Success => {
            let session = ProtocolSession {
                state: ProtocolState::WaitingForGetResourceList,
                username: Some(auth.username),
                password: Some(auth.password),
                domain: Some(auth.domain),
                resources: result.resources,
            };
            (Some(session), Some(Response::AuthSuccess(AuthenticateSuccess)))
        }
        MapperStatus::AuthenticationFailed
        | MapperStatus::NoMachine
        | MapperStatus::ResourceUnresponsive
        | MapperStatus::InternalError => (
            Some(ProtocolSession::new_authenticating()),
            Some(Response::AuthFailed(AuthenticateFailed)),
        ),
    }
}

fn handle_get_resource_list(
    mut session: ProtocolSession,
) -> (Option<ProtocolSession>, Option<Response>) {
    let resources = session
        .resources
        .iter()
        .map(|(id, resource)| TeradiciResource {
            resource_name: resource.name.clone(),
            resource_id: id.clone(),
        })
        .collect();

    session.state = ProtocolState::WaitingForAllocateResource;

    (
        Some(session),
        Some(Response::GetResourceList(GetResourceListResponse { resources })),
    )
}

async fn handle_allocate_resource(
    request: AllocateResourceRequest,
    mut session: ProtocolSession,
    ctx: &Context<'_>,
) -> (Option<ProtocolSession>, Option<Response>) {
    let Some(resource) = session.resource(&request.resource_id).cloned() else {
        return (
            Some(session),
            Some(Response::AllocateFailed(AllocateResourceFailure {
                result_id: FAILED_USER_AUTH.to_string(),
            })),
        );
    };

    let credentials = Credentials {
        username: session.username.clone().unwrap_or_default(),
        password: session.password.clone().unwrap_or_default(),
        domain: session.domain.clone().unwrap_or_default(),
    };

    let outcome = ctx
        .mapper
        .allocate_session(
            ctx.agent,
            &resource,
            &request.resource_id,
            &credentials,
            ctx.client_name,
        )
        .await;

    match outcome {
        Ok(AgentOutcome::Successful(agent_session)) => {
            session.state = ProtocolState::WaitingForBye;
            (
                Some(session),
                Some(Response::AllocateSuccess(AllocateResourceSuccess {
                    ip_address: agent_session.ip_address,
                    hostname: resource.hostname,
                    sni: agent_session.sni,
                    port: agent_session.port,
                    session_id: agent_session.session_id,
                    connect_tag: agent_session.session_tag,
                    resource_id: agent_session.resource_id,
                })),
            )
        }
        Ok(AgentOutcome::FailedUserAuth) | Err(_) => (
            Some(session),
            Some(Response::AllocateFailed(AllocateResourceFailure {
                result_id: FAILED_USER_AUTH.to_string(),
            })),
        ),
        Ok(AgentOutcome::FailedAnotherSessionStarted) => (
            Some(session),
            Some(Response::AllocateFailed(AllocateResourceFailure {
                result_id: FAILED_ANOTHER_SESSION_STARTED.to_string(),
            })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentClient;
    use crate::mapper::{MapResult, MapperStatus};
    use pcoip_proto::{HelloRequest, Resource};

    struct StaticMapper {
        status: MapperStatus,
        resources: Vec<(String, Resource)>,
    }

    #[async_trait::async_trait]
    impl Mapper for StaticMapper {
        async fn map(&self, _credentials: &Credentials, _previous_host: Option<&str>) -> MapResult {
            MapResult {
                status: self.status,
                resources: self.resources.clone(),
            }
        }

        fn domains(&self) -> Vec<String> {
            vec!["EXAMPLE".to_string()]
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    fn ctx<'a>(mapper: &'a dyn Mapper, agent: &'a AgentClient) -> Context<'a> {
        Context {
            mapper,
            agent,
            hostname: "broker.example",
            client_name: "Bobby McGee",
        }
    }

    #[tokio::test]
    async fn probe_hello_creates_no_session() {
        let mapper = StaticMapper {
            status: MapperStatus::Success,
            resources: Vec::new(),
        };
        let agent = AgentClient::new(false).unwrap();
        let request = Request::Hello(HelloRequest {
            client_hostname: "client.example".to_string(),
            client_product_name: "QueryBrokerClient".to_string(),
        });

        let (session, response) = handle(request, None, &ctx(&mapper, &agent)).await;
        assert!(session.is_none());
        assert!(matches!(response, Some(Response::Hello(_))));
    }

    #[tokio::test]
    async fn non_probe_hello_starts_authenticate_state() {
        let mapper = StaticMapper {
            status: MapperStatus::Success,
            resources: Vec::new(),
        };
        let agent = AgentClient::new(false).unwrap();
        let request = Request::Hello(HelloRequest {
            client_hostname: "client.example".to_string(),
            client_product_name: "PCoIP Software Client".to_string(),
        });

        let (session, _response) = handle(request, None, &ctx(&mapper, &agent)).await;
        let session = session.expect("non-probe hello creates a session");
        assert_eq!(session.state, ProtocolState::WaitingForAuthenticate);
    }

    #[tokio::test]
    async fn successful_authenticate_preserves_resource_order() {
        let mapper = StaticMapper {
            status: MapperStatus::Success,
            resources: vec![
                ("0".to_string(), Resource::new("Kurt", "kurt.godel.edu")),
                ("1".to_string(), Resource::new("Alan", "alan.turing.edu")),
            ],
        };
        let agent = AgentClient::new(false).unwrap();
        let session = Some(ProtocolSession::new_authenticating());
        let request = Request::Authenticate(AuthenticateRequest {
            username: "Euler".to_string(),
            password: "Leonhard".to_string(),
            domain: String::new(),
        });

        let (new_session, response) = handle(request, session, &ctx(&mapper, &agent)).await;
        assert!(matches!(response, Some(Response::AuthSuccess(_))));
        let new_session = new_session.unwrap();
        assert_eq!(new_session.state, ProtocolState::WaitingForGetResourceList);
        assert_eq!(new_session.resources[0].0, "0");
        assert_eq!(new_session.resources[1].0, "1");
    }

    #[tokio::test]
    async fn failed_authenticate_clears_credentials_but_keeps_state() {
        let mapper = StaticMapper {
            status: MapperStatus::AuthenticationFailed,
            resources: Vec::new(),
        };
        let agent = AgentClient::new(false).unwrap();
        let session = Some(ProtocolSession::new_authenticating());
        let request = Request::Authenticate(AuthenticateRequest {
            username: "Euler".to_string(),
            password: "wrong".to_string(),
            domain: String::new(),
        });

        let (new_session, response) = handle(request, session, &ctx(&mapper, &agent)).await;
        assert!(matches!(response, Some(Response::AuthFailed(_))));
        let new_session = new_session.unwrap();
        assert_eq!(new_session.state, ProtocolState::WaitingForAuthenticate);
        assert!(new_session.username.is_none());
    }

    #[tokio::test]
    async fn bye_always_destroys_session() {
        let mapper = StaticMapper {
            status: MapperStatus::Success,
            resources: Vec::new(),
        };
        let agent = AgentClient::new(false).unwrap();
        let session = Some(ProtocolSession::new_authenticating());

        let (new_session, response) =
            handle(Request::Bye(Default::default()), session, &ctx(&mapper, &agent)).await;
        assert!(new_session.is_none());
        assert!(matches!(response, Some(Response::Bye(_))));
    }

    #[tokio::test]
    async fn unexpected_request_for_state_destroys_session_with_no_response() {
        let mapper = StaticMapper {
            status: MapperStatus::Success,
            resources: Vec::new(),
        };
        let agent = AgentClient::new(false).unwrap();
        // A fresh, un-authenticated session is implicitly WAITING_FOR_HELLO;
        // sending GetResourceList there is unexpected.
        let request = Request::GetResourceList(Default::default());

        let (new_session, response) = handle(request, None, &ctx(&mapper, &agent)).await;
        assert!(new_session.is_none());
        assert!(response.is_none());
    }

    #[tokio::test]
    async fn unknown_resource_id_fails_allocation_without_calling_agent() {
        let mapper = StaticMapper {
            status: MapperStatus::Success,
            resources: vec![("0".to_string(), Resource::new("Kurt", "kurt.godel.edu"))],
        };
        let agent = AgentClient::new(false).unwrap();
        let mut session = ProtocolSession::new_authenticating();
        session.state = ProtocolState::WaitingForAllocateResource;
        session.username = Some("Euler".to_string());
        session.password = Some("Leonhard".to_string());
        session.domain = Some(String::new());
        session.resources = vec![("0".to_string(), Resource::new("Kurt", "kurt.godel.edu"))];

        let request = Request::AllocateResource(AllocateResourceRequest {
            resource_id: "does-not-exist".to_string(),
        });

        let (new_session, response) =
            handle(request, Some(session), &ctx(&mapper, &agent)).await;
        assert!(new_session.is_some());
        match response {
            Some(Response::AllocateFailed(failure)) => {
                assert_eq!(failure.result_id, FAILED_USER_AUTH);
            }
            other => panic!("expected AllocateFailed, got {other:?}"),
        }
    }
}
