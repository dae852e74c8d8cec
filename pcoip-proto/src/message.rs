//! Wire message types and the data model shared by the protocol state
//! machine and the XML codec.
//!
//! Requests and responses are modeled as closed enums (`Request`,
//! `Response`) over plain value structs, mirroring the tagged-union style
//! the original broker used (`transport.py`'s `Message` hierarchy) rather
//! than an open trait-object hierarchy — there is a fixed, known set of
//! wire messages and no room for extension at this layer.

/// A resource ("machine") a user is entitled to connect to.
///
/// Immutable once created; constructed by a mapper and handed to the
/// protocol handler, which never mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub hostname: String,
}

impl Resource {
    pub fn new(name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
        }
    }
}

/// Username/password pair, optionally with a domain.
///
/// Passwords must never be persisted to a session store or a log; they
/// travel in memory only, from `AuthenticateRequest` to the agent call.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// The five states the protocol state machine may occupy.
///
/// There is no explicit error state: failures either stay in the current
/// state (auth/allocate failure) or destroy the session outright (protocol
/// violation, bye).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    WaitingForHello,
    WaitingForAuthenticate,
    WaitingForGetResourceList,
    WaitingForAllocateResource,
    WaitingForBye,
}

/// Per-client state threaded between requests by the session store.
///
/// Invariant: `state` in `{WaitingForGetResourceList, WaitingForAllocateResource,
/// WaitingForBye}` implies `username` is `Some`. A session at
/// `WaitingForAuthenticate` that was previously authenticated has its
/// credentials and resources cleared.
#[derive(Debug, Clone)]
pub struct ProtocolSession {
    pub state: ProtocolState,
    pub username: Option<String>,
    pub password: Option<String>,
    pub domain: Option<String>,
    pub resources: Vec<(String, Resource)>,
}

impl ProtocolSession {
    /// A freshly authenticated session, one step past `WaitingForHello`.
    pub fn new_authenticating() -> Self {
        Self {
            state: ProtocolState::WaitingForAuthenticate,
            username: None,
            password: None,
            domain: None,
            resources: Vec::new(),
        }
    }

    pub fn resource(&self, resource_id: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|(id, _)| id == resource_id)
            .map(|(_, r)| r)
    }
}

/// The session returned by a successful agent allocation. Ephemeral —
/// surfaced directly to the client, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSession {
    pub ip_address: String,
    pub sni: String,
    pub port: u16,
    pub session_id: String,
    pub session_tag: String,
    pub resource_id: String,
}

/// Wire-facing projection of `Resource` used inside `GetResourceListResponse`.
#[derive(Debug, Clone)]
pub struct TeradiciResource {
    pub resource_name: String,
    pub resource_id: String,
}

impl TeradiciResource {
    pub const RESOURCE_TYPE: &'static str = "DESKTOP";
    pub const SESSION_TYPE: &'static str = "VDI";
    pub const RESOURCE_STATE: &'static str = "UNKNOWN";
    pub const PROTOCOL: &'static str = "PCOIP";
}

// --- Requests -----------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HelloRequest {
    pub client_hostname: String,
    pub client_product_name: String,
}

impl HelloRequest {
    /// The PCoIP client sends this product name to probe whether it's
    /// talking to a broker or directly to a machine.
    pub const PROBE_PRODUCT_NAME: &'static str = "QueryBrokerClient";

    pub fn is_probe(&self) -> bool {
        self.client_product_name == Self::PROBE_PRODUCT_NAME
    }
}

#[derive(Clone)]
pub struct AuthenticateRequest {
    pub username: String,
    pub password: String,
    pub domain: String,
}

impl std::fmt::Debug for AuthenticateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticateRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetResourceListRequest;

#[derive(Debug, Clone)]
pub struct AllocateResourceRequest {
    pub resource_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ByeRequest;

/// A message that failed to parse or was not understood; carries a reason
/// for logging, never shown to the client.
#[derive(Debug, Clone)]
pub struct BadMessage {
    pub reason: String,
}

/// The closed set of requests the broker understands.
#[derive(Debug, Clone)]
pub enum Request {
    Hello(HelloRequest),
    Authenticate(AuthenticateRequest),
    GetResourceList(GetResourceListRequest),
    AllocateResource(AllocateResourceRequest),
    Bye(ByeRequest),
    BadMessage(BadMessage),
}

// --- Responses ------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HelloResponse {
    pub hostname: String,
    pub domains: Vec<String>,
    pub product_name: String,
    pub product_version: String,
    pub platform: String,
    pub locale: String,
    pub ip_address: String,
    pub authentication_methods: Vec<String>,
}

impl HelloResponse {
    pub fn new(hostname: impl Into<String>, domains: Vec<String>) -> Self {
        Self {
            hostname: hostname.into(),
            domains,
            product_name: "PCoIP Broker".to_string(),
            product_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: "linux".to_string(),
            locale: "en_US".to_string(),
            ip_address: "N/A".to_string(),
            authentication_methods: vec!["AUTHENTICATE_VIA_PASSWORD".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthenticateSuccess;

#[derive(Debug, Clone, Default)]
pub struct AuthenticateFailed;

#[derive(Debug, Clone, Default)]
pub struct GetResourceListResponse {
    pub resources: Vec<TeradiciResource>,
}

#[derive(Debug, Clone)]
pub struct AllocateResourceSuccess {
    pub ip_address: String,
    pub hostname: String,
    pub sni: String,
    pub port: u16,
    pub session_id: String,
    pub connect_tag: String,
    pub resource_id: String,
}

#[derive(Debug, Clone)]
pub struct AllocateResourceFailure {
    /// e.g. `FAILED_USER_AUTH`, `FAILED_ANOTHER_SESION_STARTED` (misspelling
    /// preserved for wire compatibility, see spec §9).
    pub result_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ByeResponse;

/// The closed set of responses the broker emits.
#[derive(Debug, Clone)]
pub enum Response {
    Hello(HelloResponse),
    AuthSuccess(AuthenticateSuccess),
    AuthFailed(AuthenticateFailed),
    GetResourceList(GetResourceListResponse),
    AllocateSuccess(AllocateResourceSuccess),
    AllocateFailed(AllocateResourceFailure),
    Bye(ByeResponse),
}
