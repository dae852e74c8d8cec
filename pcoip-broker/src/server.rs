//! The single HTTP endpoint: `/pcoip-broker/xml`.
//!
//! POST drives the protocol; GET serves the operational landing page. All
//! session plumbing (cookie/header key, blob store read-modify-write) lives
//! here, not in `protocol`, which only ever sees `Option<ProtocolSession>`.
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response as AxumResponse};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::CookieJar;
use axum_server::tls_rustls::RustlsConfig;
use futures_util::stream;
use hyper::ext::HeaderCaseMap;
use pcoip_proto::{codec, Request};

use crate::agent::AgentClient;
use crate::config::{Config, SessionBackend};
use crate::html::landing_page;
use crate::mapper::{self, Mapper};
use crate::protocol::{self, Context};
use crate::session::{BlobStore, InMemoryBlobStore, SessionContext};

const SESSION_COOKIE: &str = "JSESSIONID";
const SESSION_HEADER: &str = "CLIENT-LOG-ID";

struct AppState {
    mapper: Box<dyn Mapper>,
    agent: AgentClient,
    store: Arc<dyn BlobStore>,
    hostname: String,
    client_name: String,
    session_backend: SessionBackend,
}

pub async fn run(config: &Config) -> anyhow::Result<()> {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());

    let state = Arc::new(AppState {
        mapper: mapper::build(config),
        agent: AgentClient::new(config.agent_verify_tls)?,
        store: Arc::new(InMemoryBlobStore::default()),
        hostname,
        client_name: config.client_name.clone(),
        session_backend: config.session_backend,
    });

    let tls = RustlsConfig::from_pem(
        config.tls_cert.as_bytes().to_vec(),
        config.tls_key.as_bytes().to_vec(),
    )
    .await?;

    let app = Router::new()
        .route(
            "/pcoip-broker/xml",
            get(get_landing_page).post(post_pcoip_xml),
        )
        .with_state(state);

    log::info!("PCoIP broker listening on {}", config.bind);

    let addr: SocketAddr = config.bind;
    let mut server = axum_server::bind_rustls(addr, tls);
    // `http`'s HeaderName always lowercases standard header names on output
    // (`set-cookie`, not `Set-Cookie`); some PCoIP clients match the header
    // name literally, so exact case has to survive the write. This asks the
    // HTTP/1.1 writer to consult the `HeaderCaseMap` response extension
    // (`session_header_case_map`) instead of lowercasing unconditionally.
    server.http_builder().http1().preserve_header_case(true);
    server.serve(app.into_make_service()).await?;

    Ok(())
}

async fn get_landing_page(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(landing_page(&state.hostname))
}

async fn post_pcoip_xml(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> AxumResponse {
    let request = codec::deserialize_request(&body);

    if let Request::BadMessage(bad) = &request {
        log::warn!("malformed request: {}", bad.reason);
        return StatusCode::BAD_REQUEST.into_response();
    }

    let key = session_key(&state.session_backend, &jar, &headers);
    let mut session_ctx = SessionContext::new(state.session_backend, Arc::clone(&state.store), key);
    let session = session_ctx.get().await;

    let ctx = Context {
        mapper: state.mapper.as_ref(),
        agent: &state.agent,
        hostname: &state.hostname,
        client_name: &state.client_name,
    };

    let (new_session, response) = protocol::handle(request, session, &ctx).await;

    if new_session.is_some() && response.is_none() {
        log::error!("protocol handler returned no response alongside a live session");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let new_cookie_value = session_ctx.set(new_session).await;

    let Some(response) = response else {
        // ProtocolViolation: session already destroyed, nothing to say.
        return StatusCode::OK.into_response();
    };

    let xml = match codec::serialize_response(&response) {
        Ok(xml) => xml,
        Err(err) => {
            log::error!("failed to serialize response: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut builder = AxumResponse::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/xml");

    if let Some(session_id) = &new_cookie_value {
        builder = builder.header(SET_COOKIE, format!("{SESSION_COOKIE}={session_id}; Secure; HttpOnly"));
    }

    // Streaming the body (rather than handing hyper a fixed Content-Length)
    // is what makes this come out Transfer-Encoding: chunked, which some
    // PCoIP clients require.
    let body = Body::from_stream(stream::once(async move { Ok::<_, std::io::Error>(xml) }));

    let mut response = builder
        .body(body)
        .expect("static headers always build a valid response")
        .into_response();

    if new_cookie_value.is_some() {
        response.extensions_mut().insert(session_header_case_map());
    }

    response
}

/// Exact casing to emit for the `Set-Cookie` header, read by the HTTP/1.1
/// writer when `preserve_header_case` is enabled on the server (see
/// `run()`). Without this the `http` crate would lowercase it to
/// `set-cookie` regardless of what was passed to `.header()`.
fn session_header_case_map() -> HeaderCaseMap {
    let mut case_map = HeaderCaseMap::default();
    case_map.insert(SET_COOKIE, Bytes::from_static(b"Set-Cookie"));
    case_map
}

fn session_key(backend: &SessionBackend, jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    match backend {
        SessionBackend::Cookie => jar.get(SESSION_COOKIE).map(|c| c.value().to_string()),
        SessionBackend::Header => headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_header_case_map_preserves_set_cookie_exact_case() {
        let case_map = session_header_case_map();
        let preserved: Vec<&Bytes> = case_map.get_all(&SET_COOKIE).collect();
        assert_eq!(preserved, vec![&Bytes::from_static(b"Set-Cookie")]);
    }

    #[test]
    fn session_key_reads_cookie_backend_from_jar() {
        let jar = CookieJar::new().add(axum_extra::extract::cookie::Cookie::new(
            SESSION_COOKIE,
            "abc123",
        ));
        let headers = HeaderMap::new();
        assert_eq!(
            session_key(&SessionBackend::Cookie, &jar, &headers),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn session_key_reads_header_backend_from_headers() {
        let jar = CookieJar::new();
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, "client-log-42".parse().unwrap());
        assert_eq!(
            session_key(&SessionBackend::Header, &jar, &headers),
            Some("client-log-42".to_string())
        );
    }

    #[test]
    fn session_key_is_none_when_absent() {
        let jar = CookieJar::new();
        let headers = HeaderMap::new();
        assert_eq!(session_key(&SessionBackend::Cookie, &jar, &headers), None);
        assert_eq!(session_key(&SessionBackend::Header, &jar, &headers), None);
    }
}
