//! XML wire codec: inbound XML → `Request`, `Response` → outbound XML.
//!
//! Parsing goes through a small generic element tree (`XmlElement`) rather
//! than hand-rolled event matching per message — it keeps the per-message
//! deserializers readable (`element.child("username")`, much like
//! `ElementTree.find` in the original implementation) and makes it easy to
//! reject anything that isn't well-formed XML up front. `quick_xml` never
//! expands external entities or resolves DTDs, so this is a defused parser
//! by construction — there is nothing to turn off.

use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::CodecError;
use crate::message::*;

/// A parsed XML element, stripped down to what the broker protocol needs:
/// a tag name, attributes, direct text, and children in document order.
#[derive(Debug, Default)]
struct XmlElement {
    name: String,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<XmlElement>,
}

impl XmlElement {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|c| c.text.as_deref())
    }
}

/// Parses a UTF-8 XML document into an `XmlElement` tree. Returns `None` on
/// any parse failure — callers turn that into `Request::BadMessage` rather
/// than propagating an error, per the "do not throw" rule for malformed
/// requests.
fn parse_document(xml: &[u8]) -> Option<XmlElement> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    // Stack of (element being built) with the root at index 0.
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader.read_event().ok()?;
        match event {
            Event::Start(e) => stack.push(start_element(&e)),
            Event::Empty(e) => {
                let el = start_element(&e);
                push_finished(&mut stack, &mut root, el);
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    let text = decode_text(&t)?;
                    if !text.trim().is_empty() {
                        top.text = Some(text);
                    }
                }
            }
            Event::End(_) => {
                let finished = stack.pop()?;
                push_finished(&mut stack, &mut root, finished);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root
}

fn push_finished(stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>, el: XmlElement) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
    } else {
        *root = Some(el);
    }
}

fn start_element(e: &BytesStart) -> XmlElement {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let attrs = e
        .attributes()
        .filter_map(|a| a.ok())
        .map(|a| {
            let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
            let value = a
                .unescape_value()
                .map(|v| v.into_owned())
                .unwrap_or_default();
            (key, value)
        })
        .collect();
    XmlElement {
        name,
        attrs,
        text: None,
        children: Vec::new(),
    }
}

fn decode_text(t: &BytesText) -> Option<String> {
    t.unescape().ok().map(|c| c.into_owned())
}

/// Deserializes an inbound XML document into a `Request`.
///
/// Never fails: anything that doesn't parse, has the wrong root, an
/// unrecognized message tag, or is missing a mandatory child comes back as
/// `Request::BadMessage` with a human-readable reason.
pub fn deserialize_request(xml: &[u8]) -> Request {
    let Some(root) = parse_document(xml) else {
        return Request::BadMessage(BadMessage {
            reason: "could not parse XML document".to_string(),
        });
    };

    if root.name != "pcoip-client" {
        return Request::BadMessage(BadMessage {
            reason: "root element must be pcoip-client".to_string(),
        });
    }

    if root.attr("version").is_none() {
        return Request::BadMessage(BadMessage {
            reason: "pcoip-client is missing a version attribute".to_string(),
        });
    }

    if root.children.len() != 1 {
        return Request::BadMessage(BadMessage {
            reason: "expected exactly one child of pcoip-client".to_string(),
        });
    }

    let body = &root.children[0];
    match body.name.as_str() {
        "hello" => deserialize_hello(body),
        "authenticate" => deserialize_authenticate(body),
        "get-resource-list" => Request::GetResourceList(GetResourceListRequest),
        "allocate-resource" => deserialize_allocate_resource(body),
        "bye" => Request::Bye(ByeRequest),
        other => Request::BadMessage(BadMessage {
            reason: format!("unrecognized request element: {other}"),
        }),
    }
}

fn deserialize_hello(body: &XmlElement) -> Request {
    let Some(client_info) = body.child("client-info") else {
        return Request::BadMessage(BadMessage {
            reason: "hello is missing client-info".to_string(),
        });
    };
    let Some(hostname) = client_info.child_text("hostname") else {
        return Request::BadMessage(BadMessage {
            reason: "client-info is missing hostname".to_string(),
        });
    };
    let Some(product_name) = client_info.child_text("product-name") else {
        return Request::BadMessage(BadMessage {
            reason: "client-info is missing product-name".to_string(),
        });
    };
    Request::Hello(HelloRequest {
        client_hostname: hostname.to_string(),
        client_product_name: product_name.to_string(),
    })
}

fn deserialize_authenticate(body: &XmlElement) -> Request {
    let Some(username) = body.child_text("username") else {
        return Request::BadMessage(BadMessage {
            reason: "authenticate is missing username".to_string(),
        });
    };
    let Some(password) = body.child_text("password") else {
        return Request::BadMessage(BadMessage {
            reason: "authenticate is missing password".to_string(),
        });
    };
    let domain = body.child_text("domain").unwrap_or_default();
    Request::Authenticate(AuthenticateRequest {
        username: username.to_string(),
        password: password.to_string(),
        domain: domain.to_string(),
    })
}

fn deserialize_allocate_resource(body: &XmlElement) -> Request {
    let Some(resource_id) = body.child_text("resource-id") else {
        return Request::BadMessage(BadMessage {
            reason: "allocate-resource is missing resource-id".to_string(),
        });
    };
    if resource_id.trim().parse::<i64>().is_err() {
        return Request::BadMessage(BadMessage {
            reason: format!("resource-id is not an integer: {resource_id}"),
        });
    }
    Request::AllocateResource(AllocateResourceRequest {
        resource_id: resource_id.to_string(),
    })
}

// --- Serialization --------------------------------------------------------

const ROOT_VERSION: &str = "2.1";

/// Serializes a `Response` to a complete XML document, declaration
/// included. Errors are limited to the underlying writer failing, which in
/// practice (writing into a `Vec<u8>`) never happens.
pub fn serialize_response(response: &Response) -> Result<Vec<u8>, CodecError> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    writer
        .create_element("pcoip-client")
        .with_attribute(("version", ROOT_VERSION))
        .write_inner_content(|w| write_body(w, response))?;

    Ok(writer.into_inner())
}

fn write_body(
    w: &mut Writer<Vec<u8>>,
    response: &Response,
) -> Result<(), quick_xml::Error> {
    match response {
        Response::Hello(r) => write_hello_resp(w, r),
        Response::AuthSuccess(_) => write_authenticate_resp(
            w,
            "AUTH_SUCCESSFUL_AND_COMPLETE",
            "Authentication was a resounding success.",
        ),
        Response::AuthFailed(_) => write_authenticate_resp(
            w,
            "AUTH_FAILED_UNKNOWN_USERNAME_OR_PASSWORD",
            "Could not authenticate.",
        ),
        Response::GetResourceList(r) => write_get_resource_list_resp(w, r),
        Response::AllocateSuccess(r) => write_allocate_success_resp(w, r),
        Response::AllocateFailed(r) => write_allocate_failed_resp(w, r),
        Response::Bye(_) => {
            w.create_element("bye-resp").write_empty()?;
            Ok(())
        }
    }
}

fn text_element(
    w: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
) -> Result<(), quick_xml::Error> {
    w.create_element(name)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

fn write_hello_resp(
    w: &mut Writer<Vec<u8>>,
    r: &HelloResponse,
) -> Result<(), quick_xml::Error> {
    w.create_element("hello-resp").write_inner_content(|w| {
        w.create_element("brokers-info").write_inner_content(|w| {
            w.create_element("broker-info").write_inner_content(|w| {
                text_element(w, "product-name", &r.product_name)?;
                text_element(w, "product-version", &r.product_version)?;
                text_element(w, "platform", &r.platform)?;
                text_element(w, "locale", &r.locale)?;
                text_element(w, "ip-address", &r.ip_address)?;
                text_element(w, "hostname", &r.hostname)?;
                Ok(())
            })?;
            Ok(())
        })?;

        w.create_element("next-authentication")
            .write_inner_content(|w| {
                w.create_element("authentication-methods")
                    .write_inner_content(|w| {
                        for method in &r.authentication_methods {
                            text_element(w, "method", method)?;
                        }
                        Ok(())
                    })?;
                w.create_element("domains").write_inner_content(|w| {
                    for domain in &r.domains {
                        text_element(w, "domain", domain)?;
                    }
                    Ok(())
                })?;
                Ok(())
            })?;
        Ok(())
    })?;
    Ok(())
}

fn write_authenticate_resp(
    w: &mut Writer<Vec<u8>>,
    result_id: &str,
    result_str: &str,
) -> Result<(), quick_xml::Error> {
    w.create_element("authenticate-resp")
        .with_attribute(("method", "password"))
        .write_inner_content(|w| {
            w.create_element("result").write_inner_content(|w| {
                text_element(w, "result-id", result_id)?;
                text_element(w, "result-str", result_str)?;
                Ok(())
            })?;
            Ok(())
        })?;
    Ok(())
}

fn write_get_resource_list_resp(
    w: &mut Writer<Vec<u8>>,
    r: &GetResourceListResponse,
) -> Result<(), quick_xml::Error> {
    w.create_element("get-resource-list-resp")
        .write_inner_content(|w| {
            w.create_element("result").write_inner_content(|w| {
                text_element(w, "result-id", "LIST_SUCCESSFUL")?;
                text_element(w, "result-str", "Khajit has wares.")?;
                Ok(())
            })?;

            for resource in &r.resources {
                w.create_element("resource").write_inner_content(|w| {
                    text_element(w, "resource-name", &resource.resource_name)?;
                    text_element(w, "resource-id", &resource.resource_id)?;
                    w.create_element("resource-type")
                        .with_attribute(("session-type", TeradiciResource::SESSION_TYPE))
                        .write_text_content(BytesText::new(TeradiciResource::RESOURCE_TYPE))?;
                    text_element(w, "resource-state", TeradiciResource::RESOURCE_STATE)?;
                    w.create_element("protocols").write_inner_content(|w| {
                        w.create_element("protocol")
                            .with_attribute(("is-default", "true"))
                            .write_text_content(BytesText::new(TeradiciResource::PROTOCOL))?;
                        Ok(())
                    })?;
                    Ok(())
                })?;
            }
            Ok(())
        })?;
    Ok(())
}

fn write_allocate_success_resp(
    w: &mut Writer<Vec<u8>>,
    r: &AllocateResourceSuccess,
) -> Result<(), quick_xml::Error> {
    w.create_element("allocate-resource-resp")
        .write_inner_content(|w| {
            w.create_element("result").write_inner_content(|w| {
                text_element(w, "result-id", "ALLOC_SUCCESSFUL")?;
                text_element(w, "result-str", "The Spice must flow")?;
                Ok(())
            })?;

            w.create_element("target").write_inner_content(|w| {
                text_element(w, "ip-address", &r.ip_address)?;
                text_element(w, "hostname", &r.hostname)?;
                text_element(w, "sni", &r.sni)?;
                text_element(w, "port", &r.port.to_string())?;
                text_element(w, "session-id", &r.session_id)?;
                text_element(w, "connect-tag", &r.connect_tag)?;
                Ok(())
            })?;

            text_element(w, "resource-id", &r.resource_id)?;
            text_element(w, "protocol", "PCOIP")?;
            Ok(())
        })?;
    Ok(())
}

fn write_allocate_failed_resp(
    w: &mut Writer<Vec<u8>>,
    r: &AllocateResourceFailure,
) -> Result<(), quick_xml::Error> {
    w.create_element("allocate-resource-resp")
        .write_inner_content(|w| {
            w.create_element("result").write_inner_content(|w| {
                text_element(w, "result-id", &r.result_id)?;
                text_element(
                    w,
                    "result-str",
                    "Failed to allocate a session on the given resource \u{1f622}.",
                )?;
                Ok(())
            })?;
            Ok(())
        })?;
    Ok(())
}

// --- Agent wire protocol ---------------------------------------------------

/// Builds the `launch-session` request body sent to a workstation agent.
/// See `pcoip-broker`'s `agent` module for the HTTP call itself; this lives
/// here because it's wire format, same as the client-facing messages.
pub fn serialize_launch_session(
    agent_hostname: &str,
    username: &str,
    password: &str,
    domain: &str,
    client_name: &str,
) -> Result<Vec<u8>, CodecError> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    writer
        .create_element("pcoip-agent")
        .with_attribute(("version", "1.0"))
        .write_inner_content(|w| {
            w.create_element("launch-session").write_inner_content(|w| {
                text_element(w, "session-type", "UNSPECIFIED")?;
                text_element(w, "ip-address", "127.0.0.1")?;
                text_element(w, "hostname", agent_hostname)?;

                w.create_element("logon")
                    .with_attribute(("method", "windows-password"))
                    .write_inner_content(|w| {
                        text_element(w, "username", username)?;
                        text_element(w, "password", password)?;
                        text_element(w, "domain", domain)?;
                        Ok(())
                    })?;

                text_element(w, "client-mac", "")?;
                text_element(w, "client-ip", "")?;
                text_element(w, "client-name", client_name)?;
                text_element(w, "license-path", "")?;
                text_element(w, "session-log-id", "")?;
                Ok(())
            })?;
            Ok(())
        })?;

    Ok(writer.into_inner())
}

/// The outcome of decoding `launch-session-resp/result-id` from an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchSessionResult {
    Successful(AgentSession),
    FailedUserAuth,
    FailedAnotherSessionStarted,
    /// `result-id` present but not one of the recognized values, or
    /// `session-info` missing/incomplete on a claimed success.
    Unrecognized,
}

/// Parses an agent's `launch-session-resp` document. The agent wraps it the
/// same way the broker wraps client responses: root `pcoip-agent`, with
/// `launch-session-resp` as its one child.
pub fn deserialize_launch_session_response(
    xml: &[u8],
    resource_id: &str,
) -> Option<LaunchSessionResult> {
    let root = parse_document(xml)?;
    if root.name != "pcoip-agent" {
        return None;
    }
    let body = root.child("launch-session-resp")?;

    let result_id = body.child_text("result-id")?;
    match result_id.to_ascii_lowercase().as_str() {
        "successful" => {
            let info = body.child("session-info")?;
            let port: u16 = info.child_text("port")?.parse().ok()?;
            Some(LaunchSessionResult::Successful(AgentSession {
                ip_address: info.child_text("ip-address")?.to_string(),
                sni: info.child_text("sni")?.to_string(),
                port,
                session_id: info.child_text("session-id")?.to_string(),
                session_tag: info.child_text("session-tag")?.to_string(),
                resource_id: resource_id.to_string(),
            }))
        }
        "failed_user_auth" => Some(LaunchSessionResult::FailedUserAuth),
        "failed_another_session_started" => Some(LaunchSessionResult::FailedAnotherSessionStarted),
        _ => Some(LaunchSessionResult::Unrecognized),
    }
}
