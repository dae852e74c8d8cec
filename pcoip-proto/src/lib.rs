//! PCoIP broker protocol crate.
//!
//! Contains the wire message types (`message`), the XML codec that
//! translates between them and the broker's HTTP payloads (`codec`), and the
//! error types raised along the way (`error`). These types are intentionally
//! free of any transport or storage concerns — they model the protocol
//! itself, not how it gets served.
//!
/// Request/response message types and the session/resource data model.
pub mod message;
/// XML (de)serialization for the broker wire protocol.
pub mod codec;
/// Error types shared by the codec.
pub mod error;

pub use error::CodecError;
pub use message::{
    AgentSession, AllocateResourceFailure, AllocateResourceRequest, AllocateResourceSuccess,
    AuthenticateFailed, AuthenticateRequest, AuthenticateSuccess, ByeRequest, ByeResponse,
    Credentials, GetResourceListRequest, GetResourceListResponse, HelloRequest, HelloResponse,
    Request, Resource, Response, TeradiciResource,
};

#[cfg(test)]
mod tests {
    use crate::codec;
    use crate::codec::{deserialize_request, serialize_response};
    use crate::message::*;

    #[test]
    fn probe_hello_round_trips() {
        let xml = br#"<pcoip-client version="2.1"><hello><client-info><hostname>c.h</hostname><product-name>QueryBrokerClient</product-name></client-info></hello></pcoip-client>"#;
        let req = deserialize_request(xml);
        match req {
            Request::Hello(h) => {
                assert_eq!(h.client_hostname, "c.h");
                assert_eq!(h.client_product_name, "QueryBrokerClient");
                assert!(h.is_probe());
            }
            other => panic!("expected Hello, got {other:?}"),
        }
    }

    #[test]
    fn bye_response_serializes() {
        let xml = serialize_response(&Response::Bye(ByeResponse)).expect("serializes");
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"utf-8\"?>"));
        assert!(xml.contains("<bye-resp"));
    }

    #[test]
    fn authenticate_request_parses_and_redacts_password_in_debug() {
        let xml = br#"<pcoip-client version="2.1"><authenticate version="1.0"><username>bob</username><password>hunter2</password><domain>EXAMPLE</domain></authenticate></pcoip-client>"#;
        let req = deserialize_request(xml);
        match req {
            Request::Authenticate(a) => {
                assert_eq!(a.username, "bob");
                assert_eq!(a.password, "hunter2");
                assert_eq!(a.domain, "EXAMPLE");
                assert!(!format!("{a:?}").contains("hunter2"));
            }
            other => panic!("expected Authenticate, got {other:?}"),
        }
    }

    #[test]
    fn missing_password_becomes_bad_message() {
        let xml = br#"<pcoip-client version="2.1"><authenticate version="1.0"><username>bob</username></authenticate></pcoip-client>"#;
        match deserialize_request(xml) {
            Request::BadMessage(b) => assert!(b.reason.contains("password")),
            other => panic!("expected BadMessage, got {other:?}"),
        }
    }

    #[test]
    fn non_xml_body_becomes_bad_message() {
        match deserialize_request(b"this is not xml at all <<<") {
            Request::BadMessage(_) => {}
            other => panic!("expected BadMessage, got {other:?}"),
        }
    }

    #[test]
    fn get_resource_list_response_preserves_order() {
        let resp = Response::GetResourceList(GetResourceListResponse {
            resources: vec![
                TeradiciResource {
                    resource_name: "zebra".into(),
                    resource_id: "z".into(),
                },
                TeradiciResource {
                    resource_name: "apple".into(),
                    resource_id: "a".into(),
                },
            ],
        });
        let xml = serialize_response(&resp).expect("serializes");
        let xml = String::from_utf8(xml).unwrap();
        let zebra_pos = xml.find("zebra").unwrap();
        let apple_pos = xml.find("apple").unwrap();
        assert!(zebra_pos < apple_pos);
        assert!(xml.contains("Khajit has wares."));
    }

    #[test]
    fn allocate_failure_preserves_misspelled_result_id() {
        let resp = Response::AllocateFailed(AllocateResourceFailure {
            result_id: "FAILED_ANOTHER_SESION_STARTED".to_string(),
        });
        let xml = serialize_response(&resp).expect("serializes");
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.contains("FAILED_ANOTHER_SESION_STARTED"));
    }

    #[test]
    fn launch_session_response_round_trips_agent_session() {
        let xml = br#"<pcoip-agent version="1.0"><launch-session-resp><result-id>successful</result-id><session-info><ip-address>10.0.0.5</ip-address><sni>host.example</sni><port>4172</port><session-id>sess-1</session-id><session-tag>tag-1</session-tag></session-info></launch-session-resp></pcoip-agent>"#;
        let result = codec::deserialize_launch_session_response(xml, "desk-1")
            .expect("parses");
        match result {
            codec::LaunchSessionResult::Successful(session) => {
                assert_eq!(session.ip_address, "10.0.0.5");
                assert_eq!(session.port, 4172);
                assert_eq!(session.resource_id, "desk-1");
            }
            other => panic!("expected Successful, got {other:?}"),
        }
    }

    #[test]
    fn launch_session_response_without_pcoip_agent_wrapper_does_not_parse() {
        let xml = br#"<launch-session-resp><result-id>successful</result-id></launch-session-resp>"#;
        assert_eq!(codec::deserialize_launch_session_response(xml, "desk-1"), None);
    }

    #[test]
    fn non_integer_resource_id_becomes_bad_message() {
        let xml = br#"<pcoip-client version="2.1"><allocate-resource><resource-id>Not an integer</resource-id></allocate-resource></pcoip-client>"#;
        match deserialize_request(xml) {
            Request::BadMessage(b) => assert!(b.reason.contains("resource-id")),
            other => panic!("expected BadMessage, got {other:?}"),
        }
    }

    #[test]
    fn allocate_failure_uses_verbatim_flavor_text() {
        let resp = Response::AllocateFailed(AllocateResourceFailure {
            result_id: "FAILED_USER_AUTH".to_string(),
        });
        let xml = serialize_response(&resp).expect("serializes");
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.contains("Failed to allocate a session on the given resource \u{1f622}."));
    }
}
