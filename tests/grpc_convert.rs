//! Tests for the gRPC wire conversions (`src/grpc/convert.rs`) and the
//! `GRPC` transport producer registered in `ClientFactory`.
//!
//! These don't stand up a real `tonic` channel — they exercise the
//! conversion functions directly and confirm the factory selects and
//! constructs a `GrpcTransport` without touching the network (the
//! transport connects lazily).

#![cfg(feature = "grpc")]

use a2a_rs::client::factory::{ClientConfig, ClientFactory, GRPC, JSONRPC};
use a2a_rs::grpc::convert;
use a2a_rs::grpc::pb;
use a2a_rs::types::*;

fn sample_card(preferred: &str, url: &str) -> AgentCard {
    AgentCard {
        name: "test-agent".to_string(),
        description: "test".to_string(),
        version: "1.0".to_string(),
        url: url.to_string(),
        preferred_transport: Some(preferred.to_string()),
        supported_interfaces: vec![],
        additional_interfaces: None,
        provider: None,
        documentation_url: None,
        capabilities: AgentCapabilities::default(),
        security_schemes: None,
        security_requirements: vec![],
        default_input_modes: vec![],
        default_output_modes: vec![],
        skills: vec![],
        signatures: None,
        icon_url: None,
        protocol_version: None,
        supports_authenticated_extended_card: None,
        security: None,
    }
}

#[test]
fn factory_registers_and_selects_grpc_transport() {
    let card = sample_card("GRPC", "http://localhost:50051");
    let config = ClientConfig {
        supported_transports: vec![JSONRPC.to_string(), GRPC.to_string()],
        ..Default::default()
    };
    let factory = ClientFactory::new();
    let (label, url) = factory.select_transport(&card, &config).unwrap();
    assert_eq!(label, GRPC);
    assert_eq!(url, "http://localhost:50051");

    // Building the transport must not fail or block on network I/O — the
    // channel connects lazily on first RPC.
    let transport = factory.create(&card, &config, Default::default());
    assert!(transport.is_ok());
}

#[test]
fn send_message_params_roundtrip_preserves_text_and_metadata() {
    let message = Message::user("msg-1", "hello there");
    let params = SendMessageParams {
        message,
        configuration: Some(SendMessageConfiguration {
            accepted_output_modes: Some(vec!["text/plain".to_string()]),
            push_notification_config: None,
            history_length: Some(5),
            blocking: Some(true),
        }),
        metadata: Some(serde_json::json!({"trace_id": "abc123"})),
        tenant: Some("tenant-a".to_string()),
    };

    let request = convert::send_message_request(params).unwrap();
    assert_eq!(request.tenant.as_deref(), Some("tenant-a"));
    assert!(request.configuration_json.is_some());

    let recovered = convert::send_message_params(request).unwrap();
    assert_eq!(recovered.message.message_id, "msg-1");
    assert_eq!(recovered.tenant.as_deref(), Some("tenant-a"));
    assert_eq!(
        recovered.metadata.unwrap()["trace_id"],
        serde_json::json!("abc123")
    );
    let configuration = recovered.configuration.unwrap();
    assert_eq!(configuration.history_length, Some(5));
    assert_eq!(configuration.blocking, Some(true));
}

#[test]
fn file_part_bytes_roundtrip_through_base64_wire_field() {
    let original = Part::File {
        file: FileContent::Bytes(FileWithBytes {
            bytes: "aGVsbG8=".to_string(), // base64 for "hello"
            name: Some("greeting.txt".to_string()),
            mime_type: Some("text/plain".to_string()),
        }),
        metadata: None,
    };

    let pb_part: pb::Part = original.into();
    let recovered: Part = pb_part.try_into().unwrap();

    match recovered {
        Part::File {
            file: FileContent::Bytes(FileWithBytes { bytes, name, mime_type }),
            ..
        } => {
            assert_eq!(bytes, "aGVsbG8=");
            assert_eq!(name.as_deref(), Some("greeting.txt"));
            assert_eq!(mime_type.as_deref(), Some("text/plain"));
        }
        other => panic!("expected a bytes file part, got {other:?}"),
    }
}

#[test]
fn task_push_notification_config_carries_auth_through_json_field() {
    let config = TaskPushNotificationConfig {
        id: Some("cfg-1".to_string()),
        task_id: "task-1".to_string(),
        push_notification_config: PushNotificationConfig {
            id: None,
            url: "https://notify.example.com/hook".to_string(),
            token: Some("secret".to_string()),
            authentication: Some(PushNotificationAuthenticationInfo {
                schemes: vec!["Bearer".to_string()],
                credentials: None,
            }),
        },
        tenant: None,
    };

    let pb_config = convert::task_push_notification_config_to_pb(config).unwrap();
    assert_eq!(pb_config.id.as_deref(), Some("cfg-1"));
    assert!(pb_config.push_notification_config_json.contains("notify.example.com"));

    let recovered = convert::task_push_notification_config_from_pb(pb_config).unwrap();
    assert_eq!(recovered.task_id, "task-1");
    assert_eq!(recovered.push_notification_config.url, "https://notify.example.com/hook");
    assert_eq!(
        recovered
            .push_notification_config
            .authentication
            .unwrap()
            .schemes,
        vec!["Bearer".to_string()]
    );
}

#[test]
fn task_state_maps_unspecified_to_unknown() {
    let state: TaskState = pb::TaskState::Unspecified.into();
    assert_eq!(state, TaskState::Unknown);
}
