//! Wire-format compatibility checks for the duplex message envelopes.
//! Clients depend on these exact tags and field names.

use serde_json::json;
use valet_protocol::{InboundMessage, OutboundMessage};

#[test]
fn inbound_ai_request_parses() {
    let raw = json!({
        "type": "ai_request",
        "prompt": "summarize the launch notes",
        "provider": "local",
    })
    .to_string();

    let msg: InboundMessage = serde_json::from_str(&raw).unwrap();
    match msg {
        InboundMessage::AiRequest {
            prompt, provider, ..
        } => {
            assert_eq!(prompt, "summarize the launch notes");
            assert_eq!(provider.as_deref(), Some("local"));
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn inbound_audio_fills_defaults() {
    let raw = json!({ "type": "audio", "audio": "UklGRg==" }).to_string();
    let msg: InboundMessage = serde_json::from_str(&raw).unwrap();
    match msg {
        InboundMessage::Audio {
            format,
            sample_rate,
            ..
        } => {
            assert_eq!(format, "wav");
            assert_eq!(sample_rate, 44100);
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn inbound_mcp_command_parses() {
    let raw = json!({
        "type": "mcp_command",
        "tool": "document",
        "command": "generate_pdf",
        "params": { "content": "hi" }
    })
    .to_string();

    let msg: InboundMessage = serde_json::from_str(&raw).unwrap();
    match msg {
        InboundMessage::McpCommand { tool, command, .. } => {
            assert_eq!(tool, "document");
            assert_eq!(command, "generate_pdf");
        }
        other => panic!("wrong variant: {other:?}"),
    }
}

#[test]
fn unknown_inbound_kind_is_rejected() {
    let raw = json!({ "type": "simulate_demo", "x": 1 }).to_string();
    assert!(serde_json::from_str::<InboundMessage>(&raw).is_err());
}

#[test]
fn outbound_frames_carry_type_and_timestamp() {
    let frames = [
        OutboundMessage::welcome("client-1"),
        OutboundMessage::ping(),
        OutboundMessage::server_shutdown(),
        OutboundMessage::error("invalid_input", "bad frame"),
        OutboundMessage::ai_response("hello", "local", "valet-chat-1"),
    ];
    let expected_types = [
        "welcome",
        "ping",
        "server_shutdown",
        "error",
        "ai_response",
    ];

    for (frame, expected) in frames.iter().zip(expected_types) {
        let value: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(value["type"], expected);
        assert!(value["timestamp"].as_i64().unwrap() > 0);
    }
}

#[test]
fn error_frame_exposes_stable_kind() {
    let frame = OutboundMessage::error("tool_unavailable", "search tool stopped");
    let value: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
    assert_eq!(value["error"]["kind"], "tool_unavailable");
    assert_eq!(value["error"]["message"], "search tool stopped");
}
