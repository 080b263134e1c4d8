use cloudbot_protocol::{OutboundData, encode};

/// Prints the canonical outbound envelopes so they can be diffed against
/// what the backend's own client produces.
fn main() {
    let samples = [
        OutboundData::text("user_42", "[Auto Reply] hello bridge").in_conversation(Some("conv_7")),
        OutboundData::text("user_42", "here you go").with_media("file_9f2c"),
    ];
    for data in &samples {
        match encode(data) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("encode failed: {e}"),
        }
    }
    println!("Run `cargo test -p wire-compat` to check the fixtures.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use cloudbot_protocol::{Frame, InboundData, OutboundData, Rejection, decode, encode};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes the fixture's `data` object, re-serializes it, and
    /// compares the JSON values (order-independent).
    fn roundtrip_data<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name)["data"].clone();
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  Rust: {reserialized}"
        );
    }

    fn decode_fixture(name: &str) -> InboundData {
        match decode(read_fixture(name).as_bytes()) {
            Ok(Frame::Message(data)) => data,
            other => panic!("{name} did not decode as a message: {other:?}"),
        }
    }

    // --- Inbound (backend -> bridge) ---

    #[test]
    fn fixture_inbound_message() {
        let msg = decode_fixture("inbound_message.json").validate(0).unwrap();
        assert_eq!(msg.text, "hello bridge");
        assert_eq!(msg.user_id, "user_42");
        assert_eq!(msg.conversation_id, "conv_7");
        assert_eq!(msg.id, "msg_1001");
        assert!(!msg.has_media());
    }

    #[test]
    fn fixture_inbound_media_message() {
        let msg = decode_fixture("inbound_media_message.json")
            .validate(0)
            .unwrap();
        assert_eq!(msg.text, "");
        assert_eq!(msg.file_path.as_deref(), Some("uploads/user_42/cat.png"));
        assert_eq!(msg.media_type.as_deref(), Some("image"));
        assert!(msg.has_media());
    }

    #[test]
    fn fixture_inbound_data_roundtrip() {
        roundtrip_data::<InboundData>("inbound_message.json");
        roundtrip_data::<InboundData>("inbound_media_message.json");
    }

    #[test]
    fn sparse_inbound_gets_defaults() {
        let json = r#"{"type":"message","data":{"text":"hi"}}"#;
        let Ok(Frame::Message(data)) = decode(json.as_bytes()) else {
            panic!("expected message frame");
        };
        let msg = data.validate(1700000000000).unwrap();
        assert_eq!(msg.user_id, "unknown");
        assert_eq!(msg.conversation_id, "default");
        assert_eq!(msg.id, "cloud-bot-channel-1700000000000");
    }

    #[test]
    fn relayed_recipient_keys_are_ignored() {
        let json = r#"{"type":"message","data":{"text":"hi","userId":"user_42","recipientId":"bot_1","to":"bot_1"}}"#;
        let Ok(Frame::Message(data)) = decode(json.as_bytes()) else {
            panic!("expected message frame");
        };
        let msg = data.validate(0).unwrap();
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.user_id, "user_42");
    }

    #[test]
    fn numeric_conversation_id_uses_default() {
        let json = r#"{"type":"message","data":{"text":"hi","userId":"user_42","conversationId":5}}"#;
        let Ok(Frame::Message(data)) = decode(json.as_bytes()) else {
            panic!("expected message frame");
        };
        assert_eq!(data.validate(0).unwrap().conversation_id, "default");
    }

    #[test]
    fn keepalive_envelopes_are_not_messages() {
        for json in [r#"{"type":"ping"}"#, r#"{"type":"pong"}"#, r#"{"type":"typing"}"#] {
            assert!(
                matches!(decode(json.as_bytes()), Ok(Frame::Other(_))),
                "{json} should not be a message"
            );
        }
    }

    #[test]
    fn content_free_message_is_rejected() {
        let json = r#"{"type":"message","data":{"userId":"user_42","text":""}}"#;
        let Ok(Frame::Message(data)) = decode(json.as_bytes()) else {
            panic!("expected message frame");
        };
        assert!(matches!(data.validate(0), Err(Rejection::Empty)));
    }

    // --- Outbound (bridge -> backend) ---

    #[test]
    fn fixture_outbound_message() {
        let data = OutboundData::text("user_42", "[Auto Reply] hello bridge")
            .in_conversation(Some("conv_7"));
        let encoded: serde_json::Value = serde_json::from_str(&encode(&data).unwrap()).unwrap();
        assert_eq!(encoded, load_fixture("outbound_message.json"));
    }

    #[test]
    fn fixture_outbound_media_message() {
        let data = OutboundData::text("user_42", "here you go").with_media("file_9f2c");
        let encoded: serde_json::Value = serde_json::from_str(&encode(&data).unwrap()).unwrap();
        assert_eq!(encoded, load_fixture("outbound_media_message.json"));
    }

    #[test]
    fn fixture_outbound_data_roundtrip() {
        roundtrip_data::<OutboundData>("outbound_message.json");
        roundtrip_data::<OutboundData>("outbound_media_message.json");
    }
}
