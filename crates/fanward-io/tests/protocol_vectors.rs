use fanward_io::protocol::{IncomingMessage, ProtocolVersion};

#[test]
fn parses_hello_message() {
    let raw = r#"{
        "type":"hello",
        "protocol_version":{"major":1,"minor":0},
        "capabilities":["status.v1","set_duty.v1"],
        "client_id":"panel-slider"
    }"#;

    let msg = IncomingMessage::parse(raw).expect("hello should parse");
    match msg {
        IncomingMessage::Hello(hello) => {
            assert!(hello.protocol_version.is_supported());
            assert_eq!(hello.client_id.as_deref(), Some("panel-slider"));
        }
        _ => panic!("expected hello message"),
    }
}

#[test]
fn parses_set_duty_message() {
    let raw = r#"{
        "type":"set_duty",
        "protocol_version":{"major":1,"minor":0},
        "sequence":1,
        "duty":180
    }"#;

    let msg = IncomingMessage::parse(raw).expect("set_duty should parse");
    match msg {
        IncomingMessage::SetDuty(cmd) => {
            assert_eq!(cmd.sequence, 1);
            assert_eq!(cmd.duty, 180);
            assert_eq!(cmd.protocol_version, ProtocolVersion::v1());
        }
        _ => panic!("expected set_duty message"),
    }
}

#[test]
fn unknown_message_types_are_dropped() {
    assert!(IncomingMessage::parse(r#"{"type":"recalibrate"}"#).is_none());
    assert!(IncomingMessage::parse("not json at all").is_none());
}
