use super::*;
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_domain_of() {
    assert_eq!(domain_of("acme!resource-123"), "acme");
    assert_eq!(domain_of("acme!a!b"), "acme");
    assert_eq!(domain_of("standalone"), "standalone");
    assert_eq!(domain_of("!orphan"), "");
}

#[test]
fn test_action_parse() {
    assert_eq!(Action::parse("CREATE"), Action::Create);
    assert_eq!(Action::parse("UPDATE"), Action::Update);
    assert_eq!(Action::parse("DELETE"), Action::Delete);
    assert_eq!(
        Action::parse("create"),
        Action::Unrecognized("create".to_string())
    );
}

#[test]
fn test_decode_message() {
    let body = br#"{"type":"composr:Phrase","resourceId":"acme!42","action":"CREATE"}"#;
    let message = assert_ok!(EventMessage::decode(body));

    assert_eq!(message.kind(), Some("composr:Phrase"));
    assert_eq!(assert_ok!(message.resource_id()), "acme!42");
    assert_eq!(message.action(), Action::Create);
}

#[test]
fn test_decode_ignores_extra_fields() {
    let body = br#"{"type":"composr:Snippet","resourceId":"acme!7","action":"DELETE","ts":1}"#;
    let message = assert_ok!(EventMessage::decode(body));
    assert_eq!(assert_ok!(message.resource_id()), "acme!7");
}

#[test]
fn test_decode_malformed_json() {
    let err = assert_err!(EventMessage::decode(b"{not json"));
    assert!(matches!(err, WorkerError::MessageFormat(_)));
}

#[test]
fn test_decode_invalid_utf8() {
    let err = assert_err!(EventMessage::decode(&[0xff, 0xfe, 0x7b]));
    assert!(matches!(err, WorkerError::MessageFormat(_)));
}

#[test]
fn test_decode_accepts_any_json() {
    // Other producers on the exchange may publish arbitrary shapes.
    let bodies: [&[u8]; 4] = [b"42", b"null", b"[1,2]", br#"{"type":7}"#];
    for body in bodies {
        let message = assert_ok!(EventMessage::decode(body));
        assert_eq!(message.kind(), None);
    }
}

#[test]
fn test_fields_read_leniently() {
    let message = assert_ok!(EventMessage::decode(
        br#"{"type":"composr:Phrase","resourceId":42,"action":null}"#
    ));

    assert_eq!(message.kind(), Some("composr:Phrase"));
    assert!(matches!(
        message.resource_id(),
        Err(WorkerError::MessageFormat(_))
    ));
    assert_eq!(message.action(), Action::Unrecognized("null".to_string()));
}

#[test]
fn test_missing_fields() {
    let message = assert_ok!(EventMessage::decode(br#"{"type":"composr:Phrase"}"#));

    assert!(matches!(
        message.resource_id(),
        Err(WorkerError::MessageFormat(_))
    ));
    assert_eq!(message.action(), Action::Unrecognized(String::new()));
}

#[test]
fn test_kind_matcher() {
    let matcher = KindMatcher::new("composr:Phrase", "composr:Snippet");

    assert_eq!(matcher.kind_of("composr:Phrase"), Some(ResourceKind::Phrase));
    assert_eq!(
        matcher.kind_of("composr:Snippet"),
        Some(ResourceKind::Snippet)
    );
    assert_eq!(matcher.kind_of("composr:Other"), None);
    assert_eq!(matcher.type_name(ResourceKind::Snippet), "composr:Snippet");
}

#[test]
fn test_resource_event_extracts_domain() {
    let event = ResourceEvent::new(ResourceKind::Phrase, "acme!42", Action::Create);
    assert_eq!(event.domain, "acme");
    assert!(event.kind.is_phrase());
}
