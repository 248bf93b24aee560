use domain::{DataSide, DeviceId, RawMessage, SourceValue};
use serde_json::json;
use uuid::Uuid;

#[test]
fn raw_message_from_json_object() {
    let object = json!({ "temp": 21.5, "flag": true })
        .as_object()
        .cloned()
        .expect("object");
    let msg = RawMessage::from_json_object(
        DeviceId::new(Uuid::from_u128(7)),
        DataSide::Client,
        object,
        1000,
    );

    assert_eq!(msg.body.len(), 2);
    assert_eq!(msg.body.get("flag"), Some(&SourceValue::Json(json!(true))));
    assert_eq!(msg.received_at_ms, 1000);
}

#[test]
fn data_side_parse_and_serde() {
    assert_eq!(DataSide::parse("Server"), Some(DataSide::Server));
    assert_eq!(DataSide::parse("any"), None);
    let side: DataSide = serde_json::from_str("\"shared\"").expect("deserialize");
    assert_eq!(side, DataSide::Shared);
    assert_eq!(side.to_string(), "shared");
}

#[test]
fn device_id_displays_as_uuid() {
    let id = DeviceId::new(Uuid::from_u128(7));
    assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000007");
}
