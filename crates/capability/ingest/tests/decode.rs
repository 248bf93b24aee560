use domain::{DataSide, DeviceId, SourceValue};
use ds_ingest::{BusChannel, IngestError, decode_publish};
use serde_json::json;
use uuid::Uuid;

const PREFIX: &str = "iot/datastream";

#[test]
fn decodes_attribute_envelope() {
    let device_id = Uuid::from_u128(42);
    let payload = json!({
        "device_id": device_id.to_string(),
        "data_side": "shared",
        "body": { "temp": 21.5, "pos": [1, 2] }
    })
    .to_string();

    let bus = decode_publish(PREFIX, "iot/datastream/attributedata", payload.as_bytes(), 7)
        .expect("decode")
        .expect("channel");

    assert_eq!(bus.channel, BusChannel::AttributeData);
    assert_eq!(bus.message.device_id, DeviceId::new(device_id));
    assert_eq!(bus.message.data_side, DataSide::Shared);
    assert_eq!(bus.message.received_at_ms, 7);
    assert_eq!(bus.message.body["temp"], SourceValue::Json(json!(21.5)));
    assert_eq!(bus.message.body["pos"], SourceValue::Json(json!([1, 2])));
}

#[test]
fn data_side_defaults_to_client() {
    let payload = json!({
        "device_id": Uuid::from_u128(1).to_string(),
        "body": {}
    })
    .to_string();

    let bus = decode_publish(PREFIX, "iot/datastream/telemetrydata", payload.as_bytes(), 0)
        .expect("decode")
        .expect("channel");

    assert_eq!(bus.channel, BusChannel::TelemetryData);
    assert_eq!(bus.message.data_side, DataSide::Client);
    assert!(bus.message.body.is_empty());
}

#[test]
fn unrelated_topic_is_ignored() {
    let decoded = decode_publish(PREFIX, "iot/other/telemetrydata", b"not json", 0).expect("ok");
    assert!(decoded.is_none());
}

#[test]
fn malformed_envelope_is_rejected() {
    let err = decode_publish(
        PREFIX,
        "iot/datastream/telemetrydata",
        br#"{"device_id":"not-a-uuid","body":{}}"#,
        0,
    )
    .expect_err("invalid");
    assert!(matches!(err, IngestError::Decode(_)));

    let err = decode_publish(PREFIX, "iot/datastream/telemetrydata", b"{not json", 0)
        .expect_err("invalid");
    assert!(matches!(err, IngestError::Decode(_)));
}
