//! Canonical flat-record format of messages

use serde_json::json;
use switchyard_core::*;

#[test]
fn test_record_uses_wire_names_and_nulls() {
    let message = Message::new(
        "coordinator_1",
        AgentRole::Coordinator,
        MessageType::TaskAssignment,
        payload(json!({"task": "train_model", "model_type": "hybrid_cnn_lstm"})),
    )
    .to_role(AgentRole::ModelTrainer);

    let record = message.to_record();
    assert_eq!(record["sender_role"], json!("coordinator"));
    assert_eq!(record["recipient_role"], json!("model_trainer"));
    assert_eq!(record["recipient_id"], serde_json::Value::Null);
    assert_eq!(record["in_reply_to"], serde_json::Value::Null);
    assert_eq!(record["message_type"], json!("task_assignment"));
    assert_eq!(record["content"]["model_type"], json!("hybrid_cnn_lstm"));
    assert_eq!(record.len(), 9);
}

#[test]
fn test_json_round_trip_preserves_reply_correlation() {
    let alert = Message::new(
        "anomaly_detector_6",
        AgentRole::AnomalyDetector,
        MessageType::AnomalyAlert,
        payload(json!({"anomaly_type": "vorticity", "severity": "high"})),
    )
    .to_agent("coordinator_1");
    let ack = alert.reply(
        "coordinator_1",
        AgentRole::Coordinator,
        MessageType::Response,
        payload(json!({"status": "acknowledged"})),
    );

    let parsed = Message::from_json(&ack.to_json()).unwrap();
    assert_eq!(parsed, ack);
    assert_eq!(parsed.in_reply_to(), Some(alert.id()));
    assert_eq!(parsed.recipient(), &Recipient::Agent("anomaly_detector_6".into()));
}

#[test]
fn test_missing_type_fails_without_partial_message() {
    let raw = r#"{
        "message_id": "m-1",
        "sender_id": "system_monitor_8",
        "sender_role": "system_monitor",
        "content": {"component": "ingest"}
    }"#;
    let result = Message::from_json(raw);
    assert!(matches!(result, Err(MalformedMessageError::MissingKey("message_type"))));
}

#[test]
fn test_unknown_values_are_malformed() {
    let raw = json!({
        "sender_id": "x_1",
        "sender_role": "data_collector",
        "message_type": "telepathy",
        "content": {}
    });
    assert!(matches!(
        Message::from_json(&raw.to_string()),
        Err(MalformedMessageError::UnknownMessageType(name)) if name == "telepathy"
    ));
    assert!(matches!(
        Message::from_json("not json"),
        Err(MalformedMessageError::Json(_))
    ));
}
