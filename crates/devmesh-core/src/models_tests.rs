use super::*;

#[test]
fn level_round_trips_through_storage_form() {
    for level in [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
        LogLevel::Fatal,
    ] {
        assert_eq!(LogLevel::parse(level.as_str()), Some(level));
    }
}

#[test]
fn level_rejects_unknown_strings() {
    assert_eq!(LogLevel::parse("TRACE"), None);
    assert_eq!(LogLevel::parse("info"), None);
    assert_eq!(LogLevel::parse(""), None);
}

#[test]
fn level_serde_uses_uppercase_wire_form() {
    let json = serde_json::to_string(&LogLevel::Critical).unwrap();
    assert_eq!(json, "\"CRITICAL\"");

    let level: LogLevel = serde_json::from_str("\"WARN\"").unwrap();
    assert_eq!(level, LogLevel::Warn);

    assert!(serde_json::from_str::<LogLevel>("\"NOTICE\"").is_err());
}

#[test]
fn new_log_event_optional_fields_default() {
    let json = r#"{
        "timestamp": "2026-02-01T00:00:00.000001Z",
        "source": "journald",
        "service": "sshd.service",
        "host": "node-1",
        "level": "INFO",
        "message": "hello"
    }"#;
    let event: NewLogEvent = serde_json::from_str(json).unwrap();
    assert_eq!(event.service, "sshd.service");
    assert!(event.trace_id.is_none());
    assert!(event.meta.is_none());
    assert_eq!(event.timestamp.timestamp_subsec_micros(), 1);
}

#[test]
fn ingest_report_omits_empty_errors() {
    let report = IngestReport {
        accepted: 3,
        duplicates: 1,
        ..Default::default()
    };
    let json = serde_json::to_string(&report).unwrap();
    assert!(!json.contains("errors"));
}
