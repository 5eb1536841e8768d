pub mod blacklist;
pub mod endpoint;
pub mod provider;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json;

    #[test]
    fn endpoint_record_uses_camel_case_and_nulls() {
        let record = endpoint::EndpointRecord::untested("https://api.anthropic.com");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"url":"https://api.anthropic.com","lastTestTime":null,"lastTestSpeed":null}"#
        );
    }

    #[test]
    fn endpoint_registry_file_parses() {
        let json = r#"[
            {"url": "https://a", "lastTestTime": 1706800000, "lastTestSpeed": 120},
            {"url": "https://b", "lastTestTime": 1706800000, "lastTestSpeed": null}
        ]"#;
        let records: Vec<endpoint::EndpointRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].last_test_speed, Some(120));
        assert_eq!(records[1].last_test_time, Some(1706800000));
        assert_eq!(records[1].last_test_speed, None);
    }

    #[test]
    fn endpoint_latency_omits_absent_status_and_error() {
        let ok = endpoint::EndpointLatency::success("https://a", 42, 404);
        let json = serde_json::to_string(&ok).unwrap();
        assert!(json.contains("\"status\":404"));
        assert!(!json.contains("error"));

        let failed = endpoint::EndpointLatency::failure("https://b", "timeout");
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"latency\":null"));
        assert!(!json.contains("status"));
    }

    #[test]
    fn provider_envelope_accepts_both_spellings() {
        let json = r#"{"providers": [
            {"name": "one", "apiUrl": "https://one", "enabled": true, "apiKey": "sk-x"},
            {"name": "two", "apiURL": "https://two", "enabled": false},
            {"name": "three"}
        ]}"#;
        let envelope: provider::ProviderEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.providers[0].api_url, "https://one");
        assert_eq!(envelope.providers[1].api_url, "https://two");
        assert!(!envelope.providers[2].enabled);
        assert!(envelope.providers[2].api_url.is_empty());
    }

    #[test]
    fn gemini_entries_parse() {
        let json = r#"[{"baseURL": "https://g", "enabled": true, "model": "x"}]"#;
        let entries: Vec<provider::GeminiProviderEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].base_url, "https://g");
        assert!(entries[0].enabled);
    }

    #[test]
    fn blacklist_status_projection() {
        let record = blacklist::ProviderFailureRecord {
            platform: "claude".into(),
            provider_name: "relay-a".into(),
            failure_count: 3,
            last_failure_at: Some(1_000),
            blacklisted_at: Some(1_000),
            blacklisted_until: Some(2_800),
            auto_recovered: false,
        };
        let active = blacklist::BlacklistStatus::from_record(record.clone(), 1_800);
        assert!(active.is_blacklisted);
        assert_eq!(active.remaining_seconds, 1_000);

        let expired = blacklist::BlacklistStatus::from_record(record, 2_800);
        assert!(!expired.is_blacklisted);
        assert_eq!(expired.remaining_seconds, 0);
        assert_eq!(expired.blacklisted_until, Some(2_800));
    }

    #[test]
    fn failure_outcome_is_tagged() {
        let outcome = blacklist::FailureOutcome::Debounced { until: 5 };
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(json, r#"{"kind":"debounced","until":5}"#);
    }
}
