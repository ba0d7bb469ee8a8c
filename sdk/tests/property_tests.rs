use proptest::prelude::*;
use sdk::errors::{EngineError, EngineErrorExt};
use sdk::types::{JobState, ToolInput};

proptest! {
    #[test]
    fn test_error_user_hint_never_echoes_detail(detail in "[a-z0-9_/]{8,40}") {
        let errs = vec![
            EngineError::Config(detail.clone()),
            EngineError::Provider(detail.clone()),
            EngineError::JobNotFound(detail.clone()),
            EngineError::JobInvalidState {
                job_id: detail.clone(),
                status: "running".to_string(),
            },
            EngineError::FileNotFound(detail.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            // Hints are static text; the raw detail stays in Display only.
            prop_assert!(!hint.contains(&detail));
        }
    }
}

proptest! {
    #[test]
    fn test_unknown_job_status_rejected(status in "[a-z]{1,12}") {
        let known = ["pending", "queued", "running", "completed", "failed", "cancelled"];
        let parsed = status.parse::<JobState>();
        prop_assert_eq!(parsed.is_ok(), known.contains(&status.as_str()));
    }
}

proptest! {
    #[test]
    fn test_tool_input_keeps_every_string_param(
        entries in proptest::collection::hash_map("[a-z_]{1,10}", "\\PC{0,20}", 0..8)
    ) {
        let object: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        let input = ToolInput::from_value("tool", &serde_json::Value::Object(object)).unwrap();

        for (key, value) in &entries {
            prop_assert_eq!(&input.param_str(key).unwrap(), value);
        }
    }
}
