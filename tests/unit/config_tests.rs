//! Unit tests for loading diff parameters

use crate::common::TestFixture;
use rowdiff::config::{ModifiedOutputFormat, RetryPolicy};
use rowdiff::DiffSettings;
use serde_json::json;
use std::path::Path;

#[test]
fn test_load_from_file_with_defaults() {
    let fixture = TestFixture::new().unwrap();
    let path = fixture
        .create_config(&json!({
            "datasets": { "students": { "primaryKeyColumns": ["id"] } }
        }))
        .unwrap();

    let settings = DiffSettings::load(&path).unwrap();
    let students = &settings.datasets["students"];
    assert_eq!(students.primary_key_columns, vec!["id"]);
    assert_eq!(students.modified_output.output_format, ModifiedOutputFormat::NewRowAll);
    assert_eq!(students.modified_output.unmodified_value(), "DDNC");
    assert_eq!(settings.csv.delimiter, ',');
    assert_eq!(settings.csv.quote, '"');
    assert_eq!(settings.retry, RetryPolicy::default());
}

#[test]
fn test_partial_sections_fill_in_defaults() {
    let settings = DiffSettings::from_json(
        r#"{
            "datasets": { "d": { "primaryKeyColumns": ["k"] } },
            "csv": { "delimiter": "|" },
            "retry": { "timeoutSecs": 5 }
        }"#,
    )
    .unwrap();
    assert_eq!(settings.csv.delimiter, '|');
    assert_eq!(settings.csv.quote, '"');
    assert_eq!(settings.retry.timeout_secs, 5);
    assert_eq!(settings.retry.max_attempts, 3);
}

#[test]
fn test_missing_file_is_config_error() {
    let err = DiffSettings::load(Path::new("/nonexistent/params.json")).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn test_malformed_json_is_config_error() {
    let err = DiffSettings::from_json("{ datasets: ").unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("Invalid diff parameters"));
}

#[test]
fn test_run_level_validation() {
    let zero_attempts = r#"{
        "datasets": { "d": { "primaryKeyColumns": ["k"] } },
        "retry": { "maxAttempts": 0 }
    }"#;
    assert!(DiffSettings::from_json(zero_attempts).unwrap_err().is_config());

    let same_chars = r#"{
        "datasets": { "d": { "primaryKeyColumns": ["k"] } },
        "csv": { "delimiter": "'", "quote": "'" }
    }"#;
    assert!(DiffSettings::from_json(same_chars).is_err());
}

#[test]
fn test_bad_dataset_does_not_fail_loading() {
    let settings = DiffSettings::from_json(
        r#"{
            "datasets": {
                "good": { "primaryKeyColumns": ["id"] },
                "bad": { "primaryKeyColumns": [] }
            }
        }"#,
    )
    .unwrap();

    assert!(settings.datasets["good"].validate("good").is_ok());
    assert!(settings.datasets["bad"].validate("bad").unwrap_err().is_config());
}
