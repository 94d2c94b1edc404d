use std::io::Write;

use voice_relay::upstream::Modality;
use voice_relay::Config;

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent");
    let cfg = Config::load_with_env(path.to_str().unwrap(), "VOICE_RELAY_TEST_ABSENT").unwrap();

    assert_eq!(cfg.service.http.port, 3005);
    assert_eq!(cfg.upstream.modalities, vec![Modality::Text]);
    assert_eq!(cfg.relay.transcription_prompt, "paraphrase-gpt-realtime");
}

#[test]
fn test_toml_file_overrides_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[service.http]
port = 9100

[upstream]
model = "gpt-4o-mini-realtime-preview"

[relay]
flush_timeout_ms = 1500
"#
    )
    .unwrap();

    let cfg = Config::load_with_env(file.path().to_str().unwrap(), "VOICE_RELAY_TEST_FILE").unwrap();
    assert_eq!(cfg.service.http.port, 9100);
    assert_eq!(cfg.service.http.bind, "0.0.0.0");
    assert_eq!(cfg.upstream.model, "gpt-4o-mini-realtime-preview");
    assert_eq!(cfg.relay.flush_timeout_ms, 1500);
    assert_eq!(cfg.relay.response_timeout_ms, 60_000);
}

#[test]
fn test_environment_overrides_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[upstream]\nmodel = \"from-file\"").unwrap();

    std::env::set_var("VOICE_RELAY_TEST_ENV__UPSTREAM__MODEL", "from-env");
    let cfg = Config::load_with_env(file.path().to_str().unwrap(), "VOICE_RELAY_TEST_ENV").unwrap();
    std::env::remove_var("VOICE_RELAY_TEST_ENV__UPSTREAM__MODEL");

    assert_eq!(cfg.upstream.model, "from-env");
}

#[test]
fn test_invalid_file_value_fails_validation() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[relay]\nsource_sample_rate = 44100").unwrap();

    assert!(Config::load_with_env(file.path().to_str().unwrap(), "VOICE_RELAY_TEST_BAD").is_err());
}
