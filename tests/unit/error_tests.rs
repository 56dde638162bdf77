//! Unit tests for `AppError` display format and conversions.

use regcheck::AppError;

#[test]
fn display_prefixes_identify_the_layer() {
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
    assert_eq!(AppError::Db("locked".into()).to_string(), "db: locked");
    assert_eq!(AppError::Io("disk full".into()).to_string(), "io: disk full");
    assert_eq!(AppError::Input("bad csv".into()).to_string(), "input: bad csv");
    assert_eq!(
        AppError::Transport("no client".into()).to_string(),
        "transport: no client"
    );
    assert_eq!(
        AppError::Session("none ready".into()).to_string(),
        "session: none ready"
    );
}

#[test]
fn toml_errors_become_config_errors() {
    let err: AppError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn json_errors_become_io_errors() {
    let err: AppError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
    assert!(err.to_string().starts_with("io: json"));
}
