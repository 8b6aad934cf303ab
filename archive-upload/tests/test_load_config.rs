use archive_upload::load_config::{load_config, load_credentials, CONCURRENCY_ENV};
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::NamedTempFile;

const FULL_CONFIG: &str = r#"
archive_dir: /var/backups/archive
folder_prefix: backup
dav_url: https://dav.example.com/dav
api_url: https://api.example.com/2.0
token_url: https://api.example.com/oauth2/token
credentials: /etc/archive-upload/credentials.json
concurrency: 6
recipients: [ops@example.com, audit@example.com]
database:
  host: db.internal
  user: backup
  name: backup
"#;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

#[test]
#[serial]
fn full_config_loads_with_database_defaults() {
    env::remove_var(CONCURRENCY_ENV);
    let file = config_file(FULL_CONFIG);

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(config.session.archive_dir, PathBuf::from("/var/backups/archive"));
    assert_eq!(config.session.folder_prefix, "backup");
    assert_eq!(config.session.concurrency, 6);
    assert_eq!(config.session.recipients.len(), 2);
    assert_eq!(config.dav_url, "https://dav.example.com/dav");
    assert_eq!(
        config.credentials,
        PathBuf::from("/etc/archive-upload/credentials.json")
    );
    assert_eq!(config.database.port, 5432);
    assert_eq!(config.database.token_key, "share-api");
}

#[test]
#[serial]
fn concurrency_defaults_to_eight() {
    env::remove_var(CONCURRENCY_ENV);
    let yaml = FULL_CONFIG.replace("concurrency: 6\n", "");
    let file = config_file(&yaml);

    let config = load_config(file.path()).expect("Config should load");
    assert_eq!(config.session.concurrency, 8);
}

#[test]
#[serial]
fn environment_overrides_concurrency() {
    env::set_var(CONCURRENCY_ENV, "3");
    let file = config_file(FULL_CONFIG);

    let result = load_config(file.path());
    env::remove_var(CONCURRENCY_ENV);

    assert_eq!(result.expect("Config should load").session.concurrency, 3);
}

#[test]
#[serial]
fn invalid_concurrency_is_rejected() {
    env::set_var(CONCURRENCY_ENV, "many");
    let file = config_file(FULL_CONFIG);
    let result = load_config(file.path());
    env::remove_var(CONCURRENCY_ENV);
    assert!(result.is_err());

    let zero = config_file(&FULL_CONFIG.replace("concurrency: 6", "concurrency: 0"));
    let err = load_config(zero.path()).unwrap_err();
    assert!(err.to_string().contains("at least 1"), "got: {err}");
}

#[test]
#[serial]
fn missing_required_field_fails_to_parse() {
    env::remove_var(CONCURRENCY_ENV);
    let file = config_file(&FULL_CONFIG.replace("dav_url: https://dav.example.com/dav\n", ""));
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("parse"), "got: {err}");
}

#[test]
#[serial]
fn http_timeouts_default_to_ten_and_sixty_seconds() {
    env::remove_var(CONCURRENCY_ENV);
    let file = config_file(FULL_CONFIG);

    let timeouts = load_config(file.path()).expect("Config should load").http.timeouts();
    assert_eq!(timeouts.connect, Duration::from_secs(10));
    assert_eq!(timeouts.read, Duration::from_secs(60));
}

#[test]
#[serial]
fn http_timeouts_can_be_set_in_yaml() {
    env::remove_var(CONCURRENCY_ENV);
    let yaml = format!("{FULL_CONFIG}http:\n  connect_timeout_secs: 3\n  read_timeout_secs: 120\n");
    let file = config_file(&yaml);

    let timeouts = load_config(file.path()).expect("Config should load").http.timeouts();
    assert_eq!(timeouts.connect, Duration::from_secs(3));
    assert_eq!(timeouts.read, Duration::from_secs(120));
}

#[test]
#[serial]
fn zero_http_timeout_is_rejected() {
    env::remove_var(CONCURRENCY_ENV);
    let yaml = format!("{FULL_CONFIG}http:\n  read_timeout_secs: 0\n");
    let file = config_file(&yaml);

    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("timeouts"), "got: {err}");
}

#[test]
fn missing_config_file_names_the_path() {
    let err = load_config("/nonexistent/archive-upload.yaml").unwrap_err();
    assert!(err.to_string().contains("archive-upload.yaml"), "got: {err}");
}

#[test]
fn credentials_load_and_debug_output_hides_secrets() {
    let file = config_file(
        r#"{
            "dav_user": "uploader",
            "dav_password": "dav-secret",
            "client_id": "cid",
            "client_secret": "api-secret",
            "db_password": "db-secret"
        }"#,
    );

    let credentials = load_credentials(file.path()).expect("credentials should load");
    assert_eq!(credentials.dav_user, "uploader");
    assert_eq!(credentials.db_password, "db-secret");

    let shown = format!("{credentials:?}");
    assert!(shown.contains("uploader"));
    assert!(!shown.contains("dav-secret"));
    assert!(!shown.contains("api-secret"));
    assert!(!shown.contains("db-secret"));
}

#[test]
fn incomplete_credentials_are_rejected() {
    let file = config_file(r#"{ "dav_user": "uploader" }"#);
    assert!(load_credentials(file.path()).is_err());
}
