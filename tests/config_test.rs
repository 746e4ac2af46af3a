//! Configuration file loading and client construction from config.

use std::io::Write;

use huginn::{HuginnConfig, HuginnError, Secrets};
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn loads_every_section_from_file() {
    let file = write_file(
        r#"
        [server]
        base_url = "http://notes.local:41184"
        token = "abc"
        request_timeout_secs = 10

        [limits]
        max_concurrent_requests = 2
        max_requests_per_minute = 30

        [retry]
        max_retries = 5
        base_delay_ms = 250
        jitter = false

        [circuit]
        failure_threshold = 3
        reset_timeout_secs = 15

        [cache.resources]
        max_entries = 50
        max_bytes = 1048576

        [resolve]
        fan_out = 8
        resource_dir = "assets"
        "#,
    );

    let config = HuginnConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.server.base_url, "http://notes.local:41184");
    assert_eq!(config.server.token.as_deref(), Some("abc"));
    assert_eq!(config.server.request_timeout_secs, 10);
    assert_eq!(config.limits.max_concurrent_requests, 2);
    assert_eq!(config.limits.max_requests_per_minute, 30);
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.base_delay_ms, 250);
    assert!(!config.retry.jitter);
    assert_eq!(config.circuit.failure_threshold, 3);
    assert_eq!(config.circuit.reset_timeout_secs, 15);
    assert_eq!(config.cache.resources.max_entries, Some(50));
    assert_eq!(config.cache.resources.max_bytes, Some(1_048_576));
    assert_eq!(config.cache.resources.ttl_secs, None);
    assert_eq!(config.resolve.fan_out, 8);
    assert_eq!(config.resolve.resource_dir, "assets");
}

#[test]
fn malformed_file_names_the_path() {
    let file = write_file("[server\nbase_url = ");
    let err = HuginnConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, HuginnError::Configuration(_)));
    assert!(err.to_string().contains("Failed to parse config"));
}

#[test]
fn secrets_file_supplies_the_token() {
    let file = write_file("token = \"from-secrets\"\n");
    let secrets = Secrets::load_from_file(file.path()).unwrap();
    let config = HuginnConfig::default();
    assert_eq!(config.token(&secrets).as_deref(), Some("from-secrets"));
}

#[cfg(unix)]
#[test]
fn secrets_with_open_permissions_are_rejected() {
    use std::os::unix::fs::PermissionsExt;

    let file = write_file("token = \"x\"\n");
    std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();
    let err = Secrets::check_permissions(file.path()).unwrap_err();
    assert!(err.to_string().contains("insecure permissions 644"));

    std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).unwrap();
    assert!(Secrets::check_permissions(file.path()).is_ok());
}

#[tokio::test]
async fn builder_from_config_talks_to_the_configured_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .and(query_param("token", "cfg-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("JoplinClipperServer"))
        .expect(1)
        .mount(&server)
        .await;

    let config = HuginnConfig::from_toml(&format!(
        r#"
        [server]
        base_url = "{}"
        token = "cfg-token"
        "#,
        server.uri()
    ))
    .unwrap();

    let client = config.to_builder(&Secrets::default()).build().unwrap();
    assert!(client.test_connection().await);
}

#[test]
fn builder_from_config_rejects_bad_url() {
    let config = HuginnConfig::from_toml(
        r#"
        [server]
        base_url = "ftp://notes.local"
        token = "t"
        "#,
    )
    .unwrap();
    let err = config.to_builder(&Secrets::default()).build().unwrap_err();
    assert!(matches!(err, HuginnError::Configuration(_)));
}
