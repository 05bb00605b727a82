use dialer::config::{ConfigError, ConfigLoader};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

const CREDENTIALS: &str = "DIALER_TWILIO_ACCOUNT_SID=AC123\nDIALER_TWILIO_API_KEY=SK456\nDIALER_TWILIO_API_SECRET=secret\nDIALER_TWILIO_AUTH_TOKEN=token\n";

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    let keys: Vec<String> = env::vars()
        .map(|(key, _)| key)
        .filter(|key| key.starts_with("DIALER_"))
        .collect();
    unsafe {
        for key in keys {
            env::remove_var(key);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

fn loader(dir: &TempDir) -> ConfigLoader {
    ConfigLoader::with_base_dir(PathBuf::from(dir.path()))
}

#[test]
fn loads_defaults_when_only_credentials_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", CREDENTIALS);

    let cfg = loader(&temp_dir).load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:3000");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.twilio_api_base, "https://api.twilio.com");
    assert_eq!(cfg.server_url, "http://localhost:3000");
    assert_eq!(cfg.token_ttl_seconds, 3600);
    assert_eq!(cfg.context_ttl_seconds, 600);
    assert_eq!(cfg.relay_timeout_seconds, 5);
    assert_eq!(cfg.monitor.start_delay_ms, 2000);
    assert_eq!(cfg.monitor.search_delay_ms, 3000);
    assert_eq!(cfg.monitor.poll_interval_ms, 2000);
    assert_eq!(cfg.monitor.max_polls, 150);
    assert_eq!(cfg.monitor.max_age_seconds, 600);
    assert!(cfg.relay_webhook_url.is_none());
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn missing_credentials_are_fatal() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "DIALER_TWILIO_ACCOUNT_SID=AC123\nDIALER_TWILIO_API_KEY=SK456\n",
    );

    let err = loader(&temp_dir)
        .load()
        .expect_err("missing secret should fail");
    assert!(matches!(
        err,
        ConfigError::MissingCredential {
            key: "TWILIO_API_SECRET"
        }
    ));
    assert!(err.to_string().contains("DIALER_TWILIO_API_SECRET"));
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        &format!("{CREDENTIALS}DIALER_API_BIND_ADDR=127.0.0.1:3000\n"),
    );
    write_env_file(
        &temp_dir,
        ".env.test",
        "DIALER_API_BIND_ADDR=192.168.0.10:5000\nDIALER_RELAY_WEBHOOK_URL=https://hooks.example.com/webhook/calls\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "DIALER_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "DIALER_PROFILE=test\nDIALER_API_BIND_ADDR=127.0.0.1:4000\n",
    );

    let cfg = loader(&temp_dir)
        .load()
        .expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(
        cfg.relay_webhook_url.as_deref(),
        Some("https://hooks.example.com/webhook/calls")
    );
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        &format!("{CREDENTIALS}DIALER_API_BIND_ADDR=127.0.0.1:3000\nDIALER_MONITOR_MAX_POLLS=10\n"),
    );

    unsafe {
        env::set_var("DIALER_API_BIND_ADDR", "0.0.0.0:9090");
        env::set_var("DIALER_MONITOR_MAX_POLLS", "20");
    }

    let cfg = loader(&temp_dir)
        .load()
        .expect("config loads with env override");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:9090");
    assert_eq!(cfg.monitor.max_polls, 20);

    clear_env();
}

#[test]
fn port_overrides_bind_addr_port() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        &format!("{CREDENTIALS}DIALER_API_BIND_ADDR=127.0.0.1:3000\nDIALER_PORT=8081\n"),
    );

    let cfg = loader(&temp_dir).load().expect("config loads with port");
    assert_eq!(cfg.api_bind_addr, "127.0.0.1:8081");

    clear_env();
}

#[test]
fn server_url_trailing_slash_is_trimmed() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        &format!("{CREDENTIALS}DIALER_SERVER_URL=https://abc.ngrok.io/\n"),
    );

    let cfg = loader(&temp_dir).load().expect("config loads");
    assert_eq!(cfg.server_url, "https://abc.ngrok.io");

    clear_env();
}

#[test]
fn invalid_bind_addr_returns_error() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", CREDENTIALS);
    unsafe {
        env::set_var("DIALER_API_BIND_ADDR", "not-an-addr");
    }

    let err = loader(&temp_dir)
        .load()
        .expect_err("invalid bind addr should fail");
    assert!(format!("{}", err).contains("invalid api bind address"));

    clear_env();
}

#[test]
fn invalid_relay_url_returns_error() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        &format!("{CREDENTIALS}DIALER_RELAY_WEBHOOK_URL=hooks without scheme\n"),
    );

    let err = loader(&temp_dir)
        .load()
        .expect_err("invalid relay url should fail");
    assert!(matches!(
        err,
        ConfigError::InvalidUrl {
            key: "RELAY_WEBHOOK_URL",
            ..
        }
    ));

    clear_env();
}
