use script_lifecycle::Error;
use script_lifecycle::config::{Config, DEFAULT_PROCESSED_ATTRIBUTE};

const VARS: [&str; 6] = [
    "LIFECYCLE_DEBUG",
    "LIFECYCLE_STAGING_HOSTS",
    "LIFECYCLE_PROCESSED_ATTR",
    "LIFECYCLE_SKIP_ATTR",
    "LIFECYCLE_ACTION_TIMEOUT_MS",
    "LOG_LEVEL",
];

fn clear_env() {
    for var in VARS {
        unsafe {
            std::env::remove_var(var);
        }
    }
}

// Environment is process-global, so every env scenario lives in one test.
#[test]
fn config_from_env() {
    clear_env();
    let config = Config::from_env().unwrap();
    assert_eq!(config, Config::default());

    unsafe {
        std::env::set_var("LIFECYCLE_DEBUG", "true");
        std::env::set_var("LIFECYCLE_STAGING_HOSTS", "staging.example.com, preview.dev");
        std::env::set_var("LIFECYCLE_ACTION_TIMEOUT_MS", "1500");
        std::env::set_var("LOG_LEVEL", "debug");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.debug, Some(true));
    assert_eq!(config.staging_hosts, vec!["staging.example.com", "preview.dev"]);
    assert_eq!(
        config.action_timeout(),
        Some(std::time::Duration::from_millis(1500))
    );
    assert_eq!(config.log_level, "debug");

    unsafe {
        std::env::set_var("LIFECYCLE_DEBUG", "sometimes");
    }
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::remove_var("LIFECYCLE_DEBUG");
        std::env::set_var("LIFECYCLE_ACTION_TIMEOUT_MS", "soon");
    }
    assert!(Config::from_env().is_err());

    unsafe {
        std::env::remove_var("LIFECYCLE_ACTION_TIMEOUT_MS");
        std::env::set_var("LIFECYCLE_PROCESSED_ATTR", "data-x");
        std::env::set_var("LIFECYCLE_SKIP_ATTR", "data-x");
    }
    assert!(Config::from_env().is_err(), "markers must differ");

    // No .env in the test working directory; the environment still applies.
    clear_env();
    unsafe {
        std::env::set_var("LIFECYCLE_DEBUG", "false");
    }
    let config = Config::from_dotenv().unwrap();
    assert_eq!(config.debug, Some(false));

    clear_env();
}

#[test]
fn config_from_toml() {
    let config = Config::from_toml_str(
        r#"
        [lifecycle]
        debug = false
        staging_hosts = ["webflow.io", "netlify.app"]
        skip_attribute = "data-run-once"
        action_timeout_ms = 250
        "#,
    )
    .unwrap();

    assert_eq!(config.debug, Some(false));
    assert!(config.is_staging_host("shop.netlify.app"));
    assert!(!config.diagnostics_enabled_for("shop.netlify.app"));
    assert_eq!(config.skip_attribute, "data-run-once");
    assert_eq!(config.processed_attribute, DEFAULT_PROCESSED_ATTRIBUTE);
    assert_eq!(config.action_timeout_ms, Some(250));
}

#[test]
fn config_from_empty_toml_is_default() {
    assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
}

#[test]
fn config_from_bad_toml_fails() {
    assert!(Config::from_toml_str("[lifecycle]\ndebug = \"loud\"").is_err());
    assert!(Config::from_toml_str("[lifecycle]\nprocessed_attribute = \"\"").is_err());
}

#[test]
fn config_load_reports_missing_file() {
    let path = std::env::temp_dir().join("script-lifecycle-missing.toml");
    let _ = std::fs::remove_file(&path);
    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, Error::Io(_)), "got {err:?}");
}

#[test]
fn config_load_reads_toml_file() {
    let path = std::env::temp_dir().join(format!("script-lifecycle-{}.toml", std::process::id()));
    std::fs::write(&path, "[lifecycle]\ndebug = true\n").unwrap();
    let config = Config::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(config.debug, Some(true));
}
