use serial_test::serial;

use super::*;

const LEGACY_VARS: [&str; 4] = [
    "COMICS_DB_PATH",
    "COMICS_REDIS_URL",
    "COMICS_CACHE_TTL_SECONDS",
    "COMICS_IMAGE_ROOT",
];

/// Run `f` with exactly the given legacy variables set.
fn with_legacy_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
    // SAFETY: every test touching the process environment is #[serial].
    unsafe {
        for name in LEGACY_VARS {
            std::env::remove_var(name);
        }
        for (name, value) in vars {
            std::env::set_var(name, value);
        }
    }
    let result = f();
    unsafe {
        for name in LEGACY_VARS {
            std::env::remove_var(name);
        }
    }
    result
}

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.database.url, DEFAULT_DATABASE_URL);
    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.backend, CacheBackend::Redis);
    assert_eq!(settings.cache.redis_url, "redis://localhost:6379/0");
    assert_eq!(settings.cache.ttl_seconds, 60);
    assert_eq!(settings.cache.safe_methods, vec!["GET".to_string()]);
    assert_eq!(settings.cache.retry, RetryPolicy::default());
    assert_eq!(settings.images.root, PathBuf::from(DEFAULT_IMAGE_ROOT));
    assert_eq!(settings.jobs.queue_capacity.get(), DEFAULT_JOB_QUEUE_CAPACITY);
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.cache.backend = Some(CacheBackend::Redis);

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        cache_backend: Some(CacheBackend::Memory),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.backend, CacheBackend::Memory);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn ttl_is_at_least_one_second() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(0);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.ttl_seconds, 1);
}

#[test]
fn non_sqlite_database_urls_are_rejected() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("postgres://example".to_string());
    let err = Settings::from_raw(raw).expect_err("invalid url");
    assert!(matches!(err, LoadError::Invalid { key: "database.url", .. }));
}

#[test]
fn inverted_backoff_bounds_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.retry = Some(RetryPolicy {
        retries: 1,
        base_backoff_ms: 500,
        max_backoff_ms: 100,
    });
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn zero_job_concurrency_is_rejected() {
    let mut raw = RawSettings::default();
    raw.jobs.max_concurrency = Some(0);
    let err = Settings::from_raw(raw).expect_err("invalid");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "jobs.max_concurrency",
            ..
        }
    ));
}

#[test]
#[serial]
fn default_to_serve_command() {
    let args = with_legacy_env(&[], || CliArgs::parse_from(["longbox"]));
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
#[serial]
fn parse_serve_overrides() {
    let args = with_legacy_env(&[], || {
        CliArgs::parse_from([
            "longbox",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--cache-enabled=false",
            "--cache-backend",
            "memory",
        ])
    });

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.cache_enabled, Some(false));
            assert_eq!(serve.overrides.cache_backend, Some(CacheBackend::Memory));
        }
        Command::Migrate => panic!("wrong command parsed"),
    }
}

#[test]
#[serial]
fn parse_migrate_with_global_database_path() {
    let args = with_legacy_env(&[], || {
        CliArgs::parse_from(["longbox", "migrate", "--db-path", "/tmp/comics.db"])
    });
    assert!(matches!(args.command, Some(Command::Migrate)));

    let mut raw = RawSettings::default();
    raw.apply_deployment_overrides(&args.deployment);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.database.url, "sqlite:///tmp/comics.db");
}

#[test]
#[serial]
fn legacy_environment_variables_apply() {
    let args = with_legacy_env(
        &[
            ("COMICS_REDIS_URL", "redis://cache:6379/2"),
            ("COMICS_CACHE_TTL_SECONDS", "120"),
            ("COMICS_IMAGE_ROOT", "/srv/images"),
        ],
        || CliArgs::parse_from(["longbox"]),
    );

    let mut raw = RawSettings::default();
    raw.apply_deployment_overrides(&args.deployment);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.redis_url, "redis://cache:6379/2");
    assert_eq!(settings.cache.ttl_seconds, 120);
    assert_eq!(settings.images.root, PathBuf::from("/srv/images"));
}

#[test]
#[serial]
fn unparsable_ttl_falls_back_to_default() {
    for (raw_ttl, expected) in [("soon", 60), ("-5", 1), ("0", 1)] {
        let args = with_legacy_env(&[("COMICS_CACHE_TTL_SECONDS", raw_ttl)], || {
            CliArgs::parse_from(["longbox"])
        });
        let mut raw = RawSettings::default();
        raw.apply_deployment_overrides(&args.deployment);
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.cache.ttl_seconds, expected, "ttl `{raw_ttl}`");
    }
}
