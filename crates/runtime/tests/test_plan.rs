use std::{fs::File, io::Write, path::Path, time::Duration};

use anyhow::{Context, Result};
use taskhub_config::AppConfig;
use taskhub_realtime::{Identity, Role, UserId, UserProfile};
use taskhub_runtime::{hub_settings, BackendServices, Storage};
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}", path.to_string_lossy())
}

fn build_config(database_url: String, max_connections: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.database.url = database_url;
    config.database.max_connections = max_connections;
    config.auth.jwt_secret = "runtime-test-secret".into();
    config
}

async fn initialise(config: &AppConfig) -> Result<BackendServices> {
    BackendServices::initialise(config, false)
        .await
        .context("failed to initialise backend services")
}

fn pool(services: &BackendServices) -> &sqlx::SqlitePool {
    services.storage.pool().expect("sqlite storage")
}

#[tokio::test(flavor = "multi_thread")]
async fn initialise_runs_migrations() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("runtime/init.db");
    let config = build_config(sqlite_url(&db_path), 4);

    let services = initialise(&config).await?;
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('users', 'messages') ORDER BY name",
    )
    .fetch_all(pool(&services))
    .await?;

    assert_eq!(vec!["messages".to_string(), "users".to_string()], tables);
    assert!(db_path.exists(), "sqlite file and its directory are created");
    Ok(())
}

async fn online_count(services: &BackendServices) -> Result<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_online = 1")
            .fetch_one(pool(services))
            .await?,
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn reset_presence_clears_online_flags_from_previous_run() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = build_config(sqlite_url(&temp_dir.path().join("presence.db")), 2);

    let first = initialise(&config).await?;
    first
        .storage
        .add_user(&UserProfile::new("u-1", "Ben", Role::User))
        .await?;
    sqlx::query("UPDATE users SET is_online = 1")
        .execute(pool(&first))
        .await?;
    drop(first);

    let second = initialise(&config).await?;
    assert_eq!(1, second.storage.reset_presence().await?);
    assert_eq!(0, online_count(&second).await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn second_process_leaves_live_presence_alone() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = build_config(sqlite_url(&temp_dir.path().join("live.db")), 2);

    let server = initialise(&config).await?;
    server
        .storage
        .add_user(&UserProfile::new("u-1", "Ben", Role::User))
        .await?;
    let token = server.jwt.issue(&Identity::new("u-1", Role::User))?;
    let _session = server
        .hub
        .connect(Some(token.as_str()))
        .await
        .map_err(|error| anyhow::anyhow!("connect failed: {error}"))?;
    assert_eq!(1, online_count(&server).await?);

    let cli = initialise(&config).await?;
    let users = cli.hub.users().list_users().await?;
    assert!(users.iter().any(|user| user.id == UserId::from("u-1") && user.is_online));
    assert_eq!(1, online_count(&server).await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn in_memory_reset_is_a_no_op() -> Result<()> {
    let config = build_config(String::new(), 1);
    let services = BackendServices::initialise(&config, true).await?;
    assert_eq!(0, services.storage.reset_presence().await?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn in_memory_mode_skips_the_database() -> Result<()> {
    let mut config = build_config("postgres://nowhere/ignored".into(), 1);
    config.realtime.session_buffer = 0;

    let services = BackendServices::initialise(&config, true).await?;
    assert!(matches!(services.storage, Storage::Memory(_)));
    assert_eq!(1, hub_settings(&config.realtime).session_buffer);

    services
        .storage
        .add_user(&UserProfile::new("admin-1", "Ada", Role::Admin))
        .await?;
    let users = services.hub.users().list_users().await?;
    assert_eq!(1, users.len());
    assert_eq!(UserId::from("admin-1"), users[0].id);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn issued_tokens_are_accepted_by_the_hub() -> Result<()> {
    let config = build_config(String::new(), 1);
    let services = BackendServices::initialise(&config, true).await?;

    let token = services
        .jwt
        .issue(&Identity::new("user-1", Role::User))?;
    let credential = format!("Bearer {token}");
    let identity = services.hub.authenticate(Some(credential.as_str()))?;
    assert_eq!(UserId::from("user-1"), identity.user_id);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn background_tasks_start_and_stop() -> Result<()> {
    let config = build_config(String::new(), 1);
    let services = BackendServices::initialise(&config, true).await?;
    let state = services.gateway_state(&config.realtime);

    let tasks = services.spawn_background(&state);
    sleep(Duration::from_millis(20)).await;
    tasks.shutdown();
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn non_sqlite_urls_fail_without_touching_the_filesystem() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let target_dir = temp_dir.path().join("should_not_exist");
    let malformed_url = format!("postgres://{}/ignored.db", target_dir.to_string_lossy());
    let config = build_config(malformed_url, 1);

    let error = match initialise(&config).await {
        Ok(_) => panic!("expected sqlite connection to fail for non-sqlite URL"),
        Err(error) => error,
    };
    let message = format!("{error:#}");
    assert!(!target_dir.exists());
    assert!(
        message.contains("failed to connect to database") || message.contains("invalid sqlite url"),
        "unexpected error: {message}"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_database_files_are_reported() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("corrupt.db");
    let mut file = File::create(&db_path)?;
    file.write_all(&[0xAB; 4096])?;
    drop(file);

    let config = build_config(sqlite_url(&db_path), 1);
    let error = match initialise(&config).await {
        Ok(_) => panic!("expected initialisation to fail on a corrupt database"),
        Err(error) => error,
    };
    assert!(
        format!("{error:#}").contains("failed to initialise database"),
        "unexpected error: {error:#}"
    );
    Ok(())
}

#[test]
fn telemetry_init_tracing_sets_global_subscriber() {
    taskhub_runtime::telemetry::init_tracing().expect("first initialisation should succeed");

    let second = taskhub_runtime::telemetry::init_tracing();
    assert!(
        second.is_err(),
        "initialising telemetry twice should fail with global subscriber already set"
    );
}

#[tokio::test(flavor = "multi_thread")]
#[cfg_attr(not(unix), ignore = "requires Unix signal handling")]
async fn shutdown_signal_completes_on_ctrl_c_notification() -> Result<()> {
    let shutdown_task = tokio::spawn(async { taskhub_runtime::shutdown_signal().await });

    sleep(Duration::from_millis(50)).await;
    #[cfg(unix)]
    unsafe {
        libc::raise(libc::SIGINT);
    }

    timeout(Duration::from_secs(2), shutdown_task).await??;
    Ok(())
}
