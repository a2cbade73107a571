mod common;

use std::time::Duration;

use common::FakeController;
use hotspot_portal::profile_sync;
use hotspot_portal::routeros::{ConnectParams, Controller};
use sqlx::PgPool;
use tokio::net::TcpListener;

// key: profile-sync-tests -> idempotent directory reconciliation

async fn seed_plan(pool: &PgPool, price: i32, duration: &str, profile: &str, rate_limit: Option<&str>) {
    sqlx::query(
        "INSERT INTO plans (name, price, duration, profile, rate_limit) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(format!("{duration} @ {price}"))
    .bind(price)
    .bind(duration)
    .bind(profile)
    .bind(rate_limit)
    .execute(pool)
    .await
    .unwrap();
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn sync_creates_each_missing_profile_once(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    seed_plan(&pool, 100, "1 day", "daily-1d", Some("5M/5M")).await;
    seed_plan(&pool, 20, "30 minutes", "", None).await;

    let fake = FakeController::start().await;
    let controller = Controller::new(fake.params());

    profile_sync::process_tick(&pool, &controller).await.unwrap();
    profile_sync::process_tick(&pool, &controller).await.unwrap();

    let commands = fake.command_log().await;
    let adds = commands
        .iter()
        .filter(|c| *c == "/ip/hotspot/user/profile/add")
        .count();
    assert_eq!(adds, 1, "an existing profile must not be re-created");

    let state = fake.state.lock().await;
    assert_eq!(state.profiles.len(), 1);
    let profile = &state.profiles[0];
    assert_eq!(profile.get("name").map(String::as_str), Some("daily-1d"));
    assert_eq!(profile.get("rate-limit").map(String::as_str), Some("5M/5M"));
    assert_eq!(
        profile.get("session-timeout").map(String::as_str),
        Some("1d")
    );
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn unreachable_controller_aborts_the_tick(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    seed_plan(&pool, 100, "1 day", "daily-1d", None).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let controller = Controller::new(ConnectParams {
        host: "127.0.0.1".to_string(),
        port,
        username: "admin".to_string(),
        password: String::new(),
        use_tls: false,
        tls_insecure: false,
        timeout: Duration::from_secs(1),
    });

    let result = profile_sync::process_tick(&pool, &controller).await;
    assert!(result.is_err(), "connect failure must abort the whole tick");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn retired_plans_are_not_synced(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    seed_plan(&pool, 100, "1 day", "daily-1d", None).await;
    sqlx::query("UPDATE plans SET active = FALSE")
        .execute(&pool)
        .await
        .unwrap();

    let fake = FakeController::start().await;
    let controller = Controller::new(fake.params());
    profile_sync::process_tick(&pool, &controller).await.unwrap();

    assert!(fake.state.lock().await.profiles.is_empty());
}
