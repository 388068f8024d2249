use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate, Utc};
use tokio::net::TcpListener;
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage, SimpleQueryRow};

use staybook::engine::{DEMO_PASSWORD, Engine, now_ms};
use staybook::wire;

const PASSWORD: &str = "staybook-test";

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<Engine>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let engine = Arc::new(Engine::new(Duration::from_secs(3600)));

    let engine2 = engine.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = engine2.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine, PASSWORD.to_string(), None).await;
            });
        }
    });

    (addr, engine)
}

async fn try_connect(addr: SocketAddr, password: &str) -> Result<Client, tokio_postgres::Error> {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("staybook")
        .user("staybook")
        .password(password);

    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });
    Ok(client)
}

async fn connect(addr: SocketAddr) -> Client {
    try_connect(addr, PASSWORD).await.unwrap()
}

async fn rows(client: &Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect()
}

async fn sqlstate(client: &Client, sql: &str) -> String {
    let err = client.simple_query(sql).await.err().unwrap();
    err.as_db_error()
        .map(|e| e.code().code().to_string())
        .unwrap_or_default()
}

fn day(offset: u64) -> NaiveDate {
    Utc::now().date_naive() + Days::new(offset)
}

async fn register(client: &Client, email: &str) {
    client
        .batch_execute(&format!(
            "INSERT INTO users (name, tel_number, email, password) VALUES ('Guest', '02-000-0000', '{email}', 'secret-pw')"
        ))
        .await
        .unwrap();
}

/// Log in as a freshly created admin and add one hotel. Returns its id.
async fn admin_with_hotel(addr: SocketAddr, engine: &Engine) -> (Client, String) {
    engine
        .create_admin("Admin", "admin@example.com", "admin-pw")
        .unwrap();
    let admin = connect(addr).await;
    rows(
        &admin,
        "SELECT * FROM login WHERE email = 'admin@example.com' AND password = 'admin-pw'",
    )
    .await;
    let hotel = rows(
        &admin,
        "INSERT INTO hotels (name, building_number, street, district, province, postal_code, tel) \
         VALUES ('Grand Hyatt Bangkok', '123', 'Main Street', 'Downtown', 'Bangkok', '10330', '02-123-4567') RETURNING *",
    )
    .await;
    let id = hotel[0].get("id").unwrap().to_string();
    (admin, id)
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn wrong_server_password_rejected() {
    let (addr, _engine) = start_test_server().await;
    assert!(try_connect(addr, "wrong").await.is_err());
}

#[tokio::test]
async fn register_login_and_me() {
    let (addr, _engine) = start_test_server().await;

    let client = connect(addr).await;
    register(&client, "guest@example.com").await;
    let me = rows(&client, "SELECT * FROM me").await;
    assert_eq!(me.len(), 1);
    assert_eq!(me[0].get("email"), Some("guest@example.com"));
    assert_eq!(me[0].get("role"), Some("user"));

    // A second connection starts anonymous.
    let other = connect(addr).await;
    assert_eq!(sqlstate(&other, "SELECT * FROM me").await, "28000");

    assert_eq!(
        sqlstate(
            &other,
            "SELECT * FROM login WHERE email = 'guest@example.com' AND password = 'nope'"
        )
        .await,
        "28000"
    );
    let login = rows(
        &other,
        "SELECT * FROM login WHERE email = 'guest@example.com' AND password = 'secret-pw'",
    )
    .await;
    assert_eq!(login[0].get("token").map(str::len), Some(40));
    assert_eq!(rows(&other, "SELECT * FROM me").await.len(), 1);
}

#[tokio::test]
async fn duplicate_email_is_unique_violation() {
    let (addr, _engine) = start_test_server().await;
    let client = connect(addr).await;
    register(&client, "dup@example.com").await;
    assert_eq!(
        sqlstate(
            &client,
            "INSERT INTO users (name, email, password) VALUES ('Again', 'dup@example.com', 'secret-pw')"
        )
        .await,
        "23505"
    );
}

#[tokio::test]
async fn token_binds_across_connections() {
    let (addr, _engine) = start_test_server().await;

    let first = connect(addr).await;
    register(&first, "guest@example.com").await;
    let token = rows(
        &first,
        "SELECT * FROM login WHERE email = 'guest@example.com' AND password = 'secret-pw'",
    )
    .await[0]
        .get("token")
        .unwrap()
        .to_string();

    let second = connect(addr).await;
    assert_eq!(sqlstate(&second, "SET token = 'not-a-token'").await, "28000");
    second
        .batch_execute(&format!("SET token = '{token}'"))
        .await
        .unwrap();
    assert_eq!(rows(&second, "SELECT * FROM me").await.len(), 1);

    // Logging out ends the session everywhere it is bound.
    second.batch_execute("DELETE FROM sessions").await.unwrap();
    assert_eq!(sqlstate(&second, "SELECT * FROM me").await, "28000");
    assert_eq!(sqlstate(&first, "SELECT * FROM me").await, "28000");
}

#[tokio::test]
async fn book_list_reschedule_cancel() {
    let (addr, engine) = start_test_server().await;
    let (_admin, hotel_id) = admin_with_hotel(addr, &engine).await;

    let guest = connect(addr).await;
    register(&guest, "guest@example.com").await;

    let hotels = rows(&guest, "SELECT * FROM hotels WHERE search = 'bangkok'").await;
    assert_eq!(hotels.len(), 1);
    assert!(hotels[0].get("address").unwrap().contains("\"province\":\"Bangkok\""));

    let checkout = rows(
        &guest,
        &format!("SELECT * FROM checkout_dates WHERE start_date = '{}'", day(1)),
    )
    .await;
    let dates: Vec<_> = checkout.iter().filter_map(|r| r.get("end_date")).collect();
    assert_eq!(
        dates,
        vec![day(2).to_string(), day(3).to_string(), day(4).to_string()]
    );

    let booked = rows(
        &guest,
        &format!(
            "INSERT INTO bookings (hotel_id, start_date, end_date) VALUES ('{hotel_id}', '{}', '{}') RETURNING *",
            day(1),
            day(3)
        ),
    )
    .await;
    assert_eq!(booked.len(), 1);
    assert_eq!(booked[0].get("status"), Some("upcoming"));
    assert_eq!(booked[0].get("nights"), Some("2"));
    assert_eq!(booked[0].get("hotel_name"), Some("Grand Hyatt Bangkok"));
    assert_eq!(booked[0].get("can_modify"), Some("t"));
    let booking_id = booked[0].get("id").unwrap().to_string();

    let listed = rows(&guest, "SELECT * FROM bookings WHERE status = 'upcoming'").await;
    assert_eq!(listed.len(), 1);
    assert!(rows(&guest, "SELECT * FROM bookings WHERE status = 'past'").await.is_empty());

    guest
        .batch_execute(&format!(
            "UPDATE bookings SET end_date = '{}' WHERE id = '{booking_id}'",
            day(4)
        ))
        .await
        .unwrap();
    let updated = rows(&guest, &format!("SELECT * FROM bookings WHERE id = '{booking_id}'")).await;
    assert_eq!(updated[0].get("nights"), Some("3"));

    guest
        .batch_execute(&format!("DELETE FROM bookings WHERE id = '{booking_id}'"))
        .await
        .unwrap();
    assert!(rows(&guest, "SELECT * FROM bookings").await.is_empty());
    assert_eq!(engine.booking_count(), 0);
}

#[tokio::test]
async fn date_rules_enforced() {
    let (addr, engine) = start_test_server().await;
    let (_admin, hotel_id) = admin_with_hotel(addr, &engine).await;
    let guest = connect(addr).await;
    register(&guest, "guest@example.com").await;

    let yesterday = Utc::now().date_naive() - Days::new(1);
    let in_past = format!(
        "INSERT INTO bookings VALUES ('{hotel_id}', '{yesterday}', '{}')",
        day(1)
    );
    assert_eq!(sqlstate(&guest, &in_past).await, "22023");

    let too_long = format!(
        "INSERT INTO bookings VALUES ('{hotel_id}', '{}', '{}')",
        day(1),
        day(5)
    );
    assert_eq!(sqlstate(&guest, &too_long).await, "22023");

    assert_eq!(sqlstate(&guest, "SELECT * FROM rooms").await, "42601");
    assert_eq!(engine.booking_count(), 0);
}

#[tokio::test]
async fn hotel_admin_only() {
    let (addr, engine) = start_test_server().await;
    let (admin, hotel_id) = admin_with_hotel(addr, &engine).await;
    let guest = connect(addr).await;
    register(&guest, "guest@example.com").await;

    assert_eq!(
        sqlstate(&guest, &format!("DELETE FROM hotels WHERE id = '{hotel_id}'")).await,
        "42501"
    );
    assert_eq!(sqlstate(&guest, "SELECT * FROM users").await, "42501");
    assert_eq!(rows(&admin, "SELECT * FROM users").await.len(), 2);

    admin
        .batch_execute(&format!("UPDATE hotels SET tel = '02-999-9999' WHERE id = '{hotel_id}'"))
        .await
        .unwrap();
    let hotel = rows(&guest, &format!("SELECT * FROM hotels WHERE id = '{hotel_id}'")).await;
    assert_eq!(hotel[0].get("tel"), Some("02-999-9999"));

    admin
        .batch_execute(&format!("DELETE FROM hotels WHERE id = '{hotel_id}'"))
        .await
        .unwrap();
    assert_eq!(
        sqlstate(&guest, &format!("SELECT * FROM hotels WHERE id = '{hotel_id}'")).await,
        "P0002"
    );
}

#[tokio::test]
async fn extended_protocol_insert() {
    let (addr, engine) = start_test_server().await;
    let (_admin, hotel_id) = admin_with_hotel(addr, &engine).await;
    let guest = connect(addr).await;
    register(&guest, "guest@example.com").await;

    let (start, end) = (day(2).to_string(), day(4).to_string());
    let inserted = guest
        .execute(
            "INSERT INTO bookings (hotel_id, start_date, end_date) VALUES ($1, $2, $3)",
            &[&hotel_id.as_str(), &start.as_str(), &end.as_str()],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 1);
    assert_eq!(engine.booking_count(), 1);
}

#[tokio::test]
async fn extended_protocol_register_keeps_dollar_password() {
    let (addr, engine) = start_test_server().await;
    let client = connect(addr).await;

    let inserted = client
        .execute(
            "INSERT INTO users (name, tel_number, email, password) VALUES ($1, $2, $3, $4)",
            &[&"Guest", &"02", &"dollar@example.com", &"pa$1wo'rd$2"],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 1);
    assert_eq!(engine.user_count(), 1);
    assert!(engine.login("dollar@example.com", "pa$1wo'rd$2", now_ms()).is_ok());

    let other = connect(addr).await;
    let login = rows(
        &other,
        "SELECT * FROM login WHERE email = 'dollar@example.com' AND password = 'pa$1wo''rd$2'",
    )
    .await;
    assert_eq!(login[0].get("email"), Some("dollar@example.com"));
}

#[tokio::test]
async fn statement_batches_rejected_without_side_effects() {
    let (addr, engine) = start_test_server().await;
    let client = connect(addr).await;

    let err = client
        .batch_execute(
            "INSERT INTO users (name, email, password) VALUES ('A', 'a@example.com', 'secret-pw'); \
             INSERT INTO users (name, email, password) VALUES ('B', 'b@example.com', 'secret-pw')",
        )
        .await
        .unwrap_err();
    assert_eq!(err.as_db_error().map(|e| e.code().code()), Some("42601"));
    assert_eq!(engine.user_count(), 0);
}

#[tokio::test]
async fn demo_dashboard_over_wire() {
    let (addr, engine) = start_test_server().await;
    engine.seed_demo(now_ms()).unwrap();

    let john = connect(addr).await;
    rows(
        &john,
        &format!(
            "SELECT * FROM login WHERE email = 'john.doe@example.com' AND password = '{DEMO_PASSWORD}'"
        ),
    )
    .await;

    let active = rows(&john, "SELECT * FROM bookings WHERE status = 'active'").await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].get("hotel_name"), Some("Le Meridien Chiang Mai"));
    assert_eq!(active[0].get("can_modify"), Some("f"));
    assert_eq!(active[0].get("can_cancel"), Some("t"));

    let all = rows(&john, "SELECT * FROM bookings").await;
    assert_eq!(all.len(), 3);
    assert_eq!(rows(&john, "SELECT * FROM hotels").await.len(), 5);
}
