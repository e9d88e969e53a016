use anyhow::Context as _;
use serde_json::json;
use surge_http::{HttpClient, HttpExecutor, HttpRequest};
use surge_testserver::{DEFAULT_PASSWORD, DEFAULT_USERNAME, TEST_TOKEN, TestServer};

fn reader() -> serde_json::Value {
    json!({
        "username": "reader_abc12345@test.com",
        "password": "Password1!",
        "fullName": "Test Reader abcde",
        "interests": ["fiction", "technology"],
        "gdprConsent": true,
    })
}

#[tokio::test]
async fn login_then_create_reader() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let client = HttpClient::default();
    let base = server.base_url().to_string();

    let login = client
        .execute(HttpRequest::post_json(
            format!("{base}/api/auth/login"),
            &json!({"username": DEFAULT_USERNAME, "password": DEFAULT_PASSWORD}),
        )?)
        .await;
    anyhow::ensure!(login.status == 200, "login status {}", login.status);
    let token = login
        .json_str("/token")
        .context("token missing from login response")?;
    anyhow::ensure!(token == TEST_TOKEN);

    let created = client
        .execute(
            HttpRequest::post_json(format!("{base}/api/readers"), &reader())?.with_bearer(&token),
        )
        .await;
    anyhow::ensure!(created.status == 201, "create status {}", created.status);
    anyhow::ensure!(created.json_str("/fullName").as_deref() == Some("Test Reader abcde"));
    anyhow::ensure!(created.bytes_received > 0);

    let stats = server.stats().clone();
    server.shutdown().await;

    anyhow::ensure!(stats.requests_total() == 2);
    anyhow::ensure!(stats.logins_ok() == 1);
    anyhow::ensure!(stats.readers_created() == 1);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_and_missing_token_are_rejected() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let client = HttpClient::default();
    let base = server.base_url().to_string();

    let login = client
        .execute(HttpRequest::post_json(
            format!("{base}/api/auth/login"),
            &json!({"username": DEFAULT_USERNAME, "password": "wrong"}),
        )?)
        .await;
    anyhow::ensure!(login.status == 401);
    anyhow::ensure!(login.json_str("/token").is_none());

    let created = client
        .execute(HttpRequest::post_json(
            format!("{base}/api/readers"),
            &reader(),
        )?)
        .await;
    anyhow::ensure!(created.status == 401);

    let teapot = client
        .execute(HttpRequest::get(format!("{base}/status/418")))
        .await;
    anyhow::ensure!(teapot.status == 418);

    let stats = server.stats().clone();
    server.shutdown().await;

    anyhow::ensure!(stats.logins_rejected() == 1);
    anyhow::ensure!(stats.unauthorized() == 1);
    anyhow::ensure!(stats.readers_created() == 0);
    Ok(())
}
