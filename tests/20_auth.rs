mod common;

use anyhow::Result;
use reqwest::StatusCode;

// These tests need the server's database and cache reachable plus the dev
// OTP bypass; run them against a dev environment.

#[tokio::test]
async fn signup_verify_login_roundtrip() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let email = format!("roundtrip-{}@example.test", common::run_tag());
    let password = "correct-horse-battery";

    let token = common::signup_and_login(server, &email, password).await?;
    assert!(!token.is_empty());

    // Fresh login with the same credentials
    let res = client
        .post(format!("{}/auth/login", server.base_url))
        .json(&serde_json::json!({ "email": email, "password": password }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["data"]["user"]["email"].as_str(), Some(email.as_str()));
    assert!(body["data"]["user"]["password_hash"].is_null());
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_rejected() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let email = format!("wrongpw-{}@example.test", common::run_tag());
    common::signup_and_login(server, &email, "correct-horse-battery").await?;

    let res = client
        .post(format!("{}/auth/login", server.base_url))
        .json(&serde_json::json!({ "email": email, "password": "not-the-password" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["message"].as_str(), Some("Invalid credentials"));
    Ok(())
}

#[tokio::test]
async fn bad_otp_is_rejected() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let email = format!("badotp-{}@example.test", common::run_tag());
    let res = client
        .post(format!("{}/auth/signup", server.base_url))
        .json(&serde_json::json!({
            "full_name": "Test User",
            "email": email,
            "password": "correct-horse-battery",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/auth/signup/verify", server.base_url))
        .json(&serde_json::json!({ "email": email, "otp": "999999" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn short_password_is_a_field_error() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/auth/signup", server.base_url))
        .json(&serde_json::json!({
            "full_name": "Test User",
            "email": format!("shortpw-{}@example.test", common::run_tag()),
            "password": "short",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = res.json::<serde_json::Value>().await?;
    assert!(body["errors"]["password"].is_string());
    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_session() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let email = format!("logout-{}@example.test", common::run_tag());
    let token = common::signup_and_login(server, &email, "correct-horse-battery").await?;

    let res = client
        .get(format!("{}/auth/me", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(format!("{}/auth/session", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    // The same token must no longer authenticate
    let res = client
        .get(format!("{}/auth/me", server.base_url))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
