mod common;

use anyhow::Result;
use reqwest::StatusCode;

// Role-gating checks. A fresh signup lands in the viewer role: reads are
// allowed everywhere, writes are not.

#[tokio::test]
async fn missing_token_is_unauthorized() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/barriers", server.base_url))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn garbage_token_is_unauthorized() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/organizations", server.base_url))
        .bearer_auth("not.a.jwt")
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn viewer_can_read_content() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let email = format!("viewer-read-{}@example.test", common::run_tag());
    let token = common::signup_and_login(server, &email, "correct-horse-battery").await?;

    for path in ["/barriers", "/behaviours", "/solutions", "/knowledge", "/proposals"] {
        let res = client
            .get(format!("{}{}", server.base_url, path))
            .bearer_auth(&token)
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK, "read failed for {}", path);
    }
    Ok(())
}

#[tokio::test]
async fn viewer_cannot_write_content() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let email = format!("viewer-write-{}@example.test", common::run_tag());
    let token = common::signup_and_login(server, &email, "correct-horse-battery").await?;

    let res = client
        .post(format!("{}/barriers", server.base_url))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "workspace_id": uuid_like(),
            "title": "Forbidden write",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn viewer_cannot_manage_organizations() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let email = format!("viewer-org-{}@example.test", common::run_tag());
    let token = common::signup_and_login(server, &email, "correct-horse-battery").await?;

    let res = client
        .post(format!("{}/organizations", server.base_url))
        .bearer_auth(&token)
        .json(&serde_json::json!({ "name": "Not allowed" }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    Ok(())
}

fn uuid_like() -> String {
    "00000000-0000-4000-8000-000000000000".to_string()
}
