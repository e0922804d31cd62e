mod common;

use anyhow::{Context, Result};
use reqwest::StatusCode;

// Content-authoring flows. These need an admin token; the harness spawns the
// server with the test admin emails bootstrapped via ADMIN_EMAILS.

async fn create_workspace(
    client: &reqwest::Client,
    base_url: &str,
    token: &str,
    label: &str,
) -> Result<String> {
    let res = client
        .post(format!("{}/organizations", base_url))
        .bearer_auth(token)
        .json(&serde_json::json!({
            "name": format!("{} org {}", label, common::run_tag()),
        }))
        .send()
        .await?;
    anyhow::ensure!(
        res.status() == StatusCode::CREATED,
        "org create failed: {}",
        res.status()
    );
    let org = res.json::<serde_json::Value>().await?;
    let org_id = org["data"]["id"]
        .as_str()
        .context("no org id in response")?
        .to_string();

    let res = client
        .post(format!("{}/workspaces", base_url))
        .bearer_auth(token)
        .json(&serde_json::json!({
            "organization_id": org_id,
            "name": format!("{} ws {}", label, common::run_tag()),
        }))
        .send()
        .await?;
    anyhow::ensure!(
        res.status() == StatusCode::CREATED,
        "workspace create failed: {}",
        res.status()
    );
    let ws = res.json::<serde_json::Value>().await?;
    Ok(ws["data"]["id"]
        .as_str()
        .context("no workspace id in response")?
        .to_string())
}

#[tokio::test]
async fn duplicate_title_in_workspace_rejected() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let token =
        common::signup_and_login(server, &common::admin_email("unique"), "correct-horse-battery")
            .await?;
    let workspace_id = create_workspace(&client, &server.base_url, &token, "unique").await?;

    let res = client
        .post(format!("{}/barriers", server.base_url))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "workspace_id": workspace_id,
            "title": "Limited transport access",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);

    // Exact repeat is rejected
    let res = client
        .post(format!("{}/barriers", server.base_url))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "workspace_id": workspace_id,
            "title": "Limited transport access",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["message"].as_str(), Some("title already exists"));

    // Uniqueness is case-insensitive
    let res = client
        .post(format!("{}/barriers", server.base_url))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "workspace_id": workspace_id,
            "title": "LIMITED TRANSPORT ACCESS",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["message"].as_str(), Some("title already exists"));
    Ok(())
}

#[tokio::test]
async fn save_rejects_row_from_another_workspace() -> Result<()> {
    let server = common::ensure_server().await?;
    let client = reqwest::Client::new();

    let token =
        common::signup_and_login(server, &common::admin_email("move"), "correct-horse-battery")
            .await?;
    let first_ws = create_workspace(&client, &server.base_url, &token, "move-a").await?;
    let second_ws = create_workspace(&client, &server.base_url, &token, "move-b").await?;

    let res = client
        .post(format!("{}/barriers", server.base_url))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "workspace_id": first_ws,
            "title": "Clinic distance",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<serde_json::Value>().await?;
    let barrier_id = body["data"]["id"]
        .as_str()
        .context("no barrier id in response")?
        .to_string();

    // Submitting the row's id under a different workspace must not rename it
    let res = client
        .post(format!("{}/barriers", server.base_url))
        .bearer_auth(&token)
        .json(&serde_json::json!({
            "id": barrier_id,
            "workspace_id": second_ws,
            "title": "Clinic distance renamed",
        }))
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(
        body["message"].as_str(),
        Some("Record belongs to a different workspace")
    );

    // The original row is untouched
    let res = client
        .get(format!("{}/barriers/{}", server.base_url, barrier_id))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let body = res.json::<serde_json::Value>().await?;
    assert_eq!(body["data"]["title"].as_str(), Some("Clinic distance"));
    assert_eq!(body["data"]["workspace_id"].as_str(), Some(first_ws.as_str()));
    Ok(())
}
