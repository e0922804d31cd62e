use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;

static SERVER: OnceLock<TestServer> = OnceLock::new();

// Each slot yields a distinct bootstrap admin account so concurrent tests
// do not race over a single signup.
const ADMIN_SLOTS: &[&str] = &["unique", "move"];

/// Email for a bootstrap admin slot; the server is spawned with these in
/// ADMIN_EMAILS so signing one up yields an admin token.
#[allow(dead_code)]
pub fn admin_email(slot: &str) -> String {
    format!("admin-{}-{}@example.test", slot, std::process::id())
}

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    #[allow(dead_code)]
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // Spawn the already-built binary to keep start fast during tests
        let admin_emails = ADMIN_SLOTS
            .iter()
            .map(|slot| admin_email(slot))
            .collect::<Vec<_>>()
            .join(",");

        let mut cmd = Command::new("target/debug/catalyst-api");
        cmd.env("CATALYST_API_PORT", port.to_string())
            .env("ADMIN_EMAILS", admin_emails)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        // Inherit environment so the server sees DATABASE_URL and REDIS_URL
        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK
                    || resp.status() == StatusCode::SERVICE_UNAVAILABLE
                {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!(
            "server did not become ready on {} within {:?}",
            self.base_url,
            timeout
        )
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Signs up and verifies a fresh user via the dev OTP bypass code, returning
/// the bearer token. Only works against a dev/staging server.
#[allow(dead_code)]
pub async fn signup_and_login(
    server: &TestServer,
    email: &str,
    password: &str,
) -> Result<String> {
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/auth/signup", server.base_url))
        .json(&serde_json::json!({
            "full_name": "Test User",
            "email": email,
            "password": password,
        }))
        .send()
        .await?;
    anyhow::ensure!(res.status().is_success(), "signup failed: {}", res.status());

    let res = client
        .post(format!("{}/auth/signup/verify", server.base_url))
        .json(&serde_json::json!({ "email": email, "otp": "000000" }))
        .send()
        .await?;
    anyhow::ensure!(res.status().is_success(), "verify failed: {}", res.status());

    let body = res.json::<serde_json::Value>().await?;
    let token = body["data"]["token"]
        .as_str()
        .context("no token in verify response")?
        .to_string();
    Ok(token)
}

/// Unique-per-run suffix so repeated test runs do not trip uniqueness checks.
#[allow(dead_code)]
pub fn run_tag() -> String {
    format!("{}", std::process::id())
}
