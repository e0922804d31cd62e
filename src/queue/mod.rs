use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job queue not initialized")]
    NotInitialized,

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

const NOTIFICATION_QUEUE: &str = "queue:notifications";

/// Notification jobs consumed by the out-of-process worker. The worker owns
/// templating and delivery; this side only describes what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationJob {
    SignupOtp { email: String, otp: String },
    Welcome { email: String, full_name: String },
    PasswordReset { email: String, token: String },
    OrgInvitation { email: String, organization: String, token: String },
    OrgMemberAdded { email: String, organization: String },
    Whatsapp { phone: String, template: String },
}

#[derive(Clone)]
pub struct JobQueue {
    conn: ConnectionManager,
}

static QUEUE: OnceLock<JobQueue> = OnceLock::new();

/// Connect the process-wide queue producer. Called once from main; shares
/// the redis instance with the cache store but keeps its own connection.
pub async fn init_queue(redis_url: &str) -> Result<JobQueue, QueueError> {
    let client = redis::Client::open(redis_url)?;
    let conn = ConnectionManager::new(client).await?;
    info!("Connected to job queue");
    let queue = JobQueue { conn };
    let _ = QUEUE.set(queue.clone());
    Ok(queue)
}

pub fn queue() -> Result<JobQueue, QueueError> {
    QUEUE.get().cloned().ok_or(QueueError::NotInitialized)
}

impl JobQueue {
    pub async fn enqueue(&mut self, job: &NotificationJob) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        self.conn
            .lpush::<_, _, ()>(NOTIFICATION_QUEUE, payload)
            .await?;
        Ok(())
    }
}

/// Fire-and-forget enqueue used by request handlers. Notification delivery
/// must never fail the request that triggered it, so failures are logged
/// and swallowed.
pub async fn enqueue_notification(job: NotificationJob) {
    match queue() {
        Ok(mut q) => {
            if let Err(e) = q.enqueue(&job).await {
                warn!("failed to enqueue notification job: {}", e);
            }
        }
        Err(e) => warn!("job queue unavailable, dropping notification: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_serialize_with_kind_tag() {
        let job = NotificationJob::SignupOtp {
            email: "a@b.c".to_string(),
            otp: "123456".to_string(),
        };
        let v: serde_json::Value = serde_json::to_value(&job).unwrap();
        assert_eq!(v["kind"], "signup_otp");
        assert_eq!(v["otp"], "123456");
    }

    #[test]
    fn whatsapp_job_round_trips() {
        let job = NotificationJob::Whatsapp {
            phone: "+10000000000".to_string(),
            template: "welcome".to_string(),
        };
        let json = serde_json::to_string(&job).unwrap();
        let back: NotificationJob = serde_json::from_str(&json).unwrap();
        match back {
            NotificationJob::Whatsapp { phone, .. } => assert_eq!(phone, "+10000000000"),
            other => panic!("unexpected job: {:?}", other),
        }
    }
}
