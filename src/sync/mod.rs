//! Best-effort remote sync of user and session identity
//!
//! Records are upserted keyed by username and session id. Sync never blocks
//! or fails local capture: each push runs on the tokio runtime under a
//! timeout and failures are only logged.

use crate::config::SyncConfig;
use crate::recorder::channel::{RecordingError, RecordingResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A user known to the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub username: String,
    pub optin: bool,
}

/// One recording session as seen by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub username: String,
    pub computer: String,
    /// `YYYY-MM-DD` of the session start
    pub date: String,
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(username: &str) -> Self {
        let start_time = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            username: username.to_string(),
            computer: computer_name(),
            date: start_time.format("%Y-%m-%d").to_string(),
            start_time,
            last_activity: start_time,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

/// Host name, or "unknown" if unavailable
pub fn computer_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

#[async_trait]
pub trait RemoteSync: Send + Sync {
    async fn upsert_user(&self, user: &UserRecord) -> RecordingResult<()>;

    async fn upsert_session(&self, session: &SessionRecord) -> RecordingResult<()>;
}

/// JSON over HTTP: `PUT {endpoint}/users/{username}` and
/// `PUT {endpoint}/sessions/{session_id}`
pub struct HttpRemoteSync {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRemoteSync {
    pub fn new(config: &SyncConfig) -> RecordingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RecordingError::SyncError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn user_url(&self, username: &str) -> String {
        format!("{}/users/{}", self.endpoint, urlencoding::encode(username))
    }

    fn session_url(&self, session_id: &str) -> String {
        format!("{}/sessions/{}", self.endpoint, urlencoding::encode(session_id))
    }

    async fn put<T: Serialize + Sync>(&self, url: String, body: &T) -> RecordingResult<()> {
        let response = self
            .client
            .put(&url)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| RecordingError::SyncError(format!("Failed to send {}: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(RecordingError::SyncError(format!(
                "{} returned {}: {}",
                url, status, error_text
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSync for HttpRemoteSync {
    async fn upsert_user(&self, user: &UserRecord) -> RecordingResult<()> {
        self.put(self.user_url(&user.username), user).await
    }

    async fn upsert_session(&self, session: &SessionRecord) -> RecordingResult<()> {
        self.put(self.session_url(&session.session_id.to_string()), session)
            .await
    }
}

/// Push user and session in the background. Returns immediately; without a
/// tokio runtime the push is skipped.
pub fn dispatch(
    sync: Arc<dyn RemoteSync>,
    user: Option<UserRecord>,
    session: SessionRecord,
    timeout: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("No async runtime; skipping sync of session {}", session.session_id);
        return None;
    };

    Some(runtime.spawn(async move {
        let push = async {
            if let Some(user) = &user {
                sync.upsert_user(user).await?;
            }
            sync.upsert_session(&session).await
        };

        match tokio::time::timeout(timeout, push).await {
            Ok(Ok(())) => tracing::debug!("Synced session {}", session.session_id),
            Ok(Err(e)) => tracing::warn!("Session sync failed: {}", e),
            Err(_) => tracing::warn!("Session sync timed out after {:?}", timeout),
        }
    }))
}
