use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::RemoteBackend;
use crate::config::RemoteConfig;
use crate::models::{
    ContentId, ContentType, ProgressUpdate, QuizAttempt, TicketMessagePayload, TicketPayload,
};

/// JSON REST implementation of [`RemoteBackend`] against the hosted
/// backend's row endpoints.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid backend base URL: {}", config.base_url))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        self.base_url
            .join(&format!("rest/v1/{}", table))
            .with_context(|| format!("Failed to build URL for table {}", table))
    }

    async fn post_row(&self, table: &str, row: serde_json::Value, upsert: bool) -> Result<()> {
        let url = self.table_url(table)?;
        let mut request = self.client.post(url.clone()).json(&row);

        if let Some(ref key) = self.api_key {
            request = request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key));
        }

        if upsert {
            request = request.header("Prefer", "resolution=merge-duplicates");
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach backend table {}", table))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Backend rejected write to {}: {}",
                table,
                response.status()
            ));
        }

        debug!("Wrote row to {}", table);
        Ok(())
    }
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    async fn record_download(
        &self,
        content_id: &ContentId,
        content_type: ContentType,
        downloaded_at: DateTime<Utc>,
    ) -> Result<()> {
        self.post_row(
            "content_downloads",
            json!({
                "content_id": content_id.as_str(),
                "content_type": content_type.as_str(),
                "downloaded_at": downloaded_at.to_rfc3339(),
            }),
            true,
        )
        .await
    }

    async fn upsert_progress(
        &self,
        content_id: &ContentId,
        content_type: ContentType,
        update: &ProgressUpdate,
    ) -> Result<()> {
        let mut row = serde_json::to_value(update).context("Failed to serialize progress")?;
        let object = row
            .as_object_mut()
            .context("Progress update did not serialize to an object")?;
        object.insert("content_id".into(), json!(content_id.as_str()));
        object.insert("content_type".into(), json!(content_type.as_str()));

        self.post_row("learning_progress", row, true).await
    }

    async fn insert_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<()> {
        self.post_row(
            "quiz_attempts",
            serde_json::to_value(attempt).context("Failed to serialize quiz attempt")?,
            false,
        )
        .await
    }

    async fn create_ticket(&self, ticket: &TicketPayload) -> Result<()> {
        self.post_row(
            "support_tickets",
            serde_json::to_value(ticket).context("Failed to serialize ticket")?,
            false,
        )
        .await
    }

    async fn add_ticket_message(&self, message: &TicketMessagePayload) -> Result<()> {
        self.post_row(
            "ticket_messages",
            serde_json::to_value(message).context("Failed to serialize ticket message")?,
            false,
        )
        .await
    }

    async fn health(&self) -> Result<()> {
        let url = self
            .base_url
            .join("rest/v1/")
            .context("Failed to build health URL")?;

        let mut request = self.client.head(url);
        if let Some(ref key) = self.api_key {
            request = request.header("apikey", key);
        }

        let response = request.send().await.context("Backend unreachable")?;

        if response.status().is_server_error() {
            return Err(anyhow::anyhow!("Backend unhealthy: {}", response.status()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QuizId;

    fn backend_for(url: &str) -> HttpBackend {
        HttpBackend::new(&RemoteConfig {
            base_url: format!("{}/", url),
            api_key: Some("test-key".to_string()),
            probe_interval_secs: 15,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_progress_posts_row_with_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rest/v1/learning_progress")
            .match_header("apikey", "test-key")
            .match_header("Authorization", "Bearer test-key")
            .match_header("Prefer", "resolution=merge-duplicates")
            .with_status(201)
            .create_async()
            .await;

        let backend = backend_for(&server.url());
        backend
            .upsert_progress(
                &ContentId::from("v1"),
                ContentType::Video,
                &ProgressUpdate {
                    progress: Some(40),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_insert_quiz_attempt_propagates_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/rest/v1/quiz_attempts")
            .with_status(500)
            .create_async()
            .await;

        let backend = backend_for(&server.url());
        let attempt = QuizAttempt {
            id: "a1".to_string(),
            quiz_id: QuizId::from("quiz_42"),
            answers: vec!["a".to_string()],
            score: 80,
            passed: true,
            completed_at: Utc::now(),
        };

        let result = backend.insert_quiz_attempt(&attempt).await;
        assert!(result.unwrap_err().to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_health_ok_on_2xx() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("HEAD", "/rest/v1/")
            .with_status(200)
            .create_async()
            .await;

        let backend = backend_for(&server.url());
        backend.health().await.unwrap();
    }

    #[tokio::test]
    async fn test_health_fails_when_unreachable() {
        let backend = backend_for("http://127.0.0.1:1");
        assert!(backend.health().await.is_err());
    }
}
