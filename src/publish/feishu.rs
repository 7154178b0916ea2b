use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{message_text, PublishError, Publisher};
use crate::pr::PullRequestMetadata;
use crate::summary::SummaryResult;

/// Posts summaries as text messages to a Feishu (Lark) bot webhook.
pub struct FeishuPublisher {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct TextMessage<'a> {
    msg_type: &'static str,
    content: TextContent<'a>,
}

#[derive(Serialize)]
struct TextContent<'a> {
    text: &'a str,
}

/// Feishu answers with either `code`/`msg` or the legacy
/// `StatusCode`/`StatusMessage` pair; zero means success.
#[derive(Deserialize, Default)]
struct SinkResponse {
    code: Option<i64>,
    msg: Option<String>,
    #[serde(rename = "StatusCode")]
    status_code: Option<i64>,
    #[serde(rename = "StatusMessage")]
    status_message: Option<String>,
}

impl FeishuPublisher {
    pub fn new(http: reqwest::Client, url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http,
            url: url.into(),
            token,
        }
    }

    /// Post one text message and check the sink's answer.
    pub async fn send_text(&self, text: &str) -> Result<(), PublishError> {
        let message = TextMessage {
            msg_type: "text",
            content: TextContent { text },
        };

        let mut request = self.http.post(&self.url).json(&message);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status(status.as_u16()));
        }

        // A 2xx without a JSON body is taken as accepted.
        let body = response.json::<SinkResponse>().await.unwrap_or_default();
        match body.code.or(body.status_code) {
            Some(code) if code != 0 => Err(PublishError::Rejected {
                code,
                message: body.msg.or(body.status_message).unwrap_or_default(),
            }),
            _ => {
                debug!(chars = text.len(), "message accepted by sink");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Publisher for FeishuPublisher {
    fn name(&self) -> &str {
        "feishu"
    }

    #[instrument(skip_all, fields(origin = %summary.origin))]
    async fn publish(
        &self,
        summary: &SummaryResult,
        metadata: Option<&PullRequestMetadata>,
    ) -> Result<(), PublishError> {
        self.send_text(&message_text(summary, metadata)).await
    }
}
