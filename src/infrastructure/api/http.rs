#[cfg(test)]
#[path = "http_test.rs"]
mod tests;

use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use tokio::sync::mpsc;

use super::decoder::forward_events;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Conversation;
use crate::domain::models::ConversationSummary;
use crate::domain::models::CouncilApi;
use crate::domain::models::CreatedConversation;
use crate::domain::models::ProtocolEvent;

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CreateRequest {}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MessageRequest {
    content: String,
}

pub fn trim_base_url(url: &str) -> String {
    return url.trim_end_matches('/').to_string();
}

pub struct HttpCouncil {
    url: String,
    timeout: String,
}

impl Default for HttpCouncil {
    fn default() -> HttpCouncil {
        return HttpCouncil {
            url: trim_base_url(&Config::get(ConfigKey::ApiURL)),
            timeout: Config::get(ConfigKey::RequestTimeout),
        };
    }
}

impl HttpCouncil {
    #[cfg(test)]
    pub fn with_url(url: String) -> HttpCouncil {
        return HttpCouncil {
            url: trim_base_url(&url),
            timeout: "500".to_string(),
        };
    }

    fn endpoint(&self, path: &str) -> String {
        return format!("{url}/api/conversations{path}", url = self.url);
    }

    fn timeout(&self) -> Result<Duration> {
        return Ok(Duration::from_millis(self.timeout.parse::<u64>()?));
    }

    fn check_status(res: &reqwest::Response, action: &str) -> Result<()> {
        if !res.status().is_success() {
            tracing::error!(status = res.status().as_u16(), "Failed to {action}");
            bail!(format!("Failed to {action}"));
        }

        return Ok(());
    }
}

#[async_trait]
impl CouncilApi for HttpCouncil {
    #[allow(clippy::implicit_return)]
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let res = reqwest::Client::new()
            .get(self.endpoint(""))
            .timeout(self.timeout()?)
            .send()
            .await?;

        HttpCouncil::check_status(&res, "list conversations")?;
        let conversations = res.json::<Vec<ConversationSummary>>().await?;
        tracing::debug!(count = conversations.len(), "Listed conversations");

        return Ok(conversations);
    }

    #[allow(clippy::implicit_return)]
    async fn create_conversation(&self) -> Result<CreatedConversation> {
        let res = reqwest::Client::new()
            .post(self.endpoint(""))
            .timeout(self.timeout()?)
            .json(&CreateRequest {})
            .send()
            .await?;

        HttpCouncil::check_status(&res, "create conversation")?;
        let created = res.json::<CreatedConversation>().await?;
        tracing::debug!(id = created.id, "Created conversation");

        return Ok(created);
    }

    #[allow(clippy::implicit_return)]
    async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        let res = reqwest::Client::new()
            .get(self.endpoint(&format!("/{id}")))
            .timeout(self.timeout()?)
            .send()
            .await?;

        HttpCouncil::check_status(&res, "get conversation")?;
        return Ok(res.json::<Conversation>().await?);
    }

    #[allow(clippy::implicit_return)]
    async fn send_message(&self, id: &str, content: &str) -> Result<Conversation> {
        // Waits on the full council, so no request timeout here.
        let res = reqwest::Client::new()
            .post(self.endpoint(&format!("/{id}/message")))
            .json(&MessageRequest {
                content: content.to_string(),
            })
            .send()
            .await?;

        HttpCouncil::check_status(&res, "send message")?;
        return Ok(res.json::<Conversation>().await?);
    }

    #[allow(clippy::implicit_return)]
    async fn send_message_stream<'a>(
        &self,
        id: &str,
        content: &str,
        tx: &'a mpsc::UnboundedSender<ProtocolEvent>,
    ) -> Result<()> {
        let res = reqwest::Client::new()
            .post(self.endpoint(&format!("/{id}/message/stream")))
            .json(&MessageRequest {
                content: content.to_string(),
            })
            .send()
            .await?;

        HttpCouncil::check_status(&res, "send message")?;

        return forward_events(res.bytes_stream(), tx).await;
    }
}
