use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Client;
use tracing::debug;
use url::Url;

use positron_types::api::GenerateRequest;
use positron_types::models::Message;

use crate::conversation::Conversation;
use crate::error::{ClientError, check_status};
use crate::stream::text_chunks;

/// Talks to `POST /api/generate`.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: Client,
    endpoint: Url,
}

impl RelayClient {
    /// `server` is the relay's root URL, e.g. `http://127.0.0.1:3001/`.
    pub fn new(http: Client, server: &Url) -> Result<Self, ClientError> {
        Ok(Self {
            http,
            endpoint: server.join("api/generate")?,
        })
    }

    /// Send the conversation and return the reply's chunk texts.
    /// Fails without a stream when the relay answers with an error status.
    pub async fn generate(
        &self,
        history: &[Message],
    ) -> Result<BoxStream<'static, Result<String, ClientError>>, ClientError> {
        let body = GenerateRequest {
            history: history.to_vec(),
        };
        let resp = self.http.post(self.endpoint.clone()).json(&body).send().await?;
        let resp = check_status(resp).await?;
        Ok(text_chunks(resp))
    }

    /// Stream the reply to `history` into `conv`, then close the turn.
    /// On failure the conversation shows the error line and keeps whatever
    /// text had already arrived.
    pub async fn run_turn(
        &self,
        conv: &mut Conversation,
        history: &[Message],
    ) -> Result<(), ClientError> {
        match self.stream_into(conv, history).await {
            Ok(chunks) => {
                debug!("Reply complete after {} chunks", chunks);
                conv.finish();
                Ok(())
            }
            Err(e) => {
                conv.fail(&e);
                Err(e)
            }
        }
    }

    async fn stream_into(
        &self,
        conv: &mut Conversation,
        history: &[Message],
    ) -> Result<usize, ClientError> {
        let mut chunks = self.generate(history).await?;
        let mut count = 0;
        while let Some(text) = chunks.next().await {
            conv.append_chunk(&text?);
            count += 1;
        }
        Ok(count)
    }
}
