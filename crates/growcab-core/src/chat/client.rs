use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::sse::{SseDecoder, SseEvent};
use crate::config::Settings;
use crate::error::ChatError;
use crate::sensor::SensorSnapshot;
use crate::state::{ChatMessage, Conversation};

/// Sensor reading forwarded with a chat turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorContext {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub timestamp: String,
}

impl From<&SensorSnapshot> for SensorContext {
    fn from(snapshot: &SensorSnapshot) -> Self {
        Self {
            temperature: snapshot.temp_c,
            humidity: snapshot.humidity_percent,
            timestamp: snapshot.timestamp.clone(),
        }
    }
}

/// Metadata sent alongside the message history.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatContext {
    pub plant_id: String,
    pub sensor: Option<SensorContext>,
}

impl ChatContext {
    pub fn new(plant_id: impl Into<String>) -> Self {
        Self {
            plant_id: plant_id.into(),
            sensor: None,
        }
    }

    /// Attach the latest reading, if the sensor reported one successfully.
    pub fn with_snapshot(mut self, snapshot: Option<&SensorSnapshot>) -> Self {
        self.sensor = snapshot.filter(|s| s.ok).map(SensorContext::from);
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    #[serde(rename = "plantId")]
    plant_id: &'a str,
    #[serde(rename = "sensorData", skip_serializing_if = "Option::is_none")]
    sensor_data: Option<&'a SensorContext>,
}

/// How a stream stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// `[DONE]` sentinel received.
    Done,
    /// Body ended without the sentinel.
    Eof,
    /// Caller cancelled mid-stream.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub content: String,
    pub end: StreamEnd,
}

/// Client for the grow assistant's streaming chat endpoint.
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl ChatClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            api_key: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let client = Self::new(&settings.chat_url);
        match &settings.chat_api_key {
            Some(key) => client.with_api_key(key),
            None => client,
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one chat turn and stream the reply.
    ///
    /// `on_delta` receives every text fragment as it is decoded. Fragments delivered
    /// before an error are not retracted.
    pub async fn send<F>(
        &self,
        history: &[ChatMessage],
        context: &ChatContext,
        cancel: &CancellationToken,
        mut on_delta: F,
    ) -> Result<StreamSummary, ChatError>
    where
        F: FnMut(&str),
    {
        let request = ChatRequest {
            messages: history,
            plant_id: &context.plant_id,
            sensor_data: context.sensor.as_ref(),
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        debug!(endpoint = %self.endpoint, messages = history.len(), plant = %context.plant_id, "sending chat turn");
        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Ok(StreamSummary { content: String::new(), end: StreamEnd::Cancelled });
            }
            response = builder.send() => response?,
        };

        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => return Err(ChatError::RateLimited),
            StatusCode::PAYMENT_REQUIRED => return Err(ChatError::PaymentRequired),
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                warn!(status = s.as_u16(), "chat request failed");
                return Err(ChatError::RequestFailed {
                    status: s.as_u16(),
                    body,
                });
            }
            _ => {}
        }

        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Err(ChatError::StreamUnavailable);
        }

        let mut body = std::pin::pin!(response.bytes_stream());
        let mut decoder = SseDecoder::new();
        let mut content = String::new();

        let end = loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break StreamEnd::Cancelled,
                next = body.next() => next,
            };

            let events = match next {
                Some(chunk) => decoder.feed(&chunk?),
                None => {
                    let events = decoder.finish();
                    let finished = events.contains(&SseEvent::Done);
                    deliver(&events, &mut content, &mut on_delta);
                    break if finished { StreamEnd::Done } else { StreamEnd::Eof };
                }
            };

            deliver(&events, &mut content, &mut on_delta);
            if decoder.is_done() {
                break StreamEnd::Done;
            }
        };

        debug!(?end, chars = content.chars().count(), "chat stream ended");
        Ok(StreamSummary { content, end })
    }

    /// Send the conversation as history and stream the reply into it.
    pub async fn stream_into(
        &self,
        conversation: &mut Conversation,
        context: &ChatContext,
        cancel: &CancellationToken,
    ) -> Result<StreamSummary, ChatError> {
        let history = conversation.messages().to_vec();
        self.send(&history, context, cancel, |delta| {
            conversation.append_assistant_delta(delta);
        })
        .await
    }
}

fn deliver<F>(events: &[SseEvent], content: &mut String, on_delta: &mut F)
where
    F: FnMut(&str),
{
    for event in events {
        if let SseEvent::Delta(text) = event {
            content.push_str(text);
            on_delta(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ok: bool) -> SensorSnapshot {
        SensorSnapshot {
            timestamp: "2024-05-01T10:00:00Z".to_string(),
            temp_c: Some(29.1),
            humidity_percent: Some(71.0),
            ok,
            error: None,
        }
    }

    #[test]
    fn test_request_wire_format() {
        let context = ChatContext::new("basil").with_snapshot(Some(&snapshot(true)));
        let messages = vec![ChatMessage::user("Too humid?")];
        let request = ChatRequest {
            messages: &messages,
            plant_id: &context.plant_id,
            sensor_data: context.sensor.as_ref(),
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "messages": [{"role": "user", "content": "Too humid?"}],
                "plantId": "basil",
                "sensorData": {
                    "temperature": 29.1,
                    "humidity": 71.0,
                    "timestamp": "2024-05-01T10:00:00Z"
                }
            })
        );
    }

    #[test]
    fn test_faulty_snapshot_is_not_forwarded() {
        let context = ChatContext::new("mint").with_snapshot(Some(&snapshot(false)));
        assert_eq!(context.sensor, None);

        let messages: Vec<ChatMessage> = Vec::new();
        let request = ChatRequest {
            messages: &messages,
            plant_id: &context.plant_id,
            sensor_data: context.sensor.as_ref(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("sensorData").is_none());
    }
}
