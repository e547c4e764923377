//! Cloud Firestore backend over the REST v1 API.
//!
//! Layout: `users/{uid}/chats/{chatId}` with fields `title` (string),
//! `messages` (array of maps) and `timestamp` (timestamp). Requests carry the
//! caller's Firebase ID token, so Firestore security rules decide access.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use positron_types::models::{ChatRecord, ChatSummary, Message};

use crate::{ChatStore, Owner};

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

const LIST_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct FirestoreStore {
    http: Client,
    base_url: String,
    project_id: String,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

impl FirestoreStore {
    pub fn new(http: Client, base_url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
        }
    }

    fn collection_url(&self, uid: &str) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/users/{}/chats",
            self.base_url, self.project_id, uid
        )
    }

    fn document_url(&self, uid: &str, chat_id: &str) -> String {
        format!("{}/{}", self.collection_url(uid), chat_id)
    }
}

#[async_trait]
impl ChatStore for FirestoreStore {
    async fn list_chats(&self, owner: &Owner) -> Result<Vec<ChatSummary>> {
        let mut chats = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("orderBy", "timestamp desc".into()),
                ("mask.fieldPaths", "title".into()),
                ("mask.fieldPaths", "timestamp".into()),
                ("pageSize", LIST_PAGE_SIZE.to_string()),
            ];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let resp = self
                .http
                .get(self.collection_url(&owner.uid))
                .bearer_auth(&owner.token)
                .query(&query)
                .send()
                .await
                .context("firestore list request failed")?;
            let page: ListDocumentsResponse = expect_success(resp, "list").await?.json().await?;

            for doc in &page.documents {
                chats.push(decode_summary(doc)?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} chats for {}", chats.len(), owner.uid);
        Ok(chats)
    }

    async fn get_chat(&self, owner: &Owner, chat_id: &str) -> Result<Option<ChatRecord>> {
        let resp = self
            .http
            .get(self.document_url(&owner.uid, chat_id))
            .bearer_auth(&owner.token)
            .send()
            .await
            .context("firestore get request failed")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let doc: Document = expect_success(resp, "get").await?.json().await?;
        decode_chat(&doc).map(Some)
    }

    async fn upsert_chat(
        &self,
        owner: &Owner,
        chat_id: &str,
        title: &str,
        messages: &[Message],
    ) -> Result<ChatRecord> {
        let timestamp = match self.get_chat(owner, chat_id).await? {
            Some(existing) => existing.timestamp,
            None => Utc::now(),
        };

        // PATCH without an update mask creates or fully replaces the document.
        let resp = self
            .http
            .patch(self.document_url(&owner.uid, chat_id))
            .bearer_auth(&owner.token)
            .json(&encode_chat(title, messages, timestamp)?)
            .send()
            .await
            .context("firestore patch request failed")?;
        let doc: Document = expect_success(resp, "patch").await?.json().await?;
        decode_chat(&doc)
    }

    async fn delete_chat(&self, owner: &Owner, chat_id: &str) -> Result<bool> {
        // Firestore deletes of missing documents succeed silently.
        if self.get_chat(owner, chat_id).await?.is_none() {
            return Ok(false);
        }

        let resp = self
            .http
            .delete(self.document_url(&owner.uid, chat_id))
            .bearer_auth(&owner.token)
            .send()
            .await
            .context("firestore delete request failed")?;
        expect_success(resp, "delete").await?;
        Ok(true)
    }
}

/// Error bodies are cut to this many characters in logs.
const ERROR_BODY_CHARS: usize = 300;

async fn expect_success(resp: Response, op: &str) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    bail!(
        "firestore {} returned {}: {}",
        op,
        status,
        body.chars().take(ERROR_BODY_CHARS).collect::<String>()
    )
}

// -- Document encoding --

fn encode_chat(title: &str, messages: &[Message], timestamp: DateTime<Utc>) -> Result<Value> {
    let messages = serde_json::to_value(messages)?;
    Ok(json!({
        "fields": {
            "title": { "stringValue": title },
            "messages": to_firestore(&messages),
            "timestamp": {
                "timestampValue": timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
            },
        }
    }))
}

fn decode_chat(doc: &Document) -> Result<ChatRecord> {
    let summary = decode_summary(doc)?;
    let messages = match doc.fields.get("messages") {
        Some(v) => serde_json::from_value(from_firestore(v)?)
            .with_context(|| format!("corrupt messages in {}", doc.name))?,
        None => Vec::new(),
    };

    Ok(ChatRecord {
        id: summary.id,
        title: summary.title,
        messages,
        timestamp: summary.timestamp,
    })
}

fn decode_summary(doc: &Document) -> Result<ChatSummary> {
    let id = doc
        .name
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("document name without id: {}", doc.name))?
        .to_string();

    let title = match doc.fields.get("title").map(from_firestore).transpose()? {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };

    let timestamp = match doc.fields.get("timestamp").map(from_firestore).transpose()? {
        Some(Value::String(raw)) => DateTime::parse_from_rfc3339(&raw)
            .with_context(|| format!("corrupt timestamp '{}' in {}", raw, doc.name))?
            .with_timezone(&Utc),
        Some(Value::Number(ms)) => ms
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| anyhow!("corrupt timestamp {} in {}", ms, doc.name))?,
        _ => DateTime::<Utc>::default(),
    };

    Ok(ChatSummary { id, title, timestamp })
}

/// Plain JSON to a Firestore typed value.
fn to_firestore(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) if n.is_i64() || n.is_u64() => json!({ "integerValue": n.to_string() }),
        Value::Number(n) => json!({ "doubleValue": n.as_f64() }),
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(to_firestore).collect::<Vec<_>>() }
        }),
        Value::Object(map) => {
            let fields: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), to_firestore(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

/// Firestore typed value back to plain JSON. Timestamps come back as their
/// RFC 3339 string.
fn from_firestore(value: &Value) -> Result<Value> {
    let (kind, inner) = value
        .as_object()
        .and_then(|o| o.iter().next())
        .ok_or_else(|| anyhow!("not a firestore value: {}", value))?;

    Ok(match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" | "doubleValue" | "stringValue" | "timestampValue" => inner.clone(),
        "integerValue" => {
            let n: i64 = match inner {
                Value::String(s) => s.parse().with_context(|| format!("bad integerValue '{}'", s))?,
                other => other
                    .as_i64()
                    .ok_or_else(|| anyhow!("bad integerValue {}", other))?,
            };
            Value::from(n)
        }
        "arrayValue" => {
            let items = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|vs| vs.iter().map(from_firestore).collect::<Result<Vec<_>>>())
                .transpose()?
                .unwrap_or_default();
            Value::Array(items)
        }
        "mapValue" => {
            let mut out = Map::new();
            if let Some(fields) = inner.get("fields").and_then(Value::as_object) {
                for (k, v) in fields {
                    out.insert(k.clone(), from_firestore(v)?);
                }
            }
            Value::Object(out)
        }
        other => bail!("unsupported firestore value type {}", other),
    })
}
