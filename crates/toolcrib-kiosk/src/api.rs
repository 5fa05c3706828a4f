use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::ACCEPT;
use serde::Serialize;
use serde_json::Value;

use crate::config::KioskConfig;
use crate::error::{Error, Failure, Result};
use crate::page::ToolId;
use crate::routes::{EndpointTemplates, Flow};
use crate::text;

/// A response whose body was read in full, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Option<Value> {
        let body = self.body.trim();
        if body.is_empty() {
            return None;
        }
        serde_json::from_str(body).ok()
    }

    /// Human-readable error the server put in the body, if any.
    pub fn error_message(&self) -> Option<String> {
        let body = self.json()?;
        ["error", "detail"]
            .iter()
            .filter_map(|k| body.get(*k).and_then(Value::as_str))
            .map(text::for_notice)
            .find(|s| !s.is_empty())
    }
}

/// Card reader state reported on the home screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardStatus {
    Waiting,
    Recognized { session: Option<String> },
    Denied,
    Other(String),
}

impl CardStatus {
    pub fn from_json(body: &Value) -> Self {
        let tag = body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match tag.as_str() {
            "aguardando" | "waiting" => CardStatus::Waiting,
            "lido" | "recognized" => CardStatus::Recognized {
                session: id_field(body, &["session_id", "sessao_id"]),
            },
            "negado" | "denied" => CardStatus::Denied,
            _ => CardStatus::Other(tag),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CardStatus::Recognized { .. } | CardStatus::Denied)
    }
}

/// Reply of the lightweight "is a session already running" query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActiveSession {
    pub session: Option<String>,
}

impl ActiveSession {
    /// Only an explicit `"ok": true` with the active flag and an id counts.
    pub fn from_json(body: &Value) -> Self {
        let ok = body.get("ok").and_then(Value::as_bool).unwrap_or(false);
        let active = body
            .get("sessao_ativa")
            .or_else(|| body.get("session_active"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let session = if ok && active {
            id_field(body, &["sessao_id", "session_id"])
        } else {
            None
        };
        Self { session }
    }
}

fn id_field(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match body.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// A rendered page and where it ended up after server redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLoad {
    pub location: String,
    pub markup: String,
}

#[derive(Serialize)]
struct SelectionBody<'a> {
    ferramentas_ids: &'a [ToolId],
}

/// Everything the kiosk asks of the server.
///
/// Calls block; the runtime issues them off the event loop thread.
pub trait KioskApi: Send + Sync {
    fn card_status(&self) -> std::result::Result<CardStatus, Failure>;
    fn active_session(&self) -> std::result::Result<ActiveSession, Failure>;
    fn submit_selection(
        &self,
        flow: Flow,
        session: &str,
        ids: &[ToolId],
    ) -> std::result::Result<Reply, Failure>;
    fn confirm_drawer(
        &self,
        flow: Flow,
        session: &str,
        drawer: &str,
    ) -> std::result::Result<Reply, Failure>;
    fn load_page(&self, location: &str) -> std::result::Result<PageLoad, Failure>;
}

pub struct HttpApi {
    client: Client,
    base_url: String,
    endpoints: EndpointTemplates,
}

impl HttpApi {
    pub fn new(cfg: &KioskConfig) -> Result<Self> {
        Self::with_timeout(
            cfg.server.resolved_base_url(),
            cfg.endpoints.clone(),
            cfg.server.request_timeout(),
        )
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        endpoints: EndpointTemplates,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::msg(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            endpoints,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn read_reply(res: Response) -> std::result::Result<Reply, Failure> {
        let status = res.status().as_u16();
        let body = res
            .text()
            .map_err(|e| Failure::Transport(format!("failed to read response body: {e}")))?;
        tracing::debug!(status, body = %text::for_log(&body), "reply received");
        Ok(Reply { status, body })
    }

    fn get_json(&self, path: &str) -> std::result::Result<Value, Failure> {
        let url = self.url(path);
        let res = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|e| Failure::Transport(e.to_string()))?;
        let reply = Self::read_reply(res)?;
        if !reply.is_success() {
            return Err(Failure::Protocol {
                status: reply.status,
                detail: reply
                    .error_message()
                    .unwrap_or_else(|| format!("GET {path} failed")),
            });
        }
        reply.json().ok_or_else(|| Failure::Protocol {
            status: reply.status,
            detail: format!("GET {path} returned a non-JSON body"),
        })
    }

    fn post_json<B: Serialize>(&self, path: &str, body: &B) -> std::result::Result<Reply, Failure> {
        let url = self.url(path);
        tracing::info!(url = %url, "POST");
        let res = self
            .client
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(body)
            .send()
            .map_err(|e| Failure::Transport(e.to_string()))?;
        Self::read_reply(res)
    }
}

impl KioskApi for HttpApi {
    fn card_status(&self) -> std::result::Result<CardStatus, Failure> {
        let body = self.get_json(&self.endpoints.card_status)?;
        Ok(CardStatus::from_json(&body))
    }

    fn active_session(&self) -> std::result::Result<ActiveSession, Failure> {
        let body = self.get_json(&self.endpoints.active_session)?;
        Ok(ActiveSession::from_json(&body))
    }

    fn submit_selection(
        &self,
        flow: Flow,
        session: &str,
        ids: &[ToolId],
    ) -> std::result::Result<Reply, Failure> {
        let path = self.endpoints.submit_selection(flow, session);
        self.post_json(&path, &SelectionBody { ferramentas_ids: ids })
    }

    fn confirm_drawer(
        &self,
        flow: Flow,
        session: &str,
        drawer: &str,
    ) -> std::result::Result<Reply, Failure> {
        let path = self.endpoints.confirm_drawer(flow, session, drawer);
        self.post_json(&path, &serde_json::json!({}))
    }

    fn load_page(&self, location: &str) -> std::result::Result<PageLoad, Failure> {
        let url = self.url(location);
        let res = self
            .client
            .get(&url)
            .header(ACCEPT, "text/html")
            .send()
            .map_err(|e| Failure::Transport(e.to_string()))?;

        let final_url = res.url();
        let landed = match final_url.query() {
            Some(q) => format!("{}?{}", final_url.path(), q),
            None => final_url.path().to_string(),
        };
        let reply = Self::read_reply(res)?;
        if !reply.is_success() {
            return Err(Failure::Protocol {
                status: reply.status,
                detail: format!("page {location} could not be loaded"),
            });
        }
        Ok(PageLoad {
            location: landed,
            markup: reply.body,
        })
    }
}
