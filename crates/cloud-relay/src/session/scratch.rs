//! Scratch cloud-variable transport.
//!
//! Login goes through the site's JSON login endpoint and yields a session
//! cookie. The cloud connection is a websocket carrying newline-delimited
//! JSON: one `handshake` line after connecting, then `set` lines in both
//! directions.
//!
//! ```text
//! → {"method":"handshake","user":"relay_bot","project_id":"123"}
//! ← {"method":"set","name":"☁ Public.QueueIDc","value":"17"}
//! → {"method":"set","user":"relay_bot","project_id":"123","name":"☁ Public.Requestidkc","value":"0721"}
//! ```
//!
//! The server does not echo our own writes, so `set` also updates the local
//! cache. There is no reconnect: once the socket drops, writes fail with
//! [`SessionError::Closed`] until the process is restarted.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue, Request};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{validate_value, CloudSession, SessionError, SessionEvent, SessionEventSender, SessionEvents};

pub const LOGIN_URL: &str = "https://scratch.mit.edu/login/";
pub const CLOUD_URL: &str = "wss://clouddata.scratch.mit.edu";
pub const SITE_ORIGIN: &str = "https://scratch.mit.edu";

/// Prefix the platform puts on every cloud variable name.
pub const CLOUD_PREFIX: &str = "☁ ";

const SESSION_COOKIE: &str = "scratchsessionsid";

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("login request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("login rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("login response carried no session cookie")]
    MissingSessionCookie,
}

#[derive(Clone)]
pub struct ScratchCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ScratchCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// An authenticated account, ready to open cloud sessions.
#[derive(Clone)]
pub struct ScratchLogin {
    pub username: String,
    session_id: String,
}

impl ScratchLogin {
    pub fn new(username: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Debug for ScratchLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchLogin")
            .field("username", &self.username)
            .field("session_id", &"<redacted>")
            .finish()
    }
}

/// Log in and capture the session cookie.
pub async fn login(
    client: &reqwest::Client,
    credentials: &ScratchCredentials,
) -> Result<ScratchLogin, LoginError> {
    let body = serde_json::json!({
        "username": credentials.username,
        "password": credentials.password,
        "useMessages": true,
    });

    let response = client
        .post(LOGIN_URL)
        .header("X-CSRFToken", "a")
        .header("X-Requested-With", "XMLHttpRequest")
        .header(reqwest::header::REFERER, SITE_ORIGIN)
        .header(
            reqwest::header::COOKIE,
            "scratchcsrftoken=a; scratchlanguage=en",
        )
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    let cookies: Vec<String> = response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect();

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(LoginError::Rejected {
            status: status.as_u16(),
            message: login_message(&text).unwrap_or(text),
        });
    }

    match session_id_from_cookies(cookies.iter().map(String::as_str)) {
        Some(session_id) => Ok(ScratchLogin {
            username: credentials.username.clone(),
            session_id,
        }),
        None => {
            let text = response.text().await.unwrap_or_default();
            match login_message(&text) {
                Some(message) => Err(LoginError::Rejected {
                    status: status.as_u16(),
                    message,
                }),
                None => Err(LoginError::MissingSessionCookie),
            }
        }
    }
}

/// Find the session id among `Set-Cookie` header values.
pub fn session_id_from_cookies<'a>(cookies: impl IntoIterator<Item = &'a str>) -> Option<String> {
    cookies.into_iter().find_map(|cookie| {
        let value = cookie.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('=')?;
        let value = value.split(';').next().unwrap_or_default().trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// The `msg` of a failed login, when the body is the usual `[{"msg": ...}]`.
fn login_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json[0]["msg"]
        .as_str()
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

type VarCache = Arc<RwLock<HashMap<String, String>>>;

/// A live cloud connection for one project.
pub struct ScratchSession {
    username: String,
    project_id: String,
    vars: VarCache,
    outbound: mpsc::UnboundedSender<String>,
}

impl ScratchSession {
    /// Start connecting to the project's cloud variables.
    ///
    /// Returns immediately; the socket is opened in a background task that
    /// reports [`SessionEvent::Open`] once the handshake has been sent.
    pub fn connect(
        login: &ScratchLogin,
        project_id: &str,
    ) -> Result<(Self, SessionEvents), SessionError> {
        let request = cloud_request(login)?;
        let handshake = handshake_line(&login.username, project_id);

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let vars: VarCache = Arc::new(RwLock::new(HashMap::new()));

        tokio::spawn(run_socket(
            request,
            handshake,
            Arc::clone(&vars),
            outbound_rx,
            events_tx,
        ));

        let session = Self {
            username: login.username.clone(),
            project_id: project_id.to_string(),
            vars,
            outbound,
        };
        Ok((session, events_rx))
    }
}

#[async_trait]
impl CloudSession for ScratchSession {
    fn get(&self, name: &str) -> Option<String> {
        self.vars
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), SessionError> {
        validate_value(name, value)?;
        let line = set_line(&self.username, &self.project_id, name, value);
        self.outbound.send(line).map_err(|_| SessionError::Closed)?;
        self.vars
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}

fn cloud_request(login: &ScratchLogin) -> Result<Request<()>, SessionError> {
    let mut request = CLOUD_URL
        .into_client_request()
        .map_err(|e| SessionError::Connect(e.to_string()))?;
    let cookie = HeaderValue::from_str(&format!("{SESSION_COOKIE}={}", login.session_id))
        .map_err(|e| SessionError::Connect(e.to_string()))?;
    let headers = request.headers_mut();
    headers.insert(header::COOKIE, cookie);
    headers.insert(header::ORIGIN, HeaderValue::from_static(SITE_ORIGIN));
    Ok(request)
}

pub fn handshake_line(username: &str, project_id: &str) -> String {
    let json = serde_json::json!({
        "method": "handshake",
        "user": username,
        "project_id": project_id,
    });
    format!("{json}\n")
}

pub fn set_line(username: &str, project_id: &str, name: &str, value: &str) -> String {
    let json = serde_json::json!({
        "method": "set",
        "user": username,
        "project_id": project_id,
        "name": format!("{CLOUD_PREFIX}{name}"),
        "value": value,
    });
    format!("{json}\n")
}

/// Parse a websocket frame into `(name, value)` updates.
///
/// Frames hold one JSON object per line. Non-`set` methods and unparseable
/// lines are skipped. Names lose the cloud prefix. Numeric JSON values keep
/// their exact digits (serde_json `arbitrary_precision`); numbers that are not
/// plain non-negative integers are skipped with a warning.
pub fn parse_updates(frame: &str) -> Vec<(String, String)> {
    frame
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let json: serde_json::Value = match serde_json::from_str(line) {
                Ok(json) => json,
                Err(e) => {
                    debug!(error = %e, "Skipping unparseable cloud line");
                    return None;
                }
            };
            if json["method"].as_str() != Some("set") {
                return None;
            }
            let raw_name = json["name"].as_str()?;
            let name = raw_name.strip_prefix(CLOUD_PREFIX).unwrap_or(raw_name);
            let value = match &json["value"] {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => {
                    let digits = n.to_string();
                    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                        warn!(%name, value = %digits, "Skipping non-integer cloud value");
                        return None;
                    }
                    digits
                }
                _ => return None,
            };
            Some((name.to_string(), value))
        })
        .collect()
}

fn apply_updates(vars: &VarCache, frame: &str) {
    let updates = parse_updates(frame);
    let mut cache = vars.write().unwrap_or_else(PoisonError::into_inner);
    for (name, value) in updates {
        debug!(%name, %value, "Cloud update");
        cache.insert(name, value);
    }
}

async fn run_socket(
    request: Request<()>,
    handshake: String,
    vars: VarCache,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: SessionEventSender,
) {
    let (ws_stream, _) = match tokio_tungstenite::connect_async(request).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "Cloud connection failed");
            let _ = events.send(SessionEvent::Error(e.to_string()));
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();

    if let Err(e) = write.send(Message::Text(handshake)).await {
        warn!(error = %e, "Cloud handshake failed");
        let _ = events.send(SessionEvent::Error(e.to_string()));
        return;
    }
    info!("Cloud session open");
    let _ = events.send(SessionEvent::Open);

    loop {
        tokio::select! {
            line = outbound.recv() => {
                match line {
                    Some(line) => {
                        if let Err(e) = write.send(Message::Text(line)).await {
                            warn!(error = %e, "Cloud write failed");
                            let _ = events.send(SessionEvent::Error(e.to_string()));
                            break;
                        }
                    }
                    // Session handle dropped.
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(frame))) => apply_updates(&vars, &frame),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Cloud session closed by server");
                        let _ = events.send(SessionEvent::Closed);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Cloud read failed");
                        let _ = events.send(SessionEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
        }
    }
}
