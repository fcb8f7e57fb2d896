//! Minimal echo backend speaking the same HTTP contract as the real chat API.
//!
//! Routing lives in [`Router::handle`], which never touches a socket; the
//! `tiny_http` loop in [`serve`] only moves bytes in and out of it.

use anyhow::Result;
use parley_common::ServerConfig;
use parley_protocol::{ChatRequest, ChatResponse, ErrorBody, StatusBody, WelcomeBody};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiny_http::{Header, Response, Server};
use tracing::{debug, info, warn};

pub const CHAT_PATH: &str = "/api/v1/chat/";
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub headers: Vec<(&'static str, String)>,
}

impl Reply {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        let body = serde_json::to_string(value).unwrap_or_else(|_| String::from("{}"));
        Self {
            status,
            body,
            headers: Vec::new(),
        }
    }

    fn detail(status: u16, detail: impl Into<String>) -> Self {
        Self::json(
            status,
            &ErrorBody {
                detail: detail.into(),
            },
        )
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the oldest counted request leaves the window
    pub reset_secs: u64,
}

/// Sliding one-minute window per client address
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    hits: HashMap<IpAddr, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            window: WINDOW,
            hits: HashMap::new(),
        }
    }

    /// Number of addresses with hits still inside the window
    pub fn tracked_clients(&self) -> usize {
        self.hits.len()
    }

    pub fn check(&mut self, ip: IpAddr, now: Instant) -> RateDecision {
        let window = self.window;
        self.hits.retain(|_, hits| {
            prune(hits, now, window);
            !hits.is_empty()
        });

        let hits = self.hits.entry(ip).or_default();
        let allowed = (hits.len() as u64) < u64::from(self.limit);
        if allowed {
            hits.push_back(now);
        }
        let used = u32::try_from(hits.len()).unwrap_or(u32::MAX);
        let reset_secs = hits
            .front()
            .map(|&oldest| {
                let left = window.saturating_sub(now.saturating_duration_since(oldest));
                left.as_secs() + u64::from(left.subsec_nanos() > 0)
            })
            .unwrap_or(0);
        if hits.is_empty() {
            self.hits.remove(&ip);
        }

        RateDecision {
            allowed,
            limit: self.limit,
            remaining: self.limit.saturating_sub(used),
            reset_secs,
        }
    }
}

fn prune(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = hits.front() {
        if now.saturating_duration_since(oldest) >= window {
            hits.pop_front();
        } else {
            break;
        }
    }
}

pub struct Router {
    limiter: RateLimiter,
    max_message_chars: usize,
}

impl Router {
    pub fn new(rate_limit_per_minute: u32, max_message_chars: usize) -> Self {
        Self {
            limiter: RateLimiter::new(rate_limit_per_minute),
            max_message_chars,
        }
    }

    pub fn handle(&mut self, method: &str, path: &str, body: &str, ip: IpAddr, now: Instant) -> Reply {
        let path = path.split('?').next().unwrap_or(path);
        match (method, path) {
            ("GET", "/") => Reply::json(
                200,
                &WelcomeBody {
                    message: "Welcome to the Chatbot API".to_string(),
                },
            ),
            ("GET", "/health") => Reply::json(
                200,
                &StatusBody {
                    status: "healthy".to_string(),
                },
            ),
            ("POST", CHAT_PATH) | ("POST", "/api/v1/chat") => self.chat(body, ip, now),
            _ => Reply::detail(404, "Not Found"),
        }
    }

    fn chat(&mut self, body: &str, ip: IpAddr, now: Instant) -> Reply {
        let decision = self.limiter.check(ip, now);
        let mut reply = if !decision.allowed {
            warn!(%ip, "rate limit exceeded");
            Reply::detail(
                429,
                format!("Rate limit exceeded: {} per 1 minute", decision.limit),
            )
        } else {
            self.echo(body)
        };

        reply.headers.push(("X-RateLimit-Limit", decision.limit.to_string()));
        reply
            .headers
            .push(("X-RateLimit-Remaining", decision.remaining.to_string()));
        reply
            .headers
            .push(("X-RateLimit-Reset", decision.reset_secs.to_string()));
        reply
    }

    fn echo(&self, body: &str) -> Reply {
        let request: ChatRequest = match serde_json::from_str(body) {
            Ok(request) => request,
            Err(e) => return Reply::detail(422, format!("invalid request body: {e}")),
        };
        if request.message.trim().is_empty() {
            return Reply::detail(422, "message must not be empty");
        }
        let len = request.message.chars().count();
        if len > self.max_message_chars {
            return Reply::detail(
                422,
                format!(
                    "message is {len} characters; at most {} allowed",
                    self.max_message_chars
                ),
            );
        }
        Reply::json(
            200,
            &ChatResponse {
                response: format!("Echo: {}", request.message),
            },
        )
    }
}

fn respond(request: tiny_http::Request, router: &mut Router) -> std::io::Result<()> {
    let mut request = request;
    let mut body = String::new();
    if let Err(e) = request.as_reader().read_to_string(&mut body) {
        debug!("failed to read request body: {e}");
        body.clear();
    }
    let ip = request
        .remote_addr()
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let method = request.method().to_string().to_ascii_uppercase();
    let reply = router.handle(&method, request.url(), &body, ip, Instant::now());
    debug!(%ip, method = %method, url = request.url(), status = reply.status, "handled request");

    let mut response = Response::from_string(reply.body).with_status_code(reply.status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response.add_header(header);
    }
    for (name, value) in reply.headers {
        if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            response.add_header(header);
        }
    }
    request.respond(response)
}

/// Serve until Ctrl+C
pub async fn serve(config: &ServerConfig, max_message_chars: usize) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let server = Arc::new(Server::http(&addr).map_err(|e| anyhow::anyhow!("failed to bind {addr}: {e}"))?);
    info!("echo backend listening on http://{addr}");
    println!("Listening on http://{addr} (Ctrl+C to stop)");

    let mut router = Router::new(config.rate_limit_per_minute, max_message_chars);
    let worker = {
        let server = Arc::clone(&server);
        tokio::task::spawn_blocking(move || {
            for request in server.incoming_requests() {
                if let Err(e) = respond(request, &mut router) {
                    warn!("failed to write response: {e}");
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutting down echo backend");
    server.unblock();
    worker.await?;
    Ok(())
}
