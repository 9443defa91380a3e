//! Getting the OAuth verifier back from the browser.
//!
//! [`CallbackVerifier`] serves `/callback` on localhost until the provider
//! redirects there, and falls back to asking for the URL on stdin.
//! [`ManualVerifier`] only asks.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use tracing::{debug, warn};

use larder_core::Error;
use larder_core::verifier::{
    Authorization, AuthorizeRequest, VerifierResolver, VerifierSlot, VerifierSource,
};

pub const DEFAULT_WAIT: Duration = Duration::from_secs(300);
const MANUAL_ATTEMPTS: usize = 3;

const SUCCESS_PAGE: &str = r"<!DOCTYPE html>
<html>
<head><title>larder</title></head>
<body>
<h1>Authorization received</h1>
<p>You can close this window and return to the terminal.</p>
</body>
</html>";

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("cache-control", HeaderValue::from_static("no-store"));
    response
}

async fn callback(
    State(resolver): State<VerifierResolver>,
    Query(authorization): Query<Authorization>,
) -> Response {
    if resolver.resolve(authorization) {
        debug!("Verifier received on callback");
        Html(SUCCESS_PAGE).into_response()
    } else {
        (StatusCode::CONFLICT, "Authorization was already received").into_response()
    }
}

pub fn router(resolver: VerifierResolver) -> Router {
    Router::new()
        .route("/callback", get(callback))
        .layer(middleware::from_fn(security_headers))
        .with_state(resolver)
}

/// Parse one line of user input: a pasted callback URL, or a bare verifier
/// code for the out-of-band flow.
fn parse_input(line: &str, request_token: &str) -> Option<Authorization> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.contains("oauth_verifier=") {
        return Authorization::from_callback_url(line);
    }
    if line.contains(['?', '=', '/', ' ']) {
        return None;
    }
    Some(Authorization {
        oauth_token: request_token.to_string(),
        oauth_verifier: line.to_string(),
    })
}

fn read_authorization(
    input: &mut impl BufRead,
    request_token: &str,
) -> larder_core::Result<Authorization> {
    for _ in 0..MANUAL_ATTEMPTS {
        eprint!("Paste the URL you were redirected to (or the verifier code): ");
        io::stderr().flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        match parse_input(&line, request_token) {
            Some(authorization) => return Ok(authorization),
            None => eprintln!("That does not contain oauth_token and oauth_verifier."),
        }
    }
    Err(Error::AuthFlow("no verifier was entered".to_string()))
}

fn show_authorize_url(request: &AuthorizeRequest) {
    println!("Open this URL in your browser and approve access:\n\n  {}\n", request.url);
}

/// Asks for the verifier on stdin.
pub struct ManualVerifier;

impl VerifierSource for ManualVerifier {
    fn obtain(&self, request: &AuthorizeRequest) -> larder_core::Result<Authorization> {
        show_authorize_url(request);
        read_authorization(&mut io::stdin().lock(), &request.request_token)
    }
}

/// Waits for the provider's redirect on a local port.
pub struct CallbackVerifier {
    rt: tokio::runtime::Handle,
    port: u16,
    wait: Duration,
}

impl CallbackVerifier {
    pub fn new(rt: tokio::runtime::Handle, port: u16) -> Self {
        Self {
            rt,
            port,
            wait: DEFAULT_WAIT,
        }
    }
}

impl VerifierSource for CallbackVerifier {
    fn obtain(&self, request: &AuthorizeRequest) -> larder_core::Result<Authorization> {
        let slot = VerifierSlot::new();
        let app = router(slot.resolver());

        let server = match self
            .rt
            .block_on(tokio::net::TcpListener::bind(("127.0.0.1", self.port)))
        {
            Ok(listener) => Some(self.rt.spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    warn!(error = %e, "Callback listener stopped");
                }
            })),
            Err(e) => {
                warn!(port = self.port, error = %e, "Could not start callback listener");
                None
            }
        };

        show_authorize_url(request);
        let received = if server.is_some() {
            eprintln!(
                "Waiting for the redirect to http://localhost:{}/callback (timeout: {} minutes)...",
                self.port,
                self.wait.as_secs() / 60
            );
            slot.wait(self.wait)
        } else {
            None
        };

        if let Some(server) = server {
            server.abort();
        }

        match received {
            Some(authorization) => Ok(authorization),
            None => {
                eprintln!("No redirect received.");
                read_authorization(&mut io::stdin().lock(), &request.request_token)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn callback_resolves_slot() {
        let slot = VerifierSlot::new();
        let app = router(slot.resolver());

        let response = app
            .oneshot(
                axum::http::Request::get("/callback?oauth_token=req&oauth_verifier=123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("Authorization received"));

        let authorization = slot.try_take().unwrap();
        assert_eq!(authorization.oauth_token, "req");
        assert_eq!(authorization.oauth_verifier, "123");
    }

    #[tokio::test]
    async fn callback_without_verifier_is_rejected() {
        let slot = VerifierSlot::new();
        let app = router(slot.resolver());

        let response = app
            .oneshot(
                axum::http::Request::get("/callback?oauth_token=req")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(slot.try_take().is_none());
    }

    #[tokio::test]
    async fn second_callback_conflicts() {
        let slot = VerifierSlot::new();
        let app = router(slot.resolver());
        let request = || {
            axum::http::Request::get("/callback?oauth_token=req&oauth_verifier=1")
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.oneshot(request()).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_parse_input() {
        let pasted = parse_input(
            "http://localhost:8080/callback?oauth_token=req&oauth_verifier=42\n",
            "req",
        )
        .unwrap();
        assert_eq!(pasted.oauth_verifier, "42");

        let code = parse_input("  987654 ", "req").unwrap();
        assert_eq!(code.oauth_token, "req");
        assert_eq!(code.oauth_verifier, "987654");

        assert!(parse_input("", "req").is_none());
        assert!(parse_input("http://localhost:8080/callback?oauth_token=req", "req").is_none());
    }

    #[test]
    fn test_read_authorization_retries() {
        let mut input = io::Cursor::new("\nhttp://x/callback?nothing=here\n555\n");
        let authorization = read_authorization(&mut input, "req").unwrap();
        assert_eq!(authorization.oauth_verifier, "555");
    }

    #[test]
    fn test_read_authorization_gives_up() {
        let mut input = io::Cursor::new("");
        assert!(matches!(
            read_authorization(&mut input, "req"),
            Err(Error::AuthFlow(_))
        ));
    }
}
