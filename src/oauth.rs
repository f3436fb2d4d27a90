//! Interactive GitHub OAuth web flow.
//!
//! A single-use HTTP listener is bound to a fixed localhost port, the
//! browser is sent to GitHub's authorize endpoint with a random CSRF
//! `state`, and the returned authorization code is exchanged for a token.
//! The listener accepts exactly one valid callback or times out, then is
//! torn down either way.

use crate::error::AuthError;
use log::{debug, info, warn};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::process::Command;
use std::time::{Duration, Instant};
use uuid::Uuid;

const CALLBACK_PORT: u16 = 8745;
const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const FLOW_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error_description: Option<String>,
}

/// Run the full flow and return an access token.
pub fn authenticate() -> Result<String, AuthError> {
    let client_id = std::env::var("CE_GITHUB_CLIENT_ID").unwrap_or_default();
    let client_secret = std::env::var("CE_GITHUB_CLIENT_SECRET").unwrap_or_default();
    if client_id.is_empty() || client_secret.is_empty() {
        return Err(AuthError::OauthNotConfigured(
            "set CE_GITHUB_CLIENT_ID and CE_GITHUB_CLIENT_SECRET (create an OAuth app with \
             callback http://127.0.0.1:8745/callback), or use GITHUB_TOKEN instead"
                .to_string(),
        ));
    }

    let state = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    let redirect_uri = format!("http://127.0.0.1:{}/callback", CALLBACK_PORT);

    let listener = TcpListener::bind(("127.0.0.1", CALLBACK_PORT))
        .map_err(|e| AuthError::OauthFailed(format!("cannot bind callback port: {}", e)))?;
    listener
        .set_nonblocking(true)
        .map_err(|e| AuthError::OauthFailed(e.to_string()))?;

    let auth_url = format!(
        "{}?client_id={}&redirect_uri={}&scope=repo&state={}",
        AUTHORIZE_URL,
        urlencode(&client_id),
        urlencode(&redirect_uri),
        urlencode(&state),
    );

    info!("opening browser for GitHub authorization");
    println!("If the browser does not open, visit:\n  {}", auth_url);
    open_browser(&auth_url);

    let code = wait_for_callback(&listener, &state)?;
    drop(listener);

    exchange_code(&client_id, &client_secret, &code, &redirect_uri)
}

/// Accept loop with a deadline. Connections with a mismatched `state` fail
/// the attempt outright rather than being ignored, so a forged callback
/// cannot silently race the real one.
fn wait_for_callback(listener: &TcpListener, expected_state: &str) -> Result<String, AuthError> {
    let deadline = Instant::now() + FLOW_TIMEOUT;

    while Instant::now() < deadline {
        match listener.accept() {
            Ok((mut stream, peer)) => {
                debug!("callback connection from {}", peer);
                let mut buf = [0u8; 4096];
                let n = stream.read(&mut buf).unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();

                let target = match request_target(&request) {
                    Some(t) => t,
                    None => {
                        respond(&mut stream, 400, "Malformed request");
                        continue;
                    }
                };

                if !target.starts_with("/callback") {
                    respond(&mut stream, 404, "Not found");
                    continue;
                }

                match parse_callback(&target, expected_state) {
                    Ok(code) => {
                        respond(
                            &mut stream,
                            200,
                            "Authentication successful. You can close this window \
                             and return to the terminal.",
                        );
                        return Ok(code);
                    }
                    Err(e) => {
                        respond(&mut stream, 200, "Authentication failed. Return to the terminal.");
                        return Err(e);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(200));
            }
            Err(e) => {
                return Err(AuthError::OauthFailed(format!("callback accept failed: {}", e)));
            }
        }
    }

    Err(AuthError::OauthTimeout(FLOW_TIMEOUT.as_secs()))
}

/// Extract the authorization code from a callback request target,
/// validating the CSRF state first.
fn parse_callback(target: &str, expected_state: &str) -> Result<String, AuthError> {
    let query = target.splitn(2, '?').nth(1).unwrap_or("");
    let mut code = None;
    let mut state = None;
    let mut error = None;

    for pair in query.split('&') {
        let mut kv = pair.splitn(2, '=');
        let key = kv.next().unwrap_or("");
        let value = kv.next().unwrap_or("");
        match key {
            "code" => code = Some(urldecode(value)),
            "state" => state = Some(urldecode(value)),
            "error" => error = Some(urldecode(value)),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        warn!("rejecting callback with mismatched state");
        return Err(AuthError::StateMismatch);
    }
    if let Some(err) = error {
        return Err(AuthError::OauthFailed(err));
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| AuthError::OauthFailed("no authorization code received".to_string()))
}

fn exchange_code(
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<String, AuthError> {
    let client = reqwest::blocking::Client::new();
    let response = client
        .post(TOKEN_URL)
        .header("Accept", "application/json")
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .send()
        .map_err(|e| AuthError::OauthFailed(format!("token exchange failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(AuthError::OauthFailed(format!(
            "token endpoint returned {}",
            response.status()
        )));
    }

    let parsed: TokenResponse = response
        .json()
        .map_err(|e| AuthError::OauthFailed(format!("bad token response: {}", e)))?;

    parsed.access_token.ok_or_else(|| {
        AuthError::OauthFailed(
            parsed
                .error_description
                .unwrap_or_else(|| "no access token in response".to_string()),
        )
    })
}

fn request_target(request: &str) -> Option<String> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    let method = parts.next()?;
    if method != "GET" {
        return None;
    }
    parts.next().map(String::from)
}

fn respond(stream: &mut std::net::TcpStream, status: u16, message: &str) {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        _ => "Bad Request",
    };
    let body = format!(
        "<html><body style=\"font-family: sans-serif; text-align: center; padding: 50px;\">\
         <p>{}</p></body></html>",
        message
    );
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
}

fn open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    let opener = "open";
    #[cfg(not(target_os = "macos"))]
    let opener = "xdg-open";

    // Best effort; the URL is printed either way.
    let _ = Command::new(opener).arg(url).spawn();
}

fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn urldecode(value: &str) -> String {
    let mut out = Vec::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                if let (Some(hi), Some(lo)) = (
                    bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                    bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
                ) {
                    out.push((hi * 16 + lo) as u8);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_callback_accepts_matching_state() {
        let code = parse_callback("/callback?code=abc123&state=expected", "expected").unwrap();
        assert_eq!(code, "abc123");
    }

    #[test]
    fn test_parse_callback_rejects_mismatched_state() {
        let err = parse_callback("/callback?code=abc123&state=forged", "expected").unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[test]
    fn test_parse_callback_rejects_missing_state() {
        let err = parse_callback("/callback?code=abc123", "expected").unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
    }

    #[test]
    fn test_parse_callback_surfaces_provider_error() {
        let err =
            parse_callback("/callback?error=access_denied&state=expected", "expected").unwrap_err();
        match err {
            AuthError::OauthFailed(msg) => assert_eq!(msg, "access_denied"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_callback_requires_code() {
        let err = parse_callback("/callback?state=expected", "expected").unwrap_err();
        assert!(matches!(err, AuthError::OauthFailed(_)));
    }

    #[test]
    fn test_request_target_parsing() {
        let req = "GET /callback?code=x&state=y HTTP/1.1\r\nHost: localhost\r\n\r\n";
        assert_eq!(
            request_target(req).as_deref(),
            Some("/callback?code=x&state=y")
        );
        assert_eq!(request_target("POST /callback HTTP/1.1\r\n"), None);
        assert_eq!(request_target(""), None);
    }

    #[test]
    fn test_urlencode_roundtrip() {
        let original = "http://127.0.0.1:8745/callback";
        let encoded = urlencode(original);
        assert!(!encoded.contains(':'));
        assert!(!encoded.contains('/'));
        assert_eq!(urldecode(&encoded), original);
    }

    #[test]
    fn test_urldecode_plus_as_space() {
        assert_eq!(urldecode("a+b"), "a b");
        assert_eq!(urldecode("%2Fpath"), "/path");
    }
}
