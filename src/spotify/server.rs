//! One-shot local HTTP listener that catches the OAuth redirect

use std::time::{Duration, Instant};

use tiny_http::{Request, Response, Server};
use url::Url;

use super::SpotifyError;

#[derive(Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code(String),
    Denied(String),
    /// Not the redirect (favicon and friends)
    Ignored,
}

/// Interprets one request path + query against the redirect URI.
pub fn parse_callback(
    request_url: &str,
    redirect_path: &str,
    expected_state: &str,
) -> Result<CallbackOutcome, SpotifyError> {
    let url = Url::parse("http://localhost")?.join(request_url)?;
    if url.path() != redirect_path {
        return Ok(CallbackOutcome::Ignored);
    }

    let mut code = None;
    let mut error = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }

    if code.is_none() && error.is_none() {
        return Ok(CallbackOutcome::Ignored);
    }
    if state.as_deref() != Some(expected_state) {
        return Err(SpotifyError::Auth("OAuth state mismatch".to_string()));
    }

    match (code, error) {
        (_, Some(error)) => Ok(CallbackOutcome::Denied(error)),
        (Some(code), None) => Ok(CallbackOutcome::Code(code)),
        (None, None) => Ok(CallbackOutcome::Ignored),
    }
}

fn respond(request: Request, status: u16, body: &str) {
    let response = Response::from_string(body).with_status_code(status);
    if let Err(e) = request.respond(response) {
        tracing::debug!("Failed to answer OAuth callback: {}", e);
    }
}

/// Blocks until Spotify redirects back with a code, or `timeout` passes.
pub fn wait_for_code(
    redirect_uri: &Url,
    expected_state: &str,
    timeout: Duration,
) -> Result<String, SpotifyError> {
    let host = redirect_uri
        .host_str()
        .ok_or_else(|| SpotifyError::Auth(format!("Redirect URI has no host: {redirect_uri}")))?;
    let port = redirect_uri
        .port_or_known_default()
        .ok_or_else(|| SpotifyError::Auth(format!("Redirect URI has no port: {redirect_uri}")))?;

    let server = Server::http((host, port))
        .map_err(|e| SpotifyError::Auth(format!("Failed to listen on {host}:{port}: {e}")))?;
    tracing::info!("Waiting for Spotify authorization on {}:{}", host, port);

    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SpotifyError::Auth(
                "Timed out waiting for the Spotify authorization redirect".to_string(),
            ));
        }

        let Some(request) = server.recv_timeout(remaining)? else {
            continue;
        };

        match parse_callback(request.url(), redirect_uri.path(), expected_state) {
            Ok(CallbackOutcome::Code(code)) => {
                respond(request, 200, "Spotify connected. You can close this tab.");
                return Ok(code);
            }
            Ok(CallbackOutcome::Denied(reason)) => {
                respond(request, 200, "Spotify authorization was denied.");
                return Err(SpotifyError::Auth(format!("Access denied: {reason}")));
            }
            Ok(CallbackOutcome::Ignored) => respond(request, 404, "Not found"),
            Err(e) => {
                respond(request, 400, "Invalid authorization response.");
                return Err(e);
            }
        }
    }
}
