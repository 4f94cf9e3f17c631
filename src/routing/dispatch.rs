use std::convert::Infallible;
use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::api::{chat, health};
use crate::error::error_payload;
use crate::state::AppState;

const DEFAULT_BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
enum RouteMatch {
    Health,
    Chat,
    MethodNotAllowed,
    NotFound,
}

/// Dispatch a raw HTTP request to the matching handler.
///
/// # Errors
///
/// This function currently never returns `Err` and uses `Infallible`.
pub async fn dispatch_request(
    state: Arc<AppState>,
    base_path: Arc<str>,
    request: Request<Body>,
) -> Result<Response, Infallible> {
    let (parts, body) = request.into_parts();
    let route = match_route(&parts.method, parts.uri.path(), base_path.as_ref());

    let response = match route {
        RouteMatch::Health => health::health_handler(&state).into_response(),
        RouteMatch::Chat => {
            let body_bytes = match read_request_body(body).await {
                Ok(bytes) => bytes,
                Err(response) => return Ok(response),
            };
            chat::handler(state, parts.method, body_bytes).await
        }
        RouteMatch::MethodNotAllowed => (
            StatusCode::METHOD_NOT_ALLOWED,
            axum::Json(error_payload("Method Not Allowed")),
        )
            .into_response(),
        RouteMatch::NotFound => (StatusCode::NOT_FOUND, axum::Json(error_payload("Not Found")))
            .into_response(),
    };

    Ok(response)
}

#[must_use]
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("/{}", trimmed.trim_end_matches('/'))
    }
}

async fn read_request_body(body: Body) -> Result<bytes::Bytes, Response> {
    body::to_bytes(body, DEFAULT_BODY_LIMIT_BYTES)
        .await
        .map_err(|_| {
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                axum::Json(error_payload("Request body too large (max 2MiB)")),
            )
                .into_response()
        })
}

fn match_route(method: &Method, path: &str, base_path: &str) -> RouteMatch {
    let Some(path) = strip_base_path(path, base_path) else {
        return RouteMatch::NotFound;
    };

    match path {
        "/" => {
            if method == Method::GET {
                RouteMatch::Health
            } else {
                RouteMatch::MethodNotAllowed
            }
        }
        // Any method reaches the chat validator, which owns the 405.
        "/api/chat" => RouteMatch::Chat,
        _ => RouteMatch::NotFound,
    }
}

fn strip_base_path<'a>(path: &'a str, base_path: &str) -> Option<&'a str> {
    if base_path.is_empty() {
        return Some(path);
    }

    let suffix = path.strip_prefix(base_path)?;
    if suffix.is_empty() {
        Some("/")
    } else if suffix.starts_with('/') {
        Some(suffix)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_path() {
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path("relay/"), "/relay");
        assert_eq!(normalize_base_path(" /relay/ "), "/relay");
    }

    #[test]
    fn test_match_route() {
        assert_eq!(match_route(&Method::GET, "/", ""), RouteMatch::Health);
        assert_eq!(match_route(&Method::POST, "/", ""), RouteMatch::MethodNotAllowed);
        assert_eq!(match_route(&Method::POST, "/api/chat", ""), RouteMatch::Chat);
        assert_eq!(match_route(&Method::GET, "/api/chat", ""), RouteMatch::Chat);
        assert_eq!(match_route(&Method::POST, "/v1/chat/completions", ""), RouteMatch::NotFound);
    }

    #[test]
    fn test_match_route_under_base_path() {
        assert_eq!(match_route(&Method::GET, "/relay", "/relay"), RouteMatch::Health);
        assert_eq!(
            match_route(&Method::POST, "/relay/api/chat", "/relay"),
            RouteMatch::Chat
        );
        assert_eq!(match_route(&Method::POST, "/api/chat", "/relay"), RouteMatch::NotFound);
        assert_eq!(match_route(&Method::GET, "/relayx", "/relay"), RouteMatch::NotFound);
    }
}
