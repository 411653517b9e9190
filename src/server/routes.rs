//! Method/path dispatch and error-to-status mapping.

use crate::error::Error;
use crate::server::api::{self, ApiError, AppContext};

pub struct HttpResponse {
    pub status_code: u16,
    pub status_text: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    pub fn to_http_string(&self) -> String {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status_code,
            self.status_text,
            self.content_type,
            self.body.len(),
            self.body
        )
    }
}

fn json_response(status_code: u16, status_text: &'static str, body: String) -> HttpResponse {
    HttpResponse {
        status_code,
        status_text,
        content_type: "application/json",
        body,
    }
}

fn error_response(status_code: u16, status_text: &'static str, message: &str) -> HttpResponse {
    json_response(
        status_code,
        status_text,
        format!("{{\"status\": \"error\", \"message\": \"{message}\"}}"),
    )
}

fn api_error_response(err: &ApiError) -> HttpResponse {
    let (status_code, status_text) = match err {
        ApiError::Parse(_) | ApiError::BadQuery(_) => (400, "Bad Request"),
        ApiError::Service(service) => match service {
            Error::NotFound(_) => (404, "Not Found"),
            Error::Unavailable(_) | Error::TransientAbort(_) => (503, "Service Unavailable"),
            Error::Conflict(_) => (409, "Conflict"),
            Error::DeadlineExceeded | Error::Cancelled => (504, "Gateway Timeout"),
            Error::InvalidArgument(_) => (400, "Bad Request"),
            Error::AlreadyExists(_) => (500, "Internal Server Error"),
        },
        ApiError::Encode(_) => (500, "Internal Server Error"),
    };
    error_response(status_code, status_text, &err.to_string())
}

pub fn route_request(ctx: &AppContext, method: &str, path: &str, body: &str) -> HttpResponse {
    let (route, query) = match path.split_once('?') {
        Some((route, query)) => (route, query),
        None => (path, ""),
    };
    match (method, route) {
        ("GET", "/api/health") => match api::health_payload() {
            Ok(payload) => json_response(200, "OK", payload),
            Err(err) => error_response(500, "Internal Server Error", &err.to_string()),
        },
        ("POST", "/api/v1/battles") => match api::battle_payload(ctx, body) {
            Ok(payload) => json_response(201, "Created", payload),
            Err(err) => api_error_response(&err),
        },
        ("GET", "/api/v1/battles/history") => match api::history_payload(ctx, query) {
            Ok(payload) => json_response(200, "OK", payload),
            Err(err) => api_error_response(&err),
        },
        ("DELETE", "/api/v1/battles/history") => match api::delete_history_payload(ctx) {
            Ok(payload) => json_response(200, "OK", payload),
            Err(err) => api_error_response(&err),
        },
        _ => error_response(404, "Not Found", "no such route"),
    }
}
