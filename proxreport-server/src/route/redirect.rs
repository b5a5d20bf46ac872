use axum::{
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};

/// Answer every plain HTTP request with a permanent redirect to HTTPS.
pub async fn redirect_to_https(https_port: u16, headers: HeaderMap, uri: Uri) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok());
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());

    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, https_location(host, https_port, path))],
    )
        .into_response()
}

fn https_location(host: Option<&str>, https_port: u16, path: &str) -> String {
    let host = match host.filter(|h| !h.is_empty()) {
        // keep bracketed IPv6 literals intact
        Some(h) if h.starts_with('[') => h.split_inclusive(']').next().unwrap_or(h),
        Some(h) => h.split(':').next().unwrap_or(h),
        None => "localhost",
    };
    let port = if https_port == 443 {
        String::new()
    } else {
        format!(":{https_port}")
    };

    format!("https://{host}{port}{path}")
}
