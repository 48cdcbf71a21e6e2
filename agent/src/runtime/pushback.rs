//! プッシュバック（実APIへの転送）

use axum::{
    body::{Body, Bytes},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::Response,
};
use futures::TryStreamExt;
use std::io;

const HOP_BY_HOP: [header::HeaderName; 4] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::CONTENT_LENGTH,
    header::HOST,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

/// 転送先URLを組み立てる（パスとクエリはそのまま引き継ぐ）
pub(crate) fn target_url(base: &str, parts: &Parts) -> String {
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("{}{}", base.trim_end_matches('/'), path_and_query)
}

/// リクエストを実APIへ転送し、応答をストリームで返す
pub(crate) async fn forward(
    client: &reqwest::Client,
    base: &str,
    parts: &Parts,
    body: Bytes,
) -> Result<Response, reqwest::Error> {
    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);

    let upstream = client
        .request(parts.method.clone(), target_url(base, parts))
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let mut response_headers = upstream.headers().clone();
    strip_hop_by_hop(&mut response_headers);

    let stream = upstream.bytes_stream().map_err(io::Error::other);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK);
    *response.headers_mut() = response_headers;
    Ok(response)
}
