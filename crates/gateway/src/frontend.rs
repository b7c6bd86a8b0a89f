//! The chat page served at `/`.
//!
//! `frontend/` is one page: it signs the tab in through `/v1/session`, lists
//! the user's chambers, and follows `/v1/events` to reread the open
//! transcript. The files are compiled in, so `lexchamber serve` needs no
//! asset directory.

use axum::{
    Router,
    extract::Path,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};

const CHAT_PAGE: &str = include_str!("../../../frontend/index.html");

/// Files the page loads from `/static/`, with their content types.
const ASSETS: &[(&str, &str, &str)] = &[
    (
        "app.js",
        "application/javascript; charset=utf-8",
        include_str!("../../../frontend/app.js"),
    ),
    (
        "style.css",
        "text/css; charset=utf-8",
        include_str!("../../../frontend/style.css"),
    ),
];

pub fn frontend_router() -> Router {
    Router::new()
        .route("/", get(chat_page))
        .route("/static/{file}", get(static_asset))
}

async fn chat_page() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

async fn static_asset(Path(file): Path<String>) -> Response {
    match ASSETS.iter().find(|(name, _, _)| *name == file) {
        Some((_, content_type, body)) => (
            [
                (header::CONTENT_TYPE, *content_type),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            *body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get_text(uri: &str) -> (StatusCode, Option<String>, String) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = frontend_router().oneshot(req).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn chat_page_loads_script_and_styles() {
        let (status, _, page) = get_text("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(page.contains("<!DOCTYPE html>"));
        assert!(page.contains("LexChamber"));
        assert!(page.contains("/static/app.js"));
        assert!(page.contains("/static/style.css"));
    }

    #[tokio::test]
    async fn assets_carry_their_content_type() {
        let (status, content_type, _) = get_text("/static/style.css").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().contains("text/css"));

        let (status, content_type, script) = get_text("/static/app.js").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().contains("javascript"));
        assert!(script.contains("/v1/chambers"));
        assert!(script.contains("EventSource"));
    }

    #[tokio::test]
    async fn script_keeps_unsaved_replies() {
        let (_, _, script) = get_text("/static/app.js").await;
        assert!(script.contains("result.recorded === false"));
        assert!(script.contains("showUnsaved"));
    }

    #[tokio::test]
    async fn unknown_asset_is_not_found() {
        let (status, _, _) = get_text("/static/config.toml").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
