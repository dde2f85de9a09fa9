//! Web surface: a form that drives the pipeline and a results view that
//! pages through generated memes.

use std::io::ErrorKind;
use std::num::NonZeroU16;

use axum::Router;
use axum::body::Body;
use axum::extract::{Form, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use tracing::{error, info};

use crate::config::{ApiCredentials, PipelineConfig};
use crate::error::MemeError;
use crate::pipeline::MemePipeline;

mod images;
mod views;

use images::MemeCacheHeaders;
use views::{IndexTemplate, ResultTemplate};

/// Web form generation is capped so one request cannot monopolize the server.
const MAX_WEB_MEME_COUNT: u32 = 10;

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    config: PipelineConfig,
    keys: ApiCredentials,
}

impl AppState {
    fn new(config: PipelineConfig, keys: ApiCredentials) -> Self {
        // The results view reads files back from disk, so the web surface
        // always saves; interactivity is a CLI-only concern.
        let config = PipelineConfig {
            no_file_save: false,
            ..config
        };
        Self { config, keys }
    }
}

#[derive(Deserialize)]
pub(crate) struct IndexQuery {
    user_prompt: Option<String>,
    meme_count: Option<u32>,
}

#[derive(Deserialize)]
pub(crate) struct GenerateForm {
    user_prompt: String,
    meme_count: Option<u32>,
}

#[derive(Deserialize)]
pub(crate) struct ResultQuery {
    meme_filenames: String,
    #[serde(default)]
    meme_index: i64,
    user_prompt: Option<String>,
    meme_count: Option<u32>,
}

async fn index_handler(Query(query): Query<IndexQuery>) -> IndexTemplate {
    IndexTemplate {
        user_prompt: query.user_prompt.unwrap_or_default(),
        meme_count: query.meme_count.unwrap_or(1).clamp(1, MAX_WEB_MEME_COUNT),
    }
}

async fn generate_handler(
    State(state): State<AppState>,
    Form(form): Form<GenerateForm>,
) -> Result<Redirect, MemeError> {
    let topic = match form.user_prompt.trim() {
        "" => "anything",
        topic => topic,
    };
    let meme_count = form.meme_count.unwrap_or(1).clamp(1, MAX_WEB_MEME_COUNT);

    let pipeline = MemePipeline::new(state.config.clone(), state.keys.clone())?;
    info!("Web request: {meme_count} meme(s) about {topic:?}");
    let artifacts = pipeline.run(topic, meme_count).await?;

    let file_names = artifacts
        .iter()
        .map(|artifact| artifact.file_name.as_str())
        .collect::<Vec<_>>()
        .join(",");
    Ok(Redirect::to(&result_url(
        &file_names,
        topic,
        meme_count,
        0,
    )))
}

async fn result_handler(Query(query): Query<ResultQuery>) -> Result<Response, StatusCode> {
    let file_names: Vec<&str> = query
        .meme_filenames
        .split(',')
        .filter(|name| !name.is_empty())
        .collect();
    if file_names.is_empty() {
        return Ok(Redirect::to("/").into_response());
    }

    // Paging wraps modulo the list length, so Next on the last meme cycles
    // back to the first and Previous on the first cycles to the last.
    let index = query.meme_index.rem_euclid(file_names.len() as i64) as usize;
    let current_meme = file_names[index].to_string();
    let user_prompt = query.user_prompt.unwrap_or_default();
    let meme_count = query.meme_count.unwrap_or(file_names.len() as u32);

    let mut again_query = url::form_urlencoded::Serializer::new(String::new());
    again_query
        .append_pair("user_prompt", &user_prompt)
        .append_pair("meme_count", &meme_count.to_string());
    let again_url = format!("/?{}", again_query.finish());

    Ok(ResultTemplate {
        download_url: format!("/download/{current_meme}"),
        prev_url: result_url(
            &query.meme_filenames,
            &user_prompt,
            meme_count,
            index as i64 - 1,
        ),
        next_url: result_url(
            &query.meme_filenames,
            &user_prompt,
            meme_count,
            index as i64 + 1,
        ),
        again_url,
        current_meme,
        position: index + 1,
        total: file_names.len(),
        user_prompt,
    }
    .into_response())
}

fn result_url(file_names: &str, user_prompt: &str, meme_count: u32, index: i64) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("meme_filenames", file_names)
        .append_pair("user_prompt", user_prompt)
        .append_pair("meme_count", &meme_count.to_string())
        .append_pair("meme_index", &index.to_string());
    format!("/result?{}", query.finish())
}

/// Rejects anything but a bare `.png` file name, so path parameters can
/// never escape the output directory.
fn validate_file_name(name: &str) -> Result<(), StatusCode> {
    let valid = !name.is_empty()
        && !name.contains(['/', '\\'])
        && !name.contains("..")
        && name.ends_with(".png");
    if valid {
        Ok(())
    } else {
        Err(StatusCode::BAD_REQUEST)
    }
}

async fn read_meme_file(state: &AppState, name: &str) -> Result<(Vec<u8>, MemeCacheHeaders), StatusCode> {
    let path = state.config.output_folder.join(name);
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Err(StatusCode::NOT_FOUND),
        Err(err) => {
            error!("Failed to stat {}: {}", path.display(), err);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    let cache = MemeCacheHeaders::from_metadata(&metadata);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok((bytes, cache)),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(StatusCode::NOT_FOUND),
        Err(err) => {
            error!("Failed to read {}: {}", path.display(), err);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn outputs_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_name): Path<String>,
) -> Result<Response, StatusCode> {
    validate_file_name(&file_name)?;
    let (bytes, cache) = read_meme_file(&state, &file_name).await?;
    if cache.not_modified(&headers) {
        return cache.not_modified_response();
    }
    let builder = cache.apply(Response::builder().header(CONTENT_TYPE, "image/png"));
    builder
        .body(Body::from(bytes))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn download_handler(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<Response, StatusCode> {
    validate_file_name(&file_name)?;
    let (bytes, _) = read_meme_file(&state, &file_name).await?;
    Response::builder()
        .header(CONTENT_TYPE, "image/png")
        .header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"meme_{file_name}\""),
        )
        .body(Body::from(bytes))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(CONTENT_TYPE, "text/css")], STYLES)
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            axum::routing::get(index_handler).post(generate_handler),
        )
        .route("/result", axum::routing::get(result_handler))
        .route("/static/styles.css", axum::routing::get(styles_handler))
        .route("/outputs/{file_name}", axum::routing::get(outputs_handler))
        .route("/download/{file_name}", axum::routing::get(download_handler))
}

/// Starts the web server with the validated configuration.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    config: PipelineConfig,
    keys: ApiCredentials,
) -> Result<(), anyhow::Error> {
    let app = create_router().with_state(AppState::new(config, keys));

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn setup_state(output_dir: &std::path::Path) -> AppState {
        let config = PipelineConfig {
            output_folder: output_dir.to_path_buf(),
            ..Default::default()
        };
        AppState::new(config, ApiCredentials::default())
    }

    async fn read_body(response: Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    #[tokio::test]
    async fn index_renders_form_with_prefill() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(setup_state(dir.path()));

        let request = Request::builder()
            .method("GET")
            .uri("/?user_prompt=rust%20memes&meme_count=3")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_body(response).await;
        assert!(body.contains("name=\"user_prompt\""));
        assert!(body.contains("rust memes"));
        assert!(body.contains("value=\"3\""));
    }

    #[tokio::test]
    async fn generate_without_api_key_fails_before_any_network_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(setup_state(dir.path()));

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("user_prompt=rust&meme_count=1"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = read_body(response).await;
        assert!(body.contains("No OpenAI API key found"));
    }

    #[tokio::test]
    async fn result_page_wraps_index_modulo_list_length() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(setup_state(dir.path()));

        // Index 4 over a 3-item list lands on the second item.
        let request = Request::builder()
            .method("GET")
            .uri("/result?meme_filenames=a.png,b.png,c.png&meme_index=4")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_body(response).await;
        assert!(body.contains("/outputs/b.png"));
        assert!(body.contains("Meme 2 of 3"));

        // Previous from the first item wraps to the last.
        let request = Request::builder()
            .method("GET")
            .uri("/result?meme_filenames=a.png,b.png,c.png&meme_index=-1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let body = read_body(response).await;
        assert!(body.contains("/outputs/c.png"));
    }

    #[tokio::test]
    async fn result_page_without_filenames_redirects_home() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(setup_state(dir.path()));

        let request = Request::builder()
            .method("GET")
            .uri("/result?meme_filenames=")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn outputs_serves_png_with_cache_headers_and_304() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = setup_state(dir.path());
        std::fs::write(dir.path().join("x.png"), b"png bytes").expect("seed file");
        let app = create_router().with_state(state);

        let request = Request::builder()
            .method("GET")
            .uri("/outputs/x.png")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "image/png"
        );
        let etag = response
            .headers()
            .get(axum::http::header::ETAG)
            .expect("etag header")
            .clone();

        let request = Request::builder()
            .method("GET")
            .uri("/outputs/x.png")
            .header(axum::http::header::IF_NONE_MATCH, etag)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn missing_output_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(setup_state(dir.path()));

        let request = Request::builder()
            .method("GET")
            .uri("/outputs/missing.png")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn suspicious_file_names_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = create_router().with_state(setup_state(dir.path()));

        for uri in ["/outputs/evil..png", "/outputs/notes.txt", "/download/evil..png"] {
            let request = Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {uri}");
        }
    }

    #[tokio::test]
    async fn download_sets_attachment_disposition() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = setup_state(dir.path());
        std::fs::write(dir.path().join("x.png"), b"png bytes").expect("seed file");
        let app = create_router().with_state(state);

        let request = Request::builder()
            .method("GET")
            .uri("/download/x.png")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"meme_x.png\""
        );
    }

    #[test]
    fn result_urls_are_percent_encoded() {
        let url = result_url("a.png,b.png", "cats & dogs", 2, 1);
        assert!(url.starts_with("/result?"));
        assert!(url.contains("meme_filenames=a.png%2Cb.png"));
        assert!(url.contains("user_prompt=cats+%26+dogs"));
        assert!(url.contains("meme_index=1"));
    }
}
