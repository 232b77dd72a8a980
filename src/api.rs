use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use mime_guess::MimeGuess;
use serde_json::json;
use tracing::{error, info};

use crate::{
    app_state::AppState,
    assemble, compose, extract,
    models::{Deadline, Report, Tone, UploadedFile},
    search,
};

/// Límite del cuerpo multipart; por encima, axum rechaza la subida.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Tope de resultados web conservados por consulta.
const MAX_RESULTS_PER_QUERY: usize = 5;

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/generate-report", post(generate_report_handler))
        .route("/api/health", get(health_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state)
}

// --- Payload de la petición ---

/// Envío multipart ya interpretado: ficheros, título libre, tono y si se
/// pidió aumento web.
struct Submission {
    title: String,
    tone: Tone,
    web_search: bool,
    files: Vec<UploadedFile>,
}

async fn read_submission(mut multipart: Multipart) -> anyhow::Result<Submission> {
    let mut submission = Submission {
        title: String::new(),
        tone: Tone::Neutral,
        web_search: false,
        files: Vec::new(),
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => submission.title = field.text().await?,
            "tone" => submission.tone = Tone::parse(&field.text().await?),
            "webSearch" => submission.web_search = field.text().await? == "true",
            "files" => {
                let filename = field
                    .file_name()
                    .filter(|n| !n.is_empty())
                    .unwrap_or("document")
                    .to_string();
                let declared = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?.to_vec();
                // El tipo declarado no es fiable y puede faltar; se completa
                // con una conjetura por extensión.
                let media_type = declared
                    .or_else(|| MimeGuess::from_path(&filename).first().map(|m| m.to_string()));
                submission.files.push(UploadedFile { filename, media_type, bytes });
            }
            _ => {}
        }
    }

    Ok(submission)
}

// --- Handlers ---

/// Tubería completa de una petición de informe: extracción → aumento web
/// opcional → composición por niveles → ensamblado final. Sólo la ausencia
/// de ficheros es un fallo visible; todo lo demás degrada en silencio a un
/// informe de menor fidelidad.
#[axum::debug_handler]
async fn generate_report_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Report>, (StatusCode, String)> {
    let submission = read_submission(multipart).await.map_err(|e| {
        error!("Multipart inválido: {e}");
        (StatusCode::BAD_REQUEST, format!("Invalid form submission: {e}"))
    })?;

    // Error de entrada: ninguna capacidad de generación ni de búsqueda se
    // invoca antes de esta comprobación.
    if submission.files.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No files uploaded".to_string()));
    }

    info!(
        "Generando informe: {} ficheros, tono {}, búsqueda web: {}",
        submission.files.len(),
        submission.tone,
        submission.web_search
    );

    let deadline = Deadline::within(Duration::from_secs(state.config.request_timeout_secs));

    let extraction = extract::extract(
        &state,
        &submission.files,
        submission.tone,
        &submission.title,
        deadline,
    )
    .await;

    let mut web = Vec::new();
    if submission.web_search && !extraction.payload().suggested_search_queries.is_empty() {
        web = search::search(
            &state.http,
            state.config.serp_api_key.as_deref(),
            &extraction.payload().suggested_search_queries,
            MAX_RESULTS_PER_QUERY,
            deadline,
        )
        .await;
    }

    let draft = compose::compose(
        &state,
        &extraction,
        &web,
        submission.tone,
        &submission.title,
        &submission.files,
        deadline,
    )
    .await;

    let report = assemble::assemble(
        draft,
        &submission.files,
        &submission.title,
        submission.tone,
        submission.web_search,
    );

    Ok(Json(report))
}

#[axum::debug_handler]
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
