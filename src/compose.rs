//! Etapa de composición: tres niveles candidatos probados en orden, gana el
//! primero que produce un borrador estructuralmente válido. Sin reintentos
//! dentro de un nivel y como mucho un intento por nivel. El nivel
//! determinista no puede fallar, así que la etapa entera tampoco.

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::extract::Extraction;
use crate::groq::{self, GroqOptions, GroqReference, GroqReport};
use crate::llm;
use crate::models::{
    Deadline, Reference, Report, ReportMetadata, ReportSection, Tone, UploadedFile,
};
use crate::normalize;
use crate::search::QueryFindings;

/// Presupuesto mayor de texto documental para el anclaje del nivel secundario.
const GROUNDING_DOC_CHARS: usize = 20_000;

/// Tope de referencias conservadas en el borrador.
const MAX_REFERENCES: usize = 8;

pub const DEFAULT_TITLE: &str = "Automated Report";

/// Etiqueta de metadatos que marca un informe cuyo contenido salió de la
/// ruta degradada de extracción.
const FALLBACK_TAG: &str = "ai-fallback";

/// Compone el borrador del informe final. Nunca falla.
pub async fn compose(
    state: &AppState,
    extraction: &Extraction,
    web: &[QueryFindings],
    tone: Tone,
    title: &str,
    files: &[UploadedFile],
    deadline: Deadline,
) -> Report {
    // Nivel 1: proveedor secundario, activo sólo con credencial configurada.
    if let Some(api_key) = state.config.groq_api_key.as_deref() {
        match secondary_tier(state, api_key, extraction, web, tone, title, files, deadline).await
        {
            Ok(report) => {
                info!("Borrador compuesto por el nivel secundario.");
                return report;
            }
            Err(e) => warn!("Nivel secundario fallido: {e}. Se intenta el primario."),
        }
    }

    // Nivel 2: generación estructurada contra el proveedor primario.
    match primary_tier(state, extraction, web, tone, deadline).await {
        Ok(report) => {
            info!("Borrador compuesto por el nivel primario.");
            return report;
        }
        Err(e) => warn!("Nivel primario fallido: {e}. Se usa el ensamblado determinista."),
    }

    // Nivel 3: ensamblado determinista, siempre disponible.
    info!("Borrador compuesto por el nivel determinista.");
    deterministic_tier(extraction, web, tone, title)
}

#[allow(clippy::too_many_arguments)]
async fn secondary_tier(
    state: &AppState,
    api_key: &str,
    extraction: &Extraction,
    web: &[QueryFindings],
    tone: Tone,
    title: &str,
    files: &[UploadedFile],
    deadline: Deadline,
) -> Result<Report> {
    let doc_text = normalize::normalize_to_text(files, GROUNDING_DOC_CHARS);

    let findings_json;
    let serp_findings = if web.is_empty() {
        None
    } else {
        findings_json = serde_json::to_string_pretty(web)?;
        Some(findings_json.as_str())
    };

    let tone_str = tone.to_string();
    let opts = GroqOptions {
        doc_text: &doc_text,
        serp_findings,
        tone: &tone_str,
        title,
    };

    let draft =
        groq::compose_report(&state.http, api_key, &state.config.groq_model, &opts, deadline)
            .await?;

    Ok(report_from_groq(draft, extraction, tone, title))
}

/// Traduce la respuesta de Groq a la forma canónica del informe: cada
/// `{title, content}` se pliega en una sección de un solo párrafo y las
/// referencias aceptan cadena suelta o par {title, url}.
fn report_from_groq(
    draft: GroqReport,
    extraction: &Extraction,
    tone: Tone,
    title: &str,
) -> Report {
    let payload = extraction.payload();

    let references = draft
        .references
        .into_iter()
        .take(MAX_REFERENCES)
        .map(|r| match r {
            GroqReference::Text(s) => Reference {
                title: Some(s.clone()),
                url: Some(s),
                source: None,
            },
            GroqReference::Link { title, url } => Reference { title, url, source: None },
        })
        .collect();

    let sections = draft
        .sections
        .into_iter()
        .map(|s| ReportSection {
            heading: s.title.or(s.heading).unwrap_or_default(),
            paragraphs: match s.content {
                Some(content) => vec![content],
                None => s.paragraphs.unwrap_or_default(),
            },
            table: None,
        })
        .collect();

    let metadata = payload.tags.clone().map(|tags| ReportMetadata {
        tags: Some(tags),
        ..Default::default()
    });

    Report {
        title: pick_title(&[
            draft.title.as_str(),
            title,
            payload.suggested_title.as_deref().unwrap_or_default(),
        ]),
        tone,
        generated_at: Utc::now().to_rfc3339(),
        metadata,
        executive_summary: (!draft.executive_summary.trim().is_empty())
            .then_some(draft.executive_summary),
        sections,
        charts: Vec::new(),
        references,
    }
}

async fn primary_tier(
    state: &AppState,
    extraction: &Extraction,
    web: &[QueryFindings],
    tone: Tone,
    deadline: Deadline,
) -> Result<Report> {
    let payload = extraction.payload();
    let context = json!({
        "suggestedTitle": payload.suggested_title,
        "author": payload.author,
        "stakeholder": payload.stakeholder,
        "tags": payload.tags,
        "executiveSummary": payload.executive_summary,
        "sections": payload.sections,
        "charts": payload.charts,
    });

    let prompt = format!(
        "Compose a final report with these constraints:\n\
         - Title: Prefer the user's provided title, else use suggestedTitle.\n\
         - Include metadata, executive summary, 3-6 sections, and concise references.\n\
         - If web results are provided, integrate them with brief attributions and links.\n\
         - Do not invent facts; cite sources explicitly.\n\
         - Keep writing tone: {tone}.\n\
         Return structured JSON only per this schema:\n{schema}\n\n\
         Extracted (from files):\n{extracted}\n\n\
         Web Search (SERP) Results:\n{web_results}\n",
        schema = llm::schema_text::<Report>(),
        extracted = serde_json::to_string_pretty(&context)?,
        web_results = serde_json::to_string_pretty(web)?,
    );

    let report: Report =
        llm::generate_structured(&state.config, &prompt, Some(3000), deadline).await?;
    Ok(report)
}

/// Nivel determinista: el informe sale tal cual de la representación
/// intermedia, con los primeros resultados web aplanados como referencias.
fn deterministic_tier(
    extraction: &Extraction,
    web: &[QueryFindings],
    tone: Tone,
    title: &str,
) -> Report {
    let payload = extraction.payload();

    let references: Vec<Reference> = web
        .iter()
        .flat_map(|q| q.results.iter())
        .take(MAX_REFERENCES)
        .map(|hit| Reference {
            title: Some(hit.title.clone()),
            url: Some(hit.link.clone()),
            source: None,
        })
        .collect();

    let mut tags = payload.tags.clone().unwrap_or_default();
    if extraction.is_degraded() {
        tags.push(FALLBACK_TAG.to_string());
    }

    Report {
        title: pick_title(&[title, payload.suggested_title.as_deref().unwrap_or_default()]),
        tone,
        generated_at: Utc::now().to_rfc3339(),
        metadata: (!tags.is_empty()).then(|| ReportMetadata {
            tags: Some(tags),
            ..Default::default()
        }),
        executive_summary: Some(if payload.executive_summary.trim().is_empty() {
            "This is a minimal report generated without external AI assistance.".to_string()
        } else {
            payload.executive_summary.clone()
        }),
        sections: payload.sections.clone(),
        charts: payload.charts.clone(),
        references,
    }
}

fn pick_title(candidates: &[&str]) -> String {
    candidates
        .iter()
        .find(|c| !c.trim().is_empty())
        .map(|c| c.to_string())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string())
}
