//! Etapa de extracción: convierte los ficheros crudos en una representación
//! intermedia (resumen, secciones, gráficas propuestas, consultas de
//! búsqueda sugeridas). Ruta primaria vía la capacidad de generación; si
//! falla por lo que sea, ruta determinista construida con el normalizador.

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::llm;
use crate::models::{ChartSpec, Deadline, ReportSection, Tone, UploadedFile};
use crate::normalize;

/// Presupuesto del extracto de texto de la ruta determinista.
const FALLBACK_EXCERPT_CHARS: usize = 1500;

/// Representación intermedia: estructurada pero sin pulir, la consume la
/// etapa de composición.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct IntermediateReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stakeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    pub executive_summary: String,
    pub sections: Vec<ReportSection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<ChartSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggested_search_queries: Vec<String>,
}

/// Resultado de la etapa, como variante etiquetada: la misma carga útil,
/// pero imposible de consumir sin saber si vino de una extracción genuina o
/// de la ruta degradada.
#[derive(Debug, Clone)]
pub enum Extraction {
    Extracted(IntermediateReport),
    Degraded(IntermediateReport),
}

impl Extraction {
    pub fn payload(&self) -> &IntermediateReport {
        match self {
            Self::Extracted(payload) | Self::Degraded(payload) => payload,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}

/// Extrae la representación intermedia de los ficheros. Nunca falla: todo
/// error de la ruta primaria degrada a la determinista.
pub async fn extract(
    state: &AppState,
    files: &[UploadedFile],
    tone: Tone,
    title: &str,
    deadline: Deadline,
) -> Extraction {
    match primary_extraction(state, files, tone, deadline).await {
        Ok(payload) => {
            info!("Extracción primaria completada con {} secciones.", payload.sections.len());
            Extraction::Extracted(payload)
        }
        Err(e) => {
            // La detección de rechazo de facturación es sólo informativa:
            // degrada exactamente igual que cualquier otro fallo.
            if llm::is_billing_error(&e) {
                warn!("Rechazo de facturación del proveedor primario: {e}");
            } else {
                warn!("Extracción primaria fallida: {e}. Se usa la ruta determinista.");
            }
            Extraction::Degraded(fallback_extraction(files, title))
        }
    }
}

async fn primary_extraction(
    state: &AppState,
    files: &[UploadedFile],
    tone: Tone,
    deadline: Deadline,
) -> Result<IntermediateReport> {
    let prompt = extraction_prompt(files, tone);
    let payload: IntermediateReport =
        llm::generate_structured(&state.config, &prompt, None, deadline).await?;

    // La forma debe cumplirse exactamente o la llamada cuenta como fallida.
    if payload.sections.is_empty() {
        return Err(anyhow!("la extracción no trae ninguna sección"));
    }
    if payload.executive_summary.trim().is_empty() {
        return Err(anyhow!("la extracción no trae resumen ejecutivo"));
    }

    Ok(payload)
}

fn extraction_prompt(files: &[UploadedFile], tone: Tone) -> String {
    let mut prompt = format!(
        "You are an assistant that extracts structured, accurate report content from the \
         provided files and suggests charts when numeric/tabular data exists.\n\
         Tone should be {tone}.\n\
         1) Provide executive summary.\n\
         2) Provide 3-6 sections with headings and paragraphs. Include tables when present.\n\
         3) If possible, extract numeric data and propose chart specs (line, bar, or pie).\n\
         4) Suggest 2-4 short web search queries that would add timely context or validation.\n\
         Only return JSON per this schema:\n{schema}\n",
        schema = llm::schema_text::<IntermediateReport>(),
    );

    for file in files {
        let media = file.media_type.as_deref().unwrap_or("application/octet-stream");
        prompt.push_str(&format!("\n--- FILE: {} ({media}) ---\n", file.filename));
        match std::str::from_utf8(&file.bytes) {
            Ok(text) => prompt.push_str(text),
            Err(_) => {
                // Adjunto binario: se embebe en base64, como parte de fichero.
                prompt.push_str("[base64] ");
                prompt.push_str(&BASE64.encode(&file.bytes));
            }
        }
        prompt.push('\n');
    }

    prompt
}

/// Ruta determinista: una única sección que resume los nombres de fichero
/// subidos más un extracto de texto acotado cuando existe.
fn fallback_extraction(files: &[UploadedFile], title: &str) -> IntermediateReport {
    let filenames: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
    let excerpt = normalize::normalize_to_text(files, FALLBACK_EXCERPT_CHARS);

    let mut paragraphs = vec![format!("Uploaded files: {}", filenames.join(", "))];
    if excerpt.is_empty() {
        paragraphs.push("No plain-text excerpt available from the uploaded documents.".to_string());
    } else {
        paragraphs.push(format!("Excerpt:\n{excerpt}"));
    }

    let suggested_search_queries = if title.trim().is_empty() {
        vec!["document summary".to_string(), "key points".to_string()]
    } else {
        vec![title.to_string(), "key takeaways".to_string(), "summary".to_string()]
    };

    IntermediateReport {
        suggested_title: (!title.trim().is_empty()).then(|| title.to_string()),
        executive_summary: "AI-based extraction is unavailable for this request. This fallback \
                            summary lists uploaded files and includes the first available text \
                            snippet for context."
            .to_string(),
        sections: vec![ReportSection {
            heading: "Document Overview".to_string(),
            paragraphs,
            table: None,
        }],
        suggested_search_queries,
        ..Default::default()
    }
}
