//! Proveedor secundario de composición: la API de chat de Groq (compatible
//! con OpenAI), en modo respuesta JSON. Sólo se usa server-side; la clave
//! nunca viaja al cliente. Una respuesta malformada es un fallo de este
//! nivel, no un error fatal de la petición.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::json;

use crate::llm;
use crate::models::Deadline;

const GROQ_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Presupuesto mayor de texto documental para el anclaje del nivel
/// secundario.
const MAX_DOC_CHARS: usize = 60_000;

/// Parámetros de la llamada de composición secundaria.
pub struct GroqOptions<'a> {
    pub doc_text: &'a str,
    pub serp_findings: Option<&'a str>,
    pub tone: &'a str,
    pub title: &'a str,
}

/// Sección tal y como la devuelve Groq: `{title, content}`; se tolera
/// también `heading`/`paragraphs` por si el modelo devuelve el otro formato.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GroqSection {
    pub title: Option<String>,
    pub heading: Option<String>,
    pub content: Option<String>,
    pub paragraphs: Option<Vec<String>>,
}

/// Referencia devuelta por Groq: o una cadena suelta o un par {title, url}.
/// Ambas formas se aceptan.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GroqReference {
    Text(String),
    Link {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        url: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroqReport {
    pub title: String,
    pub tone: String,
    pub executive_summary: String,
    pub sections: Vec<GroqSection>,
    pub references: Vec<GroqReference>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

fn build_messages(opts: &GroqOptions<'_>) -> serde_json::Value {
    let serp_block = match opts.serp_findings {
        Some(findings) => format!("External Web Search Findings (optional):\n{findings}\n\n"),
        None => String::new(),
    };
    let trimmed: String = opts.doc_text.chars().take(MAX_DOC_CHARS).collect();

    json!([
        {
            "role": "system",
            "content": "You are an expert analyst that MUST ground every statement strictly in the provided Document Text. Do NOT add generic industry boilerplate. If information is not present, write 'Not found in document'. Prefer direct quotes with minimal paraphrase. Keep tone consistent and avoid hallucinations; only use web findings if provided, and cite separately."
        },
        {
            "role": "user",
            "content": format!(
                "Title: {}\nTone: {}\n\n{}Document Text (may be truncated; includes page markers when available):\n{}\n\n\
                 Task: Create a structured report that is SPECIFIC to the Document Text. For each section, reference concrete details (e.g., problem statements, methods, results, datasets, algorithms, parameters). Avoid vague outlines.\n\
                 Return JSON with the following shape strictly (no extra text):\n\
                 {{\"title\": string, \"tone\": string, \"executiveSummary\": string, \"sections\": [{{ \"title\": string, \"content\": string }}], \"references\": [string]}}",
                opts.title, opts.tone, serp_block, trimmed
            )
        }
    ])
}

/// Una llamada de composición al proveedor secundario, acotada por el plazo
/// de la petición. Sin reintentos.
pub async fn compose_report(
    http: &reqwest::Client,
    api_key: &str,
    model: &str,
    opts: &GroqOptions<'_>,
    deadline: Deadline,
) -> Result<GroqReport> {
    let body = json!({
        "model": model,
        "messages": build_messages(opts),
        "temperature": 0.3,
        "response_format": { "type": "json_object" },
    });

    let response = http
        .post(GROQ_ENDPOINT)
        .bearer_auth(api_key)
        .json(&body)
        .timeout(deadline.remaining())
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        return Err(anyhow!("Groq devolvió estado {status}: {detail}"));
    }

    let parsed: ChatResponse = response.json().await?;
    let content = parsed
        .choices
        .first()
        .map(|c| c.message.content.as_str())
        .ok_or_else(|| anyhow!("La respuesta de Groq no trae ninguna alternativa"))?;

    llm::parse_json_response(content)
}
