//! Abstracción sobre Rig para la capacidad de generación primaria.
//! De momento se implementa OpenAI; Gemini/Ollama quedan preparados para el
//! futuro. El proveedor devuelve texto libre que se exige parseable como el
//! JSON del esquema solicitado; cualquier otra cosa cuenta como fallo de la
//! llamada, nunca como fallo de la petición.

use crate::config::{AppConfig, LlmProvider};
use crate::models::Deadline;
use anyhow::{anyhow, Result};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

const STRUCTURED_PREAMBLE: &str = "You are a precise assistant. \
Only return a single valid JSON object conforming to the requested schema. \
Do not include explanations, markdown fences, or any text outside the JSON.";

/// Texto del esquema JSON de un tipo, para embeberlo en el prompt de una
/// llamada de generación estructurada.
pub fn schema_text<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// Llamada de generación estructurada: un único intento, acotado por el
/// plazo de la petición, cuyo resultado debe deserializar en `T`.
pub async fn generate_structured<T>(
    cfg: &AppConfig,
    prompt: &str,
    max_tokens: Option<u64>,
    deadline: Deadline,
) -> Result<T>
where
    T: DeserializeOwned,
{
    match cfg.llm_provider {
        LlmProvider::OpenAI => generate_with_openai(cfg, prompt, max_tokens, deadline).await,
        ref other => Err(anyhow!(
            "Proveedor LLM {:?} aún no implementado para generación estructurada",
            other
        )),
    }
}

async fn generate_with_openai<T>(
    cfg: &AppConfig,
    prompt: &str,
    max_tokens: Option<u64>,
    deadline: Deadline,
) -> Result<T>
where
    T: DeserializeOwned,
{
    use rig::providers::openai;
    // Trait para client.agent(...)
    use rig::client::CompletionClient as _;
    use rig::completion::Prompt;

    // Rig hace panic con from_env si falta la clave; lo comprobamos antes
    // para que la ausencia degrade como un fallo de proveedor normal.
    let key_present = std::env::var("OPENAI_API_KEY")
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false);
    if !key_present {
        return Err(anyhow!("OPENAI_API_KEY ausente; proveedor primario no disponible"));
    }

    let client = openai::Client::from_env();

    let model_name = if cfg.llm_chat_model.is_empty() {
        "gpt-4o-mini"
    } else {
        cfg.llm_chat_model.as_str()
    };

    let mut builder = client.agent(model_name).preamble(STRUCTURED_PREAMBLE);
    if let Some(limit) = max_tokens {
        builder = builder.max_tokens(limit);
    }
    let agent = builder.build();

    let response = tokio::time::timeout(deadline.remaining(), agent.prompt(prompt))
        .await
        .map_err(|_| anyhow!("Plazo de la petición agotado en la llamada al proveedor primario"))??;

    parse_json_response(&response)
}

/// Limpia la respuesta del LLM y la parsea como JSON. Primero intento
/// directo (quitando vallas ```json), después el primer bloque {...}
/// embebido en el texto.
pub fn parse_json_response<T>(raw: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let Ok(value) = serde_json::from_str::<T>(cleaned) {
        return Ok(value);
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            return serde_json::from_str::<T>(&cleaned[start..=end]).map_err(|e| {
                anyhow!("No se pudo parsear el JSON de la respuesta del proveedor: {e}")
            });
        }
    }

    Err(anyhow!("La respuesta del proveedor no contiene ningún objeto JSON"))
}

/// Detecta un rechazo de facturación / titularidad del proveedor. El dato es
/// sólo informativo: el fallo se trata igual que cualquier otro y la
/// petición degrada a la siguiente ruta.
pub fn is_billing_error(err: &anyhow::Error) -> bool {
    let msg = format!("{err:#}").to_lowercase();
    msg.contains("customer_verification_required")
        || msg.contains("credit card")
        || msg.contains("status 403")
        || msg.contains("403 forbidden")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Muestra {
        nombre: String,
        total: i64,
    }

    #[test]
    fn parsea_json_directo() {
        let parsed: Muestra =
            parse_json_response(r#"{"nombre":"a","total":2}"#).unwrap();
        assert_eq!(parsed, Muestra { nombre: "a".into(), total: 2 });
    }

    #[test]
    fn parsea_json_con_vallas_markdown() {
        let raw = "```json\n{\"nombre\":\"b\",\"total\":3}\n```";
        let parsed: Muestra = parse_json_response(raw).unwrap();
        assert_eq!(parsed.nombre, "b");
    }

    #[test]
    fn parsea_json_embebido_en_texto() {
        let raw = "Claro, aquí tienes: {\"nombre\":\"c\",\"total\":4} espero que sirva";
        let parsed: Muestra = parse_json_response(raw).unwrap();
        assert_eq!(parsed.total, 4);
    }

    #[test]
    fn sin_json_es_error() {
        assert!(parse_json_response::<Muestra>("no hay nada aquí").is_err());
    }

    #[test]
    fn deteccion_de_rechazo_de_facturacion() {
        let billing = anyhow!("provider said: customer_verification_required");
        let card = anyhow!("AI Gateway requires a valid credit card on file");
        let normal = anyhow!("timeout while waiting for completion");
        assert!(is_billing_error(&billing));
        assert!(is_billing_error(&card));
        assert!(!is_billing_error(&normal));
    }

    #[test]
    fn el_esquema_generado_no_es_vacio() {
        let schema = schema_text::<crate::models::Report>();
        assert!(schema.contains("generatedAt"));
    }
}
