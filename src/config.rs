//! Carga y gestión de configuración de la aplicación (servidor + proveedores).

use std::env;
use anyhow::{anyhow, Result};

#[derive(Clone, Debug)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

/// Configuración completa de la aplicación.
///
/// Las credenciales opcionales (Groq, SerpAPI) se modelan como presencia /
/// ausencia: su ausencia selecciona de forma determinista la ruta degradada
/// correspondiente, no es un error.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,

    pub groq_api_key: Option<String>,
    pub groq_model: String,

    pub serp_api_key: Option<String>,

    /// Techo de reloj de pared para toda la petición, en segundos.
    pub request_timeout_secs: u64,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());

        let llm_provider_str =
            env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let llm_chat_model =
            env::var("LLM_CHAT_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        // Una credencial vacía cuenta como ausente.
        let groq_api_key = env::var("GROQ_API_KEY").ok().filter(|v| !v.trim().is_empty());
        let groq_model =
            env::var("GROQ_MODEL").unwrap_or_else(|_| "llama-3.1-8b-instant".to_string());

        let serp_api_key = env::var("SERP_API_KEY").ok().filter(|v| !v.trim().is_empty());

        let request_timeout_secs = env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Ok(Self {
            server_addr,
            llm_provider,
            llm_chat_model,
            groq_api_key,
            groq_model,
            serp_api_key,
            request_timeout_secs,
        })
    }
}
