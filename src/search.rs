//! Cliente de aumento web contra SerpAPI. Sin credencial configurada no hay
//! error: la búsqueda simplemente se omite (modo degradado esperado). Cada
//! consulta se lanza de forma independiente y su fallo no afecta al resto.

use anyhow::{anyhow, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::models::Deadline;

const SERP_ENDPOINT: &str = "https://serpapi.com/search.json";

/// Un resultado de búsqueda ordenado: título, enlace y fragmento opcional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Resultados de una consulta concreta, en el orden devuelto por el motor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryFindings {
    pub query: String,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<SearchHit>,
}

/// Lanza todas las consultas en paralelo, cada una acotada por el plazo de
/// la petición y con su fallo aislado. El orden de salida sigue el orden de
/// las consultas de entrada.
pub async fn search(
    http: &reqwest::Client,
    api_key: Option<&str>,
    queries: &[String],
    max_per_query: usize,
    deadline: Deadline,
) -> Vec<QueryFindings> {
    let Some(api_key) = api_key else {
        info!("SERP_API_KEY ausente; se omite la búsqueda externa.");
        return Vec::new();
    };

    let futures = queries
        .iter()
        .map(|q| search_one(http, api_key, q, max_per_query, deadline));

    join_all(futures).await
}

async fn search_one(
    http: &reqwest::Client,
    api_key: &str,
    query: &str,
    max_per_query: usize,
    deadline: Deadline,
) -> QueryFindings {
    let results = match fetch_hits(http, api_key, query, max_per_query, deadline).await {
        Ok(hits) => hits,
        Err(e) => {
            warn!("Búsqueda fallida para '{query}': {e}. Resultados vacíos para esta consulta.");
            Vec::new()
        }
    };

    QueryFindings {
        query: query.to_string(),
        results,
    }
}

async fn fetch_hits(
    http: &reqwest::Client,
    api_key: &str,
    query: &str,
    max_per_query: usize,
    deadline: Deadline,
) -> Result<Vec<SearchHit>> {
    let mut url = Url::parse(SERP_ENDPOINT)?;
    url.query_pairs_mut()
        .append_pair("engine", "google")
        .append_pair("q", query)
        .append_pair("num", &max_per_query.to_string())
        .append_pair("api_key", api_key);

    let response = http
        .get(url)
        .timeout(deadline.remaining())
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(anyhow!("SerpAPI devolvió estado {}", response.status()));
    }

    let body: SerpResponse = response.json().await?;
    Ok(body
        .organic_results
        .into_iter()
        .take(max_per_query)
        .collect())
}
