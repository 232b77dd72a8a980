// Módulos de la aplicación
mod api;
mod app_state;
mod assemble;
mod charts;
mod compose;
mod config;
mod extract;
mod groq;
mod llm;
mod models;
mod normalize;
mod search;

use crate::app_state::AppState;
use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().expect("Error al cargar la configuración");
    if cfg.groq_api_key.is_none() {
        info!("GROQ_API_KEY ausente: el nivel de composición secundario queda desactivado.");
    }
    if cfg.serp_api_key.is_none() {
        info!("SERP_API_KEY ausente: el aumento web queda desactivado.");
    }

    // 3. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg,
        http: reqwest::Client::new(),
    };

    // 4. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new("frontend"))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 5. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .expect("No se pudo abrir el puerto del servidor");
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    // Apagado ordenado con Ctrl-C.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .expect("El servidor terminó con error");

    info!("✅ Servidor cerrado correctamente.");
}
