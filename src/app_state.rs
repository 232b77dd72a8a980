use crate::config::AppConfig;

/// Estado compartido del servidor. Cada petición es una unidad de trabajo
/// independiente: aquí sólo viven la configuración y el cliente HTTP
/// reutilizable, nada mutable entre peticiones.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub http: reqwest::Client,
}
