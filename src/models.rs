//! Modelos de dominio del informe (secciones, gráficas, referencias) y el
//! plazo de ejecución compartido de cada petición.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Tono de redacción solicitado por el usuario. El ensamblador lo impone
/// siempre sobre lo que devuelva cualquier proveedor de generación.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Neutral,
    Formal,
    Casual,
}

impl Tone {
    /// Interpreta el valor del formulario; cualquier cosa desconocida cae en neutral.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "formal" => Self::Formal,
            "casual" => Self::Casual,
            _ => Self::Neutral,
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Neutral => "neutral",
            Self::Formal => "formal",
            Self::Casual => "casual",
        };
        write!(f, "{s}")
    }
}

/// Fichero subido tal y como llega en el multipart: bytes crudos, tipo
/// declarado (no fiable) y nombre original. Inmutable durante la petición.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Descriptor de fichero que viaja en los metadatos del informe final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// Proyección tabular de un fichero CSV / hoja de cálculo: una fila de
/// cabecera y cero o más filas de datos, todo como texto.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularRows {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Valor de celda en los datos de una gráfica. La coerción numérica es un
/// heurístico de mejor esfuerzo: si la cadena parsea como f64, es número.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CellValue {
    Num(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
    Pie,
}

/// Especificación de gráfica renderizable. Invariante: `y_keys` no vacío y
/// cada fila de `data` contiene la clave del eje X y todas las series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub title: String,
    pub x_key: String,
    pub y_keys: Vec<String>,
    pub data: Vec<BTreeMap<String, CellValue>>,
}

/// Tabla embebida en una sección. Las filas pueden ser irregulares respecto
/// a la cabecera; el renderizador debe tolerarlo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct TableSpec {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportSection {
    pub heading: String,
    #[serde(default)]
    pub paragraphs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableSpec>,
}

/// Referencia bibliográfica o de búsqueda web. Se espera al menos uno de
/// los tres campos, pero no se exige.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stakeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Siempre recalculado por el ensamblador a partir de los ficheros
    /// subidos; nunca se confía en lo que venga de una etapa intermedia.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileMeta>>,
}

/// El artefacto final de la petición. Propiedad exclusiva de la petición en
/// curso: no se cachea ni se comparte entre peticiones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub title: String,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ReportMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executive_summary: Option<String>,
    #[serde(default)]
    pub sections: Vec<ReportSection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<ChartSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
}

/// Plazo compartido de la petición. Se crea una vez al entrar la petición y
/// se propaga a cada llamada saliente; cada llamada lo honra por su cuenta
/// con `tokio::time::timeout(deadline.remaining(), ..)`.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn within(budget: Duration) -> Self {
        Self { at: Instant::now() + budget }
    }

    /// Tiempo restante, saturado a cero una vez vencido.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_parse_acepta_valores_conocidos_y_cae_en_neutral() {
        assert_eq!(Tone::parse("formal"), Tone::Formal);
        assert_eq!(Tone::parse("CASUAL"), Tone::Casual);
        assert_eq!(Tone::parse("neutral"), Tone::Neutral);
        assert_eq!(Tone::parse("algo-raro"), Tone::Neutral);
        assert_eq!(Tone::parse(""), Tone::Neutral);
    }

    #[test]
    fn tone_serializa_en_minusculas() {
        assert_eq!(serde_json::to_string(&Tone::Formal).unwrap(), "\"formal\"");
    }

    #[test]
    fn cell_value_serializa_sin_etiqueta() {
        let num = serde_json::to_string(&CellValue::Num(3.0)).unwrap();
        let txt = serde_json::to_string(&CellValue::Str("ene".into())).unwrap();
        assert_eq!(num, "3.0");
        assert_eq!(txt, "\"ene\"");
    }

    #[test]
    fn report_serializa_en_camel_case() {
        let report = Report {
            title: "t".into(),
            generated_at: "2024-01-01T00:00:00Z".into(),
            ..Report::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("generatedAt").is_some());
        assert!(json.get("generated_at").is_none());
    }

    #[test]
    fn deadline_vencido_satura_a_cero() {
        let d = Deadline::within(Duration::from_millis(0));
        assert!(d.expired());
        assert_eq!(d.remaining(), Duration::ZERO);
    }
}
