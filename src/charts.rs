//! Síntesis determinista de gráficas a partir de ficheros tabulares.
//! No interviene ninguna IA: primera columna como categoría, el resto como
//! series de valores. Nunca falla: un fichero no interpretable simplemente
//! no aporta gráficas.

use std::collections::BTreeMap;

use crate::models::{CellValue, ChartKind, ChartSpec, UploadedFile};
use crate::normalize;

/// Deriva las gráficas por defecto de todos los ficheros tabulares, en el
/// orden de subida. Una gráfica de barras para la primera serie y, si hay
/// segunda serie, una de líneas para ella. Por esta vía nunca salen tartas.
pub fn synthesize(files: &[UploadedFile]) -> Vec<ChartSpec> {
    let mut charts = Vec::new();
    for file in files {
        if let Some(mut file_charts) = charts_for_file(file) {
            charts.append(&mut file_charts);
        }
    }
    charts
}

fn charts_for_file(file: &UploadedFile) -> Option<Vec<ChartSpec>> {
    let table = normalize::normalize_to_table(file)?;

    // Hace falta una columna de categoría y al menos una de valores, más
    // una fila de datos como mínimo.
    if table.headers.len() < 2 || table.rows.is_empty() {
        return None;
    }

    let x_key = table.headers[0].clone();
    let y_keys: Vec<String> = table.headers[1..].to_vec();

    let data: Vec<BTreeMap<String, CellValue>> = table
        .rows
        .iter()
        .map(|row| {
            table
                .headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    let raw = row.get(i).map(String::as_str).unwrap_or_default();
                    (header.clone(), coerce_cell(raw))
                })
                .collect()
        })
        .collect();

    let mut charts = vec![ChartSpec {
        kind: ChartKind::Bar,
        title: format!("{} vs {}", y_keys[0], x_key),
        x_key: x_key.clone(),
        y_keys: vec![y_keys[0].clone()],
        data: data.clone(),
    }];

    if let Some(second) = y_keys.get(1) {
        charts.push(ChartSpec {
            kind: ChartKind::Line,
            title: format!("{second} vs {x_key}"),
            x_key,
            y_keys: vec![second.clone()],
            data,
        });
    }

    Some(charts)
}

/// Coerción numérica de mejor esfuerzo: si la celda parsea como f64 es
/// número, si no se conserva como texto tal cual.
fn coerce_cell(raw: &str) -> CellValue {
    match raw.trim().parse::<f64>() {
        Ok(n) => CellValue::Num(n),
        Err(_) => CellValue::Str(raw.to_string()),
    }
}
