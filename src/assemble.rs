//! Ensamblador final del informe. Función pura y sin ruta de fallo: impone
//! los invariantes finales (autoridad de título/tono/marca de tiempo,
//! metadatos recalculados, fusión de gráficas sintetizadas, redacción de
//! URLs) se haya producido el borrador en el nivel que sea. Se ejecuta
//! exactamente una vez, como último paso.

use chrono::Utc;

use crate::charts;
use crate::compose::DEFAULT_TITLE;
use crate::models::{FileMeta, Report, Tone, UploadedFile};

/// Aplica los invariantes del §final sobre el borrador, incondicionalmente.
/// Idempotente salvo por la monotonía de la marca de tiempo.
pub fn assemble(
    mut report: Report,
    files: &[UploadedFile],
    title: &str,
    tone: Tone,
    web_search: bool,
) -> Report {
    // Título: el del usuario cuando no está vacío, si no el propuesto por la
    // etapa de generación, si no el fijo.
    if !title.trim().is_empty() {
        report.title = title.to_string();
    } else if report.title.trim().is_empty() {
        report.title = DEFAULT_TITLE.to_string();
    }

    // Tono y marca de tiempo: siempre los de la petición, nunca los del
    // proveedor.
    report.tone = tone;
    report.generated_at = Utc::now().to_rfc3339();

    // metadata.files: exactamente los ficheros subidos, en su orden.
    let mut metadata = report.metadata.take().unwrap_or_default();
    metadata.files = Some(
        files
            .iter()
            .map(|f| FileMeta {
                filename: f.filename.clone(),
                media_type: f.media_type.clone(),
            })
            .collect(),
    );
    report.metadata = Some(metadata);

    // Gráficas sintetizadas de los ficheros tabulares, detrás de lo que
    // propusiera el nivel activo. Una gráfica ya presente no se duplica,
    // para que el ensamblado sea estable bajo repetición.
    for chart in charts::synthesize(files) {
        if !report.charts.contains(&chart) {
            report.charts.push(chart);
        }
    }

    // Sin aumento web, ninguna referencia debe exponer un enlace vivo: se
    // conservan reducidas a título/origen.
    if !web_search {
        for reference in &mut report.references {
            reference.url = None;
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChartKind, Reference, ReportMetadata, ReportSection};

    fn txt(name: &str, contents: &str) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            media_type: Some("text/plain".to_string()),
            bytes: contents.as_bytes().to_vec(),
        }
    }

    fn csv(name: &str, contents: &str) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            media_type: Some("text/csv".to_string()),
            bytes: contents.as_bytes().to_vec(),
        }
    }

    fn draft() -> Report {
        Report {
            title: "Propuesto por el proveedor".to_string(),
            tone: Tone::Casual,
            generated_at: "1999-01-01T00:00:00Z".to_string(),
            metadata: Some(ReportMetadata {
                tags: Some(vec!["etiqueta".to_string()]),
                files: Some(vec![FileMeta {
                    filename: "inventado-por-el-proveedor.txt".to_string(),
                    media_type: None,
                }]),
                ..Default::default()
            }),
            executive_summary: Some("resumen".to_string()),
            sections: vec![ReportSection {
                heading: "S".to_string(),
                paragraphs: vec![],
                table: None,
            }],
            charts: Vec::new(),
            references: vec![Reference {
                title: Some("ref".to_string()),
                url: Some("https://live.example".to_string()),
                source: Some("doc.txt".to_string()),
            }],
        }
    }

    #[test]
    fn impone_titulo_tono_y_marca_de_tiempo() {
        let files = vec![txt("a.txt", "x")];
        let before = Utc::now();
        let report = assemble(draft(), &files, "Título del usuario", Tone::Formal, true);
        assert_eq!(report.title, "Título del usuario");
        assert_eq!(report.tone, Tone::Formal);
        let generated = chrono::DateTime::parse_from_rfc3339(&report.generated_at)
            .unwrap()
            .with_timezone(&Utc);
        assert!(generated >= before);
    }

    #[test]
    fn sin_titulo_de_usuario_sobrevive_el_del_borrador_y_despues_el_fijo() {
        let files = vec![txt("a.txt", "x")];
        let report = assemble(draft(), &files, "", Tone::Neutral, true);
        assert_eq!(report.title, "Propuesto por el proveedor");

        let mut sin_titulo = draft();
        sin_titulo.title = "  ".to_string();
        let report = assemble(sin_titulo, &files, "", Tone::Neutral, true);
        assert_eq!(report.title, "Automated Report");
    }

    #[test]
    fn metadata_files_se_recalcula_en_orden_de_subida() {
        let files = vec![txt("b.txt", "x"), txt("a.txt", "y")];
        let report = assemble(draft(), &files, "t", Tone::Neutral, true);
        let metas = report.metadata.as_ref().unwrap().files.as_ref().unwrap();
        assert_eq!(metas.len(), 2);
        assert_eq!(metas[0].filename, "b.txt");
        assert_eq!(metas[1].filename, "a.txt");
        // El resto de metadatos del borrador se conserva.
        assert_eq!(
            report.metadata.unwrap().tags.unwrap(),
            vec!["etiqueta".to_string()]
        );
    }

    #[test]
    fn sin_aumento_web_las_referencias_pierden_la_url() {
        let files = vec![txt("a.txt", "x")];
        let report = assemble(draft(), &files, "t", Tone::Neutral, false);
        for reference in &report.references {
            assert!(reference.url.is_none());
        }
        assert_eq!(report.references[0].title.as_deref(), Some("ref"));
        assert_eq!(report.references[0].source.as_deref(), Some("doc.txt"));
    }

    #[test]
    fn con_aumento_web_las_urls_se_conservan() {
        let files = vec![txt("a.txt", "x")];
        let report = assemble(draft(), &files, "t", Tone::Neutral, true);
        assert_eq!(
            report.references[0].url.as_deref(),
            Some("https://live.example")
        );
    }

    #[test]
    fn ensamblar_dos_veces_da_lo_mismo_salvo_la_marca_de_tiempo() {
        let files = vec![csv("v.csv", "mes,ingresos\nene,1\n"), txt("a.txt", "x")];
        let once = assemble(draft(), &files, "t", Tone::Formal, false);
        let mut twice = assemble(once.clone(), &files, "t", Tone::Formal, false);
        twice.generated_at = once.generated_at.clone();
        assert_eq!(once, twice);
    }

    #[test]
    fn escenario_csv_formal_sin_busqueda_web() {
        let files = vec![csv(
            "ventas.csv",
            "month,revenue,cost\njan,10,4\nfeb,20,7\nmar,30,9\n",
        )];
        let report = assemble(draft(), &files, "Informe de ventas", Tone::Formal, false);

        assert_eq!(report.tone, Tone::Formal);
        assert_eq!(report.charts.len(), 2);
        assert_eq!(report.charts[0].kind, ChartKind::Bar);
        assert_eq!(report.charts[0].title, "revenue vs month");
        assert_eq!(report.charts[1].kind, ChartKind::Line);
        assert_eq!(report.charts[1].title, "cost vs month");
        for reference in &report.references {
            assert!(reference.url.is_none());
        }
    }

    #[test]
    fn las_graficas_sintetizadas_van_detras_de_las_del_borrador() {
        let mut with_chart = draft();
        with_chart.charts.push(crate::models::ChartSpec {
            kind: ChartKind::Pie,
            title: "propuesta por la IA".to_string(),
            x_key: "k".to_string(),
            y_keys: vec!["v".to_string()],
            data: Vec::new(),
        });
        let files = vec![csv("v.csv", "mes,ingresos\nene,1\n")];
        let report = assemble(with_chart, &files, "t", Tone::Neutral, true);
        assert_eq!(report.charts.len(), 2);
        assert_eq!(report.charts[0].title, "propuesta por la IA");
        assert_eq!(report.charts[1].title, "ingresos vs mes");
    }
}
