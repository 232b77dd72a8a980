//! Normalización de los ficheros subidos: extracto de texto plano acotado
//! por presupuesto de caracteres y proyección tabular de CSV / hojas de
//! cálculo. Todo falla en blando: un fichero corrupto aporta una
//! contribución vacía y jamás aborta al resto.

use std::io::{Cursor, Read};

use anyhow::{Context, Result};
use calamine::{open_workbook_auto_from_rs, Reader};
use regex::Regex;
use tracing::warn;
use zip::ZipArchive;

use crate::models::{TabularRows, UploadedFile};

/// Separador visible entre las contribuciones de cada fichero.
const SNIPPET_SEPARATOR: &str = "\n\n---\n\n";

/// Tope fijo de páginas leídas por PDF.
const PDF_MAX_PAGES: usize = 20;

const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const XLSX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLS_MIME: &str = "application/vnd.ms-excel";

/// Formato detectado de un fichero. Despacho por variante cerrada, no por
/// herencia: cada variante sabe qué capacidades ofrece (texto, tabla o nada).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    PlainText,
    Csv,
    WordArchive,
    Pdf,
    Spreadsheet,
    Other,
}

fn detect_kind(file: &UploadedFile) -> FileKind {
    let media = file
        .media_type
        .as_deref()
        .unwrap_or_default()
        .to_lowercase();
    let ext = std::path::Path::new(&file.filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    if media == "text/csv" || ext == "csv" {
        FileKind::Csv
    } else if matches!(media.as_str(), "text/plain" | "text/markdown" | "application/json")
        || matches!(ext.as_str(), "txt" | "md" | "json")
    {
        FileKind::PlainText
    } else if media == DOCX_MIME || ext == "docx" {
        FileKind::WordArchive
    } else if media == "application/pdf" || ext == "pdf" {
        FileKind::Pdf
    } else if matches!(media.as_str(), XLSX_MIME | XLS_MIME)
        || matches!(ext.as_str(), "xls" | "xlsx")
    {
        FileKind::Spreadsheet
    } else {
        FileKind::Other
    }
}

/// Construye el extracto de texto plano de todos los ficheros, en el orden
/// de subida, hasta agotar el presupuesto de caracteres. Determinista y sin
/// fallos: devuelve el mejor esfuerzo recogido, truncado a `max_chars`.
pub fn normalize_to_text(files: &[UploadedFile], max_chars: usize) -> String {
    let mut combined = String::new();
    let mut used_chars = 0usize;

    for file in files {
        let contribution = match detect_kind(file) {
            FileKind::PlainText | FileKind::Csv => {
                String::from_utf8_lossy(&file.bytes).to_string()
            }
            FileKind::WordArchive => match docx_text(&file.bytes) {
                Ok(text) => text,
                Err(e) => {
                    warn!("No se pudo extraer texto del DOCX {}: {e}. Contribución vacía.", file.filename);
                    String::new()
                }
            },
            FileKind::Pdf => {
                match pdf_text(&file.bytes, max_chars.saturating_sub(used_chars)) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("No se pudo extraer texto del PDF {}: {e}. Contribución vacía.", file.filename);
                        String::new()
                    }
                }
            }
            // Las hojas de cálculo y cualquier otro binario no aportan texto.
            FileKind::Spreadsheet | FileKind::Other => String::new(),
        };

        if !contribution.is_empty() {
            if !combined.is_empty() {
                combined.push_str(SNIPPET_SEPARATOR);
            }
            combined.push_str(&contribution);
            used_chars = combined.chars().count();
        }

        if used_chars >= max_chars {
            break;
        }
    }

    truncate_chars(combined, max_chars)
}

/// Proyección tabular de un fichero. Sólo CSV y hojas de cálculo producen
/// tabla; cualquier fallo de parseo se traga y devuelve `None`.
pub fn normalize_to_table(file: &UploadedFile) -> Option<TabularRows> {
    let parsed = match detect_kind(file) {
        FileKind::Csv => csv_table(&file.bytes),
        FileKind::Spreadsheet => sheet_table(&file.bytes),
        _ => return None,
    };

    match parsed {
        Ok(table) => table,
        Err(e) => {
            warn!("No se pudo interpretar {} como tabla: {e}", file.filename);
            None
        }
    }
}

fn truncate_chars(s: String, max: usize) -> String {
    if s.chars().count() <= max {
        return s;
    }
    s.chars().take(max).collect()
}

/// Paquete de procesador de textos: se abre como archivo zip, se decodifica
/// `word/document.xml`, los límites de párrafo pasan a saltos de línea, se
/// eliminan todas las marcas y se colapsa el espacio en blanco.
fn docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .context("el fichero no es un archivo zip válido")?;
    let mut entry = archive
        .by_name("word/document.xml")
        .context("falta la entrada word/document.xml")?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;

    let paragraph_re = Regex::new(r"<w:p[^>]*>")?;
    let tag_re = Regex::new(r"<[^>]+>")?;
    let blank_re = Regex::new(r"\n\s+\n")?;

    let text = paragraph_re.replace_all(&xml, "\n");
    let text = tag_re.replace_all(&text, "");
    let text = text.replace(['\t', '\r'], " ");
    let text = blank_re.replace_all(&text, "\n\n");

    Ok(text.trim().to_string())
}

/// PDF página a página, hasta `PDF_MAX_PAGES`: fragmentos unidos con espacio
/// simple dentro de la página, páginas unidas con salto de línea. Se corta
/// en cuanto el presupuesto restante ya está cubierto.
fn pdf_text(bytes: &[u8], budget: usize) -> Result<String> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)?;
    let mut out = String::new();

    for page in pages.iter().take(PDF_MAX_PAGES) {
        let fragments: Vec<&str> = page.split_whitespace().collect();
        if fragments.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&fragments.join(" "));

        if out.chars().count() >= budget {
            break;
        }
    }

    Ok(out)
}

/// CSV con inferencia de fila de cabecera. Los registros flexibles se
/// proyectan sobre la cabecera en su orden; celda ausente => cadena vacía.
fn csv_table(bytes: &[u8]) -> Result<Option<TabularRows>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        // Equivalente a saltarse las líneas vacías del fuente.
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(
            (0..headers.len())
                .map(|i| record.get(i).unwrap_or_default().to_string())
                .collect(),
        );
    }

    if headers.is_empty() || rows.is_empty() {
        Ok(None)
    } else {
        Ok(Some(TabularRows { headers, rows }))
    }
}

/// Hoja de cálculo: sólo la primera hoja. La primera fila parseada es la
/// cabecera; las celdas vacías se representan con el valor por defecto del
/// formato origen (cadena vacía).
fn sheet_table(bytes: &[u8]) -> Result<Option<TabularRows>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .context("el fichero no es una hoja de cálculo válida")?;

    let Some(sheet_name) = workbook.sheet_names().first().cloned() else {
        return Ok(None);
    };
    let range = workbook
        .worksheet_range(&sheet_name)
        .context("no se pudo leer la primera hoja")?;

    let mut rows_iter = range.rows();
    let Some(header_row) = rows_iter.next() else {
        return Ok(None);
    };
    let headers: Vec<String> = header_row.iter().map(|c| c.to_string()).collect();

    let rows: Vec<Vec<String>> = rows_iter
        .map(|row| {
            (0..headers.len())
                .map(|i| row.get(i).map(|c| c.to_string()).unwrap_or_default())
                .collect()
        })
        .collect();

    if headers.is_empty() || rows.is_empty() {
        Ok(None)
    } else {
        Ok(Some(TabularRows { headers, rows }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn file(name: &str, media: Option<&str>, bytes: &[u8]) -> UploadedFile {
        UploadedFile {
            filename: name.to_string(),
            media_type: media.map(str::to_string),
            bytes: bytes.to_vec(),
        }
    }

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer
                .start_file("word/document.xml", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn extracto_concatena_con_separador_en_orden_de_subida() {
        let files = vec![
            file("a.txt", Some("text/plain"), b"primero"),
            file("b.md", None, b"segundo"),
        ];
        let text = normalize_to_text(&files, 500);
        assert_eq!(text, "primero\n\n---\n\nsegundo");
    }

    #[test]
    fn extracto_respeta_el_presupuesto_y_los_ficheros_tardios_no_aportan() {
        let files = vec![
            file("a.txt", Some("text/plain"), b"0123456789"),
            file("b.txt", Some("text/plain"), b"nunca-llega"),
        ];
        let text = normalize_to_text(&files, 10);
        assert_eq!(text, "0123456789");
    }

    #[test]
    fn extracto_trunca_por_caracteres_no_por_bytes() {
        let files = vec![file("a.txt", Some("text/plain"), "áéíóú".as_bytes())];
        let text = normalize_to_text(&files, 3);
        assert_eq!(text, "áéí");
    }

    #[test]
    fn pdf_corrupto_aporta_vacio_sin_abortar_a_los_demas() {
        let files = vec![
            file("roto.pdf", Some("application/pdf"), b"esto no es un pdf"),
            file("ok.txt", Some("text/plain"), b"contenido valido"),
        ];
        let text = normalize_to_text(&files, 500);
        assert_eq!(text, "contenido valido");
    }

    #[test]
    fn tipo_desconocido_no_aporta_nada() {
        let files = vec![file("foto.png", Some("image/png"), &[0x89, 0x50, 0x4e, 0x47])];
        assert_eq!(normalize_to_text(&files, 100), "");
    }

    #[test]
    fn docx_convierte_parrafos_y_elimina_marcas() {
        let xml = "<w:document><w:body>\
            <w:p><w:r><w:t>Hola</w:t></w:r></w:p>\
            <w:p w:attr=\"x\"><w:r><w:t>Mundo</w:t></w:r></w:p>\
            </w:body></w:document>";
        let files = vec![file("doc.docx", Some(DOCX_MIME), &docx_bytes(xml))];
        let text = normalize_to_text(&files, 500);
        assert_eq!(text, "Hola\nMundo");
    }

    #[test]
    fn docx_corrupto_aporta_vacio() {
        let files = vec![file("doc.docx", Some(DOCX_MIME), b"no es un zip")];
        assert_eq!(normalize_to_text(&files, 500), "");
    }

    #[test]
    fn csv_infiera_cabecera_y_proyecta_filas() {
        let csv = b"mes,ingresos\nene,100\nfeb,200\n";
        let table = normalize_to_table(&file("d.csv", Some("text/csv"), csv)).unwrap();
        assert_eq!(table.headers, vec!["mes", "ingresos"]);
        assert_eq!(table.rows, vec![vec!["ene", "100"], vec!["feb", "200"]]);
    }

    #[test]
    fn csv_fila_corta_se_rellena_con_cadena_vacia() {
        let csv = b"a,b,c\n1,2\n";
        let table = normalize_to_table(&file("d.csv", None, csv)).unwrap();
        assert_eq!(table.rows, vec![vec!["1", "2", ""]]);
    }

    #[test]
    fn csv_sin_filas_de_datos_no_produce_tabla() {
        let csv = b"a,b\n";
        assert!(normalize_to_table(&file("d.csv", None, csv)).is_none());
    }

    #[test]
    fn hoja_de_calculo_corrupta_no_produce_tabla() {
        let f = file("datos.xlsx", Some(XLSX_MIME), b"bytes cualesquiera");
        assert!(normalize_to_table(&f).is_none());
    }

    #[test]
    fn un_txt_no_produce_tabla() {
        assert!(normalize_to_table(&file("a.txt", None, b"x,y\n1,2")).is_none());
    }
}
