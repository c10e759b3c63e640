//! Format converters: tabular flattening, CSV, spreadsheet cell model,
//! text document rendering and the chart renderer seam

use crate::error::Result;
use crate::export::types::ExportOptions;
use crate::record::parse_date;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Number of top-level items in an export payload: a flat array's length,
/// or the summed length of every top-level array field
pub fn count_items(data: &Value) -> usize {
    match data {
        Value::Array(items) => items.len(),
        Value::Object(map) => map
            .values()
            .filter_map(|v| v.as_array().map(|a| a.len()))
            .sum(),
        _ => 0,
    }
}

/// Flatten an export payload into uniform rows.
///
/// A flat array yields one row per element. An object with array-valued
/// fields yields the rows of every array tagged with a `section` column;
/// an object without arrays degrades to field/value rows.
pub fn tabular_rows(data: &Value) -> Vec<Map<String, Value>> {
    match data {
        Value::Array(items) => items.iter().map(row_of).collect(),
        Value::Object(map) => {
            let mut rows = Vec::new();
            for (key, value) in map {
                if let Value::Array(items) = value {
                    for item in items {
                        let mut row = row_of(item);
                        row.insert("section".to_string(), Value::String(key.clone()));
                        rows.push(row);
                    }
                }
            }
            if rows.is_empty() {
                for (key, value) in map {
                    let mut row = Map::new();
                    row.insert("field".to_string(), Value::String(key.clone()));
                    row.insert("value".to_string(), scalarize(value));
                    rows.push(row);
                }
            }
            rows
        }
        other => vec![row_of(other)],
    }
}

fn row_of(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        other => {
            let mut row = Map::new();
            row.insert("value".to_string(), other.clone());
            row
        }
    }
}

fn scalarize(value: &Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => {
            Value::String(serde_json::to_string(value).unwrap_or_default())
        }
        other => other.clone(),
    }
}

/// Column order: union of row keys by first appearance, `section` first
pub fn column_order(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    if let Some(pos) = columns.iter().position(|c| c == "section") {
        let section = columns.remove(pos);
        columns.insert(0, section);
    }
    columns
}

/// Decimal precision from the fractional part of a number-format string,
/// e.g. `#,##0.00` formats with 2 decimals
fn decimal_precision(number_format: &str) -> usize {
    number_format
        .rsplit_once('.')
        .map(|(_, frac)| frac.len())
        .unwrap_or(0)
}

fn format_cell(value: &Value, options: &ExportOptions) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() != 0.0 => {
                format!("{:.*}", decimal_precision(&options.number_format), f)
            }
            _ => n.to_string(),
        },
        Value::String(s) => match parse_date(s) {
            Some(ts) => ts.format(&options.date_format).to_string(),
            None => s.clone(),
        },
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Quote a CSV field when it contains the delimiter, a quote or a line
/// break; embedded quotes are doubled
fn escape_csv_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render rows as delimited text
pub fn rows_to_csv(rows: &[Map<String, Value>], columns: &[String], options: &ExportOptions) -> String {
    let mut out = String::new();
    let delimiter = options.delimiter;

    if options.include_header {
        let header: Vec<String> = columns
            .iter()
            .map(|c| escape_csv_field(c, delimiter))
            .collect();
        out.push_str(&header.join(&delimiter.to_string()));
        out.push('\n');
    }

    for row in rows {
        let line: Vec<String> = columns
            .iter()
            .map(|column| {
                let rendered = row
                    .get(column)
                    .map(|v| format_cell(v, options))
                    .unwrap_or_default();
                escape_csv_field(&rendered, delimiter)
            })
            .collect();
        out.push_str(&line.join(&delimiter.to_string()));
        out.push('\n');
    }
    out
}

/// Typed spreadsheet cell; numbers and dates keep their native types so the
/// serializer can emit them without string coercion
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(DateTime<Utc>),
}

impl CellValue {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => CellValue::Empty,
            Value::Bool(b) => CellValue::Bool(*b),
            Value::Number(n) => n.as_f64().map(CellValue::Number).unwrap_or(CellValue::Empty),
            Value::String(s) => match parse_date(s) {
                Some(ts) => CellValue::Date(ts),
                None => CellValue::Text(s.clone()),
            },
            other => CellValue::Text(serde_json::to_string(other).unwrap_or_default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

/// Build a workbook from an export payload: one sheet per top-level
/// array-valued key, or a single `Data` sheet for a flat array
pub fn build_workbook(data: &Value) -> Workbook {
    let mut sheets = Vec::new();
    match data {
        Value::Object(map) => {
            for (key, value) in map {
                if let Value::Array(items) = value {
                    sheets.push(sheet_of(key, items));
                }
            }
            if sheets.is_empty() {
                let rows = tabular_rows(data);
                sheets.push(sheet_from_rows("Data", &rows));
            }
        }
        Value::Array(items) => sheets.push(sheet_of("Data", items)),
        other => {
            let rows = tabular_rows(other);
            sheets.push(sheet_from_rows("Data", &rows));
        }
    }
    Workbook { sheets }
}

fn sheet_of(name: &str, items: &[Value]) -> Sheet {
    let rows: Vec<Map<String, Value>> = items.iter().map(row_of).collect();
    sheet_from_rows(name, &rows)
}

fn sheet_from_rows(name: &str, rows: &[Map<String, Value>]) -> Sheet {
    let columns = column_order(rows);
    let cell_rows = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| {
                    row.get(column)
                        .map(CellValue::from_json)
                        .unwrap_or(CellValue::Empty)
                })
                .collect()
        })
        .collect();
    Sheet {
        name: name.to_string(),
        columns,
        rows: cell_rows,
    }
}

/// Serialize a workbook as SpreadsheetML. The binary XLSX layout is
/// delegated; this XML dialect opens in standard spreadsheet viewers and
/// keeps cell types native.
pub fn workbook_to_xml(workbook: &Workbook) -> Vec<u8> {
    let mut xml = String::from(
        "<?xml version=\"1.0\"?>\n<Workbook xmlns=\"urn:schemas-microsoft-com:office:spreadsheet\" \
         xmlns:ss=\"urn:schemas-microsoft-com:office:spreadsheet\">\n",
    );
    for sheet in &workbook.sheets {
        xml.push_str(&format!(
            "<Worksheet ss:Name=\"{}\">\n<Table>\n",
            escape_xml(&sheet.name)
        ));
        xml.push_str("<Row>");
        for column in &sheet.columns {
            xml.push_str(&format!(
                "<Cell><Data ss:Type=\"String\">{}</Data></Cell>",
                escape_xml(column)
            ));
        }
        xml.push_str("</Row>\n");
        for row in &sheet.rows {
            xml.push_str("<Row>");
            for cell in row {
                let (cell_type, rendered) = match cell {
                    CellValue::Empty => ("String", String::new()),
                    CellValue::Text(s) => ("String", escape_xml(s)),
                    CellValue::Number(n) => ("Number", n.to_string()),
                    CellValue::Bool(b) => ("Boolean", if *b { "1" } else { "0" }.to_string()),
                    CellValue::Date(ts) => {
                        ("DateTime", ts.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
                    }
                };
                xml.push_str(&format!(
                    "<Cell><Data ss:Type=\"{}\">{}</Data></Cell>",
                    cell_type, rendered
                ));
            }
            xml.push_str("</Row>\n");
        }
        xml.push_str("</Table>\n</Worksheet>\n");
    }
    xml.push_str("</Workbook>\n");
    xml.into_bytes()
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render a payload as a structured text document. Page layout is delegated
/// to the viewer-side render library; this produces the document body.
pub fn render_document(data: &Value, title: &str, options: &ExportOptions) -> Vec<u8> {
    let mut doc = format!(
        "{}\n{}\nGenerated: {}\nPage: {} {} (margin {}pt)\n\n",
        title,
        "=".repeat(title.len().max(8)),
        Utc::now().to_rfc3339(),
        options.page_size,
        options.orientation,
        options.margin,
    );

    let rows = tabular_rows(data);
    let columns = column_order(&rows);
    if !columns.is_empty() {
        doc.push_str(&columns.join(" | "));
        doc.push('\n');
        doc.push_str(&"-".repeat(columns.len() * 12));
        doc.push('\n');
        for row in &rows {
            let line: Vec<String> = columns
                .iter()
                .map(|c| row.get(c).map(|v| format_cell(v, options)).unwrap_or_default())
                .collect();
            doc.push_str(&line.join(" | "));
            doc.push('\n');
        }
    }
    doc.into_bytes()
}

/// Chart description handed to the renderer collaborator. The pipeline owns
/// sizing, background and quality; the renderer owns pixels.
#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub background: String,
    pub quality: u8,
    /// Label/value pairs, one bar each
    pub series: Vec<(String, f64)>,
}

/// Chart-to-image seam. Image rendering is outside the pipeline's
/// responsibility; the pipeline only builds the spec.
pub trait ChartRenderer: Send + Sync {
    fn render_svg(&self, spec: &ChartSpec) -> Result<String>;
    fn render_png(&self, spec: &ChartSpec) -> Result<Vec<u8>>;
}

/// Derive a bar-chart spec from a report payload: categories first, then
/// time series, then any numeric top-level fields
pub fn chart_spec(data: &Value, title: &str, options: &ExportOptions) -> ChartSpec {
    let mut series: Vec<(String, f64)> = Vec::new();

    if let Some(categories) = data.get("categories").and_then(Value::as_array) {
        for category in categories {
            if let (Some(name), Some(value)) = (
                category.get("name").and_then(Value::as_str),
                category.get("value").and_then(Value::as_f64),
            ) {
                series.push((name.to_string(), value));
            }
        }
    }
    if series.is_empty() {
        if let Some(points) = data.get("time_series").and_then(Value::as_array) {
            for point in points {
                if let Some(date) = point.get("date").and_then(Value::as_str) {
                    let total: f64 = point
                        .get("values")
                        .and_then(Value::as_object)
                        .map(|m| m.values().filter_map(Value::as_f64).sum())
                        .unwrap_or(0.0);
                    series.push((date.to_string(), total));
                }
            }
        }
    }
    if series.is_empty() {
        if let Some(map) = data.as_object() {
            for (key, value) in map {
                if let Some(n) = value.as_f64() {
                    series.push((key.clone(), n));
                }
            }
        }
    }

    ChartSpec {
        title: title.to_string(),
        width: options.chart_width,
        height: options.chart_height,
        background: options.chart_background.clone(),
        quality: options.quality,
        series,
    }
}

/// Built-in renderer: simple bar charts as SVG, rasterized to PNG with an
/// uncompressed deflate stream
pub struct BasicChartRenderer;

impl ChartRenderer for BasicChartRenderer {
    fn render_svg(&self, spec: &ChartSpec) -> Result<String> {
        let width = spec.width.max(1) as f64;
        let height = spec.height.max(1) as f64;
        let mut svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\">\
             <rect width=\"100%\" height=\"100%\" fill=\"{}\"/>\
             <text x=\"10\" y=\"20\" font-size=\"16\">{}</text>",
            spec.width,
            spec.height,
            escape_xml(&spec.background),
            escape_xml(&spec.title)
        );

        if !spec.series.is_empty() {
            let max = spec
                .series
                .iter()
                .map(|(_, v)| v.abs())
                .fold(f64::MIN_POSITIVE, f64::max);
            let plot_top = 40.0;
            let plot_height = (height - plot_top - 30.0).max(10.0);
            let bar_width = width / spec.series.len() as f64 * 0.8;
            let step = width / spec.series.len() as f64;

            for (index, (label, value)) in spec.series.iter().enumerate() {
                let bar_height = (value.abs() / max) * plot_height;
                let x = index as f64 * step + step * 0.1;
                let y = plot_top + plot_height - bar_height;
                svg.push_str(&format!(
                    "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"#3b82f6\"/>\
                     <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"10\">{}</text>",
                    x,
                    y,
                    bar_width,
                    bar_height,
                    x,
                    height - 12.0,
                    escape_xml(label)
                ));
            }
        }
        svg.push_str("</svg>");
        Ok(svg)
    }

    fn render_png(&self, spec: &ChartSpec) -> Result<Vec<u8>> {
        let width = spec.width.clamp(1, 4096) as usize;
        let height = spec.height.clamp(1, 4096) as usize;
        let background = parse_hex_color(&spec.background).unwrap_or([255, 255, 255]);
        let bar_color = [59, 130, 246];

        let mut pixels = vec![0u8; width * height * 3];
        for pixel in pixels.chunks_exact_mut(3) {
            pixel.copy_from_slice(&background);
        }

        if !spec.series.is_empty() {
            let max = spec
                .series
                .iter()
                .map(|(_, v)| v.abs())
                .fold(f64::MIN_POSITIVE, f64::max);
            let plot_top = height / 10;
            let plot_bottom = height - height / 10;
            let plot_height = plot_bottom.saturating_sub(plot_top).max(1);
            let step = width / spec.series.len();
            let bar_width = (step * 8 / 10).max(1);

            for (index, (_, value)) in spec.series.iter().enumerate() {
                let bar_height = ((value.abs() / max) * plot_height as f64) as usize;
                let x0 = index * step + step / 10;
                for y in plot_bottom.saturating_sub(bar_height)..plot_bottom {
                    for x in x0..(x0 + bar_width).min(width) {
                        let offset = (y * width + x) * 3;
                        pixels[offset..offset + 3].copy_from_slice(&bar_color);
                    }
                }
            }
        }

        Ok(encode_png(width as u32, height as u32, &pixels))
    }
}

fn parse_hex_color(color: &str) -> Option<[u8; 3]> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}

/// Minimal PNG encoder: RGB8, filter 0 scanlines, stored (uncompressed)
/// deflate blocks inside a valid zlib stream
fn encode_png(width: u32, height: u32, rgb: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(rgb.len() + height as usize);
    for scanline in rgb.chunks_exact(width as usize * 3) {
        raw.push(0); // filter type: none
        raw.extend_from_slice(scanline);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[8, 2, 0, 0, 0]); // 8-bit RGB
    write_chunk(&mut out, b"IHDR", &ihdr);

    write_chunk(&mut out, b"IDAT", &zlib_stored(&raw));
    write_chunk(&mut out, b"IEND", &[]);
    out
}

fn write_chunk(out: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(data);
    let mut crc_input = Vec::with_capacity(4 + data.len());
    crc_input.extend_from_slice(chunk_type);
    crc_input.extend_from_slice(data);
    out.extend_from_slice(&crc32(&crc_input).to_be_bytes());
}

/// zlib stream made of stored deflate blocks (max 65535 bytes each)
fn zlib_stored(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x78, 0x01];
    let mut chunks = data.chunks(65535).peekable();
    while let Some(chunk) = chunks.next() {
        let last = chunks.peek().is_none();
        out.push(if last { 1 } else { 0 });
        let len = chunk.len() as u16;
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&(!len).to_le_bytes());
        out.extend_from_slice(chunk);
    }
    out.extend_from_slice(&adler32(data).to_be_bytes());
    out
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for byte in data {
        crc ^= *byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xedb8_8320 & mask);
        }
    }
    !crc
}

fn adler32(data: &[u8]) -> u32 {
    const MOD: u32 = 65521;
    let mut a = 1u32;
    let mut b = 0u32;
    for chunk in data.chunks(5552) {
        for byte in chunk {
            a += *byte as u32;
            b += a;
        }
        a %= MOD;
        b %= MOD;
    }
    (b << 16) | a
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> ExportOptions {
        ExportOptions::default()
    }

    #[test]
    fn test_count_items() {
        assert_eq!(count_items(&json!([1, 2, 3])), 3);
        assert_eq!(
            count_items(&json!({"a": [1, 2], "b": [3], "c": "scalar"})),
            3
        );
        assert_eq!(count_items(&json!("x")), 0);
    }

    #[test]
    fn test_csv_escaping_doubles_quotes() {
        assert_eq!(escape_csv_field("plain", ','), "plain");
        assert_eq!(escape_csv_field("a,b", ','), "\"a,b\"");
        assert_eq!(escape_csv_field("say \"hi\"", ','), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_csv_field("line\nbreak", ','), "\"line\nbreak\"");
    }

    #[test]
    fn test_rows_to_csv_with_header_and_formatting() {
        let rows = tabular_rows(&json!([
            {"name": "Ali", "amount": 1234.5, "date": "2024-01-15"},
            {"name": "Veli, Jr", "amount": 10}
        ]));
        let columns = column_order(&rows);
        let csv = rows_to_csv(&rows, &columns, &options());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        // serde_json maps iterate in sorted key order
        assert_eq!(lines[0], "amount,date,name");
        assert!(lines[1].contains("1234.50"));
        assert!(lines[1].contains("2024-01-15"));
        assert!(lines[2].contains("\"Veli, Jr\""));
    }

    #[test]
    fn test_decimal_precision_from_format() {
        assert_eq!(decimal_precision("#,##0.00"), 2);
        assert_eq!(decimal_precision("0.000"), 3);
        assert_eq!(decimal_precision("#,##0"), 0);
    }

    #[test]
    fn test_workbook_one_sheet_per_key_with_native_types() {
        let workbook = build_workbook(&json!({
            "donations": [{"amount": 100.5, "date": "2024-01-01", "recurring": true}],
            "expenses": [{"amount": 40}]
        }));
        assert_eq!(workbook.sheets.len(), 2);
        let donations = workbook
            .sheets
            .iter()
            .find(|s| s.name == "donations")
            .unwrap();
        assert!(donations.rows[0].contains(&CellValue::Number(100.5)));
        assert!(donations.rows[0].contains(&CellValue::Bool(true)));
        assert!(donations
            .rows[0]
            .iter()
            .any(|c| matches!(c, CellValue::Date(_))));
    }

    #[test]
    fn test_workbook_xml_is_wellformed_enough() {
        let workbook = build_workbook(&json!([{"a": 1, "b": "x<y"}]));
        let xml = String::from_utf8(workbook_to_xml(&workbook)).unwrap();
        assert!(xml.contains("ss:Type=\"Number\">1<"));
        assert!(xml.contains("x&lt;y"));
        assert!(xml.ends_with("</Workbook>\n"));
    }

    #[test]
    fn test_chart_spec_prefers_categories() {
        let spec = chart_spec(
            &json!({
                "categories": [{"name": "food", "value": 30.0}, {"name": "health", "value": 70.0}],
                "time_series": [{"date": "2024-01-01", "values": {"amount": 5.0}}]
            }),
            "Breakdown",
            &options(),
        );
        assert_eq!(spec.series.len(), 2);
        assert_eq!(spec.series[0], ("food".to_string(), 30.0));
    }

    #[test]
    fn test_svg_contains_bars() {
        let spec = chart_spec(&json!({"categories": [{"name": "a", "value": 1.0}]}), "t", &options());
        let svg = BasicChartRenderer.render_svg(&spec).unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("<rect"));
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn test_png_signature_and_chunks() {
        let spec = ChartSpec {
            title: "t".to_string(),
            width: 16,
            height: 8,
            background: "#ffffff".to_string(),
            quality: 90,
            series: vec![("a".to_string(), 1.0)],
        };
        let png = BasicChartRenderer.render_png(&spec).unwrap();
        assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n']);
        assert_eq!(&png[12..16], b"IHDR");
        assert_eq!(&png[png.len() - 8..png.len() - 4], b"IEND");
    }

    #[test]
    fn test_crc32_known_value() {
        // CRC-32 of "123456789" is 0xCBF43926
        assert_eq!(crc32(b"123456789"), 0xcbf4_3926);
    }

    #[test]
    fn test_adler32_known_value() {
        // Adler-32 of "Wikipedia" is 0x11E60398
        assert_eq!(adler32(b"Wikipedia"), 0x11e6_0398);
    }

    #[test]
    fn test_document_rendering_lists_rows() {
        let doc = render_document(
            &json!([{"name": "Ali", "amount": 5}]),
            "Monthly Report",
            &options(),
        );
        let text = String::from_utf8(doc).unwrap();
        assert!(text.starts_with("Monthly Report"));
        // serde_json maps iterate in sorted key order
        assert!(text.contains("amount | name"));
        assert!(text.contains("5 | Ali"));
    }
}
