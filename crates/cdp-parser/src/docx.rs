//! DOCX document parser using docx-rs
//!
//! Rental application forms are usually laid out as two-column tables
//! ("Telefon" | "0176 ..."). Such rows become form fields; paragraphs are
//! scanned for "Label: value" lines.

use docx_rs::read_docx;

use crate::{
    detect_form_fields, DocumentParser, FileType, FormField, ParsedDocument, ParserError, Result,
};

/// DOCX document parser
pub struct DocxParser {
    /// Whether two-cell table rows are treated as label/value pairs
    pub table_fields: bool,
}

impl DocxParser {
    /// Create a new DOCX parser with default settings
    pub fn new() -> Self {
        Self { table_fields: true }
    }

    /// Enable or disable table row field detection
    pub fn with_table_fields(mut self, enabled: bool) -> Self {
        self.table_fields = enabled;
        self
    }
}

impl Default for DocxParser {
    fn default() -> Self {
        Self::new()
    }
}

fn paragraph_text(para: &docx_rs::Paragraph) -> String {
    let mut text = String::new();
    for child in &para.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                if let docx_rs::RunChild::Text(t) = run_child {
                    text.push_str(&t.text);
                }
            }
        }
    }
    text
}

fn table_rows(tbl: &docx_rs::Table) -> Vec<Vec<String>> {
    let mut rows = Vec::new();

    for row in &tbl.rows {
        let docx_rs::TableChild::TableRow(tr) = row;
        let mut cells = Vec::new();

        for cell in &tr.cells {
            let docx_rs::TableRowChild::TableCell(tc) = cell;
            let mut cell_text = String::new();

            for content in &tc.children {
                if let docx_rs::TableCellContent::Paragraph(para) = content {
                    if !cell_text.is_empty() {
                        cell_text.push(' ');
                    }
                    cell_text.push_str(&paragraph_text(para));
                }
            }

            cells.push(cell_text.trim().to_string());
        }

        rows.push(cells);
    }

    rows
}

impl DocumentParser for DocxParser {
    fn parse_bytes(&self, name: &str, bytes: &[u8]) -> Result<ParsedDocument> {
        let docx = read_docx(bytes).map_err(|e| ParserError::DocxError(e.to_string()))?;

        let mut content = String::new();
        let mut paragraphs = String::new();
        let mut table_fields = Vec::new();

        for child in &docx.document.children {
            match child {
                docx_rs::DocumentChild::Paragraph(para) => {
                    let text = paragraph_text(para);
                    paragraphs.push_str(&text);
                    paragraphs.push('\n');
                    content.push_str(&text);
                    content.push('\n');
                }
                docx_rs::DocumentChild::Table(tbl) => {
                    for row in table_rows(tbl) {
                        if self.table_fields && row.len() == 2 {
                            let label = row[0].trim_end_matches(':').trim();
                            if !label.is_empty() && !row[1].is_empty() {
                                table_fields.push(FormField::new(label, row[1].as_str()));
                            }
                        }
                        content.push_str(&row.join("\t"));
                        content.push('\n');
                    }
                }
                _ => {}
            }
        }

        let mut doc = ParsedDocument::new(name, FileType::Docx);
        doc.form_fields = table_fields;
        // DOCX has no page boundaries until rendered
        doc.form_fields.extend(
            detect_form_fields(&paragraphs)
                .into_iter()
                .map(|f| FormField { page: None, ..f }),
        );
        doc.content = content;

        Ok(doc)
    }

    fn supported_types(&self) -> &[FileType] {
        &[FileType::Docx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};

    fn cell(text: &str) -> TableCell {
        TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text(text)))
    }

    fn build_form() -> Vec<u8> {
        let table = Table::new(vec![
            TableRow::new(vec![cell("Telefon:"), cell("0176 12345678")]),
            TableRow::new(vec![cell("E-Mail"), cell("mieter@example.de")]),
            TableRow::new(vec![cell("Zimmer"), cell("3"), cell("Balkon")]),
        ]);

        let mut buf = std::io::Cursor::new(Vec::new());
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Mieterselbstauskunft")))
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Name: Erika Muster")))
            .add_table(table)
            .build()
            .pack(&mut buf)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_docx_parser_creation() {
        let parser = DocxParser::new();
        assert!(parser.table_fields);

        let parser = parser.with_table_fields(false);
        assert!(!parser.table_fields);
    }

    #[test]
    fn test_table_rows_become_fields() {
        let doc = DocxParser::new().parse_bytes("form.docx", &build_form()).unwrap();

        assert!(doc.content.contains("Mieterselbstauskunft"));
        assert!(doc.form_fields.contains(&FormField::new("Telefon", "0176 12345678")));
        assert!(doc.form_fields.contains(&FormField::new("E-Mail", "mieter@example.de")));
        assert!(doc.form_fields.contains(&FormField::new("Name", "Erika Muster")));
        assert!(!doc.form_fields.iter().any(|f| f.label == "Zimmer"));
    }

    #[test]
    fn test_invalid_docx() {
        let result = DocxParser::new().parse_bytes("broken.docx", b"not a zip");
        assert!(matches!(result, Err(ParserError::DocxError(_))));
    }

    #[test]
    fn test_supported_types() {
        let parser = DocxParser::new();
        assert!(parser.can_parse(FileType::Docx));
        assert!(!parser.can_parse(FileType::Pdf));
    }
}
