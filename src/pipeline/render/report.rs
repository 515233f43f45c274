//! Fixed-layout HMR report.
//!
//! Sections: patient, medications, interview, recommendations, sign-off,
//! then optional appendices. Text flows down the page and breaks onto a
//! new page when it reaches the bottom margin.

use std::io::BufWriter;

use chrono::NaiveDate;
use printpdf::*;

use super::narrative;
use super::RenderError;
use crate::models::enums::{PageFormat, Watermark};
use crate::models::CanonicalRecord;
use crate::pipeline::validation::ValidationIssue;

const MARGIN: f32 = 20.0;
const BODY_SIZE: f32 = 9.5;
const HEADING_SIZE: f32 = 12.0;
const TITLE_SIZE: f32 = 15.0;
const LINE_GAP: f32 = 4.8;
/// Rough Helvetica advance per point of font size, in mm.
const CHAR_WIDTH_PER_PT: f32 = 0.19;

/// Everything the report needs beyond the record itself.
pub struct ReportInput<'a> {
    pub record: &'a CanonicalRecord,
    pub pharmacist: Option<&'a str>,
    pub issues: &'a [ValidationIssue],
    pub watermark: Watermark,
    pub page_format: PageFormat,
    pub include_appendices: bool,
    pub generated_on: NaiveDate,
}

fn pdf_err(e: impl std::fmt::Display) -> RenderError {
    RenderError::Pdf(e.to_string())
}

struct PageWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    width: f32,
    height: f32,
    y: f32,
    pages: usize,
    watermark: Watermark,
}

impl PageWriter {
    fn new(title: &str, format: PageFormat, watermark: Watermark) -> Result<Self, RenderError> {
        let (width, height) = format.dimensions_mm();
        let (doc, page, layer) = PdfDocument::new(title, Mm(width), Mm(height), "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        let font = doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_err)?;
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold).map_err(pdf_err)?;

        let mut writer = Self {
            doc,
            layer,
            font,
            bold,
            width,
            height,
            y: height - MARGIN,
            pages: 1,
            watermark,
        };
        writer.stamp_page();
        Ok(writer)
    }

    /// Watermark, status label and page number for the current page.
    fn stamp_page(&mut self) {
        if self.watermark == Watermark::Draft {
            self.layer
                .set_fill_color(Color::Greyscale(Greyscale::new(0.88, None)));
            self.layer.use_text(
                self.watermark.label(),
                96.0,
                Mm(self.width / 2.0 - 55.0),
                Mm(self.height / 2.0),
                &self.bold,
            );
            self.layer
                .set_fill_color(Color::Greyscale(Greyscale::new(0.0, None)));
        }
        self.layer.use_text(
            self.watermark.label(),
            9.0,
            Mm(self.width - MARGIN - 15.0),
            Mm(self.height - 10.0),
            &self.bold,
        );
        self.layer.use_text(
            format!("Page {}", self.pages),
            8.0,
            Mm(self.width / 2.0 - 6.0),
            Mm(10.0),
            &self.font,
        );
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(self.width), Mm(self.height), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.pages += 1;
        self.y = self.height - MARGIN;
        self.stamp_page();
    }

    fn ensure_space(&mut self, needed: f32) {
        if self.y - needed < MARGIN {
            self.new_page();
        }
    }

    fn max_chars(&self, size: f32, indent: f32) -> usize {
        let usable = self.width - 2.0 * MARGIN - indent;
        ((usable / (size * CHAR_WIDTH_PER_PT)) as usize).max(20)
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn title(&mut self, text: &str) {
        self.ensure_space(TITLE_SIZE);
        self.layer
            .use_text(text, TITLE_SIZE, Mm(MARGIN), Mm(self.y), &self.bold);
        self.y -= 9.0;
    }

    fn heading(&mut self, text: &str) {
        self.gap(3.0);
        // Keep a heading with at least two lines of its section.
        self.ensure_space(7.0 + 2.0 * LINE_GAP);
        self.layer
            .use_text(text, HEADING_SIZE, Mm(MARGIN), Mm(self.y), &self.bold);
        self.y -= 7.0;
    }

    fn paragraph(&mut self, text: &str, indent: f32) {
        for line in wrap_text(text, self.max_chars(BODY_SIZE, indent)) {
            self.ensure_space(LINE_GAP);
            self.layer
                .use_text(line, BODY_SIZE, Mm(MARGIN + indent), Mm(self.y), &self.font);
            self.y -= LINE_GAP;
        }
    }

    fn label_value(&mut self, label: &str, value: &str) {
        let value = value.trim();
        let value = if value.is_empty() { "Not recorded" } else { value };
        self.ensure_space(LINE_GAP);
        self.layer
            .use_text(format!("{label}:"), BODY_SIZE, Mm(MARGIN), Mm(self.y), &self.bold);
        let indent = 45.0;
        let mut first = true;
        for line in wrap_text(value, self.max_chars(BODY_SIZE, indent)) {
            if !first {
                self.ensure_space(LINE_GAP);
            }
            self.layer
                .use_text(line, BODY_SIZE, Mm(MARGIN + indent), Mm(self.y), &self.font);
            self.y -= LINE_GAP;
            first = false;
        }
    }

    fn finish(self) -> Result<Vec<u8>, RenderError> {
        let mut buf = BufWriter::new(Vec::new());
        self.doc.save(&mut buf).map_err(pdf_err)?;
        buf.into_inner().map_err(pdf_err)
    }
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.chars().count() + word.chars().count() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

// ═══════════════════════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════════════════════

fn patient_section(w: &mut PageWriter, record: &CanonicalRecord) {
    let p = &record.patient;
    w.heading("Patient details");
    w.label_value("Name", &p.name);
    w.label_value("Date of birth", &p.date_of_birth);
    w.label_value("Gender", &p.gender);
    w.label_value("Medicare number", &p.medicare_number);
    w.label_value("Phone", &p.phone);
    w.label_value("Email", &p.email);
    w.label_value("Address", &p.address);
    w.label_value("Allergies", &p.allergies);
    w.label_value("Conditions", &p.conditions);
    w.label_value("Medical history", &p.medical_history);

    w.heading("Referring GP");
    w.label_value("GP", &p.referring_gp);
    w.label_value("Practice", &p.gp_practice);
    w.label_value("GP email", &p.gp_email);
}

fn medications_section(w: &mut PageWriter, record: &CanonicalRecord) {
    w.heading("Current medications");
    if record.medications.is_empty() {
        w.paragraph("No medications recorded.", 0.0);
        return;
    }
    for (i, med) in record.medications.iter().enumerate() {
        let name = med.display_name();
        let name = if name.is_empty() { "Unnamed medication".to_string() } else { name };
        w.ensure_space(2.0 * LINE_GAP);
        w.paragraph(&format!("{}. {}", i + 1, name), 0.0);

        let directions: Vec<&str> = [&med.dosage, &med.frequency, &med.route]
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if !directions.is_empty() {
            w.paragraph(&directions.join(", "), 6.0);
        }
        w.paragraph(narrative::regularity_phrase(med.regularity), 6.0);
        if !med.prescriber.trim().is_empty() {
            w.paragraph(&format!("Prescriber: {}", med.prescriber.trim()), 6.0);
        }
        w.gap(1.5);
    }
}

fn interview_section(w: &mut PageWriter, record: &CanonicalRecord, pharmacist: Option<&str>) {
    let interview = &record.interview;
    w.heading("Patient interview");
    w.label_value("Interview date", &interview.interview_date);
    w.label_value("Pharmacist", pharmacist.unwrap_or_default());
    w.gap(1.5);
    for sentence in narrative::lifestyle_sentences(interview) {
        w.paragraph(&format!("{sentence}."), 0.0);
    }
    if !interview.notes.trim().is_empty() {
        w.gap(1.5);
        w.paragraph(interview.notes.trim(), 0.0);
    }
}

fn recommendations_section(w: &mut PageWriter, record: &CanonicalRecord) {
    w.heading("Recommendations");
    if record.recommendations.is_empty() {
        w.paragraph("No recommendations recorded.", 0.0);
        return;
    }
    for (i, rec) in record.recommendations.iter().enumerate() {
        w.ensure_space(3.0 * LINE_GAP);
        w.paragraph(
            &format!("{}. [{} priority] {}", i + 1, rec.priority.label(), rec.issue.trim()),
            0.0,
        );
        if !rec.action.trim().is_empty() {
            w.paragraph(&format!("Action: {}", rec.action.trim()), 6.0);
        }
        if !rec.counselling.trim().is_empty() {
            w.paragraph(&format!("Counselling: {}", rec.counselling.trim()), 6.0);
        }
        w.gap(1.5);
    }
}

fn sign_off(w: &mut PageWriter, pharmacist: Option<&str>, generated_on: NaiveDate) {
    w.gap(6.0);
    w.ensure_space(3.0 * LINE_GAP);
    match pharmacist {
        Some(name) => w.paragraph(&format!("Prepared by {name}"), 0.0),
        None => w.paragraph("Prepared by: not recorded", 0.0),
    }
    w.paragraph(&format!("Date: {}", generated_on.format("%d/%m/%Y")), 0.0);
}

fn appendices(w: &mut PageWriter, input: &ReportInput<'_>) {
    w.new_page();
    w.heading("Appendix A: Medication compliance");
    if input.record.medications.is_empty() {
        w.paragraph("No medications recorded.", 0.0);
    }
    for med in &input.record.medications {
        let name = med.display_name();
        let name = if name.is_empty() { "Unnamed medication".to_string() } else { name };
        w.paragraph(
            &format!("{name}: {}", narrative::compliance_phrase(med.compliance_status)),
            0.0,
        );
        if !med.compliance_notes.trim().is_empty() {
            w.paragraph(med.compliance_notes.trim(), 6.0);
        }
    }

    w.heading("Appendix B: Outstanding review items");
    let flagged = input.record.needs_review();
    if input.issues.is_empty() && flagged.is_empty() {
        w.paragraph("None.", 0.0);
        return;
    }
    for issue in input.issues {
        w.paragraph(
            &format!("[{}] {} ({})", issue.severity.as_str(), issue.message, issue.field_path),
            0.0,
        );
    }
    for path in flagged {
        w.paragraph(&format!("Extracted value needs checking: {path}"), 0.0);
    }
}

/// Lay out the full report and return the PDF bytes.
pub fn render_report(
    input: &ReportInput<'_>,
    progress: &dyn Fn(f32),
) -> Result<Vec<u8>, RenderError> {
    let mut w = PageWriter::new("Home Medicines Review", input.page_format, input.watermark)?;

    w.title("Home Medicines Review");
    w.paragraph(
        &format!("Report generated {}", input.generated_on.format("%d/%m/%Y")),
        0.0,
    );

    patient_section(&mut w, input.record);
    progress(0.2);
    medications_section(&mut w, input.record);
    progress(0.4);
    interview_section(&mut w, input.record, input.pharmacist);
    progress(0.6);
    recommendations_section(&mut w, input.record);
    sign_off(&mut w, input.pharmacist, input.generated_on);
    progress(0.8);

    if input.include_appendices {
        appendices(&mut w, input);
    }

    let pages = w.pages;
    let bytes = w.finish()?;
    tracing::debug!(pages, bytes = bytes.len(), "Report laid out");
    Ok(bytes)
}
