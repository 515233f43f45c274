//! Merge-field word-processing templates (DOCX).
//!
//! Two field notations are recognised: `{{field}}` placeholders typed into
//! body text, and Word MERGEFIELD fields (simple or complex). Word splits
//! text across runs freely, so placeholders are matched against the
//! joined text of a whole paragraph.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::ops::Range;
use std::sync::LazyLock;

use quick_xml::escape::unescape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::{Captures, Regex};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use super::TemplateError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-\[\]]+)\s*\}\}").unwrap()
});

static MERGEFIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)MERGEFIELD\s+"?([^\s"\\]+)"?"#).unwrap());

#[derive(Debug, Clone)]
pub struct DocxTemplate {
    bytes: Vec<u8>,
}

fn malformed(e: impl std::fmt::Display) -> TemplateError {
    TemplateError::Malformed(e.to_string())
}

/// Parts that can carry fields: the body, headers and footers.
fn is_content_part(name: &str) -> bool {
    name == "word/document.xml"
        || ((name.starts_with("word/header") || name.starts_with("word/footer"))
            && name.ends_with(".xml"))
}

impl DocxTemplate {
    pub fn parse(bytes: &[u8]) -> Result<Self, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(malformed)?;
        if archive.by_name("word/document.xml").is_err() {
            return Err(TemplateError::Malformed(
                "archive has no word/document.xml".into(),
            ));
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn discover_fields(&self) -> Result<Vec<String>, TemplateError> {
        let mut found = Vec::new();
        for (_, xml) in self.content_parts()? {
            transform_part(&xml, None, &mut found)?;
        }
        Ok(found)
    }

    /// Writes a copy of the document with every field replaced. Fields
    /// missing from `values` are blanked.
    pub fn fill(&self, values: &BTreeMap<String, String>) -> Result<Vec<u8>, TemplateError> {
        let fill_err = |e: zip::result::ZipError| TemplateError::FillFailed(e.to_string());

        let mut archive = ZipArchive::new(Cursor::new(&self.bytes)).map_err(malformed)?;
        let mut out = ZipWriter::new(Cursor::new(Vec::new()));
        let mut ignored = Vec::new();

        for i in 0..archive.len() {
            let name = archive.by_index(i).map_err(malformed)?.name().to_string();
            if is_content_part(&name) {
                let mut xml = String::new();
                archive
                    .by_index(i)
                    .map_err(malformed)?
                    .read_to_string(&mut xml)
                    .map_err(malformed)?;
                let filled = transform_part(&xml, Some(values), &mut ignored)?;
                out.start_file(name, SimpleFileOptions::default())
                    .map_err(fill_err)?;
                out.write_all(filled.as_bytes())
                    .map_err(|e| TemplateError::FillFailed(e.to_string()))?;
            } else {
                let entry = archive.by_index_raw(i).map_err(malformed)?;
                out.raw_copy_file(entry).map_err(fill_err)?;
            }
        }

        Ok(out.finish().map_err(fill_err)?.into_inner())
    }

    fn content_parts(&self) -> Result<Vec<(String, String)>, TemplateError> {
        let mut archive = ZipArchive::new(Cursor::new(&self.bytes)).map_err(malformed)?;
        let mut names: Vec<String> = archive
            .file_names()
            .filter(|n| is_content_part(n))
            .map(str::to_string)
            .collect();
        // Body first so discovery order follows the page.
        names.sort_by_key(|n| (n != "word/document.xml", n.clone()));

        let mut parts = Vec::with_capacity(names.len());
        for name in names {
            let mut xml = String::new();
            archive
                .by_name(&name)
                .map_err(malformed)?
                .read_to_string(&mut xml)
                .map_err(malformed)?;
            parts.push((name, xml));
        }
        Ok(parts)
    }

    #[cfg(test)]
    fn body_text(bytes: &[u8]) -> String {
        let template = Self::parse(bytes).unwrap();
        let (_, xml) = template.content_parts().unwrap().remove(0);
        let mut reader = Reader::from_str(&xml);
        let mut text = String::new();
        let mut in_t = false;
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) if e.name().as_ref() == b"w:t" => in_t = true,
                Event::End(e) if e.name().as_ref() == b"w:t" => in_t = false,
                Event::End(e) if e.name().as_ref() == b"w:p" => text.push('\n'),
                Event::Text(t) if in_t => text.push_str(&raw_text(&t).unwrap()),
                Event::GeneralRef(r) if in_t => text.push_str(&entity_text(&r)),
                Event::Eof => break,
                _ => {}
            }
        }
        text
    }
}

// ═══════════════════════════════════════════════════════════
// Paragraph rewriting
// ═══════════════════════════════════════════════════════════

/// Streams one XML part, buffering each top-level paragraph so fields can
/// be found and replaced across runs. With `values` unset the part is only
/// scanned.
fn transform_part(
    xml: &str,
    values: Option<&BTreeMap<String, String>>,
    found: &mut Vec<String>,
) -> Result<String, TemplateError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut paragraph: Vec<Event<'static>> = Vec::new();
    let mut depth = 0usize;

    loop {
        let event = reader.read_event().map_err(malformed)?.into_owned();
        if matches!(event, Event::Eof) {
            break;
        }

        let opens = matches!(&event, Event::Start(e) if e.name().as_ref() == b"w:p");
        let closes = matches!(&event, Event::End(e) if e.name().as_ref() == b"w:p");

        if opens {
            depth += 1;
        }
        if depth == 0 {
            writer.write_event(event).map_err(malformed)?;
            continue;
        }

        paragraph.push(event);
        if closes {
            depth -= 1;
            if depth == 0 {
                for ev in rewrite_paragraph(std::mem::take(&mut paragraph), values, found)? {
                    writer.write_event(ev).map_err(malformed)?;
                }
            }
        }
    }

    String::from_utf8(writer.into_inner()).map_err(malformed)
}

/// The text content of one `<w:t>` element.
struct TextSlot {
    start: usize,
    end: usize,
    text: String,
    /// Index into the paragraph's merge fields when this text is a field result.
    merge_field: Option<usize>,
    replacement: Option<String>,
}

fn raw_text(text: &BytesText<'_>) -> Result<String, TemplateError> {
    let raw = std::str::from_utf8(text).map_err(malformed)?;
    Ok(unescape(raw).map_err(malformed)?.into_owned())
}

/// Text for a `&name;` reference. Unknown entities read as empty.
fn entity_text(name: &[u8]) -> String {
    let reference = format!("&{};", String::from_utf8_lossy(name));
    unescape(&reference)
        .map(|text| text.into_owned())
        .unwrap_or_default()
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn merge_field_name(instr: &str) -> Option<String> {
    MERGEFIELD
        .captures(instr)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn push_unique(found: &mut Vec<String>, name: &str) {
    if !found.iter().any(|f| f == name) {
        found.push(name.to_string());
    }
}

/// New text for the run covering `span` of the paragraph text, or `None`
/// when no placeholder touches it. A value lands in the run where its
/// placeholder starts so it takes that run's formatting; text outside
/// placeholders stays in its own run.
fn splice_run(joined: &str, span: &Range<usize>, matches: &[(Range<usize>, String)]) -> Option<String> {
    let mut touching = matches
        .iter()
        .filter(|(range, _)| range.start < span.end && range.end > span.start)
        .peekable();
    touching.peek()?;

    let mut text = String::new();
    let mut pos = span.start;
    for (range, value) in touching {
        if range.start >= pos {
            text.push_str(&joined[pos..range.start]);
        }
        if span.contains(&range.start) {
            text.push_str(value);
        }
        pos = pos.max(range.end.min(span.end));
    }
    text.push_str(&joined[pos..span.end]);
    Some(text)
}

fn rewrite_paragraph(
    events: Vec<Event<'static>>,
    values: Option<&BTreeMap<String, String>>,
    found: &mut Vec<String>,
) -> Result<Vec<Event<'static>>, TemplateError> {
    let mut slots: Vec<TextSlot> = Vec::new();
    let mut merge_names: Vec<String> = Vec::new();

    let mut open_text: Option<(usize, String)> = None;
    let mut in_instr = false;
    let mut instr = String::new();
    let mut simple_field: Option<usize> = None;
    let mut pending_complex: Option<String> = None;
    let mut complex_field: Option<usize> = None;

    for (i, event) in events.iter().enumerate() {
        match event {
            Event::Start(e) => match e.name().as_ref() {
                b"w:t" => open_text = Some((i, String::new())),
                b"w:instrText" => {
                    in_instr = true;
                    instr.clear();
                }
                b"w:fldSimple" => {
                    if let Some(name) = attribute(e, "w:instr").as_deref().and_then(merge_field_name) {
                        merge_names.push(name);
                        simple_field = Some(merge_names.len() - 1);
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:fldSimple" => {
                    if let Some(name) = attribute(e, "w:instr").as_deref().and_then(merge_field_name) {
                        merge_names.push(name);
                    }
                }
                b"w:fldChar" => match attribute(e, "w:fldCharType").as_deref() {
                    Some("begin") => pending_complex = None,
                    Some("separate") => {
                        if let Some(name) = pending_complex.take() {
                            merge_names.push(name);
                            complex_field = Some(merge_names.len() - 1);
                        }
                    }
                    Some("end") => complex_field = None,
                    _ => {}
                },
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"w:t" => {
                    if let Some((start, text)) = open_text.take() {
                        slots.push(TextSlot {
                            start,
                            end: i,
                            text,
                            merge_field: simple_field.or(complex_field),
                            replacement: None,
                        });
                    }
                }
                b"w:instrText" => {
                    in_instr = false;
                    if let Some(name) = merge_field_name(&instr) {
                        pending_complex = Some(name);
                    }
                }
                b"w:fldSimple" => simple_field = None,
                _ => {}
            },
            Event::Text(t) => {
                if let Some((_, buf)) = open_text.as_mut() {
                    buf.push_str(&raw_text(t)?);
                } else if in_instr {
                    instr.push_str(&raw_text(t)?);
                }
            }
            Event::GeneralRef(r) => {
                if let Some((_, buf)) = open_text.as_mut() {
                    buf.push_str(&entity_text(r));
                }
            }
            _ => {}
        }
    }

    for name in &merge_names {
        push_unique(found, name);
    }

    // Merge field results: first run takes the value, the rest are emptied.
    let mut seen_fields = vec![false; merge_names.len()];
    for slot in slots.iter_mut() {
        if let Some(field) = slot.merge_field {
            let Some(values) = values else { continue };
            slot.replacement = Some(if seen_fields[field] {
                String::new()
            } else {
                seen_fields[field] = true;
                values.get(&merge_names[field]).cloned().unwrap_or_default()
            });
        }
    }

    // Placeholders in ordinary text, matched across runs.
    let plain: Vec<usize> = (0..slots.len())
        .filter(|&i| slots[i].merge_field.is_none())
        .collect();
    let joined: String = plain.iter().map(|&i| slots[i].text.as_str()).collect();
    for caps in PLACEHOLDER.captures_iter(&joined) {
        push_unique(found, &caps[1]);
    }

    if let Some(values) = values {
        let matches: Vec<(Range<usize>, String)> = PLACEHOLDER
            .captures_iter(&joined)
            .filter_map(|caps: Captures<'_>| {
                let whole = caps.get(0)?;
                let value = values.get(&caps[1]).cloned().unwrap_or_default();
                Some((whole.range(), value))
            })
            .collect();
        let mut offset = 0;
        for &i in &plain {
            let span = offset..offset + slots[i].text.len();
            offset = span.end;
            if let Some(text) = splice_run(&joined, &span, &matches) {
                slots[i].replacement = Some(text);
            }
        }
    }

    if slots.iter().all(|s| s.replacement.is_none()) {
        return Ok(events);
    }

    let mut out = Vec::with_capacity(events.len());
    let mut skip_until: Option<usize> = None;
    let mut slot_iter = slots.into_iter().filter(|s| s.replacement.is_some()).peekable();

    for (i, event) in events.into_iter().enumerate() {
        if let Some(end) = skip_until {
            if i <= end {
                continue;
            }
            skip_until = None;
        }
        match slot_iter.peek() {
            Some(slot) if slot.start == i => {
                let text = slot.replacement.clone().unwrap_or_default();
                out.push(Event::Start(
                    BytesStart::new("w:t").with_attributes([("xml:space", "preserve")]),
                ));
                out.push(Event::Text(BytesText::new(&text).into_owned()));
                out.push(Event::End(BytesEnd::new("w:t")));
                skip_until = Some(slot.end);
                slot_iter.next();
            }
            _ => out.push(event),
        }
    }
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn discovers_placeholders_and_merge_fields_in_order() {
        let template = DocxTemplate::parse(&fixtures::merge_docx()).unwrap();
        assert_eq!(
            template.discover_fields().unwrap(),
            ["patientName", "doctorName", "drugList", "pharmacist", "reviewDate"]
        );
    }

    #[test]
    fn fill_replaces_split_placeholders_and_field_results() {
        let template = DocxTemplate::parse(&fixtures::merge_docx()).unwrap();
        let filled = template
            .fill(&values(&[
                ("patientName", "Jane Doe"),
                ("doctorName", "Dr Lee"),
                ("pharmacist", "A. Smith"),
            ]))
            .unwrap();

        let text = DocxTemplate::body_text(&filled);
        assert!(text.contains("Patient: Jane Doe"), "{text}");
        assert!(text.contains("Doctor: Dr Lee"), "{text}");
        assert!(text.contains("A. Smith"), "{text}");
        assert!(!text.contains("«"), "{text}");
        assert!(!text.contains("{{"), "{text}");
        assert!(text.contains("Fish & chips"), "{text}");
    }

    #[test]
    fn fill_keeps_other_parts_and_field_codes() {
        let template = DocxTemplate::parse(&fixtures::merge_docx()).unwrap();
        let filled = template.fill(&BTreeMap::new()).unwrap();

        let refilled = DocxTemplate::parse(&filled).unwrap();
        // Merge fields survive a fill so the output can be merged again.
        let fields = refilled.discover_fields().unwrap();
        assert!(fields.contains(&"drugList".to_string()));
        assert!(fields.contains(&"pharmacist".to_string()));

        let mut archive = ZipArchive::new(Cursor::new(filled)).unwrap();
        let mut styles = String::new();
        archive
            .by_name("word/styles.xml")
            .unwrap()
            .read_to_string(&mut styles)
            .unwrap();
        assert_eq!(styles, "<w:styles/>");
    }

    #[test]
    fn values_are_xml_escaped() {
        let template = DocxTemplate::parse(&fixtures::merge_docx()).unwrap();
        let filled = template
            .fill(&values(&[("patientName", "Jane <J> & Co")]))
            .unwrap();
        assert!(DocxTemplate::body_text(&filled).contains("Patient: Jane <J> & Co"));
    }

    #[test]
    fn zip_without_document_part_is_malformed() {
        let bytes = crate::pipeline::format::fixtures::zip_with(&[("other.xml", "<a/>")]);
        assert!(matches!(
            DocxTemplate::parse(&bytes),
            Err(TemplateError::Malformed(_))
        ));
    }

    #[test]
    fn entity_references_decode() {
        assert_eq!(entity_text(b"amp"), "&");
        assert_eq!(entity_text(b"#233"), "é");
        assert_eq!(entity_text(b"#xE9"), "é");
        assert_eq!(entity_text(b"bogus"), "");
        let escaped = BytesText::from_escaped("a &amp;lt; b");
        assert_eq!(raw_text(&escaped).unwrap(), "a &lt; b");
    }

    fn document_part(bytes: Vec<u8>) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    #[test]
    fn split_placeholder_keeps_each_runs_formatting() {
        let document = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">Name: </w:t></w:r><w:r><w:rPr><w:i/></w:rPr><w:t>{{first</w:t></w:r><w:r><w:rPr><w:u/></w:rPr><w:t xml:space="preserve">Name}} seen</w:t></w:r></w:p></w:body></w:document>"#;
        let bytes = crate::pipeline::format::fixtures::zip_with(&[("word/document.xml", document)]);
        let template = DocxTemplate::parse(&bytes).unwrap();
        let xml = document_part(template.fill(&values(&[("firstName", "Jane")])).unwrap());

        assert!(xml.contains(r#"<w:b/></w:rPr><w:t xml:space="preserve">Name: </w:t>"#), "{xml}");
        assert!(xml.contains(r#"<w:i/></w:rPr><w:t xml:space="preserve">Jane</w:t>"#), "{xml}");
        assert!(xml.contains(r#"<w:u/></w:rPr><w:t xml:space="preserve"> seen</w:t>"#), "{xml}");
    }

    #[test]
    fn several_placeholders_in_one_run_are_all_filled() {
        let document = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:t>{{a}} and {{b}}</w:t></w:r></w:p></w:body></w:document>"#;
        let bytes = crate::pipeline::format::fixtures::zip_with(&[("word/document.xml", document)]);
        let filled = DocxTemplate::parse(&bytes)
            .unwrap()
            .fill(&values(&[("a", "one"), ("b", "two")]))
            .unwrap();
        assert_eq!(DocxTemplate::body_text(&filled), "one and two\n");
    }
}
