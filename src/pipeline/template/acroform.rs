//! Form-fillable PDF templates (AcroForm).
//!
//! Field names are fully qualified (`parent.child`) the way PDF viewers
//! show them. Filling sets `/V` and asks the viewer to regenerate
//! appearances.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};

use super::TemplateError;

#[derive(Debug, Clone)]
pub struct AcroFormTemplate {
    bytes: Vec<u8>,
}

fn malformed(e: impl std::fmt::Display) -> TemplateError {
    TemplateError::Malformed(e.to_string())
}

impl AcroFormTemplate {
    pub fn parse(bytes: &[u8]) -> Result<Self, TemplateError> {
        let doc = Document::load_mem(bytes).map_err(malformed)?;
        collect_fields(&doc)?;
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn discover_fields(&self) -> Result<Vec<String>, TemplateError> {
        let doc = Document::load_mem(&self.bytes).map_err(malformed)?;
        Ok(collect_fields(&doc)?.into_iter().map(|f| f.name).collect())
    }

    pub fn fill(&self, values: &BTreeMap<String, String>) -> Result<Vec<u8>, TemplateError> {
        let mut doc = Document::load_mem(&self.bytes).map_err(malformed)?;
        let fields = collect_fields(&doc)?;

        for field in &fields {
            let value = values.get(&field.name).map(String::as_str).unwrap_or_default();
            let dict = doc
                .get_object_mut(field.id)
                .and_then(Object::as_dict_mut)
                .map_err(malformed)?;

            if field.is_checkbox {
                let state: &[u8] = if is_truthy(value) { b"Yes" } else { b"Off" };
                dict.set("V", Object::Name(state.to_vec()));
                dict.set("AS", Object::Name(state.to_vec()));
            } else {
                dict.set("V", Object::String(encode_text(value), StringFormat::Literal));
                dict.remove(b"AP");
            }
        }

        set_need_appearances(&mut doc)?;

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| TemplateError::FillFailed(e.to_string()))?;
        Ok(out)
    }
}

struct FormField {
    name: String,
    id: ObjectId,
    is_checkbox: bool,
}

fn root_id(doc: &Document) -> Result<ObjectId, TemplateError> {
    doc.trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(malformed)
}

fn acroform_dict<'a>(doc: &'a Document, catalog: &'a Dictionary) -> Option<&'a Dictionary> {
    match catalog.get(b"AcroForm").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Terminal fields in document order. A document without a form has none.
fn collect_fields(doc: &Document) -> Result<Vec<FormField>, TemplateError> {
    let catalog = doc.get_dictionary(root_id(doc)?).map_err(malformed)?;
    let Some(acroform) = acroform_dict(doc, catalog) else {
        return Ok(Vec::new());
    };
    let Ok(roots) = acroform.get(b"Fields").and_then(Object::as_array) else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    for obj in roots {
        if let Ok(id) = obj.as_reference() {
            walk_field(doc, id, None, &mut out, 0)?;
        }
    }
    Ok(out)
}

const MAX_FIELD_DEPTH: usize = 16;

fn walk_field(
    doc: &Document,
    id: ObjectId,
    parent: Option<&str>,
    out: &mut Vec<FormField>,
    depth: usize,
) -> Result<(), TemplateError> {
    if depth > MAX_FIELD_DEPTH {
        return Err(TemplateError::Malformed("form field tree too deep".into()));
    }
    let dict = doc.get_dictionary(id).map_err(malformed)?;

    let partial = dict
        .get(b"T")
        .and_then(Object::as_str)
        .map(decode_text)
        .ok();
    let name = match (parent, partial) {
        (Some(p), Some(t)) => format!("{p}.{t}"),
        (None, Some(t)) => t,
        (Some(p), None) => p.to_string(),
        (None, None) => return Ok(()),
    };

    // Kids without their own /T are widget annotations of this field.
    let named_kids: Vec<ObjectId> = dict
        .get(b"Kids")
        .and_then(Object::as_array)
        .map(|kids| {
            kids.iter()
                .filter_map(|k| k.as_reference().ok())
                .filter(|kid| {
                    doc.get_dictionary(*kid)
                        .map(|d| d.has(b"T"))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default();

    if named_kids.is_empty() {
        let is_checkbox = matches!(
            dict.get(b"FT").and_then(Object::as_name),
            Ok(b"Btn")
        );
        out.push(FormField {
            name,
            id,
            is_checkbox,
        });
    } else {
        for kid in named_kids {
            walk_field(doc, kid, Some(&name), out, depth + 1)?;
        }
    }
    Ok(())
}

fn set_need_appearances(doc: &mut Document) -> Result<(), TemplateError> {
    let root = root_id(doc)?;
    let acroform_ref = doc
        .get_dictionary(root)
        .map_err(malformed)?
        .get(b"AcroForm")
        .and_then(Object::as_reference)
        .ok();

    let acroform = match acroform_ref {
        Some(id) => doc.get_object_mut(id),
        None => doc
            .get_object_mut(root)
            .and_then(Object::as_dict_mut)
            .and_then(|catalog| catalog.get_mut(b"AcroForm")),
    }
    .and_then(Object::as_dict_mut);

    if let Ok(dict) = acroform {
        dict.set("NeedAppearances", Object::Boolean(true));
    }
    Ok(())
}

/// PDF text strings: UTF-16BE with a byte-order mark, else PDFDocEncoding.
fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn encode_text(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    let mut out = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "yes" | "y" | "true" | "x" | "1" | "on"
    )
}

/// Current `/V` of every terminal field, decoded as text.
pub fn field_values(bytes: &[u8]) -> Result<BTreeMap<String, String>, TemplateError> {
    let doc = Document::load_mem(bytes).map_err(malformed)?;
    let mut values = BTreeMap::new();
    for field in collect_fields(&doc)? {
        let dict = doc.get_dictionary(field.id).map_err(malformed)?;
        let value = match dict.get(b"V") {
            Ok(Object::String(bytes, _)) => decode_text(bytes),
            Ok(Object::Name(name)) => String::from_utf8_lossy(name).into_owned(),
            _ => String::new(),
        };
        values.insert(field.name, value);
    }
    Ok(values)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::{dictionary, Document, Object, ObjectId};

    /// A one-page PDF whose form holds the given top-level text fields,
    /// plus a `gp` parent field with a `name` kid when `nested` is set.
    pub fn form_pdf(fields: &[&str], nested: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");

        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );

        let mut field_refs: Vec<Object> = Vec::new();
        for (i, name) in fields.iter().enumerate() {
            let id: ObjectId = doc.add_object(dictionary! {
                "FT" => "Tx",
                "T" => Object::string_literal(*name),
                "Rect" => vec![50.into(), (700 - 30 * i as i64).into(), 300.into(), (720 - 30 * i as i64).into()],
                "Subtype" => "Widget",
                "P" => page_id,
            });
            field_refs.push(id.into());
        }
        if nested {
            let parent_id = doc.new_object_id();
            let kid_id = doc.add_object(dictionary! {
                "FT" => "Tx",
                "T" => Object::string_literal("name"),
                "Parent" => parent_id,
                "Subtype" => "Widget",
                "P" => page_id,
            });
            doc.objects.insert(
                parent_id,
                Object::Dictionary(dictionary! {
                    "T" => Object::string_literal("gp"),
                    "Kids" => vec![kid_id.into()],
                }),
            );
            field_refs.push(parent_id.into());
        }

        let acroform_id = doc.add_object(dictionary! {
            "Fields" => field_refs,
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "AcroForm" => acroform_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    /// A valid PDF with no form at all.
    pub fn plain_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }
}
