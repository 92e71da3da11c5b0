//! DOCX template engine
//!
//! A DOCX file is a zip archive of WordprocessingML parts. Templates carry
//! `{{key}}` tokens in the body, tables, headers and footers. Word freely
//! splits a token across several runs (`{{NA` + `ME}}`), so substitution
//! works on the concatenated text of each paragraph and writes the result
//! back into the paragraph's original `<w:t>` nodes.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Write};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// DOCX processing error
#[derive(Debug, Error)]
pub enum DocxError {
    #[error("Invalid DOCX archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DOCX is missing part {0}")]
    MissingPart(String),

    #[error("DOCX part {0} is not UTF-8")]
    Encoding(String),
}

pub type DocxResult<T> = Result<T, DocxError>;

const DOCUMENT_PART: &str = "word/document.xml";

static PARAGRAPH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:p(?:\s[^>]*?)?(?:/>|>.*?</w:p>)").expect("static regex"));
static TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(<w:t(?:\s[^>]*)?>)(.*?)</w:t>").expect("static regex"));
static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("static regex"));
static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<w:tbl(?:\s[^>]*)?>.*?</w:tbl>|<w:p(?:\s[^>]*?)?(?:/>|>.*?</w:p>)")
        .expect("static regex")
});
static ROW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:tr(?:\s[^>]*)?>.*?</w:tr>").expect("static regex"));
static CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:tc(?:\s[^>]*)?>.*?</w:tc>").expect("static regex"));
static RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:r(?:\s[^>]*)?>.*?</w:r>").expect("static regex"));
static ALIGN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<w:jc w:val="([a-z]+)"\s*/>"#).expect("static regex"));

/// Parts that can carry tokens: body, headers, footers
fn is_text_part(name: &str) -> bool {
    name == DOCUMENT_PART
        || (name.starts_with("word/header") && name.ends_with(".xml"))
        || (name.starts_with("word/footer") && name.ends_with(".xml"))
}

fn read_parts(bytes: &[u8]) -> DocxResult<Vec<(String, Vec<u8>)>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut parts = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        parts.push((file.name().to_string(), data));
    }
    Ok(parts)
}

fn write_parts(parts: &[(String, Vec<u8>)]) -> DocxResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, data) in parts {
        if name.ends_with('/') {
            writer.add_directory(name.as_str(), options)?;
            continue;
        }
        writer.start_file(name.as_str(), options)?;
        writer.write_all(data)?;
    }
    Ok(writer.finish()?.into_inner())
}

fn part_text(name: &str, data: &[u8]) -> DocxResult<String> {
    String::from_utf8(data.to_vec()).map_err(|_| DocxError::Encoding(name.to_string()))
}

/// Body, header and footer parts decoded as text
fn text_parts(parts: &[(String, Vec<u8>)]) -> DocxResult<Vec<(String, String)>> {
    parts
        .iter()
        .filter(|(name, _)| is_text_part(name))
        .map(|(name, data)| Ok((name.clone(), part_text(name, data)?)))
        .collect()
}

/// Replace `{{key}}` tokens whose key is in `values`; unknown tokens stay
pub fn fill_template(bytes: &[u8], values: &BTreeMap<String, String>) -> DocxResult<Vec<u8>> {
    let mut parts = read_parts(bytes)?;
    if !parts.iter().any(|(name, _)| name == DOCUMENT_PART) {
        return Err(DocxError::MissingPart(DOCUMENT_PART.to_string()));
    }
    for (name, data) in parts.iter_mut() {
        if !is_text_part(name) {
            continue;
        }
        let xml = part_text(name, data)?;
        let filled = PARAGRAPH_RE.replace_all(&xml, |caps: &regex::Captures| {
            fill_paragraph(&caps[0], values)
        });
        *data = filled.into_owned().into_bytes();
    }
    write_parts(&parts)
}

/// One `<w:t>` element's position in the paragraph XML and its unescaped text
struct TextNode {
    open_tag: std::ops::Range<usize>,
    close_end: usize,
    text: String,
}

fn text_nodes(paragraph: &str) -> Vec<TextNode> {
    TEXT_RE
        .captures_iter(paragraph)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let open = caps.get(1)?;
            let inner = caps.get(2)?;
            Some(TextNode {
                open_tag: open.range(),
                close_end: whole.end(),
                text: unescape_xml(inner.as_str()),
            })
        })
        .collect()
}

fn fill_paragraph(paragraph: &str, values: &BTreeMap<String, String>) -> String {
    let nodes = text_nodes(paragraph);
    let full: String = nodes.iter().map(|n| n.text.as_str()).collect();
    if !full.contains("{{") {
        return paragraph.to_string();
    }

    let matches: Vec<(usize, usize, &String)> = TOKEN_RE
        .captures_iter(&full)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let value = values.get(&caps[1])?;
            Some((whole.start(), whole.end(), value))
        })
        .collect();
    if matches.is_empty() {
        return paragraph.to_string();
    }

    // Byte range of each node within the concatenated paragraph text
    let mut bounds = Vec::with_capacity(nodes.len());
    let mut offset = 0;
    for node in &nodes {
        bounds.push((offset, offset + node.text.len()));
        offset += node.text.len();
    }

    let mut new_texts = vec![String::new(); nodes.len()];
    let copy = |from: usize, to: usize, out: &mut Vec<String>| {
        for (i, &(start, end)) in bounds.iter().enumerate() {
            let (a, b) = (from.max(start), to.min(end));
            if a < b {
                out[i].push_str(&full[a..b]);
            }
        }
    };

    let mut pos = 0;
    for (start, end, value) in matches {
        copy(pos, start, &mut new_texts);
        // The replacement lands in the node where the token begins
        if let Some(i) = bounds.iter().position(|&(s, e)| s <= start && start < e) {
            new_texts[i].push_str(value);
        }
        pos = end;
    }
    copy(pos, full.len(), &mut new_texts);

    let mut out = String::with_capacity(paragraph.len());
    let mut last = 0;
    for (node, text) in nodes.iter().zip(new_texts) {
        if node.text == text {
            continue;
        }
        out.push_str(&paragraph[last..node.open_tag.start]);
        out.push_str(&text_element(&text));
        last = node.close_end;
    }
    out.push_str(&paragraph[last..]);
    out
}

/// `<w:t>` element for `text`; newlines become `<w:br/>`
fn text_element(text: &str) -> String {
    text.split('\n')
        .map(|line| format!(r#"<w:t xml:space="preserve">{}</w:t>"#, escape_xml(line)))
        .collect::<Vec<_>>()
        .join("<w:br/>")
}

fn paragraph_text(paragraph: &str) -> String {
    text_nodes(paragraph).into_iter().map(|n| n.text).collect()
}

/// Sorted unique placeholder names found anywhere in the document
pub fn extract_placeholders(bytes: &[u8]) -> DocxResult<BTreeSet<String>> {
    let parts = read_parts(bytes)?;
    let mut names = BTreeSet::new();
    for (_, xml) in text_parts(&parts)? {
        for paragraph in PARAGRAPH_RE.find_iter(&xml) {
            let text = paragraph_text(paragraph.as_str());
            for caps in TOKEN_RE.captures_iter(&text) {
                names.insert(caps[1].to_string());
            }
        }
    }
    Ok(names)
}

/// Body paragraphs as plain text, one per line
pub fn plain_text(bytes: &[u8]) -> DocxResult<String> {
    let parts = read_parts(bytes)?;
    let (_, data) = parts
        .iter()
        .find(|(name, _)| name == DOCUMENT_PART)
        .ok_or_else(|| DocxError::MissingPart(DOCUMENT_PART.to_string()))?;
    let xml = part_text(DOCUMENT_PART, data)?;
    Ok(PARAGRAPH_RE
        .find_iter(&xml)
        .map(|p| paragraph_text(p.as_str()))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// HTML preview: headers, body paragraphs and tables in order, footers
pub fn to_preview_html(bytes: &[u8]) -> DocxResult<String> {
    let parts = read_parts(bytes)?;
    let texts = text_parts(&parts)?;
    let mut html = Vec::new();

    for (_, xml) in texts.iter().filter(|(n, _)| n.starts_with("word/header")) {
        html.push(r#"<div style="border-bottom:1px solid #000; margin-bottom:10px;">"#.to_string());
        html.extend(PARAGRAPH_RE.find_iter(xml).map(|p| paragraph_html(p.as_str())));
        html.push("</div>".to_string());
    }

    let body = texts
        .iter()
        .find(|(n, _)| n == DOCUMENT_PART)
        .ok_or_else(|| DocxError::MissingPart(DOCUMENT_PART.to_string()))?;
    for block in BLOCK_RE.find_iter(&body.1) {
        let block = block.as_str();
        if block.starts_with("<w:tbl") {
            html.push(table_html(block));
        } else {
            html.push(paragraph_html(block));
        }
    }

    for (_, xml) in texts.iter().filter(|(n, _)| n.starts_with("word/footer")) {
        html.push(r#"<div style="border-top:1px solid #000; margin-top:10px;">"#.to_string());
        html.extend(PARAGRAPH_RE.find_iter(xml).map(|p| paragraph_html(p.as_str())));
        html.push("</div>".to_string());
    }

    Ok(html.join("\n"))
}

fn table_html(table: &str) -> String {
    let mut html = String::from(r#"<table style="border-collapse:collapse; width:100%; margin:10px 0;">"#);
    for row in ROW_RE.find_iter(table) {
        html.push_str("<tr>");
        for cell in CELL_RE.find_iter(row.as_str()) {
            let inner: String = PARAGRAPH_RE
                .find_iter(cell.as_str())
                .map(|p| paragraph_html(p.as_str()))
                .collect();
            html.push_str(r#"<td style="border:1px solid #444; padding:5px; vertical-align:top;">"#);
            html.push_str(&inner);
            html.push_str("</td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    html
}

fn paragraph_html(paragraph: &str) -> String {
    let mut content = String::new();
    for run in RUN_RE.find_iter(paragraph) {
        let run = run.as_str();
        let text: String = text_nodes(run).into_iter().map(|n| n.text).collect();
        if text.trim().is_empty() {
            continue;
        }
        let mut piece = escape_html(&text);
        if has_toggle(run, "b") {
            piece = format!("<b>{}</b>", piece);
        }
        if has_toggle(run, "i") {
            piece = format!("<i>{}</i>", piece);
        }
        if run.contains("<w:u ") && !run.contains(r#"<w:u w:val="none""#) {
            piece = format!("<u>{}</u>", piece);
        }
        content.push_str(&piece);
    }

    let align = ALIGN_RE
        .captures(paragraph)
        .and_then(|caps| match &caps[1] {
            "left" | "start" => Some("left"),
            "center" => Some("center"),
            "right" | "end" => Some("right"),
            "both" => Some("justify"),
            _ => None,
        })
        .map(|a| format!("text-align:{};", a))
        .unwrap_or_default();
    format!(r#"<p style="{} margin:5px 0;">{}</p>"#, align, content)
}

/// `<w:b/>` or `<w:b w:val="1"/>`, but not `w:val="0"`/`"false"`
fn has_toggle(run: &str, tag: &str) -> bool {
    let plain = format!("<w:{}/>", tag);
    let valued = format!("<w:{} w:val=\"", tag);
    if run.contains(&plain) {
        return true;
    }
    run.match_indices(&valued).any(|(i, m)| {
        let rest = &run[i + m.len()..];
        !(rest.starts_with("0\"") || rest.starts_with("false\""))
    })
}

/// Package a single body part into a minimal DOCX
pub fn package(document_xml: &str) -> DocxResult<Vec<u8>> {
    let content_types = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;
    let rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;
    let parts = vec![
        ("[Content_Types].xml".to_string(), content_types.as_bytes().to_vec()),
        ("_rels/.rels".to_string(), rels.as_bytes().to_vec()),
        (DOCUMENT_PART.to_string(), document_xml.as_bytes().to_vec()),
    ];
    write_parts(&parts)
}

/// New document from plain text: blank lines separate paragraphs, single
/// newlines become line breaks
pub fn build_document(text: &str) -> DocxResult<Vec<u8>> {
    let normalized = text.replace("\r\n", "\n");
    let body: String = normalized
        .split("\n\n")
        .map(|para| format!("<w:p><w:r>{}</w:r></w:p>", text_element(para)))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}<w:sectPr/></w:body></w:document>"#,
        body
    );
    package(&xml)
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_html(text: &str) -> String {
    escape_xml(text).replace('"', "&quot;")
}

fn unescape_xml(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        rest = &rest[i..];
        let Some(end) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
