//! Office metadata XML cleanup.
//!
//! Office docProps XML is noisy: namespaced tags, GUID-valued
//! attributes, format identifiers, and empty container elements that
//! carry no semantic content. Cleaning strips all of that so the
//! remaining XML is compact enough to hand to an LLM as context.

use std::sync::OnceLock;

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use crate::models::StageError;

#[derive(Debug, Default)]
struct XmlNode {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<XmlNode>,
}

fn guid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-fA-F0-9-]{36}").expect("static regex"))
}

fn local_name(qualified: &str) -> String {
    qualified
        .rsplit(':')
        .next()
        .unwrap_or(qualified)
        .to_string()
}

fn parse(xml: &str) -> Result<XmlNode, StageError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut root = XmlNode::default();
    let mut stack: Vec<XmlNode> = Vec::new();

    loop {
        match reader
            .read_event()
            .map_err(|e| StageError::Parse(format!("xml parse failed: {e}")))?
        {
            Event::Start(start) => {
                let mut node = XmlNode {
                    tag: local_name(&String::from_utf8_lossy(start.name().as_ref())),
                    ..Default::default()
                };
                for attr in start.attributes().flatten() {
                    let key = local_name(&String::from_utf8_lossy(attr.key.as_ref()));
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    node.attrs.push((key, value));
                }
                stack.push(node);
            }
            Event::Empty(start) => {
                let node = XmlNode {
                    tag: local_name(&String::from_utf8_lossy(start.name().as_ref())),
                    ..Default::default()
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root.children.push(node),
                }
            }
            Event::Text(text) => {
                if let Some(node) = stack.last_mut() {
                    node.text.push_str(
                        &text
                            .unescape()
                            .map_err(|e| StageError::Parse(e.to_string()))?,
                    );
                }
            }
            Event::End(_) => {
                let node = match stack.pop() {
                    Some(node) => node,
                    None => continue,
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root.children.push(node),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(root)
}

fn clean_node(node: &mut XmlNode) {
    node.attrs.retain(|(key, value)| {
        !guid_re().is_match(value) && !matches!(key.as_str(), "fmtid" | "pid" | "type")
    });

    for child in &mut node.children {
        clean_node(child);
    }
    node.children.retain(|child| {
        let guid_text = guid_re().is_match(child.text.trim())
            && child.text.trim().chars().count() == 36;
        let empty = child.text.trim().is_empty() && child.children.is_empty();
        !guid_text && !empty
    });
}

fn write_node(node: &XmlNode, out: &mut String) {
    out.push('<');
    out.push_str(&node.tag);
    for (key, value) in &node.attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(value);
        out.push('"');
    }
    out.push('>');
    out.push_str(node.text.trim());
    for child in &node.children {
        write_node(child, out);
    }
    out.push_str("</");
    out.push_str(&node.tag);
    out.push('>');
}

/// Clean one docProps XML document down to its semantic content.
pub fn clean_xml(xml: &str) -> Result<String, StageError> {
    let mut root = parse(xml)?;
    clean_node(&mut root);
    let mut out = String::new();
    for child in &root.children {
        write_node(child, &mut out);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_namespaces_and_guids() {
        let xml = r#"<cp:coreProperties xmlns:cp="http://example">
            <dc:title>Quarterly Report</dc:title>
            <cp:revision>00000000-0000-0000-0000-000000000000</cp:revision>
            <cp:empty></cp:empty>
        </cp:coreProperties>"#;
        let cleaned = clean_xml(xml).unwrap();
        assert!(cleaned.contains("<title>Quarterly Report</title>"));
        assert!(!cleaned.contains("revision"));
        assert!(!cleaned.contains("empty"));
    }

    #[test]
    fn test_strips_format_attributes() {
        let xml = r#"<properties><property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" name="Pages">4</property></properties>"#;
        let cleaned = clean_xml(xml).unwrap();
        assert!(cleaned.contains(r#"name="Pages""#));
        assert!(!cleaned.contains("fmtid"));
    }

    #[test]
    fn test_invalid_xml_is_an_error() {
        assert!(clean_xml("<unclosed").is_err());
    }
}
