//! Line-oriented layout markup produced by `templates/report.xml`.
//!
//! Each non-blank line is exactly one element:
//!
//! ```text
//! <title>Fleet Report</title>
//! <kpi label="Devices">42</kpi>
//! <image src="data:image/png;base64,..." width="170"/>
//! <thead widths="60,50,40"><c>Device</c><c>Site</c><c>Status</c></thead>
//! <tr><c>Lamp 1</c><c>Depot</c><c>Online</c></tr>
//! <spacer/>
//! ```
//!
//! Text content comes out of an autoescaping template, so it never holds a
//! raw `<`, `>` or `"`; entities are decoded here.

use crate::error::{ReportError, Result};

// ---

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    Subtitle(String),
    Heading(String),
    Text(String),
    Kpi { label: String, value: String },
    Image { src: String, width_mm: f32 },
    TableHeader { widths_mm: Vec<f32>, cells: Vec<String> },
    TableRow(Vec<String>),
    Spacer,
}

const DEFAULT_IMAGE_WIDTH_MM: f32 = 170.0;

pub fn parse_markup(markup: &str) -> Result<Vec<Block>> {
    // ---
    markup
        .lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(n, line)| {
            parse_line(line)
                .map_err(|e| ReportError::Render(format!("layout line {n}: {e}")))
        })
        .collect()
}

fn parse_line(line: &str) -> std::result::Result<Block, String> {
    // ---
    let element = Element::parse(line)?;
    let block = match element.name {
        "title" => Block::Title(decode_entities(element.body)),
        "subtitle" => Block::Subtitle(decode_entities(element.body)),
        "heading" => Block::Heading(decode_entities(element.body)),
        "text" => Block::Text(decode_entities(element.body)),
        "kpi" => Block::Kpi {
            label: element.attr("label").unwrap_or_default(),
            value: decode_entities(element.body),
        },
        "image" => Block::Image {
            src: element.attr("src").ok_or("image without src")?,
            width_mm: element
                .attr("width")
                .and_then(|w| w.parse().ok())
                .unwrap_or(DEFAULT_IMAGE_WIDTH_MM),
        },
        "thead" => Block::TableHeader {
            widths_mm: element
                .attr("widths")
                .map(|w| w.split(',').filter_map(|v| v.trim().parse().ok()).collect())
                .unwrap_or_default(),
            cells: cells(element.body)?,
        },
        "tr" => Block::TableRow(cells(element.body)?),
        "spacer" => Block::Spacer,
        other => return Err(format!("unknown element <{other}>")),
    };
    Ok(block)
}

struct Element<'a> {
    name: &'a str,
    attrs: Vec<(&'a str, &'a str)>,
    body: &'a str,
}

impl<'a> Element<'a> {
    fn parse(line: &'a str) -> std::result::Result<Self, String> {
        // ---
        let rest = line.strip_prefix('<').ok_or("expected '<'")?;
        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .ok_or("unterminated tag")?;
        let name = &rest[..name_end];
        let mut rest = &rest[name_end..];

        let mut attrs = Vec::new();
        loop {
            rest = rest.trim_start();
            if let Some(after) = rest.strip_prefix("/>") {
                if !after.trim().is_empty() {
                    return Err(format!("trailing text after <{name}/>"));
                }
                return Ok(Element { name, attrs, body: "" });
            }
            if let Some(after) = rest.strip_prefix('>') {
                rest = after;
                break;
            }
            let eq = rest.find("=\"").ok_or("malformed attribute")?;
            let key = rest[..eq].trim();
            let value_start = &rest[eq + 2..];
            let close = value_start.find('"').ok_or("unterminated attribute")?;
            attrs.push((key, &value_start[..close]));
            rest = &value_start[close + 1..];
        }

        let closing = format!("</{name}>");
        let body = rest
            .strip_suffix(closing.as_str())
            .ok_or_else(|| format!("missing {closing}"))?;
        Ok(Element { name, attrs, body })
    }

    fn attr(&self, key: &str) -> Option<String> {
        self.attrs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| decode_entities(v))
    }
}

fn cells(body: &str) -> std::result::Result<Vec<String>, String> {
    // ---
    let mut out = Vec::new();
    let mut rest = body.trim();
    while !rest.is_empty() {
        let inner = rest.strip_prefix("<c>").ok_or("expected <c>")?;
        let end = inner.find("</c>").ok_or("missing </c>")?;
        out.push(decode_entities(&inner[..end]));
        rest = inner[end + 4..].trim_start();
    }
    Ok(out)
}

/// Undo HTML escaping. `&amp;` goes last so `&amp;lt;` stays `&lt;`.
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&#x2F;", "/")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_parses_each_element() {
        // ---
        let markup = r#"
<title>Fleet Report</title>

<subtitle>North &amp; South</subtitle>
<kpi label="Energy (kWh)">12.5</kpi>
<image src="data:image/png;base64,AQID" width="90"/>
<thead widths="60, 40"><c>Device</c><c>Site</c></thead>
<tr><c>&lt;Lamp&gt;</c><c>O&#x27;Brien&#x2F;Depot</c></tr>
<spacer/>
"#;
        let blocks = parse_markup(markup).unwrap();

        assert_eq!(
            blocks,
            vec![
                Block::Title("Fleet Report".into()),
                Block::Subtitle("North & South".into()),
                Block::Kpi { label: "Energy (kWh)".into(), value: "12.5".into() },
                Block::Image { src: "data:image/png;base64,AQID".into(), width_mm: 90.0 },
                Block::TableHeader {
                    widths_mm: vec![60.0, 40.0],
                    cells: vec!["Device".into(), "Site".into()]
                },
                Block::TableRow(vec!["<Lamp>".into(), "O'Brien/Depot".into()]),
                Block::Spacer,
            ]
        );
    }

    #[test]
    fn test_escaped_ampersand_survives() {
        // ---
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("plain"), "plain");
    }

    #[test]
    fn test_rejects_malformed_lines() {
        // ---
        assert!(parse_markup("<marquee>hi</marquee>").is_err());
        assert!(parse_markup("<title>unterminated").is_err());
        assert!(parse_markup("<tr><c>a</c>b</tr>").is_err());
        assert!(parse_markup("just text").is_err());
    }

    #[test]
    fn test_empty_row() {
        // ---
        assert_eq!(parse_markup("<tr></tr>").unwrap(), vec![Block::TableRow(vec![])]);
    }
}
