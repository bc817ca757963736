use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::header_region;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagShape {
    Token,
    Remainder,
    Number,
    Pair,
}

const HEADER_TAGS: &[(&str, TagShape)] = &[
    ("FMT", TagShape::Token),
    ("UNI", TagShape::Remainder),
    ("OPR", TagShape::Remainder),
    ("CUR", TagShape::Number),
    ("TXS", TagShape::Pair),
];

static TAG_PATTERNS: LazyLock<Vec<(&'static str, TagShape, Regex)>> = LazyLock::new(|| {
    HEADER_TAGS
        .iter()
        .map(|(tag, shape)| {
            let body = match shape {
                TagShape::Token => r"(\S+)",
                TagShape::Remainder => r"([^\r\n]+)",
                TagShape::Number => r"([-\d.eE+]+)",
                TagShape::Pair => r"([-\d.eE+]+)[ \t]+([-\d.eE+]+)",
            };
            let pattern = format!(r"<{tag}>[ \t]+{body}");
            (*tag, *shape, Regex::new(&pattern).expect("header tag pattern"))
        })
        .collect()
});

static RAW_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*<([A-Za-z][A-Za-z0-9]*)>[ \t]*(.*?)\s*$").expect("raw tag pattern")
});

static GEOMETRY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[LP]\d+$").expect("geometry tag pattern"));

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Text(String),
    Number(f64),
    Pair(f64, f64),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Header {
    pub fields: BTreeMap<String, HeaderValue>,
    pub raw_tags: BTreeMap<String, String>,
    pub client: Option<String>,
    pub survey_id: Option<String>,
}

impl Header {
    fn text(&self, tag: &str) -> Option<&str> {
        match self.fields.get(tag) {
            Some(HeaderValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn format_code(&self) -> Option<&str> {
        self.text("FMT")
    }

    pub fn units(&self) -> Option<&str> {
        self.text("UNI")
    }

    pub fn operator(&self) -> Option<&str> {
        self.text("OPR")
    }

    pub fn peak_current(&self) -> Option<f64> {
        match self.fields.get("CUR") {
            Some(HeaderValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn loop_size(&self) -> Option<(f64, f64)> {
        match self.fields.get("TXS") {
            Some(HeaderValue::Pair(x, y)) => Some((*x, *y)),
            _ => None,
        }
    }
}

/// Pulls the recognized header tags, the raw tag audit map and the
/// client/survey-id pair out of a file.
///
/// A tag that is missing, or whose numeric value does not parse, is simply
/// absent from [`Header::fields`].
pub fn extract_header(text: &str, client_marker: &str) -> Header {
    let mut header = Header::default();

    for (tag, shape, pattern) in TAG_PATTERNS.iter() {
        let Some(caps) = pattern.captures(text) else {
            continue;
        };
        let value = match shape {
            TagShape::Token | TagShape::Remainder => {
                Some(HeaderValue::Text(caps[1].trim().to_string()))
            }
            TagShape::Number => caps[1].parse::<f64>().ok().map(HeaderValue::Number),
            TagShape::Pair => match (caps[1].parse::<f64>(), caps[2].parse::<f64>()) {
                (Ok(x), Ok(y)) => Some(HeaderValue::Pair(x, y)),
                _ => None,
            },
        };
        if let Some(value) = value {
            header.fields.insert(tag.to_string(), value);
        }
    }

    for line in header_region(text).lines() {
        if let Some(caps) = RAW_TAG.captures(line) {
            let tag = caps[1].to_string();
            if GEOMETRY_TAG.is_match(&tag) {
                continue;
            }
            header
                .raw_tags
                .entry(tag)
                .or_insert_with(|| caps[2].to_string());
        }
    }

    if !client_marker.is_empty() {
        let lines: Vec<&str> = text.lines().collect();
        if let Some(index) = lines.iter().position(|line| line.contains(client_marker)) {
            header.client = Some(lines[index].trim().to_string());
            header.survey_id = lines
                .get(index + 1)
                .map(|next| next.trim())
                .filter(|next| !next.is_empty())
                .map(str::to_string);
        }
    }

    header
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "<FMT> 230\n<UNI> nanoTesla/sec\n<OPR> J. Smith  \n<CUR> 20.5\n<TXS> 600 700\nNorth American Nickel\nP-141\n$\n<CUR> 99\n";

    #[test]
    fn extracts_typed_fields() {
        let header = extract_header(SAMPLE, "North American Nickel");
        assert_eq!(header.format_code(), Some("230"));
        assert_eq!(header.units(), Some("nanoTesla/sec"));
        assert_eq!(header.operator(), Some("J. Smith"));
        assert_eq!(header.peak_current(), Some(20.5));
        assert_eq!(header.loop_size(), Some((600.0, 700.0)));
        assert_eq!(header.client.as_deref(), Some("North American Nickel"));
        assert_eq!(header.survey_id.as_deref(), Some("P-141"));
    }

    #[test]
    fn raw_tags_stop_at_marker() {
        let header = extract_header(SAMPLE, "North American Nickel");
        assert_eq!(header.raw_tags.get("CUR").map(String::as_str), Some("20.5"));
        assert_eq!(header.raw_tags.len(), 5);
    }

    #[test]
    fn missing_tags_are_absent() {
        let header = extract_header("<FMT> 210\n", "North American Nickel");
        assert_eq!(header.fields.len(), 1);
        assert!(header.operator().is_none());
        assert!(header.survey_id.is_none());
    }

    #[test]
    fn blank_line_after_client_gives_no_survey_id() {
        let header = extract_header("North American Nickel\n\nP-9\n", "North American Nickel");
        assert!(header.client.is_some());
        assert!(header.survey_id.is_none());
    }
}
