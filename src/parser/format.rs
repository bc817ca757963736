use std::sync::LazyLock;

use regex::Regex;

use crate::domain::FileFormat;

static FMT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<FMT>[ \t]+(\S+)").expect("format tag pattern"));

/// Classifies a file from the value of its first `<FMT>` tag.
///
/// Files without the tag, or with an unrecognized code, come back as
/// [`FileFormat::Unknown`]; callers still parse them on a best-effort basis.
pub fn detect_format(text: &str) -> FileFormat {
    FMT_TAG
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|code| FileFormat::from_code(code.as_str()))
        .unwrap_or(FileFormat::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_codes() {
        assert_eq!(detect_format("<FMT> 230\n<UNI> nanoTesla/sec\n"), FileFormat::Stp);
        assert_eq!(detect_format("<FMT> 210\n"), FileFormat::Pem);
    }

    #[test]
    fn first_tag_wins() {
        assert_eq!(detect_format("<FMT> 210\n<FMT> 230\n"), FileFormat::Pem);
    }

    #[test]
    fn missing_or_foreign_tag_is_unknown() {
        assert_eq!(detect_format("no header here"), FileFormat::Unknown);
        assert_eq!(detect_format("<FMT> 999"), FileFormat::Unknown);
    }
}
