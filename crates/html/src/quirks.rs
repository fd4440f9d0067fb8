//! DOCTYPE parsing and document compatibility mode

use scalpel_dom::CompatMode;

use crate::attributes::is_html_whitespace;

/// Parsed DOCTYPE declaration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DoctypeInfo {
    /// Lowercased root element name
    pub name: Option<String>,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub force_quirks: bool,
}

fn is_whitespace(c: char) -> bool {
    c.is_ascii() && is_html_whitespace(c as u8)
}

/// Split a quoted identifier off the front of `input`.
///
/// Returns the identifier, the remaining input and whether the closing quote
/// was found.
fn quoted_identifier(input: &str) -> Option<(String, &str, bool)> {
    let input = input.trim_start_matches(is_whitespace);
    let quote = input.chars().next().filter(|&c| c == '"' || c == '\'')?;
    let body = &input[1..];
    match body.find(quote) {
        Some(end) => Some((body[..end].to_string(), &body[end + 1..], true)),
        None => Some((body.to_string(), "", false)),
    }
}

/// Split a case-insensitive keyword off the front of `input`
fn strip_keyword<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    let head = input.get(..keyword.len())?;
    head.eq_ignore_ascii_case(keyword)
        .then(|| &input[keyword.len()..])
}

impl DoctypeInfo {
    /// Parse the source of a `<!DOCTYPE ...>` declaration
    pub fn parse(source: &str) -> Self {
        let mut info = DoctypeInfo::default();

        let body = source.strip_prefix("<!").unwrap_or(source);
        let body = strip_keyword(body, "doctype").unwrap_or(body);
        let body = body.strip_suffix('>').unwrap_or(body);

        let rest = body.trim_start_matches(is_whitespace);
        if rest.is_empty() {
            info.force_quirks = true;
            return info;
        }

        let name_end = rest.find(is_whitespace).unwrap_or(rest.len());
        info.name = Some(rest[..name_end].to_ascii_lowercase());
        let rest = rest[name_end..].trim_start_matches(is_whitespace);
        if rest.is_empty() {
            return info;
        }

        if let Some(after) = strip_keyword(rest, "public") {
            let Some((public_id, after, closed)) = quoted_identifier(after) else {
                info.force_quirks = true;
                return info;
            };
            info.public_id = Some(public_id);
            if !closed {
                info.force_quirks = true;
                return info;
            }
            if after.trim_start_matches(is_whitespace).is_empty() {
                return info;
            }
            match quoted_identifier(after) {
                Some((system_id, _, closed)) => {
                    info.system_id = Some(system_id);
                    info.force_quirks = !closed;
                }
                None => info.force_quirks = true,
            }
        } else if let Some(after) = strip_keyword(rest, "system") {
            match quoted_identifier(after) {
                Some((system_id, _, closed)) => {
                    info.system_id = Some(system_id);
                    info.force_quirks = !closed;
                }
                None => info.force_quirks = true,
            }
        } else {
            info.force_quirks = true;
        }
        info
    }

    /// Compatibility mode selected by this DOCTYPE
    pub fn compat_mode(&self) -> CompatMode {
        if self.force_quirks || self.name.as_deref() != Some("html") {
            return CompatMode::Quirks;
        }

        let public_id = self.public_id.as_deref().map(str::to_ascii_lowercase);
        let system_id = self.system_id.as_deref().map(str::to_ascii_lowercase);
        let public_starts_with =
            |prefixes: &[&str]| public_id.as_deref().is_some_and(|id| prefixes.iter().any(|p| id.starts_with(p)));

        if public_id.as_deref().is_some_and(|id| QUIRKS_PUBLIC_IDS.contains(&id))
            || public_starts_with(QUIRKS_PUBLIC_PREFIXES)
            || system_id.as_deref() == Some(QUIRKS_SYSTEM_ID)
            || (system_id.is_none() && public_starts_with(HTML401_PUBLIC_PREFIXES))
        {
            return CompatMode::Quirks;
        }

        if public_starts_with(LIMITED_QUIRKS_PUBLIC_PREFIXES)
            || (system_id.is_some() && public_starts_with(HTML401_PUBLIC_PREFIXES))
        {
            return CompatMode::LimitedQuirks;
        }

        CompatMode::NoQuirks
    }
}

const QUIRKS_SYSTEM_ID: &str = "http://www.ibm.com/data/dtd/v11/ibmxhtml1-transitional.dtd";

/// Public identifiers that force quirks mode when matched exactly
const QUIRKS_PUBLIC_IDS: &[&str] = &[
    "-//w3o//dtd w3 html strict 3.0//en//",
    "-/w3c/dtd html 4.0 transitional/en",
    "html",
];

/// Public identifier prefixes that force quirks mode
const QUIRKS_PUBLIC_PREFIXES: &[&str] = &[
    "+//silmaril//dtd html pro v0r11 19970101//",
    "-//as//dtd html 3.0 aswedit + extensions//",
    "-//advasoft ltd//dtd html 3.0 aswedit + extensions//",
    "-//ietf//dtd html 2.0 level 1//",
    "-//ietf//dtd html 2.0 level 2//",
    "-//ietf//dtd html 2.0 strict level 1//",
    "-//ietf//dtd html 2.0 strict level 2//",
    "-//ietf//dtd html 2.0 strict//",
    "-//ietf//dtd html 2.0//",
    "-//ietf//dtd html 2.1e//",
    "-//ietf//dtd html 3.0//",
    "-//ietf//dtd html 3.2 final//",
    "-//ietf//dtd html 3.2//",
    "-//ietf//dtd html 3//",
    "-//ietf//dtd html level 0//",
    "-//ietf//dtd html level 1//",
    "-//ietf//dtd html level 2//",
    "-//ietf//dtd html level 3//",
    "-//ietf//dtd html strict level 0//",
    "-//ietf//dtd html strict level 1//",
    "-//ietf//dtd html strict level 2//",
    "-//ietf//dtd html strict level 3//",
    "-//ietf//dtd html strict//",
    "-//ietf//dtd html//",
    "-//metrius//dtd metrius presentational//",
    "-//microsoft//dtd internet explorer 2.0 html strict//",
    "-//microsoft//dtd internet explorer 2.0 html//",
    "-//microsoft//dtd internet explorer 2.0 tables//",
    "-//microsoft//dtd internet explorer 3.0 html strict//",
    "-//microsoft//dtd internet explorer 3.0 html//",
    "-//microsoft//dtd internet explorer 3.0 tables//",
    "-//netscape comm. corp.//dtd html//",
    "-//netscape comm. corp.//dtd strict html//",
    "-//o'reilly and associates//dtd html 2.0//",
    "-//o'reilly and associates//dtd html extended 1.0//",
    "-//o'reilly and associates//dtd html extended relaxed 1.0//",
    "-//sq//dtd html 2.0 hotmetal + extensions//",
    "-//softquad software//dtd hotmetal pro 6.0::19990601::extensions to html 4.0//",
    "-//softquad//dtd hotmetal pro 4.0::19971010::extensions to html 4.0//",
    "-//spyglass//dtd html 2.0 extended//",
    "-//sun microsystems corp.//dtd hotjava html//",
    "-//sun microsystems corp.//dtd hotjava strict html//",
    "-//w3c//dtd html 3 1995-03-24//",
    "-//w3c//dtd html 3.2 draft//",
    "-//w3c//dtd html 3.2 final//",
    "-//w3c//dtd html 3.2//",
    "-//w3c//dtd html 3.2s draft//",
    "-//w3c//dtd html 4.0 frameset//",
    "-//w3c//dtd html 4.0 transitional//",
    "-//w3c//dtd html experimental 19960712//",
    "-//w3c//dtd html experimental 970421//",
    "-//w3c//dtd w3 html//",
    "-//w3o//dtd w3 html 3.0//",
    "-//webtechs//dtd mozilla html 2.0//",
    "-//webtechs//dtd mozilla html//",
];

/// Quirks without a system identifier, limited quirks with one
const HTML401_PUBLIC_PREFIXES: &[&str] = &[
    "-//w3c//dtd html 4.01 frameset//",
    "-//w3c//dtd html 4.01 transitional//",
];

/// Public identifier prefixes that select limited quirks mode
const LIMITED_QUIRKS_PUBLIC_PREFIXES: &[&str] = &[
    "-//w3c//dtd xhtml 1.0 frameset//",
    "-//w3c//dtd xhtml 1.0 transitional//",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(source: &str) -> CompatMode {
        DoctypeInfo::parse(source).compat_mode()
    }

    #[test]
    fn test_parse_html5_doctype() {
        let info = DoctypeInfo::parse("<!DOCTYPE html>");
        assert_eq!(info.name.as_deref(), Some("html"));
        assert_eq!(info.public_id, None);
        assert!(!info.force_quirks);
        assert_eq!(info.compat_mode(), CompatMode::NoQuirks);
        assert_eq!(mode("<!doctype HTML >"), CompatMode::NoQuirks);
    }

    #[test]
    fn test_missing_name_forces_quirks() {
        let info = DoctypeInfo::parse("<!DOCTYPE>");
        assert_eq!(info.name, None);
        assert!(info.force_quirks);
        assert_eq!(info.compat_mode(), CompatMode::Quirks);
    }

    #[test]
    fn test_html401_frameset_depends_on_system_id() {
        let with_system = r#"<!DOCTYPE HTML PUBLIC "-//W3C//DTD HTML 4.01 Frameset//EN" "http://www.w3.org/TR/html4/frameset.dtd">"#;
        let info = DoctypeInfo::parse(with_system);
        assert_eq!(info.public_id.as_deref(), Some("-//W3C//DTD HTML 4.01 Frameset//EN"));
        assert_eq!(info.system_id.as_deref(), Some("http://www.w3.org/TR/html4/frameset.dtd"));
        assert_eq!(info.compat_mode(), CompatMode::LimitedQuirks);

        let without_system = r#"<!DOCTYPE HTML PUBLIC "-//W3C//DTD HTML 4.01 Frameset//EN">"#;
        assert_eq!(mode(without_system), CompatMode::Quirks);
    }

    #[test]
    fn test_identifier_tables() {
        assert_eq!(mode(r#"<!DOCTYPE html PUBLIC "-//W3C//DTD HTML 3.2 Final//EN">"#), CompatMode::Quirks);
        assert_eq!(mode(r#"<!DOCTYPE html PUBLIC 'HTML'>"#), CompatMode::Quirks);
        assert_eq!(
            mode(r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">"#),
            CompatMode::LimitedQuirks
        );
        assert_eq!(
            mode(r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">"#),
            CompatMode::NoQuirks
        );
        assert_eq!(
            mode(r#"<!DOCTYPE html SYSTEM "http://www.IBM.com/data/dtd/v11/ibmxhtml1-transitional.dtd">"#),
            CompatMode::Quirks
        );
    }

    #[test]
    fn test_malformed_doctypes() {
        assert_eq!(mode("<!DOCTYPE svg>"), CompatMode::Quirks);
        assert_eq!(mode("<!DOCTYPE html bogus>"), CompatMode::Quirks);
        assert_eq!(mode(r#"<!DOCTYPE html PUBLIC "unterminated>"#), CompatMode::Quirks);
        assert_eq!(mode("<!DOCTYPE html SYSTEM>"), CompatMode::Quirks);
    }
}
