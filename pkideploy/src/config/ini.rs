//! INI documents with ordered sections and `%(name)s` interpolation.
//!
//! The dialect is the one deployment files have always used: `[section]`
//! headers, `key = value` or `key: value` entries, `#`/`;` comments and
//! indented continuation lines. Every section implicitly inherits the keys of
//! `[DEFAULT]`. A literal percent sign is written `%%`.

use pkideploy_shared::errors::{DeployError, DeployResult};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_SECTION: &str = "DEFAULT";

const MAX_INTERPOLATION_DEPTH: usize = 10;

pub type Section = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<(String, Section)>,
}

impl IniDocument {
    /// Read and parse a file. A missing file is a configuration error.
    pub fn load(path: &Path) -> DeployResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DeployError::config(format!(
                "cannot read configuration file {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    pub fn parse(text: &str, origin: &str) -> DeployResult<Self> {
        let mut doc = IniDocument::default();
        let mut current: Option<String> = None;
        let mut last_key: Option<String> = None;

        for (index, raw) in text.lines().enumerate() {
            let lineno = index + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() {
                last_key = None;
                continue;
            }
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            // Continuation of the previous value
            if raw.starts_with(char::is_whitespace)
                && let (Some(section), Some(key)) = (&current, &last_key)
            {
                let entry = doc.section_entry(section).entry(key.clone()).or_default();
                if !entry.is_empty() {
                    entry.push('\n');
                }
                entry.push_str(trimmed);
                continue;
            }

            if let Some(name) = trimmed
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
            {
                let name = name.trim().to_string();
                doc.section_entry(&name);
                current = Some(name);
                last_key = None;
                continue;
            }

            let Some(section) = &current else {
                return Err(DeployError::config(format!(
                    "{origin}:{lineno}: entry outside of any section"
                )));
            };

            let split = trimmed.find(['=', ':']).ok_or_else(|| {
                DeployError::config(format!(
                    "{origin}:{lineno}: expected 'key = value', got '{trimmed}'"
                ))
            })?;
            let key = trimmed[..split].trim();
            let value = trimmed[split + 1..].trim();
            if key.is_empty() {
                return Err(DeployError::config(format!(
                    "{origin}:{lineno}: empty key"
                )));
            }

            doc.section_entry(section)
                .insert(key.to_string(), value.to_string());
            last_key = Some(key.to_string());
        }

        Ok(doc)
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|(n, _)| n == name)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entries)| entries)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        self.section_entry(section)
            .insert(key.to_string(), value.to_string());
    }

    /// Keys visible from `section`: `[DEFAULT]` overlaid with the section itself.
    pub fn view(&self, section: &str) -> Section {
        let mut view = self.section(DEFAULT_SECTION).cloned().unwrap_or_default();
        if section != DEFAULT_SECTION
            && let Some(entries) = self.section(section)
        {
            view.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        view
    }

    /// Serialize back to INI text. Multi-line values become continuation lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, entries) in &self.sections {
            out.push_str(&format!("[{name}]\n"));
            for (key, value) in entries {
                let mut lines = value.split('\n');
                out.push_str(&format!("{key} = {}\n", lines.next().unwrap_or_default()));
                for line in lines {
                    out.push_str(&format!("    {line}\n"));
                }
            }
            out.push('\n');
        }
        out
    }

    fn section_entry(&mut self, name: &str) -> &mut Section {
        let index = match self.sections.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.sections.push((name.to_string(), Section::new()));
                self.sections.len() - 1
            }
        };
        &mut self.sections[index].1
    }
}

/// Expand `%(name)s` references against `view` and collapse `%%`.
pub fn interpolate(value: &str, view: &Section) -> DeployResult<String> {
    interpolate_at_depth(value, view, 0)
}

fn interpolate_at_depth(value: &str, view: &Section, depth: usize) -> DeployResult<String> {
    if depth > MAX_INTERPOLATION_DEPTH {
        return Err(DeployError::config(format!(
            "interpolation nested too deeply in '{value}'"
        )));
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];

        if let Some(after) = tail.strip_prefix('%') {
            out.push('%');
            rest = after;
            continue;
        }

        if let Some(inner) = tail.strip_prefix('(') {
            let close = inner.find(")s").ok_or_else(|| {
                DeployError::config(format!("unterminated interpolation in '{value}'"))
            })?;
            let name = &inner[..close];
            let referenced = view.get(name).ok_or_else(|| {
                DeployError::config(format!(
                    "missing configuration key '{name}' referenced by '{value}'"
                ))
            })?;
            out.push_str(&interpolate_at_depth(referenced, view, depth + 1)?);
            rest = &inner[close + 2..];
            continue;
        }

        return Err(DeployError::config(format!(
            "stray '%' in '{value}' (write '%%' for a literal percent sign)"
        )));
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
[DEFAULT]
# comment
pki_instance_name = pki-tomcat
pki_path: /var/lib/pki
pki_instance_path = %(pki_path)s/%(pki_instance_name)s
sensitive_parameters =
    pki_admin_password
    pki_pin

[CA]
pki_instance_name = ca-one
";

    #[test]
    fn test_parse_sections_and_continuations() {
        let doc = IniDocument::parse(SAMPLE, "sample").unwrap();
        assert!(doc.has_section("CA"));
        assert_eq!(doc.get("DEFAULT", "pki_path"), Some("/var/lib/pki"));
        assert_eq!(
            doc.get("DEFAULT", "sensitive_parameters"),
            Some("pki_admin_password\npki_pin")
        );
    }

    #[test]
    fn test_view_resolves_section_overrides() {
        let doc = IniDocument::parse(SAMPLE, "sample").unwrap();
        let view = doc.view("CA");
        let path = interpolate(&view["pki_instance_path"], &view).unwrap();
        assert_eq!(path, "/var/lib/pki/ca-one");

        let default_view = doc.view(DEFAULT_SECTION);
        let path = interpolate(&default_view["pki_instance_path"], &default_view).unwrap();
        assert_eq!(path, "/var/lib/pki/pki-tomcat");
    }

    #[test]
    fn test_interpolate_literal_percent() {
        let view = Section::new();
        assert_eq!(interpolate("100%% sure", &view).unwrap(), "100% sure");
        assert!(interpolate("100% sure", &view).is_err());
    }

    #[test]
    fn test_interpolate_missing_reference() {
        let view = Section::new();
        let err = interpolate("%(pki_nope)s", &view).unwrap_err();
        assert!(err.to_string().contains("pki_nope"));
    }

    #[test]
    fn test_interpolate_cycle_is_bounded() {
        let mut view = Section::new();
        view.insert("a".into(), "%(b)s".into());
        view.insert("b".into(), "%(a)s".into());
        assert!(interpolate("%(a)s", &view).is_err());
    }

    #[test]
    fn test_entry_outside_section_rejected() {
        assert!(IniDocument::parse("key = value\n", "bad").is_err());
    }

    #[test]
    fn test_render_round_trips() {
        let doc = IniDocument::parse(SAMPLE, "sample").unwrap();
        let again = IniDocument::parse(&doc.render(), "rendered").unwrap();
        assert_eq!(doc, again);
    }
}
