//! Build-config documents: rendering requests into the declarative format
//! the tool's editor expects, and structurally parsing the `packages:`
//! section back out of whatever the editor hands us.

use crate::error::{GatewayError, Result};
use std::collections::BTreeSet;

/// Render the build-config document for a customization request.
///
/// The description becomes leading comments; packages land under
/// `contents.packages` in the order given. An empty package list still
/// produces the section header, which the tool accepts.
pub fn render_build_config(description: &str, packages: &[String]) -> String {
    let mut doc = String::from("# Custom Assembly Build Configuration\n");
    for line in description.lines() {
        doc.push_str("# ");
        doc.push_str(line);
        doc.push('\n');
    }
    doc.push('\n');
    doc.push_str("contents:\n  packages:\n");
    for package in packages {
        doc.push_str("    - ");
        doc.push_str(package);
        doc.push('\n');
    }
    doc
}

/// Extract the package names from a build-config document.
///
/// This is a structural scan, not a YAML parse: we locate the `packages:`
/// key and collect `- name` entries until indentation drops back out of the
/// section. A document with a `contents:` section but no package list is a
/// valid empty config; a document with neither is rejected, so tool error
/// text never masquerades as an empty config.
pub fn parse_build_config(text: &str) -> Result<BTreeSet<String>> {
    let lines: Vec<&str> = text.lines().collect();

    let Some(start) = lines.iter().position(|line| line.trim() == "packages:") else {
        if lines.iter().any(|line| line.trim().starts_with("contents:")) {
            return Ok(BTreeSet::new());
        }
        return Err(GatewayError::Parse(
            "no contents/packages section found".to_string(),
        ));
    };

    let section_indent = indent_of(lines[start]);
    let mut packages = BTreeSet::new();

    for (offset, raw) in lines[start + 1..].iter().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if indent_of(raw) <= section_indent {
            break;
        }
        let Some(entry) = trimmed.strip_prefix('-') else {
            return Err(GatewayError::Parse(format!(
                "unexpected line {} in packages section: {trimmed:?}",
                start + offset + 2
            )));
        };
        let name = entry.trim();
        if name.is_empty() {
            return Err(GatewayError::Parse(format!(
                "empty package entry at line {}",
                start + offset + 2
            )));
        }
        packages.insert(name.to_string());
    }

    Ok(packages)
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}
