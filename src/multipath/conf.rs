//! multipath.conf drop-in rendering.
//!
//! Operators supply the `defaults`, `devices` and `blacklist` sections as JSON
//! text; they are parsed here, before anything is written.

use std::fmt::Write;

use serde_json::{Map, Value};

use crate::config::ConnectorConfig;

const HEADER: &str = "# Managed by storage-connector. Local changes will be overwritten.\n";
const INDENT: &str = "    ";

/// Key/value pairs of one multipath block.
pub type Section = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum SectionError {
    #[error("multipath-{section} is not valid JSON: {source}")]
    Json {
        section: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("multipath-{section} must be a JSON object")]
    NotAnObject { section: &'static str },

    #[error("multipath-{section} must be a JSON object or a list of objects")]
    NotAnObjectList { section: &'static str },
}

/// The `multipaths { multipath { ... } }` entry naming the Fibre Channel LUN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LunAlias {
    pub wwid: String,
    pub alias: String,
}

/// Everything the multipath drop-in is rendered from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipathContext {
    pub defaults: Option<Section>,
    pub blacklist: Vec<Section>,
    pub devices: Vec<Section>,
    pub multipath: Option<LunAlias>,
}

impl MultipathContext {
    /// Parse the structured sections out of `config`.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, SectionError> {
        let mut ctx = Self::default();

        if let Some(text) = config.multipath_section("defaults") {
            tracing::info!(section = "defaults", "Gathering multipath section");
            match parse_section("defaults", text)? {
                Value::Object(map) => ctx.defaults = Some(map),
                _ => return Err(SectionError::NotAnObject { section: "defaults" }),
            }
        }
        for (name, target) in [("blacklist", &mut ctx.blacklist), ("devices", &mut ctx.devices)] {
            let Some(text) = config.multipath_section(name) else {
                tracing::debug!(section = name, "Multipath section is empty");
                continue;
            };
            tracing::info!(section = name, "Gathering multipath section");
            *target = device_list(name, parse_section(name, text)?)?;
        }
        Ok(ctx)
    }
}

fn parse_section(section: &'static str, text: &str) -> Result<Value, SectionError> {
    tracing::debug!(section, data = %text, "multipath section data");
    serde_json::from_str(text).map_err(|source| SectionError::Json { section, source })
}

fn device_list(section: &'static str, value: Value) -> Result<Vec<Section>, SectionError> {
    let shape = || SectionError::NotAnObjectList { section };
    match value {
        Value::Object(map) if map.is_empty() => Ok(Vec::new()),
        Value::Object(map) => Ok(vec![map]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                _ => Err(shape()),
            })
            .collect(),
        _ => Err(shape()),
    }
}

/// Render the drop-in file.
pub fn render(ctx: &MultipathContext) -> String {
    let mut out = String::from(HEADER);

    if let Some(defaults) = &ctx.defaults {
        out.push_str("defaults {\n");
        write_pairs(&mut out, defaults, 1);
        out.push_str("}\n");
    }
    write_device_block(&mut out, "blacklist", &ctx.blacklist);
    write_device_block(&mut out, "devices", &ctx.devices);
    if let Some(lun) = &ctx.multipath {
        out.push_str("multipaths {\n");
        out.push_str(INDENT);
        out.push_str("multipath {\n");
        let _ = writeln!(out, "{0}{0}wwid {1}", INDENT, lun.wwid);
        let _ = writeln!(out, "{0}{0}alias {1}", INDENT, lun.alias);
        out.push_str(INDENT);
        out.push_str("}\n");
        out.push_str("}\n");
    }
    out
}

fn write_device_block(out: &mut String, name: &str, devices: &[Section]) {
    if devices.is_empty() {
        return;
    }
    let _ = writeln!(out, "{} {{", name);
    for device in devices {
        out.push_str(INDENT);
        out.push_str("device {\n");
        write_pairs(out, device, 2);
        out.push_str(INDENT);
        out.push_str("}\n");
    }
    out.push_str("}\n");
}

fn write_pairs(out: &mut String, section: &Section, depth: usize) {
    let indent = INDENT.repeat(depth);
    let mut pairs: Vec<(&String, &Value)> = section.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in pairs {
        let rendered = match value {
            Value::Null => continue,
            Value::String(s) => format!("\"{}\"", s),
            other => other.to_string(),
        };
        let _ = writeln!(out, "{}{} {}", indent, key, rendered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ConnectorConfig {
        ConnectorConfig {
            multipath_defaults: Some(r#"{"user_friendly_names": "yes"}"#.into()),
            multipath_devices: Some(
                r#"{"vendor":"PURE","product": "FlashArray","fast_io_fail_tmo": "10", "path_grouping_policy":"group_by_prio"}"#.into(),
            ),
            multipath_blacklist: Some(r#"{"vendor": "QEMU", "product": "*"}"#.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_all_sections() {
        let mut ctx = MultipathContext::from_config(&config()).unwrap();
        ctx.multipath = Some(LunAlias {
            wwid: "360014380056efd060000d00000510000".into(),
            alias: "data1".into(),
        });
        let expected = "\
# Managed by storage-connector. Local changes will be overwritten.
defaults {
    user_friendly_names \"yes\"
}
blacklist {
    device {
        product \"*\"
        vendor \"QEMU\"
    }
}
devices {
    device {
        fast_io_fail_tmo \"10\"
        path_grouping_policy \"group_by_prio\"
        product \"FlashArray\"
        vendor \"PURE\"
    }
}
multipaths {
    multipath {
        wwid 360014380056efd060000d00000510000
        alias data1
    }
}
";
        assert_eq!(render(&ctx), expected);
    }

    #[test]
    fn test_device_list() {
        let config = ConnectorConfig {
            multipath_devices: Some(r#"[{"vendor": "PURE"}, {"vendor": "NETAPP", "no_path_retry": 5}]"#.into()),
            ..Default::default()
        };
        let ctx = MultipathContext::from_config(&config).unwrap();
        assert_eq!(ctx.devices.len(), 2);
        let text = render(&ctx);
        assert!(text.contains("no_path_retry 5"));
        assert_eq!(text.matches("device {").count(), 2);
    }

    #[test]
    fn test_empty_devices_object() {
        let config = ConnectorConfig {
            multipath_devices: Some("{}".into()),
            ..Default::default()
        };
        let ctx = MultipathContext::from_config(&config).unwrap();
        assert!(ctx.devices.is_empty());
        assert!(!render(&ctx).contains("devices"));
    }

    #[test]
    fn test_bad_json() {
        let config = ConnectorConfig {
            multipath_blacklist: Some("{vendor: QEMU".into()),
            ..Default::default()
        };
        let err = MultipathContext::from_config(&config).unwrap_err();
        assert!(matches!(err, SectionError::Json { section: "blacklist", .. }));
    }

    #[test]
    fn test_defaults_must_be_object() {
        let config = ConnectorConfig {
            multipath_defaults: Some(r#"["yes"]"#.into()),
            ..Default::default()
        };
        let err = MultipathContext::from_config(&config).unwrap_err();
        assert_eq!(err.to_string(), "multipath-defaults must be a JSON object");
    }
}
