//! Grouping of the capabilities a NETCONF server announces in its hello.

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// NETCONF base protocol, the only framing this crate speaks.
pub const NC_BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";
/// Candidate datastore; the edit stage targets it.
pub const NC_CANDIDATE: &str = "urn:ietf:params:netconf:capability:candidate:1.0";

const NETCONF_PREFIX: &str = "urn:ietf:params:netconf";

static MODULE_URI: Lazy<Regex> = Lazy::new(|| match Regex::new(r"^([^?]+)\?module=([^&]+)&?") {
    Ok(re) => re,
    Err(err) => panic!("invalid MODULE_URI regex: {err}"),
});

/// Namespace family of an announced model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityCategory {
    IetfNetconf,
    IetfModel,
    OpenConfig,
    Cisco,
    CiscoCalvados,
    Mib,
    Other,
}

impl CapabilityCategory {
    pub fn heading(&self) -> &'static str {
        match self {
            CapabilityCategory::IetfNetconf => "IETF NETCONF Capabilities:",
            CapabilityCategory::IetfModel => "IETF Models:",
            CapabilityCategory::OpenConfig => "OpenConfig Models:",
            CapabilityCategory::Cisco => "Cisco Models:",
            CapabilityCategory::CiscoCalvados => "Cisco Calvados Models:",
            CapabilityCategory::Mib => "MIB Models:",
            CapabilityCategory::Other => "Other Models:",
        }
    }
}

/// Namespace fragments in match order; the first hit wins.
const NAMESPACE_FAMILIES: &[(&str, CapabilityCategory)] = &[
    ("urn:ietf:params:xml:ns", CapabilityCategory::IetfModel),
    ("http://openconfig.net/yang", CapabilityCategory::OpenConfig),
    ("http://cisco.com/ns/yang", CapabilityCategory::Cisco),
    ("http://cisco.com/calvados", CapabilityCategory::CiscoCalvados),
    ("http://cisco.com/panini/calvados", CapabilityCategory::CiscoCalvados),
    ("http://tail-f.com/ns/mibs", CapabilityCategory::Mib),
    ("http://tail-f.com/ns", CapabilityCategory::CiscoCalvados),
    ("http://tail-f.com/test", CapabilityCategory::CiscoCalvados),
    ("http://tail-f.com/yang", CapabilityCategory::CiscoCalvados),
    ("http://www.cisco.com/calvados", CapabilityCategory::CiscoCalvados),
    ("http://www.cisco.com/ns/calvados", CapabilityCategory::CiscoCalvados),
    ("http://www.cisco.com/panini/calvados", CapabilityCategory::CiscoCalvados),
    ("http://", CapabilityCategory::Other),
];

/// Announced capabilities grouped by family.
///
/// Model entries are rendered as `module (namespace)`. Capabilities that
/// fit no family are kept verbatim in `unmatched`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CapabilityReport {
    pub groups: Vec<(CapabilityCategory, Vec<String>)>,
    pub unmatched: Vec<String>,
}

impl CapabilityReport {
    pub fn from_capabilities<S: AsRef<str>>(capabilities: &[S]) -> Self {
        let mut report = CapabilityReport::default();
        for capability in capabilities {
            let capability = capability.as_ref();
            if capability.starts_with(NETCONF_PREFIX) {
                report.push(CapabilityCategory::IetfNetconf, capability.to_string());
                continue;
            }
            let family = NAMESPACE_FAMILIES
                .iter()
                .find(|(ns, _)| capability.contains(ns))
                .map(|(_, category)| *category);
            match (family, MODULE_URI.captures(capability)) {
                (Some(category), Some(caps)) => {
                    report.push(category, format!("{} ({})", &caps[2], &caps[1]));
                }
                _ => report.unmatched.push(capability.to_string()),
            }
        }
        report
    }

    fn push(&mut self, category: CapabilityCategory, entry: String) {
        match self.groups.iter_mut().find(|(c, _)| *c == category) {
            Some((_, entries)) => entries.push(entry),
            None => self.groups.push((category, vec![entry])),
        }
    }

    pub fn entries(&self, category: CapabilityCategory) -> &[String] {
        self.groups
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, entries)| entries.as_slice())
            .unwrap_or(&[])
    }

    /// Renders the report with one heading per non-empty family.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for category in [
            CapabilityCategory::IetfNetconf,
            CapabilityCategory::IetfModel,
            CapabilityCategory::OpenConfig,
            CapabilityCategory::Cisco,
            CapabilityCategory::CiscoCalvados,
            CapabilityCategory::Mib,
            CapabilityCategory::Other,
        ] {
            let entries = self.entries(category);
            if entries.is_empty() {
                continue;
            }
            out.push_str(category.heading());
            out.push('\n');
            for entry in entries {
                out.push('\t');
                out.push_str(entry);
                out.push('\n');
            }
        }
        for entry in &self.unmatched {
            out.push_str(entry);
            out.push('\n');
        }
        out
    }
}

/// True if the server announced the candidate datastore.
///
/// Capability URIs may carry query parameters, which are ignored.
pub fn supports_candidate<S: AsRef<str>>(capabilities: &[S]) -> bool {
    capabilities
        .iter()
        .any(|c| c.as_ref().split('?').next() == Some(NC_CANDIDATE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NC_WRITABLE_RUNNING: &str = "urn:ietf:params:netconf:capability:writable-running:1.0";

    const CAPS: &[&str] = &[
        "urn:ietf:params:netconf:base:1.1",
        "urn:ietf:params:netconf:capability:candidate:1.0",
        "urn:ietf:params:xml:ns:yang:ietf-interfaces?module=ietf-interfaces&revision=2014-05-08",
        "http://openconfig.net/yang/bgp?module=openconfig-bgp&revision=2016-06-21",
        "http://cisco.com/ns/yang/Cisco-IOS-XR-ifmgr-cfg?module=Cisco-IOS-XR-ifmgr-cfg&revision=2017-09-07",
        "http://tail-f.com/ns/mibs/SNMPv2-MIB/200210160000Z?module=SNMPv2-MIB&revision=2002-10-16",
        "http://tail-f.com/ns/aaa/1.1?module=tailf-aaa&revision=2011-09-22",
        "http://example.com/ns/foo?module=foo",
        "mystery-capability",
    ];

    #[test]
    fn capabilities_are_grouped_by_namespace_family() {
        let report = CapabilityReport::from_capabilities(CAPS);

        assert_eq!(report.entries(CapabilityCategory::IetfNetconf).len(), 2);
        assert_eq!(
            report.entries(CapabilityCategory::IetfModel),
            &["ietf-interfaces (urn:ietf:params:xml:ns:yang:ietf-interfaces)".to_string()]
        );
        assert_eq!(
            report.entries(CapabilityCategory::Cisco),
            &["Cisco-IOS-XR-ifmgr-cfg (http://cisco.com/ns/yang/Cisco-IOS-XR-ifmgr-cfg)"
                .to_string()]
        );
        assert_eq!(report.entries(CapabilityCategory::Mib).len(), 1);
        assert_eq!(report.entries(CapabilityCategory::CiscoCalvados).len(), 1);
        assert_eq!(report.entries(CapabilityCategory::Other).len(), 1);
        assert_eq!(report.unmatched, vec!["mystery-capability".to_string()]);
    }

    #[test]
    fn render_skips_empty_families() {
        let report = CapabilityReport::from_capabilities(&[NC_BASE_1_0]);
        assert_eq!(
            report.render(),
            "IETF NETCONF Capabilities:\n\turn:ietf:params:netconf:base:1.0\n"
        );
    }

    #[test]
    fn candidate_support_ignores_query_parameters() {
        assert!(supports_candidate(CAPS));
        assert!(supports_candidate(&[format!("{NC_CANDIDATE}?x=1")]));
        assert!(!supports_candidate(&[NC_BASE_1_0, NC_WRITABLE_RUNNING]));
    }
}
