//! NETCONF `edit-config` synthesis from a configuration delta.

use crate::capabilities::NC_BASE_1_0;
use crate::delta::ConfigDelta;

/// Message id carried by the synthesized edit request.
pub const EDIT_MESSAGE_ID: &str = "101";

const EDIT_CONFIG_HEADER: &str = r#"<edit-config>
 <target>
  <candidate/>
 </target>
 <config xmlns:xc="urn:ietf:params:xml:ns:netconf:base:1.0">"#;

const RPC_FOOTER: &str = r#"
 </config>
</edit-config>
</rpc>"#;

const CONFIG_HEADER: &str = r#"<config xmlns:xc="urn:ietf:params:xml:ns:netconf:base:1.0">"#;

const CONFIG_FOOTER: &str = "\n</config>";

/// A complete edit request built from one delta.
///
/// `rpc` is the document transmitted to the device and persisted as the
/// request record, so the two are always text-identical. `config` is the
/// bare `<config>` payload carrying the same fragments in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    rpc: String,
    config: String,
    fragments: usize,
}

impl EditRequest {
    /// Wraps every delta fragment, in delta order, into both envelopes.
    ///
    /// An empty delta still yields a well-formed request whose `<config>`
    /// element has no children.
    pub fn build(delta: &ConfigDelta) -> Self {
        let mut body = String::new();
        for fragment in delta.fragments() {
            body.push('\n');
            body.push_str(fragment);
        }

        Self {
            rpc: format!(
                "<rpc message-id=\"{EDIT_MESSAGE_ID}\" xmlns=\"{NC_BASE_1_0}\">\n{EDIT_CONFIG_HEADER}{body}{RPC_FOOTER}"
            ),
            config: format!("{CONFIG_HEADER}{body}{CONFIG_FOOTER}"),
            fragments: delta.len(),
        }
    }

    /// Full `<rpc><edit-config>` document targeting the candidate datastore.
    pub fn rpc(&self) -> &str {
        &self.rpc
    }

    /// Plain `<config>` payload.
    pub fn config(&self) -> &str {
        &self.config
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    /// True when the request carries no configuration fragments.
    pub fn is_noop(&self) -> bool {
        self.fragments == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::diff;
    use crate::extract::ModelKeyedConfig;
    use pretty_assertions::assert_eq;

    fn delta(pairs: &[(&str, &str)]) -> ConfigDelta {
        let candidate: ModelKeyedConfig = pairs.iter().copied().collect();
        diff(&ModelKeyedConfig::default(), &candidate)
    }

    #[test]
    fn empty_delta_builds_envelope_without_fragments() {
        let request = EditRequest::build(&ConfigDelta::default());

        assert!(request.is_noop());
        assert_eq!(
            request.config(),
            "<config xmlns:xc=\"urn:ietf:params:xml:ns:netconf:base:1.0\">\n</config>"
        );
        assert!(request.rpc().contains("<candidate/>"));
        assert!(request.rpc().ends_with(
            "<config xmlns:xc=\"urn:ietf:params:xml:ns:netconf:base:1.0\">\n </config>\n</edit-config>\n</rpc>"
        ));
    }

    #[test]
    fn fragments_keep_delta_order_in_both_documents() {
        let request = EditRequest::build(&delta(&[("M2", "<b/>"), ("M1", "<a/>")]));

        assert_eq!(request.fragment_count(), 2);
        assert!(request.config().contains("\n<b/>\n<a/>\n</config>"));
        assert!(request.rpc().contains("\n<b/>\n<a/>\n </config>"));
    }

    #[test]
    fn rpc_has_no_explicit_edit_options() {
        let request = EditRequest::build(&delta(&[("M1", "<a/>")]));
        let rpc = request.rpc();

        assert_eq!(
            rpc.lines().take(2).collect::<Vec<_>>(),
            vec![
                r#"<rpc message-id="101" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">"#,
                "<edit-config>",
            ]
        );
        assert!(!rpc.contains("default-operation"));
        assert!(!rpc.contains("test-option"));
        assert!(!rpc.contains("error-option"));
    }
}
