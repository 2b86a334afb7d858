//! Offline stand-ins for both sessions.
//!
//! [`ScriptedTransport`] plays a device terminal from a list of expected
//! input lines and canned replies. [`ScriptedModelSession`] plays a
//! NETCONF server from canned get-config replies and records what it was
//! asked to do in a shared [`ModelJournal`].

use super::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::xml;

#[derive(Debug, Clone)]
struct Exchange {
    expect: String,
    reply: String,
}

/// Scripted device terminal.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    pending: VecDeque<String>,
    script: VecDeque<Exchange>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    /// Starts a script whose first output is `banner`.
    pub fn new(banner: &str) -> Self {
        let mut pending = VecDeque::new();
        if !banner.is_empty() {
            pending.push_back(banner.to_string());
        }
        Self {
            pending,
            script: VecDeque::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Expects `line` as the next input and answers it with `reply`.
    pub fn expect_line(mut self, line: &str, reply: &str) -> Self {
        self.script.push_back(Exchange {
            expect: line.to_string(),
            reply: reply.to_string(),
        });
        self
    }

    /// Expects `command`, echoes it, prints `output` and then `prompt`.
    pub fn expect_command(self, command: &str, output: &str, prompt: &str) -> Self {
        let mut reply = format!("{command}\r\n");
        if !output.is_empty() {
            reply.push_str(output);
            reply.push_str("\r\n");
        }
        reply.push_str(prompt);
        self.expect_line(command, &reply)
    }

    /// Lines sent so far; stays readable after the transport is moved.
    pub fn sent_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }

    /// Number of scripted exchanges not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

#[async_trait]
impl CliTransport for ScriptedTransport {
    async fn send(&mut self, data: &str) -> Result<(), VerifyError> {
        let line = data.trim_end_matches(['\r', '\n']).to_string();
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(line.clone());
        }
        match self.script.pop_front() {
            Some(exchange) if exchange.expect == line => {
                self.pending.push_back(exchange.reply);
                Ok(())
            }
            Some(exchange) => Err(VerifyError::ReplayMismatch(format!(
                "expected '{}', got '{line}'",
                exchange.expect
            ))),
            None => Err(VerifyError::ReplayMismatch(format!(
                "unexpected input '{line}' after end of script"
            ))),
        }
    }

    async fn read_chunk(&mut self) -> Result<Option<String>, VerifyError> {
        Ok(self.pending.pop_front())
    }

    async fn close(&mut self) -> Result<(), VerifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push("<closed>".to_string());
        }
        Ok(())
    }
}

/// What a scripted model session was asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelJournal {
    pub get_configs: usize,
    /// Rpc documents received by edit-config, verbatim.
    pub edits: Vec<String>,
    pub commits: usize,
    pub discards: usize,
    pub closed: bool,
}

/// Scripted NETCONF server.
#[derive(Debug, Clone)]
pub struct ScriptedModelSession {
    capabilities: Vec<String>,
    replies: VecDeque<String>,
    edit_error: Option<String>,
    commit_error: Option<String>,
    journal: Arc<Mutex<ModelJournal>>,
}

impl ScriptedModelSession {
    /// Server announcing `capabilities` and answering get-config with
    /// `replies` in order. Replies are full `<rpc-reply>` documents.
    pub fn new<S: Into<String>>(capabilities: Vec<S>, replies: Vec<S>) -> Self {
        Self {
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            replies: replies.into_iter().map(Into::into).collect(),
            edit_error: None,
            commit_error: None,
            journal: Arc::new(Mutex::new(ModelJournal::default())),
        }
    }

    /// Makes edit-config answer with an rpc-error.
    pub fn failing_edit(mut self, message: &str) -> Self {
        self.edit_error = Some(message.to_string());
        self
    }

    /// Makes commit answer with an rpc-error.
    pub fn failing_commit(mut self, message: &str) -> Self {
        self.commit_error = Some(message.to_string());
        self
    }

    pub fn journal(&self) -> Arc<Mutex<ModelJournal>> {
        Arc::clone(&self.journal)
    }

    fn with_journal(&self, f: impl FnOnce(&mut ModelJournal)) -> Result<(), VerifyError> {
        let mut guard = self
            .journal
            .lock()
            .map_err(|e| VerifyError::InternalServerError(format!("journal lock error: {e}")))?;
        f(&mut guard);
        Ok(())
    }
}

#[async_trait]
impl ModelSession for ScriptedModelSession {
    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn get_config(&mut self, _source: Datastore) -> Result<String, VerifyError> {
        self.with_journal(|j| j.get_configs += 1)?;
        let reply = self.replies.pop_front().ok_or_else(|| {
            VerifyError::ReplayMismatch("no scripted get-config reply left".to_string())
        })?;
        xml::data_document(&reply)
    }

    async fn edit_config(&mut self, request: &EditRequest) -> Result<(), VerifyError> {
        self.with_journal(|j| j.edits.push(request.rpc().to_string()))?;
        match &self.edit_error {
            Some(message) => Err(VerifyError::RpcError(message.clone())),
            None => Ok(()),
        }
    }

    async fn commit(&mut self) -> Result<(), VerifyError> {
        if let Some(message) = &self.commit_error {
            return Err(VerifyError::RpcError(message.clone()));
        }
        self.with_journal(|j| j.commits += 1)
    }

    async fn discard_changes(&mut self) -> Result<(), VerifyError> {
        self.with_journal(|j| j.discards += 1)
    }

    async fn close(&mut self) -> Result<(), VerifyError> {
        self.with_journal(|j| j.closed = true)
    }
}

/// Connector handing out one pre-built session of each kind.
///
/// A missing session makes the matching connect call fail, which is how
/// tests simulate an unreachable device.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    model: Option<ScriptedModelSession>,
    cli: Option<ScriptedTransport>,
}

impl ScriptedConnector {
    pub fn new(model: Option<ScriptedModelSession>, cli: Option<ScriptedTransport>) -> Self {
        Self { model, cli }
    }
}

#[async_trait]
impl DeviceConnector for ScriptedConnector {
    type Model = ScriptedModelSession;
    type Cli = ScriptedTransport;

    async fn connect_model(
        &mut self,
        _transcript: &Transcript,
    ) -> Result<Self::Model, VerifyError> {
        self.model.take().ok_or_else(|| VerifyError::ConnectFailed {
            addr: "scripted netconf".to_string(),
            reason: "no scripted model session".to_string(),
        })
    }

    async fn connect_cli(&mut self) -> Result<Self::Cli, VerifyError> {
        self.cli.take().ok_or_else(|| VerifyError::ConnectFailed {
            addr: "scripted cli".to_string(),
            reason: "no scripted transport".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transport_replays_in_order_and_tracks_input() {
        let mut transport = ScriptedTransport::new("hello").expect_line("a", "ra");
        let sent = transport.sent_handle();

        assert_eq!(transport.read_chunk().await.expect("read").as_deref(), Some("hello"));
        transport.send("a\n").await.expect("send");
        assert_eq!(transport.read_chunk().await.expect("read").as_deref(), Some("ra"));
        assert_eq!(transport.read_chunk().await.expect("read"), None);
        assert_eq!(transport.remaining(), 0);
        assert_eq!(*sent.lock().expect("lock"), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn unexpected_input_is_a_replay_mismatch() {
        let mut transport = ScriptedTransport::new("").expect_line("a", "ra");
        let err = transport.send("b\n").await.expect_err("mismatch");
        assert!(matches!(err, VerifyError::ReplayMismatch(_)));
    }

    #[tokio::test]
    async fn model_session_normalises_replies_and_journals_calls() {
        let reply = r#"<rpc-reply xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><data><a xmlns="urn:x"><b>1</b></a></data></rpc-reply>"#;
        let mut session = ScriptedModelSession::new(vec!["urn:ietf:params:netconf:base:1.0"], vec![reply]);
        let journal = session.journal();

        let document = session.get_config(Datastore::Running).await.expect("get-config");
        assert_eq!(document, "<data>\n  <a xmlns=\"urn:x\">\n    <b>1</b>\n  </a>\n</data>");

        session.commit().await.expect("commit");
        session.close().await.expect("close");
        let journal = journal.lock().expect("lock").clone();
        assert_eq!(journal.get_configs, 1);
        assert_eq!(journal.commits, 1);
        assert!(journal.closed);

        assert!(matches!(
            session.get_config(Datastore::Running).await,
            Err(VerifyError::ReplayMismatch(_))
        ));
    }

    #[tokio::test]
    async fn connector_hands_out_each_session_once() {
        let mut connector = ScriptedConnector::new(None, Some(ScriptedTransport::new("")));
        assert!(connector.connect_cli().await.is_ok());
        assert!(matches!(
            connector.connect_cli().await,
            Err(VerifyError::ConnectFailed { .. })
        ));
        assert!(
            connector
                .connect_model(&Transcript::default())
                .await
                .is_err()
        );
    }
}
