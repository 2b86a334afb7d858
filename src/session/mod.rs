//! Device sessions used by the verification workflow.
//!
//! Two protocols are driven side by side against the same device:
//!
//! - [`ModelSession`] - the NETCONF session that reads and writes
//!   YANG-modelled configuration ([`NetconfSshSession`] over SSH)
//! - [`CliSession`] - the prompt-driven command-line session, running on
//!   any [`CliTransport`] ([`TelnetTransport`] on the wire)
//! - [`DeviceConnector`] - opens both on demand ([`NetworkConnector`]
//!   for a real device, [`ScriptedConnector`] offline)
//! - [`Transcript`] - records what was sent and received on either side

use async_ssh2_tokio::ServerCheckMethod;
use async_trait::async_trait;
use log::{debug, trace};
use russh::Preferred;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;

use crate::error::VerifyError;
use crate::request::EditRequest;

pub use cli::{CliSession, CommandOutput};
pub use connector::NetworkConnector;
pub use netconf::{NetconfOptions, NetconfSshSession};
pub use replay::{ModelJournal, ScriptedConnector, ScriptedModelSession, ScriptedTransport};
pub use security::{ConnectionSecurityOptions, SecurityLevel};
pub use telnet::TelnetTransport;
pub use transcript::{Transcript, TranscriptEntry, TranscriptEvent, TranscriptLevel};

/// NETCONF configuration datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Datastore {
    Running,
    Candidate,
}

impl Datastore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Datastore::Running => "running",
            Datastore::Candidate => "candidate",
        }
    }
}

/// Model-driven configuration session.
#[async_trait]
pub trait ModelSession: Send {
    /// Capability URIs from the server hello.
    fn capabilities(&self) -> &[String];

    /// Retrieves `source` and returns its `<data>` element one tag per line.
    async fn get_config(&mut self, source: Datastore) -> Result<String, VerifyError>;

    /// Transmits the request's rpc document verbatim.
    async fn edit_config(&mut self, request: &EditRequest) -> Result<(), VerifyError>;

    async fn commit(&mut self) -> Result<(), VerifyError>;

    /// Drops uncommitted candidate changes.
    async fn discard_changes(&mut self) -> Result<(), VerifyError>;

    async fn close(&mut self) -> Result<(), VerifyError>;
}

/// Byte stream underneath a command-line session.
#[async_trait]
pub trait CliTransport: Send {
    async fn send(&mut self, data: &str) -> Result<(), VerifyError>;

    /// Next chunk of device output, or `None` once the peer has closed.
    async fn read_chunk(&mut self) -> Result<Option<String>, VerifyError>;

    async fn close(&mut self) -> Result<(), VerifyError>;
}

/// Opens the two sessions of a run.
#[async_trait]
pub trait DeviceConnector: Send {
    type Model: ModelSession;
    type Cli: CliTransport;

    async fn connect_model(&mut self, transcript: &Transcript)
    -> Result<Self::Model, VerifyError>;

    async fn connect_cli(&mut self) -> Result<Self::Cli, VerifyError>;
}

mod cli;
mod connector;
mod netconf;
mod replay;
mod security;
mod telnet;
mod transcript;
