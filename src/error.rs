//! Error types for device sessions and the verification workflow.
//!
//! Every failure a stage can hit is a [`VerifyError`]. The orchestrator
//! catches them at the stage boundary and turns them into a FAIL result,
//! so nothing in this crate exits the process on its own.

use thiserror::Error;

/// Errors that can occur while talking to the device or reconciling its configuration.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// A TCP/SSH session could not be opened.
    #[error("failed to connect to {addr}: {reason}")]
    ConnectFailed { addr: String, reason: String },

    /// The session opened but the device rejected the credentials.
    #[error("authentication rejected by {0}")]
    AuthenticationFailed(String),

    /// The session channel was closed while waiting for data.
    #[error("channel disconnect on wait prompt")]
    ChannelDisconnectError,

    /// A prompt or reply did not arrive within the configured timeout.
    ///
    /// The error carries the partial output received before the timeout.
    #[error("operation timeout: {0}")]
    ExecTimeout(String),

    /// The NETCONF server answered an RPC with `<rpc-error>`.
    #[error("rpc error: {0}")]
    RpcError(String),

    /// The NETCONF server does not advertise a capability the workflow needs.
    #[error("server does not advertise capability {0}")]
    MissingCapability(String),

    /// The command set was empty or only contained `commit`.
    #[error("empty cli configuration")]
    EmptyCommandSet,

    /// The device answered a configuration line with an in-band error.
    #[error("command '{command}' rejected by device: {output}")]
    CommandRejected { command: String, output: String },

    /// Retrieved text did not have the shape the workflow relies on.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A prompt or error pattern in a CLI template is invalid.
    #[error("invalid prompt configuration: {0}")]
    InvalidPromptConfig(String),

    /// The requested CLI template does not exist.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// The run configuration is incomplete or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A scripted session received something other than the next expected line.
    #[error("replay mismatch: {0}")]
    ReplayMismatch(String),

    #[error("internal error: {0}")]
    InternalServerError(String),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
