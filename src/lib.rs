//! # netconf-cli-verify - CLI vs NETCONF configuration equivalence
//!
//! `netconf-cli-verify` checks that a block of CLI configuration and the
//! NETCONF `edit-config` derived from it leave a device with the same
//! running configuration. It drives a NETCONF session and a command-line
//! session against one device through a fixed seven-stage workflow, and
//! rolls the device back to its base configuration on every exit path.
//!
//! ## Features
//!
//! - **Model-keyed extraction**: splits a `<data>` document into per-YANG-model blocks
//! - **Minimal delta**: keeps only the model blocks the CLI change added or modified
//! - **Edit synthesis**: wraps the delta into an `edit-config` against the candidate datastore
//! - **Equivalence check**: set comparison of the two `show running-config` snapshots
//! - **Guaranteed cleanup**: a rollback ledger reverts whatever an early failure left behind
//! - **Offline replay**: scripted sessions drive the whole workflow without a device
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netconf_cli_verify::config::VerifierConfig;
//! use netconf_cli_verify::orchestrator::{CommandSet, Verifier};
//! use netconf_cli_verify::session::{NetworkConnector, Transcript};
//! use netconf_cli_verify::templates;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VerifierConfig {
//!         host: "192.168.1.1".to_string(),
//!         username: "admin".to_string(),
//!         password: "password".to_string(),
//!         ..Default::default()
//!     };
//!     let commands = CommandSet::parse("hostname xr2\ncommit\n")?;
//!
//!     let mut verifier = Verifier::new(
//!         NetworkConnector::new(config.clone()),
//!         config,
//!         templates::iosxr(),
//!         Transcript::default(),
//!     );
//!     let report = verifier.run(&commands).await;
//!
//!     println!("exit code {}", report.exit_code());
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`orchestrator::Verifier`] - runs the seven stages and the cleanup path
//! - [`extract::ModelKeyedConfig`] - ordered model key to fragment mapping
//! - [`delta::diff`] - base vs candidate delta
//! - [`request::EditRequest`] - edit-config document and request record
//! - [`validate::Validator`] - snapshot equivalence check
//! - [`session`] - NETCONF and CLI sessions, transports and the transcript
//! - [`error::VerifyError`] - error type shared by every stage

pub mod capabilities;
pub mod config;
pub mod delta;
pub mod device;
pub mod error;
pub mod extract;
pub mod orchestrator;
pub mod report;
pub mod request;
pub mod session;
pub mod templates;
pub mod validate;
pub mod xml;
