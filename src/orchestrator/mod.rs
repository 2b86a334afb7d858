//! The seven-stage verification workflow.
//!
//! One run drives both sessions against the same device:
//!
//! 1. NETCONF get-config of the base configuration
//! 2. CLI apply, commit and `show running-config`
//! 3. NETCONF get-config of the complete configuration
//! 4. CLI rollback to the base configuration
//! 5. NETCONF edit-config of the delta, commit and `show running-config`
//! 6. CLI rollback to the base configuration
//! 7. equivalence check of the snapshots from stages 2 and 5
//!
//! The first failing stage ends the run. Whatever the [`RollbackLedger`]
//! still records is reverted afterwards, and both sessions are closed, on
//! every exit path.

use log::{debug, info, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::VerifierConfig;
use crate::delta::ConfigDelta;
use crate::error::VerifyError;
use crate::extract::ModelKeyedConfig;
use crate::request::EditRequest;
use crate::session::{
    CliSession, CliTransport, DeviceConnector, ModelSession, Transcript, TranscriptEvent,
};
use crate::templates::CliTemplate;
use crate::validate::{EquivalenceReport, Mismatch, ResponseSnapshot, StageStatus, Validator};

#[cfg(test)]
use crate::session::{ScriptedModelSession, ScriptedTransport};

pub use commands::CommandSet;
pub use ledger::{CleanupReport, RollbackLedger};

mod commands;
mod ledger;
mod stages;

/// One of the seven fixed workflow steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BaseConfig,
    CliApply,
    CompleteConfig,
    CliRollback,
    NetconfEdit,
    NetconfRollback,
    Equivalence,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::BaseConfig,
        Stage::CliApply,
        Stage::CompleteConfig,
        Stage::CliRollback,
        Stage::NetconfEdit,
        Stage::NetconfRollback,
        Stage::Equivalence,
    ];

    pub fn number(&self) -> u8 {
        match self {
            Stage::BaseConfig => 1,
            Stage::CliApply => 2,
            Stage::CompleteConfig => 3,
            Stage::CliRollback => 4,
            Stage::NetconfEdit => 5,
            Stage::NetconfRollback => 6,
            Stage::Equivalence => 7,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::BaseConfig => "NETCONF - Send GET_CONFIG for Base Configuration",
            Stage::CliApply => "CLI - Send CLI Configuration and show running-config",
            Stage::CompleteConfig => "NETCONF - Send GET_CONFIG for Complete Configuration",
            Stage::CliRollback | Stage::NetconfRollback => "CLI - Rollback to Base Configuration",
            Stage::NetconfEdit => "NETCONF - Send EDIT_CONFIG and show running-config",
            Stage::Equivalence => "CLI NETCONF Configurations match",
        }
    }
}

/// PASS/FAIL of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StageResult {
    pub stage: u8,
    pub label: String,
    pub status: StageStatus,
}

/// Result of one verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    /// Results of the stages that ran, in order.
    pub stages: Vec<StageResult>,
    /// Number of the stage whose error ended the run.
    pub failed_stage: Option<u8>,
    /// Error text of the failed stage.
    pub failure: Option<String>,
    /// YANG namespaces exercised by the configuration change.
    pub yang_models: Vec<String>,
    /// Lines present in only one of the final snapshots.
    pub mismatches: Vec<Mismatch>,
    pub cleanup: CleanupReport,
    /// SHA-256 of the stage-2 snapshot without its volatile line.
    pub cli_fingerprint: Option<String>,
    /// SHA-256 of the stage-5 snapshot without its volatile line.
    pub netconf_fingerprint: Option<String>,
    /// Where the edit request was recorded, if stage 5 got that far.
    pub request_file: Option<PathBuf>,
}

impl RunReport {
    /// True when all seven stages passed.
    pub fn passed(&self) -> bool {
        self.stages.len() == Stage::ALL.len()
            && self.stages.iter().all(|s| s.status == StageStatus::Pass)
    }

    /// 0 on a full pass, 1 when a stage failed with an error, 2 when only
    /// the equivalence check failed.
    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else if self.failed_stage.is_some() {
            1
        } else {
            2
        }
    }
}

/// Everything a run accumulates, handed from stage to stage.
pub struct RunContext<M: ModelSession, T: CliTransport> {
    model: Option<M>,
    cli: Option<CliSession<T>>,
    base: Option<ModelKeyedConfig>,
    complete: Option<ModelKeyedConfig>,
    delta: Option<ConfigDelta>,
    request: Option<EditRequest>,
    cli_snapshot: Option<ResponseSnapshot>,
    netconf_snapshot: Option<ResponseSnapshot>,
    equivalence: Option<EquivalenceReport>,
    request_file: Option<PathBuf>,
    ledger: RollbackLedger,
}

impl<M: ModelSession, T: CliTransport> Default for RunContext<M, T> {
    fn default() -> Self {
        Self {
            model: None,
            cli: None,
            base: None,
            complete: None,
            delta: None,
            request: None,
            cli_snapshot: None,
            netconf_snapshot: None,
            equivalence: None,
            request_file: None,
            ledger: RollbackLedger::default(),
        }
    }
}

fn required<'a, V>(value: &'a Option<V>, what: &str) -> Result<&'a V, VerifyError> {
    value
        .as_ref()
        .ok_or_else(|| VerifyError::InternalServerError(format!("{what} is not available")))
}

fn required_mut<'a, V>(value: &'a mut Option<V>, what: &str) -> Result<&'a mut V, VerifyError> {
    value
        .as_mut()
        .ok_or_else(|| VerifyError::InternalServerError(format!("{what} is not available")))
}

/// Drives one verification run through a [`DeviceConnector`].
pub struct Verifier<K: DeviceConnector> {
    connector: K,
    config: VerifierConfig,
    template: CliTemplate,
    validator: Validator,
    transcript: Transcript,
}

impl<K: DeviceConnector> Verifier<K> {
    pub fn new(
        connector: K,
        config: VerifierConfig,
        template: CliTemplate,
        transcript: Transcript,
    ) -> Self {
        let validator = config.validator();
        Self {
            connector,
            config,
            template,
            validator,
            transcript,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn request_file(&self) -> &Path {
        &self.config.request_file
    }

    /// Runs the stages in order, stopping at the first error, then cleans up.
    pub async fn run(&mut self, commands: &CommandSet) -> RunReport {
        let mut ctx: RunContext<K::Model, K::Cli> = RunContext::default();
        let mut stages = Vec::with_capacity(Stage::ALL.len());
        let mut failed_stage = None;
        let mut failure = None;

        for stage in Stage::ALL {
            info!("stage {}: {}", stage.number(), stage.label());
            let _ = self.transcript.record(TranscriptEvent::StageStarted {
                stage: stage.number(),
                label: stage.label().to_string(),
            });

            let (status, error) = match self.run_stage(stage, commands, &mut ctx).await {
                Ok(status) => (status, None),
                Err(err) => {
                    warn!("stage {} failed: {}", stage.number(), err);
                    (StageStatus::Fail, Some(err.to_string()))
                }
            };

            let _ = self.transcript.record(TranscriptEvent::StageFinished {
                stage: stage.number(),
                label: stage.label().to_string(),
                status,
                error: error.clone(),
            });
            stages.push(StageResult {
                stage: stage.number(),
                label: stage.label().to_string(),
                status,
            });

            if let Some(error) = error {
                failed_stage = Some(stage.number());
                failure = Some(error);
                break;
            }
        }

        let cleanup =
            ledger::cleanup(&mut ctx.model, &mut ctx.cli, &mut ctx.ledger, &self.transcript).await;
        debug!("cleanup finished: {:?}", cleanup);

        let volatile = self.validator.volatile_line();
        let (yang_models, mismatches) = match ctx.equivalence {
            Some(report) => (report.yang_models, report.mismatches),
            None => (Vec::new(), Vec::new()),
        };

        RunReport {
            stages,
            failed_stage,
            failure,
            yang_models,
            mismatches,
            cleanup,
            cli_fingerprint: ctx.cli_snapshot.as_ref().map(|s| s.fingerprint(volatile)),
            netconf_fingerprint: ctx
                .netconf_snapshot
                .as_ref()
                .map(|s| s.fingerprint(volatile)),
            request_file: ctx.request_file,
        }
    }

    async fn run_stage(
        &mut self,
        stage: Stage,
        commands: &CommandSet,
        ctx: &mut RunContext<K::Model, K::Cli>,
    ) -> Result<StageStatus, VerifyError> {
        match stage {
            Stage::BaseConfig => self.base_config(ctx).await,
            Stage::CliApply => self.cli_apply(commands, ctx).await,
            Stage::CompleteConfig => self.complete_config(ctx).await,
            Stage::CliRollback | Stage::NetconfRollback => self.cli_rollback(ctx).await,
            Stage::NetconfEdit => self.netconf_edit(ctx).await,
            Stage::Equivalence => self.equivalence(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_numbered_in_order() {
        let numbers = Stage::ALL.iter().map(|s| s.number()).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(Stage::CliRollback.label(), Stage::NetconfRollback.label());
    }

    fn report(statuses: &[StageStatus], failed_stage: Option<u8>) -> RunReport {
        RunReport {
            stages: statuses
                .iter()
                .zip(Stage::ALL)
                .map(|(status, stage)| StageResult {
                    stage: stage.number(),
                    label: stage.label().to_string(),
                    status: *status,
                })
                .collect(),
            failed_stage,
            failure: failed_stage.map(|_| "boom".to_string()),
            yang_models: Vec::new(),
            mismatches: Vec::new(),
            cleanup: CleanupReport::default(),
            cli_fingerprint: None,
            netconf_fingerprint: None,
            request_file: None,
        }
    }

    #[test]
    fn exit_codes_separate_errors_from_mismatches() {
        let pass = [StageStatus::Pass; 7];
        assert_eq!(report(&pass, None).exit_code(), 0);

        let mut mismatch = pass;
        mismatch[6] = StageStatus::Fail;
        assert_eq!(report(&mismatch, None).exit_code(), 2);

        let fatal = [StageStatus::Pass, StageStatus::Fail];
        assert_eq!(report(&fatal, Some(2)).exit_code(), 1);
    }

    #[test]
    fn partial_run_is_not_a_pass() {
        assert!(!report(&[StageStatus::Pass; 3], None).passed());
    }

    #[test]
    fn missing_context_is_an_internal_error() {
        let ctx: RunContext<ScriptedModelSession, ScriptedTransport> = RunContext::default();
        assert!(matches!(
            required(&ctx.base, "base configuration"),
            Err(VerifyError::InternalServerError(_))
        ));
    }
}
