use super::*;

use crate::capabilities::{CapabilityReport, NC_CANDIDATE, supports_candidate};
use crate::delta::diff;
use crate::session::Datastore;

impl<K: DeviceConnector> Verifier<K> {
    async fn model_session<'a>(
        &mut self,
        ctx: &'a mut RunContext<K::Model, K::Cli>,
    ) -> Result<&'a mut K::Model, VerifyError> {
        if ctx.model.is_none() {
            let session = self.connector.connect_model(&self.transcript).await?;
            let capabilities = CapabilityReport::from_capabilities(session.capabilities());
            self.transcript.note(capabilities.render());
            ctx.model = Some(session);
        }
        required_mut(&mut ctx.model, "NETCONF session")
    }

    async fn running_config(
        &mut self,
        ctx: &mut RunContext<K::Model, K::Cli>,
    ) -> Result<ModelKeyedConfig, VerifyError> {
        let document = self
            .model_session(ctx)
            .await?
            .get_config(Datastore::Running)
            .await?;
        let config = ModelKeyedConfig::from_data_document(&document)?;
        debug!("running configuration holds {} model blocks", config.len());
        Ok(config)
    }

    pub(super) async fn base_config(
        &mut self,
        ctx: &mut RunContext<K::Model, K::Cli>,
    ) -> Result<StageStatus, VerifyError> {
        let base = self.running_config(ctx).await?;
        self.transcript
            .note(format!("base configuration: {} model blocks", base.len()));
        ctx.base = Some(base);
        Ok(StageStatus::Pass)
    }

    pub(super) async fn cli_apply(
        &mut self,
        commands: &CommandSet,
        ctx: &mut RunContext<K::Model, K::Cli>,
    ) -> Result<StageStatus, VerifyError> {
        let transport = self.connector.connect_cli().await?;
        let session = CliSession::login(
            transport,
            self.template.clone(),
            &self.config.host,
            &self.config.username,
            &self.config.password,
            self.config.command_timeout(),
            self.transcript.clone(),
        )
        .await?;
        let session = ctx.cli.insert(session);

        session.apply_config(commands, &mut ctx.ledger).await?;
        let snapshot = session.show_running_config().await?;
        ctx.cli_snapshot = Some(snapshot);
        Ok(StageStatus::Pass)
    }

    pub(super) async fn complete_config(
        &mut self,
        ctx: &mut RunContext<K::Model, K::Cli>,
    ) -> Result<StageStatus, VerifyError> {
        let complete = self.running_config(ctx).await?;
        self.transcript.note(format!(
            "complete configuration: {} model blocks",
            complete.len()
        ));
        ctx.complete = Some(complete);
        Ok(StageStatus::Pass)
    }

    pub(super) async fn cli_rollback(
        &mut self,
        ctx: &mut RunContext<K::Model, K::Cli>,
    ) -> Result<StageStatus, VerifyError> {
        let session = required_mut(&mut ctx.cli, "CLI session")?;
        session.rollback(&mut ctx.ledger).await?;
        Ok(StageStatus::Pass)
    }

    pub(super) async fn netconf_edit(
        &mut self,
        ctx: &mut RunContext<K::Model, K::Cli>,
    ) -> Result<StageStatus, VerifyError> {
        let delta = diff(
            required(&ctx.base, "base configuration")?,
            required(&ctx.complete, "complete configuration")?,
        );
        let request = EditRequest::build(&delta);
        info!(
            "edit request carries {} model block(s)",
            request.fragment_count()
        );

        let request_file = self.config.request_file.clone();
        std::fs::write(&request_file, request.rpc())?;
        ctx.request_file = Some(request_file);
        let _ = self.transcript.record(TranscriptEvent::EditPayload {
            config: request.config().to_string(),
        });
        if request.is_noop() {
            self.transcript
                .note("configuration delta is empty; sending an empty edit-config");
        }

        let noop = request.is_noop();
        ctx.delta = Some(delta);
        let request = ctx.request.insert(request);

        let model = required_mut(&mut ctx.model, "NETCONF session")?;
        if !supports_candidate(model.capabilities()) {
            return Err(VerifyError::MissingCapability(NC_CANDIDATE.to_string()));
        }
        ctx.ledger.mark_candidate_dirty();
        model.edit_config(request).await?;
        model.commit().await?;
        ctx.ledger.clear_candidate();
        // An empty commit creates no commit id on the device.
        if !noop {
            ctx.ledger.record_commit();
        }

        let session = required_mut(&mut ctx.cli, "CLI session")?;
        let snapshot = session.show_running_config().await?;
        ctx.netconf_snapshot = Some(snapshot);
        Ok(StageStatus::Pass)
    }

    pub(super) fn equivalence(
        &mut self,
        ctx: &mut RunContext<K::Model, K::Cli>,
    ) -> Result<StageStatus, VerifyError> {
        let cli = required(&ctx.cli_snapshot, "CLI snapshot")?;
        let netconf = required(&ctx.netconf_snapshot, "NETCONF snapshot")?;
        let delta = required(&ctx.delta, "configuration delta")?;

        self.transcript
            .note(format!("CLI response:\n{}", cli.text()));
        self.transcript
            .note(format!("NETCONF response:\n{}", netconf.text()));

        let report = self.validator.validate(cli, netconf, delta);
        self.transcript.note(format!(
            "{}: status of configurations match\nYANG models:\n{}",
            report.status,
            report.yang_models.join("\n")
        ));
        if !report.mismatches.is_empty() {
            let lines = report
                .mismatches
                .iter()
                .map(|m| m.line.as_str())
                .collect::<Vec<_>>();
            self.transcript
                .note(format!("mismatched configurations:\n{}", lines.join("\n")));
        }

        let status = report.status;
        ctx.equivalence = Some(report);
        Ok(status)
    }
}
