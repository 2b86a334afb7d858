use super::*;

/// Device changes not yet undone.
///
/// The sessions update it as they go; the cleanup path reads it to decide
/// what still has to be reverted after an early failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct RollbackLedger {
    cli_buffer_open: bool,
    candidate_dirty: bool,
    commits: usize,
}

impl RollbackLedger {
    /// A configuration line was sent and is not committed yet.
    pub fn open_cli_buffer(&mut self) {
        self.cli_buffer_open = true;
    }

    pub fn close_cli_buffer(&mut self) {
        self.cli_buffer_open = false;
    }

    pub fn cli_buffer_open(&self) -> bool {
        self.cli_buffer_open
    }

    pub fn record_commit(&mut self) {
        self.commits += 1;
    }

    /// Commits a rollback would still have to revert.
    pub fn pending_commits(&self) -> usize {
        self.commits
    }

    pub fn clear_commits(&mut self) {
        self.commits = 0;
    }

    /// An edit-config may have touched the candidate datastore.
    pub fn mark_candidate_dirty(&mut self) {
        self.candidate_dirty = true;
    }

    pub fn clear_candidate(&mut self) {
        self.candidate_dirty = false;
    }

    pub fn candidate_dirty(&self) -> bool {
        self.candidate_dirty
    }

    /// True when the device holds anything the run has to revert.
    pub fn needs_cleanup(&self) -> bool {
        self.cli_buffer_open || self.candidate_dirty || self.commits > 0
    }
}

/// Outcome of the cleanup path that runs after every run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CleanupReport {
    /// Whether the ledger held anything to revert.
    pub attempted: bool,
    /// Whether the ledger is clear after cleanup.
    pub succeeded: bool,
    /// Cleanup actions taken, in order.
    pub actions: Vec<String>,
    /// Errors hit while reverting (can contain multiple entries).
    pub errors: Vec<String>,
}

/// Reverts whatever the ledger still records, then closes both sessions.
///
/// Order: abort the open CLI buffer, discard the NETCONF candidate, roll
/// back outstanding commits. Each step runs even if an earlier one failed.
pub(super) async fn cleanup<M: ModelSession, T: CliTransport>(
    model: &mut Option<M>,
    cli: &mut Option<CliSession<T>>,
    ledger: &mut RollbackLedger,
    transcript: &Transcript,
) -> CleanupReport {
    let mut report = CleanupReport {
        attempted: ledger.needs_cleanup(),
        ..Default::default()
    };

    if report.attempted {
        transcript.note("cleanup: reverting outstanding device changes");
        debug!("cleanup needed: {:?}", ledger);
    }

    if ledger.cli_buffer_open() {
        match cli.as_mut() {
            Some(session) => match session.discard(ledger).await {
                Ok(()) => report.actions.push(format!(
                    "discarded open CLI configuration buffer ({})",
                    session.template().discard
                )),
                Err(err) => report.errors.push(format!("discard CLI buffer: {err}")),
            },
            None => report
                .errors
                .push("discard CLI buffer: no CLI session".to_string()),
        }
    }

    if ledger.candidate_dirty() {
        match model.as_mut() {
            Some(session) => match session.discard_changes().await {
                Ok(()) => {
                    ledger.clear_candidate();
                    report
                        .actions
                        .push("discarded uncommitted candidate changes".to_string());
                }
                Err(err) => report.errors.push(format!("discard-changes: {err}")),
            },
            None => report
                .errors
                .push("discard-changes: no NETCONF session".to_string()),
        }
    }

    let commits = ledger.pending_commits();
    if commits > 0 {
        match cli.as_mut() {
            Some(session) => match session.rollback(ledger).await {
                Ok(()) => report.actions.push(format!(
                    "rolled back {commits} outstanding commit(s) with '{}'",
                    session.template().rollback_command(commits)
                )),
                Err(err) => report.errors.push(format!("rollback: {err}")),
            },
            None => report.errors.push("rollback: no CLI session".to_string()),
        }
    }

    report.succeeded = report.errors.is_empty() && !ledger.needs_cleanup();
    for error in &report.errors {
        warn!("cleanup error: {}", error);
        transcript.note(format!("cleanup error: {error}"));
    }

    if let Some(mut session) = cli.take() {
        if let Err(err) = session.close().await {
            debug!("closing CLI session failed: {}", err);
        }
    }
    if let Some(mut session) = model.take() {
        if let Err(err) = session.close().await {
            debug!("closing NETCONF session failed: {}", err);
        }
    }

    report
}
