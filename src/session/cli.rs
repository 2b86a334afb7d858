use super::*;

use std::collections::HashMap;

use regex::Regex;

use crate::device::{
    IGNORE_START_LINE, MORE_STATE, PASSWORD_STATE, PromptMatcher, USERNAME_STATE,
};
use crate::orchestrator::{CommandSet, RollbackLedger};
use crate::templates::CliTemplate;
use crate::validate::ResponseSnapshot;

/// Output of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// False if any line matched an error pattern.
    pub success: bool,
    /// Output without the echoed command and the trailing prompt.
    pub content: String,
    pub all: String,
    pub prompt: Option<String>,
}

/// Prompt-driven command-line session on top of a [`CliTransport`].
pub struct CliSession<T: CliTransport> {
    transport: T,
    matcher: PromptMatcher,
    template: CliTemplate,
    no_changes: Regex,
    timeout: Duration,
    prompt: String,
    host: String,
    transcript: Transcript,
}

impl<T: CliTransport> CliSession<T> {
    /// Logs in, waits for the exec prompt and runs the terminal setup
    /// commands.
    ///
    /// A username prompt showing up a second time means the credentials
    /// were rejected.
    pub async fn login(
        transport: T,
        template: CliTemplate,
        host: &str,
        username: &str,
        password: &str,
        timeout: Duration,
        transcript: Transcript,
    ) -> Result<Self, VerifyError> {
        let mut params = HashMap::new();
        params.insert(USERNAME_STATE.to_string(), username.to_string());
        params.insert(PASSWORD_STATE.to_string(), password.to_string());
        let matcher = PromptMatcher::from_template(&template, params)?;
        let no_changes = template.no_changes_regex()?;

        let mut session = Self {
            transport,
            matcher,
            template,
            no_changes,
            timeout,
            prompt: String::new(),
            host: host.to_string(),
            transcript,
        };

        let (_, banner) = session.read_until_prompt().await.map_err(|err| match err {
            VerifyError::ExecTimeout(output) => {
                VerifyError::ExecTimeout(format!("waiting for login prompt: {output}"))
            }
            other => other,
        })?;
        trace!("{} login banner: {:?}", session.host, banner);
        debug!("{} logged in, prompt '{}'", session.host, session.prompt);
        session
            .transcript
            .note(format!("CLI session to {} logged in", session.host));

        let setup = session.template.terminal_setup.clone();
        for command in setup {
            session.execute(&command).await?;
        }
        Ok(session)
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn template(&self) -> &CliTemplate {
        &self.template
    }

    pub fn in_config_mode(&self) -> bool {
        self.matcher.in_config_mode()
    }

    /// Reads device output until a prompt line.
    ///
    /// Input prompts are answered along the way. Returns whether any
    /// line matched an error pattern, and the cleaned output including
    /// the final prompt.
    async fn read_until_prompt(&mut self) -> Result<(bool, String), VerifyError> {
        let Self {
            transport,
            matcher,
            prompt,
            transcript,
            host,
            timeout,
            ..
        } = self;

        let mut clean_output = String::new();
        let mut line_buffer = String::new();
        let mut line = String::new();
        let mut username_prompts = 0usize;

        let result: Result<Result<bool, VerifyError>, _> = tokio::time::timeout(*timeout, async {
            let mut is_error = false;
            loop {
                let Some(data) = transport.read_chunk().await? else {
                    return Err(VerifyError::ChannelDisconnectError);
                };
                let _ = transcript.record_raw_chunk(&data);
                line_buffer.push_str(&data);

                while let Some(newline_pos) = line_buffer.find('\n') {
                    line.clear();
                    line.extend(line_buffer.drain(..=newline_pos));
                    let trim_start = IGNORE_START_LINE.replace(&line, "");
                    let trimmed_line = trim_start.trim_end();

                    matcher.read(trimmed_line);
                    if matcher.error() {
                        is_error = true;
                    }

                    clean_output.push_str(trimmed_line);
                    clean_output.push('\n');
                }

                // The prompt never ends with a newline, so it is only
                // visible in the unfinished remainder.
                if !line_buffer.is_empty() {
                    let pending = IGNORE_START_LINE.replace(&line_buffer, "").to_string();
                    if matcher.read_prompt(&pending) {
                        matcher.read(&pending);
                        clean_output.push_str(&pending);
                        *prompt = pending;
                        line_buffer.clear();
                        return Ok(!is_error);
                    }
                    if let Some(request) = matcher.read_need_write(&pending) {
                        matcher.read(&pending);
                        if request.state == USERNAME_STATE {
                            username_prompts += 1;
                            if username_prompts > 1 {
                                return Err(VerifyError::AuthenticationFailed(host.clone()));
                            }
                        }
                        trace!("Input required for state '{}'", request.state);
                        transcript.note(format!("answered {} prompt", request.state));
                        if request.record {
                            clean_output.push_str(&pending);
                            clean_output.push('\n');
                        }
                        line_buffer.clear();
                        if request.state == MORE_STATE {
                            transport.send(&request.input).await?;
                        } else {
                            transport.send(&format!("{}\n", request.input)).await?;
                        }
                    }
                }
            }
        })
        .await;

        match result {
            Err(_) => Err(VerifyError::ExecTimeout(clean_output)),
            Ok(Err(err)) => Err(err),
            Ok(Ok(success)) => Ok((success, clean_output)),
        }
    }

    /// Sends one command and waits for the next prompt.
    pub async fn execute(&mut self, command: &str) -> Result<CommandOutput, VerifyError> {
        let _ = self.transcript.record(TranscriptEvent::CliSent {
            command: command.to_string(),
        });
        self.transport.send(&format!("{command}\n")).await?;

        let (success, all) = match self.read_until_prompt().await {
            Ok(v) => v,
            Err(err) => {
                debug!("{} command '{}' failed: {}", self.host, command, err);
                return Err(err);
            }
        };

        let mut content = all.as_str();

        // Remove the echoed command from the beginning of the output
        if !command.is_empty() && content.starts_with(command) {
            content = content
                .strip_prefix(command)
                .unwrap_or(content)
                .trim_start_matches(['\n', '\r']);
        }

        // Remove the trailing prompt
        let content = match content.rfind('\n') {
            Some(pos) => &content[..pos],
            None => "",
        };

        let output = CommandOutput {
            success,
            content: content.to_string(),
            all: all.clone(),
            prompt: self.matcher.current_prompt().map(|p| p.to_string()),
        };

        let _ = self.transcript.record(TranscriptEvent::CliReceived {
            command: command.to_string(),
            success: output.success,
            content: output.content.clone(),
        });

        Ok(output)
    }

    /// Like [`execute`](Self::execute) but fails on an in-band error.
    async fn execute_checked(&mut self, command: &str) -> Result<CommandOutput, VerifyError> {
        let output = self.execute(command).await?;
        if !output.success {
            return Err(VerifyError::CommandRejected {
                command: command.to_string(),
                output: output.content,
            });
        }
        Ok(output)
    }

    /// Sends a commit line and updates the ledger.
    ///
    /// A commit that reports no changes is not counted, so a later
    /// rollback never reverts an older, unrelated commit.
    async fn commit(&mut self, command: &str, ledger: &mut RollbackLedger) -> Result<(), VerifyError> {
        let output = self.execute_checked(command).await?;
        ledger.close_cli_buffer();
        if self.no_changes.is_match(&output.content) {
            self.transcript
                .note("commit reported no configuration changes; nothing to roll back");
        } else {
            ledger.record_commit();
        }
        Ok(())
    }

    /// Enters config mode, applies every line, commits and leaves config
    /// mode.
    ///
    /// Lines that are themselves commits are committed in place; a final
    /// commit is only added when the set does not already end on one.
    pub async fn apply_config(
        &mut self,
        commands: &CommandSet,
        ledger: &mut RollbackLedger,
    ) -> Result<(), VerifyError> {
        let enter = self.template.enter_config.clone();
        self.execute_checked(&enter).await?;
        if !self.in_config_mode() {
            return Err(VerifyError::MalformedResponse(format!(
                "'{enter}' did not reach a config prompt, got '{}'",
                self.prompt
            )));
        }

        let mut pending = false;
        for line in commands.lines() {
            if self.template.is_commit_line(line) {
                self.commit(line, ledger).await?;
                pending = false;
                continue;
            }
            ledger.open_cli_buffer();
            pending = true;
            self.execute_checked(line).await?;
        }
        if pending {
            let commit = self.template.commit.clone();
            self.commit(&commit, ledger).await?;
        }

        let end = self.template.end.clone();
        self.execute_checked(&end).await?;
        Ok(())
    }

    /// Leaves config mode dropping any uncommitted changes.
    pub async fn discard(&mut self, ledger: &mut RollbackLedger) -> Result<(), VerifyError> {
        if self.in_config_mode() {
            let discard = self.template.discard.clone();
            self.execute_checked(&discard).await?;
        }
        ledger.close_cli_buffer();
        Ok(())
    }

    /// Rolls back every commit the ledger still holds.
    ///
    /// With nothing outstanding this is a no-op that only leaves a note in
    /// the transcript.
    pub async fn rollback(&mut self, ledger: &mut RollbackLedger) -> Result<(), VerifyError> {
        let commits = ledger.pending_commits();
        if commits == 0 {
            self.transcript.note("no outstanding commits; rollback skipped");
            return Ok(());
        }
        if self.in_config_mode() {
            let end = self.template.end.clone();
            self.execute_checked(&end).await?;
        }
        let command = self.template.rollback_command(commits);
        self.execute_checked(&command).await?;
        ledger.clear_commits();
        Ok(())
    }

    /// Captures the running configuration between the template's begin
    /// and end marker lines, both included.
    pub async fn show_running_config(&mut self) -> Result<ResponseSnapshot, VerifyError> {
        let command = self.template.show_config.clone();
        let output = self.execute(&command).await?;

        let begin = self.template.show_config_begin.as_str();
        let end = self.template.show_config_end.as_str();
        let lines = output.content.lines().collect::<Vec<_>>();
        let Some(start) = lines.iter().position(|l| l.trim() == begin) else {
            return Err(VerifyError::MalformedResponse(format!(
                "'{command}' output has no '{begin}' line"
            )));
        };
        let Some(len) = lines[start..].iter().position(|l| l.trim() == end) else {
            return Err(VerifyError::MalformedResponse(format!(
                "'{command}' output has no closing '{end}' line"
            )));
        };
        Ok(ResponseSnapshot::new(lines[start..=start + len].join("\n")))
    }

    pub async fn close(&mut self) -> Result<(), VerifyError> {
        debug!("Closing CLI session to {}", self.host);
        if !self.in_config_mode() {
            let _ = self.transport.send("exit\n").await;
        }
        self.transport.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates;

    const PROMPT: &str = "RP/0/RSP0/CPU0:xr1#";
    const CONFIG_PROMPT: &str = "RP/0/RSP0/CPU0:xr1(config)#";

    fn login_script() -> ScriptedTransport {
        ScriptedTransport::new("\r\nUser Access Verification\r\n\r\nUsername: ")
            .expect_line("admin", "admin\r\nPassword: ")
            .expect_line("secret", &format!("\r\n\r\n{PROMPT}"))
            .expect_command("terminal length 0", "", PROMPT)
    }

    async fn login(transport: ScriptedTransport) -> Result<CliSession<ScriptedTransport>, VerifyError> {
        CliSession::login(
            transport,
            templates::iosxr(),
            "xr1",
            "admin",
            "secret",
            Duration::from_secs(5),
            Transcript::default(),
        )
        .await
    }

    #[tokio::test]
    async fn login_answers_credentials_and_sets_terminal() {
        let session = login(login_script()).await.expect("login");
        assert_eq!(session.prompt(), PROMPT);
        assert!(!session.in_config_mode());
    }

    #[tokio::test]
    async fn invalid_no_changes_pattern_fails_before_login() {
        let mut template = templates::iosxr();
        template.no_changes = "(unclosed".to_string();
        let transport = ScriptedTransport::new("Username: ");
        let sent = transport.sent_handle();
        let result = CliSession::login(
            transport,
            template,
            "xr1",
            "admin",
            "secret",
            Duration::from_secs(5),
            Transcript::default(),
        )
        .await;
        assert!(matches!(result, Err(VerifyError::InvalidPromptConfig(_))));
        assert!(sent.lock().expect("sent").is_empty());
    }

    #[tokio::test]
    async fn repeated_username_prompt_is_authentication_failure() {
        let transport = ScriptedTransport::new("Username: ")
            .expect_line("admin", "admin\r\nPassword: ")
            .expect_line("secret", "\r\n% Authentication failed\r\n\r\nUsername: ");
        let err = match login(transport).await {
            Ok(_) => panic!("login should fail"),
            Err(err) => err,
        };
        assert!(matches!(err, VerifyError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn unscripted_input_during_login_fails() {
        let err = match login(ScriptedTransport::new("Username: ")).await {
            Ok(_) => panic!("login should fail"),
            Err(err) => err,
        };
        assert!(matches!(
            err,
            VerifyError::ReplayMismatch(_) | VerifyError::ChannelDisconnectError
        ));
    }

    #[tokio::test]
    async fn apply_config_commits_and_records_ledger() {
        let transport = login_script()
            .expect_command("configure", "", CONFIG_PROMPT)
            .expect_command("hostname xr2", "", CONFIG_PROMPT)
            .expect_command("commit", "", CONFIG_PROMPT)
            .expect_command("end", "", PROMPT);
        let mut session = login(transport).await.expect("login");
        let commands = CommandSet::parse("hostname xr2\n").expect("commands");
        let mut ledger = RollbackLedger::default();

        session.apply_config(&commands, &mut ledger).await.expect("apply");

        assert_eq!(ledger.pending_commits(), 1);
        assert!(!ledger.cli_buffer_open());
        assert!(!session.in_config_mode());
    }

    #[tokio::test]
    async fn commit_without_changes_is_not_counted() {
        let transport = login_script()
            .expect_command("configure", "", CONFIG_PROMPT)
            .expect_command("hostname xr1", "", CONFIG_PROMPT)
            .expect_command("commit", "% No configuration changes to commit.", CONFIG_PROMPT)
            .expect_command("end", "", PROMPT);
        let mut session = login(transport).await.expect("login");
        let commands = CommandSet::parse("hostname xr1\ncommit\n").expect("commands");
        let mut ledger = RollbackLedger::default();

        session.apply_config(&commands, &mut ledger).await.expect("apply");
        assert_eq!(ledger.pending_commits(), 0);
    }

    #[tokio::test]
    async fn rejected_line_leaves_buffer_open() {
        let transport = login_script()
            .expect_command("configure", "", CONFIG_PROMPT)
            .expect_command(
                "interfce Gi0/0/0/0",
                "                  ^\r\n% Invalid input detected at '^' marker.",
                CONFIG_PROMPT,
            );
        let mut session = login(transport).await.expect("login");
        let commands = CommandSet::parse("interfce Gi0/0/0/0\n").expect("commands");
        let mut ledger = RollbackLedger::default();

        let err = session
            .apply_config(&commands, &mut ledger)
            .await
            .expect_err("rejected");
        assert!(matches!(err, VerifyError::CommandRejected { .. }));
        assert!(ledger.cli_buffer_open());
        assert!(session.in_config_mode());
    }

    #[tokio::test]
    async fn rollback_uses_outstanding_commit_count() {
        let transport = login_script().expect_command(
            "rollback configuration last 2",
            "Loading Rollback Changes.\r\nConfiguration successfully rolled back 2 commits.",
            PROMPT,
        );
        let mut session = login(transport).await.expect("login");
        let mut ledger = RollbackLedger::default();
        ledger.record_commit();
        ledger.record_commit();

        session.rollback(&mut ledger).await.expect("rollback");
        assert_eq!(ledger.pending_commits(), 0);
    }

    #[tokio::test]
    async fn rollback_with_nothing_outstanding_sends_nothing() {
        let mut session = login(login_script()).await.expect("login");
        let mut ledger = RollbackLedger::default();
        session.rollback(&mut ledger).await.expect("no-op rollback");
    }

    #[tokio::test]
    async fn show_running_config_keeps_marker_lines() {
        let output = [
            "Mon Mar  7 10:00:00.000 UTC",
            "Building configuration...",
            "!! IOS XR Configuration 7.3.2",
            "!! Last configuration change at Mon Mar  7 09:59:00 2022 by admin",
            "!",
            "hostname xr1",
            "end",
        ]
        .join("\r\n");
        let transport = login_script().expect_command("show running-config", &output, PROMPT);
        let mut session = login(transport).await.expect("login");

        let snapshot = session.show_running_config().await.expect("snapshot");
        let lines = snapshot.text().lines().collect::<Vec<_>>();
        assert_eq!(lines.first(), Some(&"Building configuration..."));
        assert_eq!(lines.last(), Some(&"end"));
        assert!(lines[2].starts_with("!! Last configuration change"));
    }

    #[tokio::test]
    async fn show_running_config_without_marker_is_malformed() {
        let transport = login_script().expect_command("show running-config", "hostname xr1", PROMPT);
        let mut session = login(transport).await.expect("login");
        assert!(matches!(
            session.show_running_config().await,
            Err(VerifyError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn pagination_prompt_is_answered() {
        let transport = login_script()
            .expect_line("show clock", "show clock\r\n10:00\r\n --More-- ")
            .expect_line(" ", &format!("\r\nUTC\r\n{PROMPT}"));
        let mut session = login(transport).await.expect("login");
        let output = session.execute("show clock").await.expect("execute");
        assert!(output.success);
        assert!(output.content.contains("UTC"));
    }
}
