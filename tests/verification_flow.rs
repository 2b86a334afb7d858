use netconf_cli_verify::config::VerifierConfig;
use netconf_cli_verify::orchestrator::{CommandSet, RunReport, Verifier};
use netconf_cli_verify::session::{
    ModelJournal, ScriptedConnector, ScriptedModelSession, ScriptedTransport, Transcript,
    TranscriptEvent,
};
use netconf_cli_verify::templates;
use netconf_cli_verify::validate::{MismatchSide, StageStatus};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};

const BASE_REPLY: &str = include_str!("fixtures/base_reply.xml");
const COMPLETE_REPLY: &str = include_str!("fixtures/complete_reply.xml");
const COMMANDS: &str = include_str!("fixtures/commands.txt");
const RUNNING_AFTER_CLI: &str = include_str!("fixtures/running_after_cli.txt");
const RUNNING_AFTER_NETCONF: &str = include_str!("fixtures/running_after_netconf.txt");
const RUNNING_AFTER_NETCONF_DRIFT: &str = include_str!("fixtures/running_after_netconf_drift.txt");

const PROMPT: &str = "RP/0/RSP0/CPU0:xr1#";
const CONFIG_PROMPT: &str = "RP/0/RSP0/CPU0:xr1(config)#";
const CONFIG_IF_PROMPT: &str = "RP/0/RSP0/CPU0:xr1(config-if)#";

const ROLLBACK_OUTPUT: &str = "Loading Rollback Changes.\r\nLoaded Rollback Changes in 1 sec\r\nCommitting.\r\nConfiguration successfully rolled back 1 commits.";

const CAPABILITIES: &[&str] = &[
    "urn:ietf:params:netconf:base:1.0",
    "urn:ietf:params:netconf:capability:candidate:1.0",
    "http://cisco.com/ns/yang/Cisco-IOS-XR-shellutil-cfg?module=Cisco-IOS-XR-shellutil-cfg&revision=2015-10-12",
];

fn login() -> ScriptedTransport {
    ScriptedTransport::new("\r\nUser Access Verification\r\n\r\nUsername: ")
        .expect_line("admin", "admin\r\nPassword: ")
        .expect_line("secret", &format!("\r\n\r\n{PROMPT}"))
        .expect_command("terminal length 0", "", PROMPT)
}

fn apply_commands(transport: ScriptedTransport) -> ScriptedTransport {
    transport
        .expect_command("configure", "", CONFIG_PROMPT)
        .expect_command("hostname xr2", "", CONFIG_PROMPT)
        .expect_command("interface GigabitEthernet0/0/0/0", "", CONFIG_IF_PROMPT)
        .expect_command("description uplink", "", CONFIG_IF_PROMPT)
        .expect_command("no shutdown", "", CONFIG_IF_PROMPT)
        .expect_command("commit", "", CONFIG_IF_PROMPT)
        .expect_command("end", "", PROMPT)
}

fn show_running(transport: ScriptedTransport, output: &str) -> ScriptedTransport {
    transport.expect_command("show running-config", output.trim_end(), PROMPT)
}

fn rollback(transport: ScriptedTransport) -> ScriptedTransport {
    transport.expect_command("rollback configuration last 1", ROLLBACK_OUTPUT, PROMPT)
}

fn full_cli_script(netconf_running: &str) -> ScriptedTransport {
    let transport = show_running(apply_commands(login()), RUNNING_AFTER_CLI);
    let transport = show_running(rollback(transport), netconf_running);
    rollback(transport)
}

fn model(replies: Vec<&str>) -> ScriptedModelSession {
    ScriptedModelSession::new(CAPABILITIES.to_vec(), replies)
}

struct Harness {
    report: RunReport,
    journal: ModelJournal,
    sent: Vec<String>,
    transcript: Transcript,
    request_record: Option<String>,
    _dir: tempfile::TempDir,
}

async fn run(model: ScriptedModelSession, transport: ScriptedTransport, commands: &str) -> Harness {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = VerifierConfig {
        host: "xr1".to_string(),
        username: "admin".to_string(),
        password: "secret".to_string(),
        command_timeout_secs: 5,
        request_file: dir.path().join("edit_config.txt"),
        log_file: dir.path().join("logs.txt"),
        ..Default::default()
    };
    let journal: Arc<Mutex<ModelJournal>> = model.journal();
    let sent = transport.sent_handle();
    let transcript = Transcript::default();

    let connector = ScriptedConnector::new(Some(model), Some(transport));
    let mut verifier = Verifier::new(
        connector,
        config.clone(),
        templates::iosxr(),
        transcript.clone(),
    );
    let commands = CommandSet::parse(commands).expect("command set");
    let report = verifier.run(&commands).await;

    let journal = journal.lock().expect("journal").clone();
    let sent = sent.lock().expect("sent").clone();
    Harness {
        report,
        journal,
        sent,
        transcript,
        request_record: std::fs::read_to_string(&config.request_file).ok(),
        _dir: dir,
    }
}

fn statuses(report: &RunReport) -> Vec<StageStatus> {
    report.stages.iter().map(|s| s.status).collect()
}

#[tokio::test]
async fn timestamp_only_difference_passes_all_stages() {
    let harness = run(
        model(vec![BASE_REPLY, COMPLETE_REPLY]),
        full_cli_script(RUNNING_AFTER_NETCONF),
        COMMANDS,
    )
    .await;
    let report = &harness.report;

    assert_eq!(statuses(report), vec![StageStatus::Pass; 7]);
    assert!(report.passed());
    assert_eq!(report.exit_code(), 0);
    assert!(report.mismatches.is_empty());
    assert_eq!(
        report.yang_models,
        vec![
            "http://cisco.com/ns/yang/Cisco-IOS-XR-ifmgr-cfg".to_string(),
            "http://cisco.com/ns/yang/Cisco-IOS-XR-shellutil-cfg".to_string(),
        ]
    );
    assert_eq!(report.cli_fingerprint, report.netconf_fingerprint);
    assert!(!report.cleanup.attempted);

    assert_eq!(harness.journal.get_configs, 2);
    assert_eq!(harness.journal.commits, 1);
    assert!(harness.journal.closed);
    assert_eq!(harness.journal.edits.len(), 1);

    let sent_edit = &harness.journal.edits[0];
    assert_eq!(harness.request_record.as_deref(), Some(sent_edit.as_str()));
    assert!(sent_edit.contains("<host-name>xr2</host-name>"));
    assert!(sent_edit.contains("<description>uplink</description>"));
    assert!(!sent_edit.contains("tail-f.com/ns/aaa"));

    let rollbacks = harness
        .sent
        .iter()
        .filter(|l| l.starts_with("rollback configuration"))
        .count();
    assert_eq!(rollbacks, 2);
}

#[tokio::test]
async fn invalid_cli_line_fails_stage_two_and_aborts_buffer() {
    let transport = login()
        .expect_command("configure", "", CONFIG_PROMPT)
        .expect_command(
            "interfce GigabitEthernet0/0/0/0",
            "                  ^\r\n% Invalid input detected at '^' marker.",
            CONFIG_PROMPT,
        )
        .expect_command("abort", "", PROMPT);
    let harness = run(
        model(vec![BASE_REPLY, COMPLETE_REPLY]),
        transport,
        "interfce GigabitEthernet0/0/0/0\ncommit\n",
    )
    .await;
    let report = &harness.report;

    assert_eq!(statuses(report), vec![StageStatus::Pass, StageStatus::Fail]);
    assert_eq!(report.failed_stage, Some(2));
    assert_eq!(report.exit_code(), 1);
    assert!(
        report
            .failure
            .as_deref()
            .is_some_and(|f| f.contains("Invalid input detected"))
    );

    assert!(report.cleanup.attempted);
    assert!(report.cleanup.succeeded);
    assert!(report.cleanup.actions[0].contains("abort"));
    assert!(harness.sent.contains(&"abort".to_string()));
    assert!(!harness.sent.iter().any(|l| l.starts_with("rollback")));
    assert!(!harness.sent.contains(&"commit".to_string()));

    assert_eq!(harness.journal.get_configs, 1);
    assert!(harness.journal.edits.is_empty());
    assert!(harness.journal.closed);
    assert_eq!(harness.request_record, None);

    let finished = harness
        .transcript
        .entries()
        .expect("entries")
        .into_iter()
        .filter(|e| matches!(e.event, TranscriptEvent::StageFinished { .. }))
        .count();
    assert_eq!(finished, 2);
}

#[tokio::test]
async fn stage_three_failure_rolls_back_cli_commit() {
    let transport = rollback(show_running(apply_commands(login()), RUNNING_AFTER_CLI));
    let harness = run(model(vec![BASE_REPLY]), transport, COMMANDS).await;
    let report = &harness.report;

    assert_eq!(report.failed_stage, Some(3));
    assert_eq!(statuses(report).len(), 3);
    assert!(report.cleanup.attempted);
    assert!(report.cleanup.succeeded);
    assert!(
        report.cleanup.actions[0].contains("rollback configuration last 1"),
        "{:?}",
        report.cleanup.actions
    );
    assert!(harness.sent.contains(&"rollback configuration last 1".to_string()));
}

#[tokio::test]
async fn two_committed_blocks_are_rolled_back_together() {
    let transport = login()
        .expect_command("configure", "", CONFIG_PROMPT)
        .expect_command("hostname xr2", "", CONFIG_PROMPT)
        .expect_command("commit", "", CONFIG_PROMPT)
        .expect_command("interface GigabitEthernet0/0/0/0", "", CONFIG_IF_PROMPT)
        .expect_command("description uplink", "", CONFIG_IF_PROMPT)
        .expect_command("no shutdown", "", CONFIG_IF_PROMPT)
        .expect_command("commit", "", CONFIG_IF_PROMPT)
        .expect_command("end", "", PROMPT);
    let transport = show_running(transport, RUNNING_AFTER_CLI)
        .expect_command("rollback configuration last 2", ROLLBACK_OUTPUT, PROMPT);
    let harness = run(
        model(vec![BASE_REPLY]),
        transport,
        "hostname xr2\ncommit\ninterface GigabitEthernet0/0/0/0\n description uplink\n no shutdown\ncommit\n",
    )
    .await;
    let report = &harness.report;

    assert_eq!(report.failed_stage, Some(3));
    assert!(report.cleanup.succeeded);
    assert!(
        report.cleanup.actions[0].contains("rolled back 2 outstanding commit(s)"),
        "{:?}",
        report.cleanup.actions
    );
    let rollbacks = harness
        .sent
        .iter()
        .map(String::as_str)
        .filter(|l| l.starts_with("rollback configuration"))
        .collect::<Vec<_>>();
    assert_eq!(rollbacks, vec!["rollback configuration last 2"]);
}

#[tokio::test]
async fn stage_five_commit_failure_discards_candidate() {
    let transport = rollback(show_running(apply_commands(login()), RUNNING_AFTER_CLI));
    let harness = run(
        model(vec![BASE_REPLY, COMPLETE_REPLY]).failing_commit("'YANG' detected the 'fatal' condition"),
        transport,
        COMMANDS,
    )
    .await;
    let report = &harness.report;

    assert_eq!(report.failed_stage, Some(5));
    assert_eq!(harness.journal.edits.len(), 1);
    assert_eq!(harness.journal.commits, 0);
    assert_eq!(harness.journal.discards, 1);
    assert!(report.cleanup.succeeded);
    assert_eq!(
        report.cleanup.actions,
        vec!["discarded uncommitted candidate changes".to_string()]
    );
    assert_eq!(
        harness.request_record.as_deref(),
        Some(harness.journal.edits[0].as_str())
    );
}

#[tokio::test]
async fn missing_candidate_capability_fails_before_edit() {
    let transport = rollback(show_running(apply_commands(login()), RUNNING_AFTER_CLI));
    let model = ScriptedModelSession::new(
        vec!["urn:ietf:params:netconf:base:1.0"],
        vec![BASE_REPLY, COMPLETE_REPLY],
    );
    let harness = run(model, transport, COMMANDS).await;

    assert_eq!(harness.report.failed_stage, Some(5));
    assert!(
        harness
            .report
            .failure
            .as_deref()
            .is_some_and(|f| f.contains("capability:candidate"))
    );
    assert!(harness.journal.edits.is_empty());
    assert!(!harness.report.cleanup.attempted);
}

#[tokio::test]
async fn configuration_drift_is_reported_as_stage_seven_failure() {
    let harness = run(
        model(vec![BASE_REPLY, COMPLETE_REPLY]),
        full_cli_script(RUNNING_AFTER_NETCONF_DRIFT),
        COMMANDS,
    )
    .await;
    let report = &harness.report;

    assert_eq!(report.stages.len(), 7);
    assert_eq!(report.stages[6].status, StageStatus::Fail);
    assert_eq!(report.failed_stage, None);
    assert_eq!(report.exit_code(), 2);
    assert_eq!(report.mismatches.len(), 1);
    assert_eq!(report.mismatches[0].side, MismatchSide::OnlyInNetconf);
    assert_eq!(report.mismatches[0].line, " shutdown");
    assert_ne!(report.cli_fingerprint, report.netconf_fingerprint);

    let log = harness.transcript.render_text().expect("render");
    assert!(log.contains("========== 7. CLI NETCONF Configurations match =========="));
    assert!(log.contains("mismatched configurations:\n shutdown"));
}

#[tokio::test]
async fn unreachable_netconf_fails_stage_one_without_cli() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = VerifierConfig {
        host: "xr1".to_string(),
        username: "admin".to_string(),
        request_file: dir.path().join("edit_config.txt"),
        ..Default::default()
    };
    let transport = ScriptedTransport::new("Username: ");
    let sent = transport.sent_handle();
    let mut verifier = Verifier::new(
        ScriptedConnector::new(None, Some(transport)),
        config,
        templates::iosxr(),
        Transcript::default(),
    );
    let report = verifier
        .run(&CommandSet::parse("hostname xr2").expect("commands"))
        .await;

    assert_eq!(report.failed_stage, Some(1));
    assert_eq!(report.stages.len(), 1);
    assert!(sent.lock().expect("sent").is_empty());
}
