use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};

use netconf_cli_verify::capabilities::CapabilityReport;
use netconf_cli_verify::config::VerifierConfig;
use netconf_cli_verify::orchestrator::{CommandSet, RunReport, Verifier};
use netconf_cli_verify::report::render_summary;
use netconf_cli_verify::session::{
    DeviceConnector, ModelSession, NetworkConnector, SecurityLevel, Transcript, TranscriptLevel,
};
use netconf_cli_verify::templates::{self, CliTemplate};

const FATAL_EXIT: i32 = 1;
const USAGE_EXIT: i32 = 3;

#[derive(Parser, Debug)]
#[command(name = "netconf-cli-verify")]
#[command(about = "Check that CLI configuration and the equivalent NETCONF edit-config give the same running configuration")]
struct Cli {
    /// Device address.
    #[arg(long)]
    host: Option<String>,
    #[arg(long, alias = "netconfport")]
    netconf_port: Option<u16>,
    #[arg(long, alias = "telnetport")]
    cli_port: Option<u16>,
    #[arg(long)]
    username: Option<String>,
    #[arg(long)]
    password: Option<String>,
    /// File of CLI configuration lines. Without it, lines are read from
    /// stdin until one containing `commit`.
    #[arg(long, alias = "clifile")]
    cli_file: Option<PathBuf>,
    /// JSON run configuration; flags override its fields.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Built-in CLI template.
    #[arg(long)]
    template: Option<String>,
    /// JSON CLI template; takes precedence over --template.
    #[arg(long)]
    template_file: Option<PathBuf>,
    /// SSH algorithm profile: secure, balanced or legacy-compatible.
    #[arg(long, value_parser = parse_security)]
    security: Option<SecurityLevel>,
    /// Seconds allowed for each command or RPC reply.
    #[arg(long)]
    timeout: Option<u64>,
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[arg(long)]
    request_file: Option<PathBuf>,
    /// Also write the run report as JSON.
    #[arg(long)]
    report_json: Option<PathBuf>,
    /// Also write the transcript as JSON lines.
    #[arg(long)]
    transcript_jsonl: Option<PathBuf>,
    /// Print the server capabilities grouped by family and exit.
    #[arg(long)]
    list_capabilities: bool,
}

fn parse_security(value: &str) -> Result<SecurityLevel, String> {
    value.parse::<SecurityLevel>().map_err(|e| e.to_string())
}

fn load_config(cli: &Cli) -> Result<VerifierConfig> {
    let mut config = match &cli.config {
        Some(path) => VerifierConfig::from_json_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => VerifierConfig::default(),
    };

    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.netconf_port {
        config.netconf_port = port;
    }
    if let Some(port) = cli.cli_port {
        config.cli_port = port;
    }
    if let Some(username) = &cli.username {
        config.username = username.clone();
    }
    if let Some(password) = &cli.password {
        config.password = password.clone();
    }
    if let Some(template) = &cli.template {
        config.template = template.clone();
    }
    if let Some(path) = &cli.template_file {
        config.template_file = Some(path.clone());
    }
    if let Some(security) = cli.security {
        config.security = security;
    }
    if let Some(timeout) = cli.timeout {
        config.command_timeout_secs = timeout;
    }
    if let Some(path) = &cli.log_file {
        config.log_file = path.clone();
    }
    if let Some(path) = &cli.request_file {
        config.request_file = path.clone();
    }

    config.validate()?;
    Ok(config)
}

fn load_template(config: &VerifierConfig) -> Result<CliTemplate> {
    let template = match &config.template_file {
        Some(path) => CliTemplate::from_json_file(path)
            .with_context(|| format!("failed to load template {}", path.display()))?,
        None => templates::by_name(&config.template)?,
    };
    Ok(template)
}

fn load_commands(cli: &Cli) -> Result<CommandSet> {
    let commands = match &cli.cli_file {
        Some(path) => CommandSet::from_file(path)
            .with_context(|| format!("CLI file {}", path.display()))?,
        None => {
            println!("\nEnter the CLI configurations along with commit:\n");
            std::io::stdout().flush()?;
            CommandSet::read_interactive(std::io::stdin().lock())?
        }
    };
    Ok(commands)
}

async fn list_capabilities(config: VerifierConfig) -> Result<i32> {
    let transcript = Transcript::new(TranscriptLevel::Off);
    let mut connector = NetworkConnector::new(config);
    let mut session = connector.connect_model(&transcript).await?;
    println!(
        "{}",
        CapabilityReport::from_capabilities(session.capabilities()).render()
    );
    session.close().await?;
    Ok(0)
}

fn write_artifacts(
    cli: &Cli,
    config: &VerifierConfig,
    transcript: &Transcript,
    report: &RunReport,
) -> Result<()> {
    std::fs::write(&config.log_file, transcript.render_text()?)
        .with_context(|| format!("failed to write {}", config.log_file.display()))?;
    if let Some(path) = &cli.transcript_jsonl {
        std::fs::write(path, transcript.to_jsonl()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    if let Some(path) = &cli.report_json {
        std::fs::write(path, serde_json::to_string_pretty(report)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

async fn run(
    cli: &Cli,
    config: VerifierConfig,
    template: CliTemplate,
    commands: CommandSet,
) -> Result<i32> {
    debug!("{} configuration line(s) to verify", commands.len());

    let transcript = Transcript::new(TranscriptLevel::KeyEventsOnly);
    let connector = NetworkConnector::new(config.clone());
    let mut verifier = Verifier::new(connector, config.clone(), template, transcript.clone());
    let report = verifier.run(&commands).await;
    info!("run finished with exit code {}", report.exit_code());

    write_artifacts(cli, &config, &transcript, &report)?;
    println!(
        "\n{}",
        render_summary(&report, &config.request_file, &config.log_file)
    );
    Ok(report.exit_code())
}

fn exit_with(err: anyhow::Error, code: i32) -> ! {
    eprintln!("error: {err:#}");
    std::process::exit(code);
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { USAGE_EXIT } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let config = load_config(&cli).unwrap_or_else(|err| exit_with(err, USAGE_EXIT));
    if cli.list_capabilities {
        let code = list_capabilities(config)
            .await
            .unwrap_or_else(|err| exit_with(err, FATAL_EXIT));
        std::process::exit(code);
    }
    let template = load_template(&config).unwrap_or_else(|err| exit_with(err, USAGE_EXIT));
    let commands = load_commands(&cli).unwrap_or_else(|err| exit_with(err, USAGE_EXIT));

    let code = run(&cli, config, template, commands)
        .await
        .unwrap_or_else(|err| exit_with(err, FATAL_EXIT));
    std::process::exit(code);
}
