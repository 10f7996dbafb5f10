use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use noticeflow_actions::{Latency, SimulatedActions, SimulationConfig, TicketDesk};
use noticeflow_ai::{HttpBackend, LlmOracle, OracleConfig};
use noticeflow_core::{EscalationFailurePolicy, EscalationPolicy};
use noticeflow_workflow::{
    CancellationToken, DispatchConfig, DispatchWorkflow, NoticeDefaults, NoticeRequest,
    NoticeWorkflow,
};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "noticeflow", version, about = "Triage notices and route inbound messages")]
pub struct Cli {
    #[command(flatten)]
    shared: SharedArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the notice workflow on one message
    Notice(NoticeArgs),
    /// Let the dispatcher route one inbound message
    Dispatch(DispatchArgs),
}

#[derive(Debug, Args)]
struct SharedArgs {
    #[arg(long, global = true, env = "NOTICEFLOW_API_URL", default_value = "https://api.anthropic.com")]
    api_url: String,
    #[arg(long, global = true, env = "NOTICEFLOW_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,
    #[arg(long, global = true, env = "NOTICEFLOW_MODEL", default_value = "claude-sonnet-4-5")]
    model: String,
    /// Upper bound of simulated action latency; 0 disables it
    #[arg(long, global = true, env = "NOTICEFLOW_LATENCY_MS")]
    latency_ms: Option<u64>,
    /// Probability in [0, 1] that a simulated action fails
    #[arg(long, global = true, env = "NOTICEFLOW_FAILURE_RATE", default_value_t = 0.0, value_parser = parse_probability)]
    failure_rate: f64,
    #[arg(long, short, global = true, env = "NOTICEFLOW_VERBOSE")]
    verbose: bool,
}

#[derive(Debug, Args)]
struct NoticeArgs {
    /// Message file, or `-` for stdin
    #[arg(long, env = "NOTICEFLOW_INPUT", default_value = "-")]
    input: PathBuf,
    #[arg(long, env = "NOTICEFLOW_CRITERIA")]
    criteria: Option<String>,
    #[arg(long, env = "NOTICEFLOW_FINE_THRESHOLD")]
    fine_threshold: Option<f64>,
    /// Comma-separated escalation recipients
    #[arg(long, env = "NOTICEFLOW_RECIPIENTS", value_delimiter = ',')]
    recipients: Vec<String>,
    /// Treat an unavailable escalation check as "escalate"
    #[arg(long, env = "NOTICEFLOW_FAIL_CLOSED")]
    fail_closed: bool,
}

#[derive(Debug, Args)]
struct DispatchArgs {
    /// Message file, or `-` for stdin
    #[arg(long, env = "NOTICEFLOW_INPUT", default_value = "-")]
    input: PathBuf,
    #[arg(long, env = "NOTICEFLOW_MAX_ITERATIONS", default_value_t = 10)]
    max_iterations: usize,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        init_tracing(self.shared.verbose);
        info!("noticeflow v{}", env!("CARGO_PKG_VERSION"));

        let oracle = Arc::new(self.shared.oracle()?);
        let actions = Arc::new(self.shared.actions());
        let notices = NoticeWorkflow::new(oracle.clone(), actions.clone());
        let cancel = cancel_on_ctrl_c();

        match self.command {
            Command::Notice(args) => {
                let message = read_input(&args.input)?;
                let defaults = NoticeDefaults::default();
                let criteria = args.criteria.unwrap_or(defaults.policy.criteria);
                let threshold = args.fine_threshold.unwrap_or(defaults.policy.fine_threshold);
                let on_failure = if args.fail_closed {
                    EscalationFailurePolicy::FailClosed
                } else {
                    EscalationFailurePolicy::FailOpen
                };
                let policy = EscalationPolicy::new(criteria, threshold)?.with_failure_policy(on_failure);
                let recipients = if args.recipients.is_empty() {
                    defaults.recipients
                } else {
                    args.recipients
                };

                let request = NoticeRequest::new(message, policy).with_recipients(recipients);
                let outcome = notices.run(request, &cancel).await;
                crate::display::print_notice_card(&outcome);
            }
            Command::Dispatch(args) => {
                let message = read_input(&args.input)?;
                let config = DispatchConfig {
                    max_iterations: args.max_iterations,
                    ..Default::default()
                };
                let dispatcher = DispatchWorkflow::new(oracle, actions, notices, config);
                match dispatcher.run(&message, &cancel).await {
                    Ok(outcome) => crate::display::print_dispatch(&outcome),
                    Err(e) => {
                        warn!(actions = e.completed_actions(), "dispatch stopped early");
                        crate::display::print_transcript(e.history());
                        return Err(e).context("dispatch failed");
                    }
                }
            }
        }
        Ok(())
    }
}

impl SharedArgs {
    fn oracle(&self) -> anyhow::Result<LlmOracle<HttpBackend>> {
        if self.api_key.is_empty() {
            warn!("no API key set (NOTICEFLOW_API_KEY); oracle calls will likely be rejected");
        }
        let config = OracleConfig {
            base_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            ..Default::default()
        };
        let backend = HttpBackend::new(config).context("failed to build oracle client")?;
        Ok(LlmOracle::new(backend))
    }

    fn actions(&self) -> SimulatedActions {
        let latency = match self.latency_ms {
            None => Latency::default(),
            Some(0) => Latency::none(),
            Some(max) => Latency::between_ms(max / 2, max),
        };
        let config = SimulationConfig {
            latency,
            failure_rate: self.failure_rate,
        };
        SimulatedActions::new(config, TicketDesk::default())
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_probability(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{raw} is not a probability in [0, 1]"))
    }
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read message from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    };
    if text.trim().is_empty() {
        anyhow::bail!("input message is empty");
    }
    Ok(text)
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping at the next step");
            token.cancel();
        }
    });
    cancel
}
