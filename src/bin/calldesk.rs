//! Calldesk CLI
//!
//! Command-line access to the lead API, phone matching, and a dry run of the
//! call session lifecycle. Every command prints one JSON document on stdout.

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use calldesk_lib::{
    // Screen plumbing
    AppState, CallSession, CallSessionTracker, Clock, DialTarget, Dialer, LifecycleObserver, ManualClock,
    PlatformError, ScreenConfig,
    // Leads
    FetchLeadsRequest, HttpLeadsApi, LeadRecord, LeadSource, StaticTokenProvider,
    // Phone
    digits_only, normalize_digits, numbers_match, tel_target,
    logging::init_tracing,
};

#[derive(Parser)]
#[command(name = "calldesk")]
#[command(about = "Calldesk CLI - Leads, phone matching and call session dry runs", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lead API commands
    Leads {
        #[command(subcommand)]
        action: LeadsAction,
    },
    /// Phone number helpers
    Phone {
        #[command(subcommand)]
        action: PhoneAction,
    },
    /// Dial a number, background the app for N seconds, then return
    Simulate {
        /// Number to dial
        #[arg(short, long)]
        number: String,
        /// Seconds spent in the background
        #[arg(short, long, default_value = "42")]
        seconds: i64,
    },
}

#[derive(Subcommand)]
enum LeadsAction {
    /// Fetch one page of leads
    Fetch {
        /// Page number (defaults to the configured page)
        #[arg(long)]
        page: Option<u32>,
        /// Page size (defaults to the configured limit)
        #[arg(long)]
        limit: Option<u32>,
        /// Only leads with no assignee
        #[arg(long)]
        unassigned: bool,
        /// Bearer token
        #[arg(long, env = "CALLDESK_TOKEN")]
        token: Option<String>,
    },
}

#[derive(Subcommand)]
enum PhoneAction {
    /// Show the digits used for matching and dialing
    Normalize {
        number: String,
    },
    /// Check whether two numbers refer to the same line
    Match {
        a: String,
        b: String,
    },
}

// ============ Output Types ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LeadsOutput {
    count: usize,
    leads: Vec<LeadRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NormalizeOutput {
    input: String,
    digits: String,
    normalized: String,
    tel: String,
}

#[derive(Serialize)]
struct MatchOutput {
    a: String,
    b: String,
    matches: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateOutput {
    closed: Option<CallSession>,
    history: Vec<CallSession>,
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

/// Dialer that records nothing and always succeeds
struct DryRunDialer;

#[async_trait]
impl Dialer for DryRunDialer {
    async fn open(&self, target: &str) -> Result<(), PlatformError> {
        tracing::info!(tel = %target, "Dry run, not opening dialer");
        Ok(())
    }
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Leads { action } => handle_leads(action).await,
        Commands::Phone { action } => handle_phone(action),
        Commands::Simulate { number, seconds } => handle_simulate(number, seconds).await,
    };

    match result {
        Ok(json) => println!("{}", json),
        Err(e) => {
            let error = ErrorOutput { error: e.to_string() };
            match serde_json::to_string(&error) {
                Ok(json) => println!("{}", json),
                Err(_) => println!("{{\"error\":\"unknown\"}}"),
            }
            std::process::exit(1);
        }
    }
}

fn load_config() -> ScreenConfig {
    ScreenConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load preferences, using defaults");
        ScreenConfig::default()
    })
}

// ============ Command Handlers ============

async fn handle_leads(action: LeadsAction) -> anyhow::Result<String> {
    match action {
        LeadsAction::Fetch { page, limit, unassigned, token } => {
            let config = load_config();
            let defaults = config.lead_request();
            let request = FetchLeadsRequest {
                page: page.unwrap_or(defaults.page),
                limit: limit.unwrap_or(defaults.limit),
                unassigned_only: unassigned || defaults.unassigned_only,
            };

            let api = HttpLeadsApi::new(&config.api_base_url, config.request_timeout());
            let source = LeadSource::new(Arc::new(api), Arc::new(StaticTokenProvider(token)));
            let leads = source.fetch(&request).await?;

            let output = LeadsOutput {
                count: leads.len(),
                leads: leads.as_ref().clone(),
            };
            Ok(serde_json::to_string(&output)?)
        }
    }
}

fn handle_phone(action: PhoneAction) -> anyhow::Result<String> {
    match action {
        PhoneAction::Normalize { number } => {
            let output = NormalizeOutput {
                digits: digits_only(&number),
                normalized: normalize_digits(&number),
                tel: tel_target(&number),
                input: number,
            };
            Ok(serde_json::to_string(&output)?)
        }
        PhoneAction::Match { a, b } => {
            let matches = numbers_match(&a, &b);
            Ok(serde_json::to_string(&MatchOutput { a, b, matches })?)
        }
    }
}

/// When the app comes back after `seconds` in the background.
fn return_time(start: DateTime<Utc>, seconds: i64) -> anyhow::Result<DateTime<Utc>> {
    if seconds < 0 {
        anyhow::bail!("seconds must not be negative");
    }
    let away = chrono::Duration::try_seconds(seconds)
        .ok_or_else(|| anyhow!("seconds out of range: {}", seconds))?;
    start
        .checked_add_signed(away)
        .ok_or_else(|| anyhow!("seconds out of range: {}", seconds))
}

async fn handle_simulate(number: String, seconds: i64) -> anyhow::Result<String> {
    let config = load_config();
    let clock = Arc::new(ManualClock::default());
    let returned_at = return_time(clock.now(), seconds)?;
    let tracker = Arc::new(CallSessionTracker::with_policy(
        clock.clone(),
        Arc::new(DryRunDialer),
        config.history_capacity,
        config.open_session_policy,
    ));

    let lifecycle = LifecycleObserver::new(AppState::Active);
    let closed = Arc::new(parking_lot::Mutex::new(None));
    let _subscription = {
        let tracker = Arc::clone(&tracker);
        let closed = Arc::clone(&closed);
        lifecycle.subscribe(move |previous, next| {
            if let Some(session) = tracker.on_transition(previous, next) {
                *closed.lock() = Some(session);
            }
        })
    };

    tracker.dial(DialTarget::ad_hoc(number)).await?;
    lifecycle.report(AppState::Background);
    clock.set(returned_at);
    lifecycle.report(AppState::Active);

    let closed = closed.lock().take();
    let output = SimulateOutput {
        closed,
        history: tracker.history(),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}
