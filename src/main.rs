//! Ikigai Coach - guided self-reflection on the terminal.
//!
//! Runs Why Finder, Ikigai Builder and Decision-Helper sessions against a
//! local or hosted model and keeps the results as saved profiles.

#![allow(clippy::single_match_else)]

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ikigai_coach::core::{Config, IkigaiProfile, SessionError, StoreError, WhyProfile};
use ikigai_coach::session::{
    CancelHandle, Collaborators, DecisionHelperState, IkigaiPhase, IkigaiState, Orchestrator,
    Outcome, SessionMachine, SessionMode, WhyFinderState, WhySource, WhySynthesis, STOPPED_LABEL,
};
use ikigai_coach::store::{JsonFileStore, MemoryStore, ProfileStore};
use ikigai_coach::ChatProvider;

/// Set while a response is streaming so Ctrl-C stops it instead of exiting.
static STREAMING: AtomicBool = AtomicBool::new(false);

/// Guided self-reflection: find your Why, build your Ikigai, decide with it
#[derive(Parser)]
#[command(name = "ikigai")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Keep profiles in memory only (nothing is written to disk)
    #[arg(long, global = true)]
    ephemeral: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a Why Finder interview
    Why,

    /// Start an Ikigai Builder session
    Ikigai {
        /// Seed the session from a saved Why profile
        #[arg(long)]
        from: Option<String>,
    },

    /// Resume the last unfinished session
    Resume,

    /// Talk a decision through with a saved Ikigai profile
    Decide {
        /// Ikigai profile id
        id: String,
    },

    /// Manage saved profiles
    Profiles {
        /// Profiles operation
        #[command(subcommand)]
        operation: ProfilesOperation,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,

        /// Write the current settings to the global config file
        #[arg(long, conflicts_with = "path")]
        init: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ProfilesOperation {
    /// List saved Why and Ikigai profiles
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show a saved profile
    Show {
        /// Profile id
        id: String,
    },

    /// Rename a saved profile
    Rename {
        /// Profile id
        id: String,

        /// New name
        name: String,
    },

    /// Delete a saved profile
    Delete {
        /// Profile id
        id: String,

        /// Don't confirm before deleting
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
        Commands::Config { path, init } => cmd_config(path, init),
        command => {
            let config = Config::load()?;
            let store = open_store(&config, cli.ephemeral)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run(command, config, store))
        }
    }
}

async fn run(command: Commands, config: Config, store: Arc<dyn ProfileStore>) -> Result<()> {
    match command {
        Commands::Why => cmd_why(&config, store).await,
        Commands::Ikigai { from } => cmd_ikigai(&config, store, from.as_deref()).await,
        Commands::Resume => cmd_resume(&config, store).await,
        Commands::Decide { id } => cmd_decide(&config, store, &id).await,
        Commands::Profiles { operation } => cmd_profiles(store.as_ref(), operation).await,
        Commands::Config { .. } | Commands::Completions { .. } => Ok(()),
    }
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "ikigai", &mut io::stdout());
}

/// Show configuration.
fn cmd_config(show_path: bool, init: bool) -> Result<()> {
    if show_path {
        if let Some(path) = Config::config_dir() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = Config::load()?;
    if init {
        let path = config.save()?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let toml = toml::to_string_pretty(&config)?;
    println!("{toml}");

    Ok(())
}

fn open_store(config: &Config, ephemeral: bool) -> Result<Arc<dyn ProfileStore>> {
    if ephemeral {
        return Ok(Arc::new(MemoryStore::new()));
    }
    let dir = config.storage_dir().ok_or(StoreError::NoDataDir)?;
    tracing::debug!(dir = %dir.display(), "Using profile store");
    Ok(Arc::new(JsonFileStore::with_path(dir)))
}

#[cfg(feature = "ai")]
async fn connect(config: &Config) -> Result<Arc<dyn ChatProvider>> {
    let ai = ikigai_coach::AIManager::from_config(&config.ai).await;

    if !ai.is_available() {
        anyhow::bail!(
            "No AI provider available.\n\
             Set ANTHROPIC_API_KEY for Claude, or run Ollama locally."
        );
    }

    tracing::info!(provider = ai.name(), model = ai.model(), "Using AI provider");
    Ok(Arc::new(ai))
}

#[cfg(not(feature = "ai"))]
async fn connect(_config: &Config) -> Result<Arc<dyn ChatProvider>> {
    anyhow::bail!("Built without the `ai` feature; no model provider is available.")
}

fn install_cancel_handler(handle: CancelHandle) -> Result<()> {
    ctrlc::set_handler(move || {
        if STREAMING.load(Ordering::SeqCst) {
            handle.cancel();
        } else {
            std::process::exit(130);
        }
    })?;
    Ok(())
}

/// Start a Why Finder interview.
async fn cmd_why(config: &Config, store: Arc<dyn ProfileStore>) -> Result<()> {
    let chat = connect(config).await?;
    let state = WhyFinderState::with_settings(config.session.why_total_exchanges, config.session.answer_gate());
    let mut orchestrator = Orchestrator::new(state, Collaborators::with_analyst(chat, store));
    install_cancel_handler(orchestrator.cancel_handle())?;

    let opening = {
        let _streaming = Streaming::begin();
        orchestrator.start(print_fragment).await?
    };
    finish_why(&mut orchestrator, opening).await
}

/// Start an Ikigai Builder session.
async fn cmd_ikigai(config: &Config, store: Arc<dyn ProfileStore>, from: Option<&str>) -> Result<()> {
    let source = match from {
        Some(id) => Some(WhySource::from(&store.load_why(id).await?)),
        None => None,
    };
    if let Some(source) = &source {
        println!("Building on your Why: {}", source.why_statement);
    }

    let chat = connect(config).await?;
    let state = IkigaiState::new(source, config.session.ikigai_settings());
    let mut orchestrator = Orchestrator::new(state, Collaborators::with_analyst(chat, store));
    install_cancel_handler(orchestrator.cancel_handle())?;

    let opening = {
        let _streaming = Streaming::begin();
        orchestrator.start(print_fragment).await?
    };
    finish_ikigai(&mut orchestrator, opening).await
}

/// Resume the last unfinished session.
async fn cmd_resume(config: &Config, store: Arc<dyn ProfileStore>) -> Result<()> {
    let Some(snapshot) = store.load_temp_state().await? else {
        println!("No unfinished session to resume.");
        return Ok(());
    };

    println!(
        "Resuming {} session from {}",
        snapshot.mode,
        snapshot.last_updated.format("%Y-%m-%d %H:%M")
    );

    match snapshot.mode {
        SessionMode::WhyFinder => {
            let state = WhyFinderState::restore(
                &snapshot,
                config.session.why_total_exchanges,
                config.session.answer_gate(),
            )?;
            let chat = connect(config).await?;
            let mut orchestrator = Orchestrator::new(state, Collaborators::with_analyst(chat, store));
            install_cancel_handler(orchestrator.cancel_handle())?;
            replay(orchestrator.state());

            let opening = orchestrator.resume(print_fragment).await?;
            finish_why(&mut orchestrator, opening).await
        }
        SessionMode::IkigaiBuilder => {
            let source = match &snapshot.source_why_profile_id {
                Some(id) => match store.load_why(id).await {
                    Ok(profile) => Some(WhySource::from(&profile)),
                    Err(e) => {
                        tracing::warn!(id = %id, error = %e, "Source Why profile unavailable");
                        None
                    }
                },
                None => None,
            };
            let state = IkigaiState::restore(&snapshot, source, config.session.ikigai_settings())?;
            let chat = connect(config).await?;
            let mut orchestrator = Orchestrator::new(state, Collaborators::with_analyst(chat, store));
            install_cancel_handler(orchestrator.cancel_handle())?;
            replay(orchestrator.state());

            if orchestrator.state().phase() != IkigaiPhase::Complete {
                println!("\nContinuing {}.", orchestrator.state().phase().label());
            }
            let opening = orchestrator.resume(print_fragment).await?;
            finish_ikigai(&mut orchestrator, opening).await
        }
        SessionMode::DecisionHelper => {
            println!("Decision-Helper sessions cannot be resumed.");
            Ok(())
        }
    }
}

/// Talk a decision through with a saved Ikigai profile.
async fn cmd_decide(config: &Config, store: Arc<dyn ProfileStore>, id: &str) -> Result<()> {
    let profile = store.load_ikigai(id).await?;
    let state = DecisionHelperState::new(profile)?;

    let chat = connect(config).await?;
    let mut orchestrator = Orchestrator::new(state, Collaborators::with_analyst(chat, store));
    install_cancel_handler(orchestrator.cancel_handle())?;

    let opening = {
        let _streaming = Streaming::begin();
        orchestrator.start(print_fragment).await?
    };
    converse(&mut orchestrator, opening).await?;
    Ok(())
}

/// How an interactive session ended.
enum Finish {
    Quit,
    Why(WhySynthesis),
    Ikigai,
}

/// Marks a response as streaming for the Ctrl-C handler.
struct Streaming;

impl Streaming {
    fn begin() -> Self {
        STREAMING.store(true, Ordering::SeqCst);
        Self
    }
}

impl Drop for Streaming {
    fn drop(&mut self) {
        STREAMING.store(false, Ordering::SeqCst);
    }
}

fn print_fragment(fragment: &str) {
    print!("{fragment}");
    let _ = io::stdout().flush();
}

/// Print outcomes; returns the finish signal if the session ended.
fn render(outcomes: Vec<Outcome>) -> Option<Finish> {
    let mut finish = None;
    for outcome in outcomes {
        match outcome {
            Outcome::Message(text) => println!("\n{text}\n"),
            Outcome::Response(text) => println!("\n\n{text}\n"),
            Outcome::Stopped(_) => println!(" {STOPPED_LABEL}\n"),
            Outcome::PhaseCompleted { phase, auto_filled } => {
                if auto_filled {
                    println!("✓ {} filled in from your Why profile", phase.label());
                } else {
                    println!("✓ {} complete", phase.label());
                }
            }
            Outcome::SaveSuggested(synthesis) => finish = Some(Finish::Why(synthesis)),
            Outcome::IkigaiReady => finish = Some(Finish::Ikigai),
            Outcome::Warning(warning) => eprintln!("warning: {warning}"),
        }
    }
    finish
}

/// Print the conversation so far after a resume.
fn replay<M: SessionMachine>(state: &M) {
    for exchange in state.transcript().exchanges() {
        if !exchange.user_text.is_empty() {
            println!("> {}", exchange.user_text);
        }
        println!("{}\n", exchange.display_text());
    }
}

/// Read-eval loop until the session finishes, the user quits or stdin closes.
async fn converse<M: SessionMachine>(orchestrator: &mut Orchestrator<M>, opening: Vec<Outcome>) -> Result<Finish> {
    if let Some(finish) = render(opening) {
        return Ok(finish);
    }

    loop {
        let Some(line) = prompt_line("> ")? else {
            return Ok(Finish::Quit);
        };
        if line.eq_ignore_ascii_case("/quit") {
            println!("Progress is saved. Run `ikigai resume` to continue.");
            return Ok(Finish::Quit);
        }

        let result = {
            let _streaming = Streaming::begin();
            orchestrator.submit(&line, print_fragment).await
        };
        match result {
            Ok(outcomes) => {
                if let Some(finish) = render(outcomes) {
                    return Ok(finish);
                }
            }
            Err(SessionError::EmptyInput) => {}
            Err(SessionError::CollaboratorUnavailable(e)) => {
                eprintln!("\nCould not reach the model: {e}\nYour message was not recorded; try again.");
            }
            Err(SessionError::SessionComplete) => return Ok(Finish::Quit),
            Err(e) => return Err(e.into()),
        }
    }
}

async fn finish_why(orchestrator: &mut Orchestrator<WhyFinderState>, opening: Vec<Outcome>) -> Result<()> {
    let Finish::Why(synthesis) = converse(orchestrator, opening).await? else {
        return Ok(());
    };

    print_synthesis(&synthesis);
    if !confirm("Save this Why profile?")? {
        return Ok(());
    }

    let name = prompt_name("My Why")?;
    let collaborators = orchestrator.collaborators();
    let profile = WhyProfile::new(
        name,
        &synthesis,
        collaborators.chat.model(),
        orchestrator.state().exchange_count(),
    );

    loop {
        match collaborators.store.save_why(&profile).await {
            Ok(()) => break,
            Err(e) => {
                eprintln!("Could not save profile: {e}");
                if !confirm("Retry?")? {
                    return Ok(());
                }
            }
        }
    }

    clear_progress(collaborators.store.as_ref()).await;
    println!("Saved Why profile {}", profile.id);
    println!("Build your Ikigai from it with: ikigai ikigai --from {}", profile.id);
    Ok(())
}

async fn finish_ikigai(orchestrator: &mut Orchestrator<IkigaiState>, opening: Vec<Outcome>) -> Result<()> {
    if !matches!(converse(orchestrator, opening).await?, Finish::Ikigai) {
        return Ok(());
    }

    let name = prompt_name("My Ikigai")?;
    let profile = orchestrator.state().to_profile(name)?;
    print_ikigai(&profile);
    if !confirm("Save this Ikigai profile?")? {
        return Ok(());
    }

    let store = Arc::clone(&orchestrator.collaborators().store);
    loop {
        match store.save_ikigai(&profile).await {
            Ok(()) => break,
            Err(e) => {
                eprintln!("Could not save profile: {e}");
                if !confirm("Retry?")? {
                    return Ok(());
                }
            }
        }
    }

    clear_progress(store.as_ref()).await;
    println!("Saved Ikigai profile {}", profile.id);
    println!("Talk a decision through with: ikigai decide {}", profile.id);
    Ok(())
}

async fn clear_progress(store: &dyn ProfileStore) {
    if let Err(e) = store.clear_temp_state().await {
        tracing::warn!(error = %e, "Could not clear session progress");
    }
}

/// Manage saved profiles.
async fn cmd_profiles(store: &dyn ProfileStore, operation: ProfilesOperation) -> Result<()> {
    match operation {
        ProfilesOperation::List { format } => {
            let why = store.list_why().await?;
            let ikigai = store.list_ikigai().await?;

            if format == "json" {
                let json = serde_json::json!({ "why": why, "ikigai": ikigai });
                println!("{}", serde_json::to_string_pretty(&json)?);
                return Ok(());
            }

            if why.is_empty() && ikigai.is_empty() {
                println!("No saved profiles.");
                return Ok(());
            }

            if !why.is_empty() {
                println!("Why profiles:");
                for p in &why {
                    println!(
                        "  {}  {}  ({})  loves: {}, good at: {}",
                        p.id,
                        p.name,
                        p.created_at.format("%Y-%m-%d"),
                        p.love_count,
                        p.good_at_count
                    );
                }
            }
            if !ikigai.is_empty() {
                println!("Ikigai profiles:");
                for p in &ikigai {
                    let status = if p.is_complete { "complete" } else { "incomplete" };
                    println!("  {}  {}  ({})  {status}", p.id, p.name, p.created_at.format("%Y-%m-%d"));
                }
            }
        }

        ProfilesOperation::Show { id } => match store.load_why(&id).await {
            Ok(profile) => print_why_profile(&profile),
            Err(StoreError::NotFound(_)) => print_ikigai(&store.load_ikigai(&id).await?),
            Err(e) => return Err(e.into()),
        },

        ProfilesOperation::Rename { id, name } => {
            if name.trim().is_empty() {
                anyhow::bail!("Profile name cannot be empty");
            }
            let renamed = match store.rename_why(&id, &name).await {
                Ok(profile) => profile.name,
                Err(StoreError::NotFound(_)) => store.rename_ikigai(&id, &name).await?.name,
                Err(e) => return Err(e.into()),
            };
            println!("Renamed {id} to \"{renamed}\"");
        }

        ProfilesOperation::Delete { id, yes } => {
            if !yes && !confirm(&format!("Delete profile {id}?"))? {
                return Ok(());
            }
            match store.delete_why(&id).await {
                Ok(()) => {}
                Err(StoreError::NotFound(_)) => store.delete_ikigai(&id).await?,
                Err(e) => return Err(e.into()),
            }
            println!("Deleted {id}");
        }
    }

    Ok(())
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{title}");
    for item in items {
        println!("  - {item}");
    }
}

fn print_synthesis(synthesis: &WhySynthesis) {
    println!();
    if synthesis.missing_conclusion {
        println!("The interview ended without a clear Why statement.");
    } else {
        println!("Your Why: {}", synthesis.why_statement);
    }
    print_list("What you love:", &synthesis.what_you_love);
    print_list("What you're good at:", &synthesis.what_you_are_good_at);
    println!();
}

fn print_why_profile(profile: &WhyProfile) {
    println!("{} ({})", profile.name, profile.id);
    println!("Created: {}  Model: {}", profile.created_at.format("%Y-%m-%d %H:%M"), profile.model_used);
    println!("\nYour Why: {}", profile.why_statement);
    if !profile.why_explanation.is_empty() {
        println!("\n{}", profile.why_explanation);
    }
    println!();
    print_list("What you love:", &profile.what_you_love);
    print_list("What you're good at:", &profile.what_you_are_good_at);
}

fn print_ikigai(profile: &IkigaiProfile) {
    println!("{} ({})", profile.name, profile.id);
    if !profile.why_statement.is_empty() {
        println!("Why: {}", profile.why_statement);
    }
    println!();
    print_list("What you love:", &profile.love.bullets);
    print_list("What you're good at:", &profile.good_at.bullets);
    print_list("What the world needs:", &profile.world_needs.bullets);
    print_list("What you can be paid for:", &profile.paid_for.bullets);

    let overlaps = &profile.overlaps;
    for (title, bucket) in [
        ("Passion", &overlaps.passion),
        ("Mission", &overlaps.mission),
        ("Profession", &overlaps.profession),
        ("Vocation", &overlaps.vocation),
    ] {
        println!("\n{title}: {}", bucket.summary);
        for bullet in &bucket.bullets {
            println!("  - {bullet}");
        }
    }
    println!();
}

/// Read one trimmed line; `None` on end of input.
fn prompt_line(label: &str) -> Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;

    let mut input = String::new();
    if io::stdin().lock().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

fn prompt_name(default: &str) -> Result<String> {
    let name = prompt_line(&format!("Name [{default}]: "))?.unwrap_or_default();
    Ok(if name.is_empty() { default.to_string() } else { name })
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt_line(&format!("{question} [Y/n] "))?.unwrap_or_else(|| "n".to_string());
    Ok(answer.is_empty() || answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}
