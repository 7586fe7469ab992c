//! Kaien command implementations

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kaien_agent::tools::default_registry;
use kaien_agent::{AgentLoop, LocalMemory, Session, TurnEnd, TurnOutcome};
use kaien_config::{self, Config};
use kaien_provider::OpenAiProvider;

/// Config from disk with environment overrides applied
async fn load_config() -> Result<Config> {
    let mut config = Config::load()
        .await
        .with_context(|| format!("cannot load {}", kaien_config::config_path().display()))?;
    config.apply_env().context("invalid environment override")?;
    Ok(config)
}

/// Initialize config and workspace
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing Kaien...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = kaien_config::init().await?;
    let workspace = config.workspace_path();

    create_template(&workspace, "PERSONA.md", PERSONA_MD).await?;
    create_template(&workspace, "DIRECTIVE.md", DIRECTIVE_MD).await?;

    println!("\n◆ Kaien initialized");
    println!("Config:    {}", kaien_config::config_path().display());
    println!("Workspace: {}", workspace.display());
    println!("\nNext steps:");
    println!("  1. Point llm.api_base at an OpenAI-compatible endpoint (default: local Ollama)");
    println!("  2. Start chatting: kaien engage -m \"Hello!\"");

    Ok(())
}

async fn create_template(dir: &std::path::Path, filename: &str, content: &str) -> Result<()> {
    let path = dir.join(filename);
    if !path.exists() {
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;
        info!("◆ Created {}", path.display());
    }
    Ok(())
}

/// Chat with the agent
pub async fn engage_command(message: Option<String>, session: String) -> Result<()> {
    let config = load_config().await?;

    let provider = OpenAiProvider::with_timeout(
        config.llm.api_key.clone(),
        Some(config.llm.api_base.clone()),
        Some(config.default_model()),
        Duration::from_secs(config.llm.request_timeout_secs),
    );
    let memory = Arc::new(LocalMemory::new());
    let agent = AgentLoop::from_config(provider, &config, memory);
    let mut session = Session::with_max_messages(session, config.session_max_messages());

    info!(
        "◆ ENGAGING {} WITH {} TOOLS, BUDGET {} STEPS",
        agent.model(),
        agent.tools().names().len(),
        agent.max_steps()
    );

    let interrupts = Interrupts::default();
    let watcher = interrupts.watch();

    if let Some(msg) = message {
        let outcome = run_turn(&agent, &mut session, &msg, &interrupts).await;
        watcher.abort();
        let outcome = outcome?;
        println!("\n◆ {}", outcome.reply);
        return Ok(());
    }

    println!("◆ Interactive mode (type 'exit' to quit, Ctrl+C cancels a turn or quits at the prompt)");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    loop {
        print!("◆ ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        match run_turn(&agent, &mut session, input, &interrupts).await {
            Ok(outcome) => println!("\n◆ {}\n", outcome.reply),
            Err(e) => println!("\n◆ {}\n", e),
        }
    }

    watcher.abort();
    Ok(())
}

/// Routes Ctrl+C to whichever turn is running.
///
/// Installing the signal handler replaces the default SIGINT action for the
/// rest of the process, so one watcher lives for the whole session. With no
/// turn running an interrupt quits.
#[derive(Clone, Default)]
struct Interrupts {
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupts {
    fn slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Token for a new turn; interrupts cancel it until `end_turn`
    fn begin_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.slot() = Some(token.clone());
        token
    }

    fn end_turn(&self) {
        self.slot().take();
    }

    /// Cancel the running turn. Returns false when none is running.
    fn interrupt(&self) -> bool {
        match self.slot().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn watch(&self) -> tokio::task::JoinHandle<()> {
        let interrupts = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if interrupts.interrupt() {
                    warn!("◆ INTERRUPTED, CANCELLING TURN");
                } else {
                    println!("\n◆ Goodbye");
                    std::process::exit(130);
                }
            }
        })
    }
}

/// Run one turn, cancelling it on Ctrl+C
async fn run_turn(
    agent: &AgentLoop<OpenAiProvider>,
    session: &mut Session,
    input: &str,
    interrupts: &Interrupts,
) -> Result<TurnOutcome> {
    let cancel = interrupts.begin_turn();
    let result = agent.process(session, input, &cancel).await;
    interrupts.end_turn();

    let outcome = result?;
    if outcome.end == TurnEnd::BudgetExhausted {
        warn!("◆ TURN ENDED AFTER {} STEPS WITHOUT A FINAL ANSWER", outcome.steps);
    }
    Ok(outcome)
}

/// List enabled tools
pub async fn tools_command(json: bool) -> Result<()> {
    let config = load_config().await?;
    let registry = default_registry(&config, Arc::new(LocalMemory::new()));

    if json {
        let definitions = registry.definitions();
        println!("{}", serde_json::to_string_pretty(&definitions)?);
        return Ok(());
    }

    println!("◆ Enabled Tools");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for descriptor in registry.list() {
        println!("{}", descriptor.name);
        println!("  {}", descriptor.description);
        for arg in &descriptor.args {
            println!(
                "    {} ({}{}) {}",
                arg.name,
                arg.arg_type.as_str(),
                if arg.required { "" } else { ", optional" },
                arg.description
            );
        }
    }

    Ok(())
}

/// Show status
pub async fn status_command() -> Result<()> {
    let config_path = kaien_config::config_path();
    let config = load_config().await?;
    let workspace = config.workspace_path();

    println!("◆ Kaien System Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("Config:     {} {}", config_path.display(), present(config_path.exists()));
    println!("Workspace:  {} {}", workspace.display(), present(workspace.exists()));
    println!("Model:      {}", config.default_model());
    println!("API base:   {}", config.llm.api_base);
    println!(
        "API key:    {}",
        if config.has_api_key() { "[Set]" } else { "[Not set]" }
    );
    println!(
        "Shell:      {}",
        if config.sandbox.allow_shell { "enabled" } else { "disabled" }
    );
    println!("Max steps:  {}", config.max_steps());

    Ok(())
}

fn present(exists: bool) -> &'static str {
    if exists {
        "[OK]"
    } else {
        "[Missing]"
    }
}

const PERSONA_MD: &str = r#"# Persona

You are Kaien, a careful reconnaissance assistant.

- Prefer read-only commands
- Report findings tersely
- Say when a command was denied instead of retrying it
"#;

const DIRECTIVE_MD: &str = r#"# Directive

Only investigate hosts and domains the operator has authorized.
Store notable findings with remember_info.
"#;
