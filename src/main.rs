use std::path::Path;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use ai_task_agent::config::Config;
use ai_task_agent::github::{GitHubClient, RepoId};
use ai_task_agent::llm::OpenAiGenerator;
use ai_task_agent::mcp::McpClient;
use ai_task_agent::{agent, extract, server};

/// ai-task-agent — automated triage and implementation of GitHub issues,
/// driven through a local MCP proxy.
#[derive(Parser, Debug)]
#[command(name = "ai-task-agent", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP server that proxies GitHub operations
    Serve {
        /// Bind host (overrides configuration)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Process issues labeled 'ai-task': classify, implement, open PRs
    Triage {
        /// Repository in owner/repo form (defaults to configuration)
        repository: Option<String>,
    },

    /// Summarize and analyze the issues carrying a label
    Analyze {
        /// Repository in owner/repo form (defaults to configuration)
        repository: Option<String>,

        /// Label to filter issues by
        #[arg(short, long, default_value = "bug")]
        label: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Command::Serve { host, port } => serve(&config, host, port).await,
        Command::Triage { repository } => triage(&config, repository).await,
        Command::Analyze { repository, label } => analyze(&config, repository, &label).await,
    }
}

async fn serve(
    config: &Config,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let token = config
        .github_token()
        .ok_or("GITHUB_TOKEN is required to run the MCP server")?;
    let github = GitHubClient::new(&token)?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    server::run(github, &host, port).await?;
    Ok(())
}

async fn triage(
    config: &Config,
    repository: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let repo = repo_from(config, repository)?;
    let generator = generator_from(config)?;
    let client = McpClient::new(config.server_url());

    println!("{}", "🤖 AI Task Agent".bold());
    println!("{}", "=".repeat(50));
    println!("Repository: {repo}");
    println!("MCP Server: {}", config.server_url());
    println!("Looking for issues labeled as '{}'...", agent::AI_TASK_LABEL);
    println!();

    let result = agent::handle_ai_tasks(&client, &generator, &repo).await?;

    println!("{}", "AI TASK HANDLING RESULTS".bold());
    println!("{}", "=".repeat(50));
    println!("{result}");
    print_action_summary(&result);

    if result.contains("```") {
        let saved = extract::save_implementations(&result, Path::new(extract::IMPLEMENTATIONS_DIR))?;
        if saved.is_empty() {
            println!("\nNo code files were saved (no valid code blocks found)");
        } else {
            println!(
                "\nSaved {} implementation files to {}:",
                saved.len(),
                extract::IMPLEMENTATIONS_DIR
            );
            for path in saved {
                println!("  {}", path.display());
            }
        }
    }
    Ok(())
}

async fn analyze(
    config: &Config,
    repository: Option<String>,
    label: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let repo = repo_from(config, repository)?;
    let generator = generator_from(config)?;
    let client = McpClient::new(config.server_url());

    println!("Analyzing issues with label '{label}' in {repo}...");
    println!();

    let result = agent::analyze_issues(&client, &generator, &repo, label).await?;

    println!("{}", "ANALYSIS RESULTS".bold());
    println!("{}", "=".repeat(50));
    println!("{result}");
    Ok(())
}

fn repo_from(
    config: &Config,
    repository: Option<String>,
) -> Result<RepoId, Box<dyn std::error::Error>> {
    let raw = repository
        .or_else(|| config.repository())
        .ok_or("repository is required (argument, config file, or GITHUB_REPOSITORY)")?;
    Ok(RepoId::from_str(&raw)?)
}

fn generator_from(config: &Config) -> Result<OpenAiGenerator, Box<dyn std::error::Error>> {
    let api_key = config
        .openai_api_key()
        .ok_or("OPENAI_API_KEY is required for generation")?;
    Ok(OpenAiGenerator::new(api_key, config.llm.model.clone()))
}

/// Per-step tallies so a reviewer can see at a glance whether anything needs
/// manual follow-up.
fn print_action_summary(result: &str) {
    let succeeded = result.lines().filter(|line| line.starts_with('✅')).count();
    let failed = result.lines().filter(|line| line.starts_with('❌')).count();
    if succeeded + failed > 0 {
        println!();
        println!(
            "{} steps succeeded, {}",
            succeeded.to_string().green().bold(),
            if failed > 0 {
                format!("{} failed", failed).red().bold().to_string()
            } else {
                "0 failed".to_string()
            }
        );
    }
}
