mod commands;
mod naming;

use chatmux_core::{GroupColor, Provider};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::Context;

#[derive(Parser)]
#[command(name = "chatmux")]
#[command(about = "Drive several AI chat sites side by side in one browser", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open (or reuse) a provider tab for a session, optionally sending a prompt
    Open {
        /// chatgpt, claude, gemini or grok
        provider: Provider,
        /// Session identifier; never changes once created
        slug: String,
        /// First prompt to send
        #[arg(short, long)]
        prompt: Option<String>,
        /// Enable the provider's research mode before sending
        #[arg(long)]
        research: bool,
        /// Enable the provider's incognito/temporary chat before sending
        #[arg(long)]
        incognito: bool,
    },

    /// Send a follow-up prompt into an open tab
    Send {
        slug: String,
        provider: Provider,
        prompt: String,
    },

    /// Close one provider tab, or the whole session
    Close {
        slug: String,
        #[arg(long)]
        provider: Option<Provider>,
    },

    /// List tracked sessions
    List,

    /// Change a session's display title
    Rename { slug: String, title: String },

    /// Name a session from its transcript
    Retitle { slug: String },

    /// Tile the windows of ungrouped sessions
    Arrange {
        #[arg(long, default_value_t = 4)]
        max: usize,
    },

    /// Manage tab groups
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Group a session's tabs, or ungroup them if already grouped
    Toggle {
        slug: String,
        #[arg(long)]
        color: Option<GroupColor>,
    },
    /// Put one tab into a named group
    Move {
        slug: String,
        provider: Provider,
        name: String,
        #[arg(long)]
        color: Option<GroupColor>,
    },
    /// Take one tab out of its group
    Remove { slug: String, provider: Provider },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let ctx = Context::load()?;

    match cli.command {
        Commands::Open {
            provider,
            slug,
            prompt,
            research,
            incognito,
        } => {
            commands::session::open(&ctx, provider, &slug, prompt, research, incognito).await?;
        }
        Commands::Send {
            slug,
            provider,
            prompt,
        } => {
            commands::session::send(&ctx, &slug, provider, &prompt).await?;
        }
        Commands::Close { slug, provider } => {
            commands::session::close(&ctx, &slug, provider).await?;
        }
        Commands::List => {
            commands::session::list(&ctx).await?;
        }
        Commands::Rename { slug, title } => {
            commands::session::rename(&ctx, &slug, &title).await?;
        }
        Commands::Retitle { slug } => {
            commands::session::retitle(&ctx, &slug).await?;
        }
        Commands::Arrange { max } => {
            commands::layout::arrange(&ctx, max).await?;
        }
        Commands::Group { command } => match command {
            GroupCommands::Toggle { slug, color } => {
                commands::layout::toggle(&ctx, &slug, color).await?;
            }
            GroupCommands::Move {
                slug,
                provider,
                name,
                color,
            } => {
                commands::layout::move_tab(&ctx, &slug, provider, &name, color).await?;
            }
            GroupCommands::Remove { slug, provider } => {
                commands::layout::remove_tab(&ctx, &slug, provider).await?;
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_open() {
        let cli = Cli::parse_from([
            "chatmux", "open", "claude", "s1", "--prompt", "Hello", "--incognito",
        ]);
        match cli.command {
            Commands::Open {
                provider,
                slug,
                prompt,
                research,
                incognito,
            } => {
                assert_eq!(provider, Provider::Claude);
                assert_eq!(slug, "s1");
                assert_eq!(prompt.as_deref(), Some("Hello"));
                assert!(!research);
                assert!(incognito);
            }
            _ => panic!("expected open"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_provider() {
        assert!(Cli::try_parse_from(["chatmux", "send", "s1", "bard", "hi"]).is_err());
    }

    #[test]
    fn test_cli_group_color() {
        let cli = Cli::parse_from(["chatmux", "group", "toggle", "s1", "--color", "gray"]);
        match cli.command {
            Commands::Group {
                command: GroupCommands::Toggle { color, .. },
            } => assert_eq!(color, Some(GroupColor::Grey)),
            _ => panic!("expected group toggle"),
        }
    }
}
