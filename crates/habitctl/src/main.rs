//! habitctl - CLI for the HabitLedger behavioural coach

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use habitctl::service::APOLOGY;
use habitctl::{build_service, load_knowledge_base, CoachService, Config};
use habit_shared::streaks::habit_title;
use habit_shared::templates::daily_check_in;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Words that end an interactive chat
const EXIT_WORDS: &[&str] = &["quit", "exit", "bye"];

#[derive(Parser)]
#[command(name = "habitctl")]
#[command(about = "HabitLedger - behavioural coaching for money habits", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: $HABITLEDGER_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// User whose memory to use
    #[arg(long, short, global = true, default_value = "default")]
    user: String,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to the coach (one message, or interactive when none given)
    Chat {
        /// Message to send
        message: Vec<String>,
    },

    /// Show the session summary
    Summary,

    /// Report whether an intervention worked
    Feedback {
        /// Principle id (see `habitctl principles`)
        principle: String,

        /// The intervention did not work
        #[arg(long)]
        failed: bool,
    },

    /// Check in on a habit streak
    Streak {
        /// Habit name, e.g. no_food_delivery
        habit: String,

        /// The habit was missed
        #[arg(long)]
        missed: bool,
    },

    /// Manage goals
    Goal {
        #[command(subcommand)]
        action: GoalAction,
    },

    /// Daily check-in prompt
    Checkin {
        /// Note a struggle from today
        #[arg(long)]
        struggle: Option<String>,
    },

    /// Weekly review prompt
    Review,

    /// List principles, or explain one
    Principles {
        /// Principle id to explain
        id: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Subcommand)]
enum GoalAction {
    /// Add a goal
    Add {
        description: String,

        #[arg(long)]
        target: Option<String>,
    },
    /// Mark goal N (from `goal list`) as done
    Done { number: usize },
    /// List goals
    List,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "habitctl=debug,habit_shared=debug"
    } else {
        "habitctl=info,habit_shared=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    let user = cli.user.as_str();

    match cli.command {
        Commands::Chat { message } => {
            let service = build_service(&config)?;
            if message.is_empty() {
                chat_loop(&service, user)
            } else {
                println!("{}", turn(&service, user, &message.join(" ")));
                Ok(())
            }
        }
        Commands::Summary => {
            println!("{}", build_service(&config)?.summary(user)?);
            Ok(())
        }
        Commands::Feedback { principle, failed } => {
            let feedback = build_service(&config)?.record_feedback(user, &principle, !failed)?;
            println!(
                "Noted. {}: {} of {} worked ({:.0}%).",
                habit_title(&principle),
                feedback.successes,
                feedback.total(),
                feedback.success_rate() * 100.0
            );
            Ok(())
        }
        Commands::Streak { habit, missed } => {
            let streak = build_service(&config)?.record_streak(user, &habit, !missed)?;
            if missed {
                println!(
                    "{} streak reset. Your best is still {}. Start again today!",
                    habit_title(&habit),
                    streak.best
                );
            } else {
                println!(
                    "{}: {} in a row (best {}). Keep it up!",
                    habit_title(&habit),
                    streak.current,
                    streak.best
                );
            }
            Ok(())
        }
        Commands::Goal { action } => goal(&build_service(&config)?, user, action),
        Commands::Checkin { struggle } => {
            if let Some(struggle) = struggle {
                build_service(&config)?.record_struggle(user, &struggle)?;
                println!("Noted: {}\n", struggle.trim());
            }
            println!("{}", daily_check_in());
            Ok(())
        }
        Commands::Review => {
            println!("{}", build_service(&config)?.weekly_review(user)?);
            Ok(())
        }
        Commands::Principles { id } => {
            let kb = load_knowledge_base(&config)?;
            match id {
                Some(id) => println!("{}", kb.explain(&id)),
                None => {
                    for p in kb.principles() {
                        println!("{:<22} {}", p.id, p.name);
                    }
                }
            }
            Ok(())
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config.redacted()).context("Failed to render config")?);
            Ok(())
        }
    }
}

/// One chat turn; users see an apology instead of internal errors
fn turn(service: &CoachService, user: &str, message: &str) -> String {
    match service.process_turn(user, message) {
        Ok(reply) => reply,
        Err(e) if e.is_user_error() => format!("{}", e),
        Err(e) => {
            error!("Turn failed: {}", e);
            APOLOGY.to_string()
        }
    }
}

fn chat_loop(service: &CoachService, user: &str) -> Result<()> {
    println!("HabitLedger coach. Type 'quit' to leave.\n");
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("You: ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&message.to_lowercase().as_str()) {
            break;
        }
        println!("\nCoach: {}\n", turn(service, user, message));
    }

    println!("Take care! Run `habitctl summary` any time to see your progress.");
    Ok(())
}

fn goal(service: &CoachService, user: &str, action: GoalAction) -> Result<()> {
    match action {
        GoalAction::Add { description, target } => {
            let index = service.add_goal(user, &description, target.as_deref())?;
            println!("Goal #{} added: {}", index + 1, description.trim());
        }
        GoalAction::Done { number } => {
            let index = number
                .checked_sub(1)
                .context("Goal numbers start at 1")?;
            service.complete_goal(user, index)?;
            println!("Goal #{} completed. Great work!", number);
        }
        GoalAction::List => {
            let memory = service.load(user)?;
            if memory.goals.is_empty() {
                println!("No goals yet. Add one with `habitctl goal add \"...\"`.");
            }
            for (i, g) in memory.goals.iter().enumerate() {
                let mark = if g.completed { "✓" } else { " " };
                let target = g.target.as_deref().map(|t| format!(" ({})", t)).unwrap_or_default();
                println!("[{}] {}. {}{}", mark, i + 1, g.description, target);
            }
        }
    }
    Ok(())
}
