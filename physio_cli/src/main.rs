use chrono::Utc;
use clap::{Parser, Subcommand};
use physio_core::messages::{conversation_id, physiotherapist_id};
use physio_core::remote::{pull_profiles, push_profile};
use physio_core::stats::{recent_completed, sessions_by_category, weekly_progress};
use physio_core::*;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "physio")]
#[command(about = "Guided physiotherapy exercise sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Act as this user instead of the configured one
    #[arg(long, global = true)]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available exercises
    Exercises {
        /// Only show one body region (shoulder, knee, back, ...)
        #[arg(long)]
        category: Option<String>,
    },

    /// Run a guided session for an exercise
    Start {
        exercise_id: String,

        /// Comma-separated steps instead of interactive input,
        /// e.g. "s,r10,c,s,r8,c,f"
        #[arg(long)]
        script: Option<String>,

        /// Pain level after the session (1-10)
        #[arg(long)]
        pain: Option<u8>,

        /// Perceived difficulty (1 too easy - 5 too hard)
        #[arg(long)]
        difficulty: Option<u8>,

        #[arg(long)]
        mood: Option<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Show recent completed sessions
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show totals, streak and weekly progress
    Stats,

    /// Show achievements and their progress
    Achievements,

    /// Show today's tasks
    Tasks {
        /// Claim the points of a finished task
        #[arg(long)]
        complete: Option<Uuid>,
    },

    /// Rank users by points
    Leaderboard,

    /// Export completed sessions to CSV
    Export {
        #[arg(long)]
        out: PathBuf,
    },

    /// Rewrite the session log keeping only the latest version of each session
    Compact,

    /// Show or update clinical details
    Profile {
        /// Treating doctor or physiotherapist
        #[arg(long)]
        doctor: Option<String>,

        /// Record a past surgery with these details
        #[arg(long, conflicts_with = "no_surgery")]
        surgery: Option<String>,

        /// Clear the surgery record
        #[arg(long)]
        no_surgery: bool,
    },

    /// Exchange messages with your physiotherapist
    Messages {
        #[command(subcommand)]
        action: MessageAction,
    },
}

#[derive(Subcommand)]
enum MessageAction {
    /// Send a message, to your physiotherapist unless --to is given
    Send {
        content: String,

        #[arg(long)]
        to: Option<String>,

        /// text, image, video, exercise_report or audio
        #[arg(long = "type", default_value = "text")]
        kind: String,

        #[arg(long)]
        attachment: Option<String>,
    },

    /// List conversations, or the messages exchanged with one user
    List {
        #[arg(long)]
        with: Option<String>,
    },

    /// Mark a conversation as read, your physiotherapist's unless --with is given
    Read {
        #[arg(long)]
        with: Option<String>,
    },

    /// Delete a message
    Delete { id: Uuid },

    /// Fetch messages from the remote store
    Sync,
}

/// Resolved settings shared by every command
struct Context {
    config: Config,
    data_dir: PathBuf,
    user_id: String,
    catalog: Catalog,
}

impl Context {
    fn sessions_path(&self) -> PathBuf {
        self.data_dir.join("sessions.jsonl")
    }

    fn profiles_path(&self) -> PathBuf {
        self.data_dir.join("profiles.json")
    }

    fn messages_path(&self) -> PathBuf {
        self.data_dir.join("messages.jsonl")
    }

    fn messenger(&self) -> Messenger {
        let messenger = Messenger::new(JsonlMessageStore::new(self.messages_path()));
        match self.remote() {
            Some(remote) => messenger.with_remote(remote),
            None => messenger,
        }
    }

    /// The other side of a conversation, the assigned physiotherapist by default
    fn counterpart(&self, with: Option<String>) -> String {
        with.unwrap_or_else(|| physiotherapist_id(&self.user_id))
    }

    fn store(&self) -> JsonlSessionStore {
        JsonlSessionStore::new(self.sessions_path())
    }

    fn remote(&self) -> Option<DirDocumentStore> {
        self.config
            .remote
            .enabled
            .then(|| DirDocumentStore::new(self.config.remote_root(&self.data_dir)))
    }

    fn user_sessions(&self) -> Result<Vec<ExerciseSession>> {
        self.store().sessions_for_user(&self.user_id)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    physio_core::logging::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| config.data.data_dir.clone());
    let user_id = cli.user.unwrap_or_else(|| config.user.id.clone());

    let catalog = get_default_catalog().with_custom(&config.exercises.custom);
    let errors = catalog.validate();
    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::CatalogValidation("Invalid catalog".into()));
    }

    let ctx = Context {
        config,
        data_dir,
        user_id,
        catalog,
    };

    match cli.command {
        Commands::Exercises { category } => cmd_exercises(&ctx, category),
        Commands::Start {
            exercise_id,
            script,
            pain,
            difficulty,
            mood,
            notes,
        } => {
            let feedback = SessionFeedback {
                pain_level: pain,
                difficulty,
                mood,
                notes,
            };
            cmd_start(&ctx, &exercise_id, script, feedback).await
        }
        Commands::History { limit } => cmd_history(&ctx, limit),
        Commands::Stats => cmd_stats(&ctx),
        Commands::Achievements => cmd_achievements(&ctx),
        Commands::Tasks { complete } => cmd_tasks(&ctx, complete),
        Commands::Leaderboard => cmd_leaderboard(&ctx),
        Commands::Export { out } => cmd_export(&ctx, out),
        Commands::Compact => cmd_compact(&ctx),
        Commands::Profile {
            doctor,
            surgery,
            no_surgery,
        } => cmd_profile(&ctx, doctor, surgery, no_surgery),
        Commands::Messages { action } => cmd_messages(&ctx, action),
    }
}

fn cmd_exercises(ctx: &Context, category: Option<String>) -> Result<()> {
    let exercises: Vec<&Exercise> = match category {
        Some(name) => {
            let category = ExerciseCategory::parse(&name)
                .ok_or_else(|| Error::Other(format!("Unknown category: {}", name)))?;
            ctx.catalog.by_category(category)
        }
        None => ctx.catalog.exercises.values().collect(),
    };

    if exercises.is_empty() {
        println!("No exercises found.");
        return Ok(());
    }

    for exercise in exercises {
        let marker = if exercise.assigned { "*" } else { " " };
        println!(
            "{} {:<22} {:<26} {:<9} {}x{}  rest {}s",
            marker,
            exercise.id,
            exercise.title,
            format!("{:?}", exercise.category).to_lowercase(),
            exercise.sets,
            exercise.repetitions,
            exercise.rest_time
        );
    }
    Ok(())
}

/// One step of a scripted or typed session
#[derive(Debug, PartialEq)]
enum Step {
    Command(SessionCommand),
    Status,
    Finish,
    Quit,
}

fn parse_step(input: &str) -> Option<Step> {
    let input = input.trim().to_lowercase();
    let step = match input.as_str() {
        "s" | "start" => Step::Command(SessionCommand::StartSet),
        "c" | "done" => Step::Command(SessionCommand::CompleteSet),
        "p" | "pause" => Step::Command(SessionCommand::Pause),
        "u" | "resume" => Step::Command(SessionCommand::Resume),
        "f" | "finish" => Step::Finish,
        "q" | "quit" => Step::Quit,
        "" | "status" => Step::Status,
        other => {
            let reps = other.strip_prefix('r').unwrap_or(other).trim();
            Step::Command(SessionCommand::UpdateReps(reps.parse().ok()?))
        }
    };
    Some(step)
}

fn format_status(snapshot: &SessionSnapshot) -> String {
    let mut status = format!(
        "Set {}/{} | reps {}/{} | {}",
        snapshot.current_set,
        snapshot.total_sets,
        snapshot.current_reps,
        snapshot.target_reps,
        snapshot.timer_text
    );
    if snapshot.is_resting && snapshot.rest_remaining > 0 {
        status.push_str(" | resting");
    }
    if snapshot.is_paused {
        status.push_str(" | paused");
    }
    status.push_str(&format!(" | {} pts", snapshot.points_earned));
    status
}

fn parse_script(script: &str) -> Result<Vec<Step>> {
    script
        .split(',')
        .map(|token| {
            parse_step(token).ok_or_else(|| Error::Other(format!("Unknown script step: '{}'", token)))
        })
        .collect()
}

/// Returns true when the session was finished, false when it should be cancelled
async fn run_script(handle: &mut SessionHandle, steps: Vec<Step>, feedback: SessionFeedback) -> Result<bool> {
    for step in steps {
        match step {
            Step::Command(command) => match handle.apply(command).await {
                Some(snapshot) => println!("{}", format_status(&snapshot)),
                None => return Ok(false),
            },
            Step::Status => println!("{}", format_status(&handle.snapshot())),
            Step::Finish => {
                handle.complete_session(feedback);
                return Ok(true);
            }
            Step::Quit => return Ok(false),
        }
    }
    Ok(false)
}

async fn run_interactive(handle: &mut SessionHandle, feedback: SessionFeedback) -> Result<bool> {
    println!("─────────────────────────────────────────");
    println!("  s  start set      c  complete set");
    println!("  r<N> / <N>  set reps");
    println!("  p  pause          u  resume");
    println!("  f  finish         q  quit without saving");
    println!("  Enter for status");
    println!("─────────────────────────────────────────");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            return Ok(false);
        };
        match parse_step(&line) {
            Some(Step::Command(command)) => match handle.apply(command).await {
                Some(snapshot) => println!("{}", format_status(&snapshot)),
                None => return Ok(false),
            },
            Some(Step::Status) => println!("{}", format_status(&handle.snapshot())),
            Some(Step::Finish) => {
                handle.complete_session(feedback);
                return Ok(true);
            }
            Some(Step::Quit) => return Ok(false),
            None => println!("Unknown input: {}", line.trim()),
        }
    }
}

async fn cmd_start(
    ctx: &Context,
    exercise_id: &str,
    script: Option<String>,
    feedback: SessionFeedback,
) -> Result<()> {
    let mut persistence = SessionPersistence::new(ctx.store());
    if let Some(remote) = ctx.remote() {
        persistence = persistence.with_remote(remote);
    }
    let timing = SessionTiming::from(&ctx.config.session);
    let steps = script.as_deref().map(parse_script).transpose()?;

    let mut handle = start_session(&ctx.catalog, exercise_id, &ctx.user_id, persistence, timing)?;
    display_exercise(&handle.snapshot().exercise);

    let finished = match steps {
        Some(steps) => run_script(&mut handle, steps, feedback).await?,
        None => run_interactive(&mut handle, feedback).await?,
    };

    if !finished {
        let record = handle.cancel().await?;
        println!("Session {} stopped before completion.", record.id);
        return Ok(());
    }

    let done = handle.wait_for(|s| s.is_completed).await;
    let record = handle.finish().await?;

    println!();
    println!("✓ Session complete!");
    println!(
        "  Sets: {}/{}   Reps: {}   Accuracy: {:.0}%",
        record.completed_sets,
        done.total_sets,
        record.completed_reps,
        record.accuracy * 100.0
    );
    println!("  Time: {}   Points: {}", done.timer_text, record.points_earned);
    if let Some(error) = &done.error {
        eprintln!("Warning: session not fully saved: {}", error);
    }

    record_rewards(ctx, &record)
}

fn display_exercise(exercise: &Exercise) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  {}", exercise.title.to_uppercase());
    println!("╰─────────────────────────────────────────╯");
    println!(
        "  {} sets x {} reps, {}s rest",
        exercise.sets, exercise.repetitions, exercise.rest_time
    );
    for (i, instruction) in exercise.instructions.iter().enumerate() {
        println!("  {}. {}", i + 1, instruction);
    }
    if let Some(url) = &exercise.video_url {
        println!("  ℹ Video: {}", url);
    }
    println!();
}

/// Apply a finished session to the user's profile and daily tasks
fn record_rewards(ctx: &Context, record: &ExerciseSession) -> Result<()> {
    let now = Utc::now();
    let today = now.date_naive();
    let todays = ctx.store().completed_today(&ctx.user_id, today)?;

    let (reward, profile) = ProfileBook::update(&ctx.profiles_path(), |book| {
        let player = book.player_mut(&ctx.user_id);
        if player.profile.display_name.is_empty() {
            player.profile.display_name = ctx.config.user.display_name.clone();
        }
        let reward = player.record_session(record, now);
        player.ensure_daily_tasks(today);
        player.refresh_task_progress(today, &todays);
        Ok((reward, player.profile.clone()))
    })?;

    if reward.streak_bonus > 0 {
        println!("  🔥 {}-day streak! +{} bonus points", reward.streak_days, reward.streak_bonus);
    }
    for id in &reward.unlocked {
        println!("  🏆 Achievement unlocked: {}", id);
    }
    println!(
        "  Total: {} points, level {}, streak {} days",
        profile.total_points, profile.level, profile.streak_days
    );

    if let Some(mut remote) = ctx.remote() {
        if let Err(e) = push_profile(&mut remote, &profile) {
            tracing::warn!("Profile sync failed: {}", e);
            eprintln!("Warning: profile not synced: {}", e);
        }
    }
    Ok(())
}

fn cmd_history(ctx: &Context, limit: usize) -> Result<()> {
    let sessions = ctx.user_sessions()?;
    let recent = recent_completed(&sessions, limit);
    if recent.is_empty() {
        println!("No completed sessions yet.");
        return Ok(());
    }

    for session in recent {
        let title = ctx
            .catalog
            .get(&session.exercise_id)
            .map(|e| e.title.as_str())
            .unwrap_or(session.exercise_id.as_str());
        println!(
            "{}  {:<26} {} sets  {:>3} pts  {:>3.0}%",
            session.start_time.format("%Y-%m-%d %H:%M"),
            title,
            session.completed_sets,
            session.points_earned,
            session.accuracy * 100.0
        );
    }
    Ok(())
}

fn cmd_stats(ctx: &Context) -> Result<()> {
    let sessions = ctx.user_sessions()?;
    let stats = user_stats(&sessions);
    let book = ProfileBook::load(&ctx.profiles_path())?;
    let profile = book
        .player(&ctx.user_id)
        .map(|p| p.profile.clone())
        .unwrap_or_default();

    println!("Sessions completed: {}", stats.completed_sessions);
    println!("Time exercised:     {} min", stats.total_seconds / 60);
    println!("Session points:     {}", stats.total_points);
    println!("Total points:       {}", profile.total_points);
    println!("Level:              {}", profile.level);
    println!("Streak:             {} days", profile.streak_days);

    println!("\nLast 7 days:");
    for (day, count) in weekly_progress(&sessions, Utc::now().date_naive()) {
        println!("  {}  {}", day.format("%a %d"), "■".repeat(count as usize));
    }

    let by_category = sessions_by_category(&sessions, &ctx.catalog);
    if !by_category.is_empty() {
        println!("\nBy body region:");
        for (category, count) in by_category {
            println!("  {:<9} {}", category, count);
        }
    }
    Ok(())
}

fn cmd_achievements(ctx: &Context) -> Result<()> {
    let book = ProfileBook::load(&ctx.profiles_path())?;
    let player = book
        .player(&ctx.user_id)
        .cloned()
        .unwrap_or_else(|| PlayerRecord::new(&ctx.user_id));

    for achievement in &player.achievements {
        let mark = if achievement.is_unlocked() { "x" } else { " " };
        println!(
            "[{}] {:<18} {:>5}/{:<5} {:>4} pts  {}",
            mark,
            achievement.title,
            achievement.progress,
            achievement.required_value,
            achievement.points,
            achievement.description
        );
    }
    Ok(())
}

fn cmd_tasks(ctx: &Context, complete: Option<Uuid>) -> Result<()> {
    let today = Utc::now().date_naive();
    let todays = ctx.store().completed_today(&ctx.user_id, today)?;

    let (tasks, awarded) = ProfileBook::update(&ctx.profiles_path(), |book| {
        let player = book.player_mut(&ctx.user_id);
        player.ensure_daily_tasks(today);
        player.refresh_task_progress(today, &todays);
        let awarded = match complete {
            Some(task_id) => Some(player.complete_task(task_id, Utc::now())?),
            None => None,
        };
        Ok((player.daily_tasks.clone(), awarded))
    })?;

    if let Some(points) = awarded {
        println!("✓ Task completed: +{} points\n", points);
    }
    for task in tasks {
        let mark = if task.completed { "x" } else { " " };
        println!(
            "[{}] {:<24} {:>3}/{:<3} {:>3} pts  {}",
            mark, task.title, task.current_progress, task.target_value, task.points, task.id
        );
    }
    Ok(())
}

fn cmd_leaderboard(ctx: &Context) -> Result<()> {
    let profiles = match ctx.remote() {
        Some(remote) => rank_profiles(pull_profiles(&remote)?),
        None => ProfileBook::load(&ctx.profiles_path())?.leaderboard(),
    };

    if profiles.is_empty() {
        println!("No players yet.");
        return Ok(());
    }
    for (rank, profile) in profiles.iter().enumerate() {
        let name = if profile.display_name.is_empty() {
            profile.user_id.as_str()
        } else {
            profile.display_name.as_str()
        };
        println!(
            "{:>2}. {:<20} {:>6} pts  level {}",
            rank + 1,
            name,
            profile.total_points,
            profile.level
        );
    }
    Ok(())
}

fn cmd_export(ctx: &Context, out: PathBuf) -> Result<()> {
    let sessions = ctx.user_sessions()?;
    let count = export_csv(&sessions, &out)?;
    println!("✓ Exported {} sessions to {}", count, out.display());
    Ok(())
}

fn cmd_compact(ctx: &Context) -> Result<()> {
    let kept = ctx.store().compact()?;
    println!("✓ Session log compacted: {} sessions", kept);
    Ok(())
}

fn cmd_profile(
    ctx: &Context,
    doctor: Option<String>,
    surgery: Option<String>,
    no_surgery: bool,
) -> Result<()> {
    let changed = doctor.is_some() || surgery.is_some() || no_surgery;
    let profile = if changed {
        let profile = ProfileBook::update(&ctx.profiles_path(), |book| {
            let player = book.player_mut(&ctx.user_id);
            if let Some(doctor) = doctor {
                player.profile.doctor_name = Some(doctor).filter(|d| !d.trim().is_empty());
            }
            if let Some(details) = surgery {
                player.profile.has_surgery = true;
                player.profile.surgery_details = Some(details).filter(|d| !d.trim().is_empty());
            }
            if no_surgery {
                player.profile.has_surgery = false;
                player.profile.surgery_details = None;
            }
            Ok(player.profile.clone())
        })?;
        if let Some(mut remote) = ctx.remote() {
            if let Err(e) = push_profile(&mut remote, &profile) {
                tracing::warn!("Profile sync failed: {}", e);
                eprintln!("Warning: profile not synced: {}", e);
            }
        }
        println!("✓ Profile updated\n");
        profile
    } else {
        ProfileBook::load(&ctx.profiles_path())?
            .player(&ctx.user_id)
            .map(|p| p.profile.clone())
            .unwrap_or_default()
    };

    println!("User:            {}", ctx.user_id);
    println!(
        "Doctor:          {}",
        profile.doctor_name.as_deref().unwrap_or("-")
    );
    println!("Physiotherapist: {}", physiotherapist_id(&ctx.user_id));
    match (profile.has_surgery, profile.surgery_details.as_deref()) {
        (true, Some(details)) => println!("Surgery:         yes ({})", details),
        (true, None) => println!("Surgery:         yes"),
        (false, _) => println!("Surgery:         no"),
    }
    Ok(())
}

fn cmd_messages(ctx: &Context, action: MessageAction) -> Result<()> {
    let mut messenger = ctx.messenger();

    match action {
        MessageAction::Send {
            content,
            to,
            kind,
            attachment,
        } => {
            let message_type = MessageType::parse(&kind)
                .ok_or_else(|| Error::Other(format!("Unknown message type: {}", kind)))?;
            if content.trim().is_empty() {
                return Err(Error::Other("Message is empty".into()));
            }
            let to = ctx.counterpart(to);
            let mut message = Message::new(&ctx.user_id, &to, content, message_type, Utc::now());
            message.attachment_url = attachment;

            let warning = messenger.send(&message)?;
            println!("✓ Message sent to {} ({})", to, message.id);
            if let Some(warning) = warning {
                eprintln!("Warning: message not synced: {}", warning);
            }
        }
        MessageAction::List { with: Some(with) } => {
            let messages = messenger
                .local()
                .conversation(&conversation_id(&ctx.user_id, &with))?;
            if messages.is_empty() {
                println!("No messages with {}.", with);
                return Ok(());
            }
            for message in messages {
                let unread = if message.receiver_id == ctx.user_id && !message.is_read {
                    "*"
                } else {
                    " "
                };
                let kind = match message.message_type {
                    MessageType::Text => String::new(),
                    other => format!("[{:?}] ", other).to_lowercase(),
                };
                println!(
                    "{} {}  {}: {}{}",
                    unread,
                    message.timestamp.format("%Y-%m-%d %H:%M"),
                    message.sender_id,
                    kind,
                    message.content
                );
                if let Some(url) = &message.attachment_url {
                    println!("    ↳ {}", url);
                }
            }
        }
        MessageAction::List { with: None } => {
            let summaries = messenger.local().conversations(&ctx.user_id)?;
            if summaries.is_empty() {
                println!("No messages yet.");
                return Ok(());
            }
            println!(
                "Unread: {}\n",
                messenger.local().unread_count(&ctx.user_id)?
            );
            for summary in summaries {
                println!(
                    "{:<28} {:>2} unread  {}  {}",
                    summary.with,
                    summary.unread,
                    summary.last.timestamp.format("%Y-%m-%d %H:%M"),
                    summary.last.content
                );
            }
        }
        MessageAction::Read { with } => {
            let with = ctx.counterpart(with);
            let (count, warning) =
                messenger.mark_read(&conversation_id(&ctx.user_id, &with), &ctx.user_id)?;
            println!("✓ Marked {} messages from {} as read", count, with);
            if let Some(warning) = warning {
                eprintln!("Warning: read state not synced: {}", warning);
            }
        }
        MessageAction::Delete { id } => {
            let (deleted, warning) = messenger.delete(id)?;
            if !deleted {
                return Err(Error::Other(format!("Message not found: {}", id)));
            }
            println!("✓ Message {} deleted", id);
            if let Some(warning) = warning {
                eprintln!("Warning: remote copy not deleted: {}", warning);
            }
        }
        MessageAction::Sync => {
            if ctx.remote().is_none() {
                println!("Remote store is not enabled.");
                return Ok(());
            }
            let written = messenger.sync(&ctx.user_id)?;
            println!("✓ Synced {} messages", written);
        }
    }
    Ok(())
}
