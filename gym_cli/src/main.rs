use clap::{Parser, Subcommand};
use gym_core::config::DataConfig;
use gym_core::history::{daily_volume, format_duration, last_set, write_session_report};
use gym_core::transfer::format_timestamp;
use gym_core::*;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gymtrack")]
#[command(about = "Workout log with sessions, volume tracking and rest timer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage workouts
    Workout {
        #[command(subcommand)]
        action: WorkoutAction,
    },

    /// Manage exercises of a workout
    Exercise {
        #[command(subcommand)]
        action: ExerciseAction,
    },

    /// Log or remove sets
    Set {
        #[command(subcommand)]
        action: SetAction,
    },

    /// Inspect and finish sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Export every record as CSV
    Export {
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Replace every record with the contents of a CSV file
    Import {
        file: PathBuf,
    },

    /// Run the rest countdown
    Rest {
        /// Countdown length (defaults to the configured rest time)
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Write a per-session CSV report
    Report {
        path: PathBuf,
    },

    /// Check the ledger for inconsistencies
    Check,
}

#[derive(Subcommand)]
enum WorkoutAction {
    Add { name: String },
    List,
    /// Delete a workout with its exercises, sessions and sets
    Delete { name: String },
}

#[derive(Subcommand)]
enum ExerciseAction {
    Add {
        #[arg(long)]
        workout: String,
        name: String,
        /// legs, biceps, triceps, abs, back, shoulders or chest
        #[arg(long, default_value = "chest")]
        category: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    List {
        #[arg(long)]
        workout: String,
    },
    /// Replace an exercise's note
    Note {
        #[arg(long)]
        workout: String,
        name: String,
        note: String,
    },
    /// Delete an exercise with all of its sets
    Delete {
        #[arg(long)]
        workout: String,
        name: String,
    },
    /// Show volume per day for an exercise
    Stats {
        #[arg(long)]
        workout: String,
        name: String,
    },
}

#[derive(Subcommand)]
enum SetAction {
    Add {
        #[arg(long)]
        workout: String,
        #[arg(long)]
        exercise: String,
        /// Kilograms
        #[arg(long)]
        weight: f64,
        #[arg(long)]
        reps: u32,
        /// Start the rest countdown after logging
        #[arg(long)]
        rest: bool,
    },
    List {
        #[arg(long)]
        workout: String,
        #[arg(long)]
        exercise: String,
    },
    Remove { id: SetEntryId },
}

#[derive(Subcommand)]
enum SessionAction {
    List,
    /// Close the open session of a workout
    Close {
        #[arg(long)]
        workout: String,
    },
    /// Close a session by id
    Finish { id: SessionId },
    /// Delete a session and its sets
    Delete { id: SessionId },
}

/// Everything a command needs
struct App {
    config: Config,
    store: JsonStore,
    sessions: SessionManager,
    clock: Arc<dyn Clock>,
}

impl App {
    fn open(data_dir: Option<PathBuf>) -> Result<Self> {
        let config = Config::load()?;
        let data_dir = data_dir.unwrap_or_else(|| config.data.data_dir.clone());
        std::fs::create_dir_all(&data_dir)?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger_path = DataConfig::ledger_path(&data_dir);
        tracing::debug!("Using ledger at {:?}", ledger_path);
        let mut store = JsonStore::open(ledger_path)?;
        let mut sessions = SessionManager::new(Arc::clone(&clock));
        sessions.recover(&mut store, config.sessions.recovery)?;

        Ok(Self {
            config,
            store,
            sessions,
            clock,
        })
    }

    fn workout_id(&self, name: &str) -> Result<WorkoutId> {
        self.store
            .ledger()
            .find_workout_by_name(name)
            .map(|w| w.id)
            .ok_or_else(|| Error::NotFound(format!("workout '{}'", name)))
    }

    fn exercise_id(&self, workout: &str, name: &str) -> Result<ExerciseId> {
        let workout_id = self.workout_id(workout)?;
        self.store
            .ledger()
            .find_exercise(workout_id, name)
            .map(|e| e.id)
            .ok_or_else(|| Error::NotFound(format!("exercise '{}' in '{}'", name, workout)))
    }
}

fn main() -> Result<()> {
    // Initialize logging
    gym_core::logging::init_with_level("warn");

    let cli = Cli::parse();
    let mut app = App::open(cli.data_dir)?;

    match cli.command {
        Commands::Workout { action } => cmd_workout(&mut app, action),
        Commands::Exercise { action } => cmd_exercise(&mut app, action),
        Commands::Set { action } => cmd_set(&mut app, action),
        Commands::Session { action } => cmd_session(&mut app, action),
        Commands::Export { out } => cmd_export(&app, out),
        Commands::Import { file } => cmd_import(&mut app, file),
        Commands::Rest { seconds } => {
            let duration = seconds
                .map(Duration::from_secs)
                .unwrap_or_else(|| app.config.timer.rest_duration());
            run_rest(&app, duration)
        }
        Commands::Report { path } => {
            let count = write_session_report(app.store.ledger(), &path)?;
            println!("✓ Wrote {} sessions to {}", count, path.display());
            Ok(())
        }
        Commands::Check => cmd_check(&app),
    }
}

fn cmd_workout(app: &mut App, action: WorkoutAction) -> Result<()> {
    match action {
        WorkoutAction::Add { name } => {
            app.store.ledger_mut().create_workout(name.clone());
            app.store.save()?;
            println!("✓ Added workout {}", name);
        }
        WorkoutAction::List => {
            let ledger = app.store.ledger();
            for workout in ledger.workouts_by_name() {
                let open = if app.sessions.open_session(&app.store, workout.id).is_some() {
                    "  (session open)"
                } else {
                    ""
                };
                println!(
                    "{}  [{} exercises]{}",
                    workout.name,
                    ledger.exercises_of(workout.id).len(),
                    open
                );
            }
        }
        WorkoutAction::Delete { name } => {
            let id = app.workout_id(&name)?;
            app.store.ledger_mut().delete_workout(id);
            app.store.save()?;
            println!("✓ Deleted workout {}", name);
        }
    }
    Ok(())
}

fn cmd_exercise(app: &mut App, action: ExerciseAction) -> Result<()> {
    match action {
        ExerciseAction::Add {
            workout,
            name,
            category,
            note,
        } => {
            let workout_id = app.workout_id(&workout)?;
            let category: ExerciseCategory = category.parse()?;
            app.store
                .ledger_mut()
                .create_exercise(workout_id, name.clone(), category, note)?;
            app.store.save()?;
            println!("✓ Added {} ({}) to {}", name, category.display_name(), workout);
        }
        ExerciseAction::List { workout } => {
            let workout_id = app.workout_id(&workout)?;
            for exercise in app.store.ledger().exercises_of(workout_id) {
                print!("{}  [{}]", exercise.name, exercise.category.display_name());
                if !exercise.note.is_empty() {
                    print!("  {}", exercise.note);
                }
                println!();
            }
        }
        ExerciseAction::Note {
            workout,
            name,
            note,
        } => {
            let id = app.exercise_id(&workout, &name)?;
            app.sessions.update_note(&mut app.store, id, note)?;
            println!("✓ Note saved");
        }
        ExerciseAction::Delete { workout, name } => {
            let id = app.exercise_id(&workout, &name)?;
            let removed = app.sessions.delete_exercise(&mut app.store, id)?;
            println!("✓ Deleted {} and {} sets", name, removed);
        }
        ExerciseAction::Stats { workout, name } => {
            let id = app.exercise_id(&workout, &name)?;
            let ledger = app.store.ledger();
            for (day, volume) in daily_volume(ledger, id) {
                println!("{}  {:.0} kg", day, volume);
            }
            if let Some(set) = last_set(ledger, id) {
                println!("Last set: {} kg x {}", set.weight, set.reps);
            }
        }
    }
    Ok(())
}

fn cmd_set(app: &mut App, action: SetAction) -> Result<()> {
    match action {
        SetAction::Add {
            workout,
            exercise,
            weight,
            reps,
            rest,
        } => {
            let id = app.exercise_id(&workout, &exercise)?;
            let entry = app.sessions.add_set(&mut app.store, id, weight, reps)?;
            let volume = entry
                .session_id
                .and_then(|s| app.store.ledger().session(s))
                .map(|s| s.total_volume)
                .unwrap_or(0.0);
            println!("✓ Logged {} kg x {} ({})", weight, reps, entry.id);
            println!("  Session volume: {:.0} kg", volume);

            if rest {
                let duration = app.config.timer.rest_duration();
                run_rest(app, duration)?;
            }
        }
        SetAction::List { workout, exercise } => {
            let id = app.exercise_id(&workout, &exercise)?;
            for set in app.store.ledger().sets_of_exercise(id) {
                println!(
                    "{}  {:.1} kg x {}  {}",
                    format_timestamp(set.timestamp),
                    set.weight,
                    set.reps,
                    set.id
                );
            }
        }
        SetAction::Remove { id } => {
            app.sessions.remove_set(&mut app.store, id)?;
            println!("✓ Removed set {}", id);
        }
    }
    Ok(())
}

fn cmd_session(app: &mut App, action: SessionAction) -> Result<()> {
    match action {
        SessionAction::List => {
            for summary in session_history(app.store.ledger()) {
                let status = match summary.status {
                    SessionStatus::Ongoing => "Ongoing".to_string(),
                    SessionStatus::Finished => format_duration(summary.duration),
                };
                println!(
                    "{}  {}  {}  Total volume: {:.0}  {}",
                    format_timestamp(summary.start_time),
                    summary.workout_name,
                    status,
                    summary.total_volume,
                    summary.session_id
                );
            }
        }
        SessionAction::Close { workout } => {
            let workout_id = app.workout_id(&workout)?;
            match app.sessions.close_session(&mut app.store, workout_id)? {
                Some(id) => {
                    let duration = app
                        .store
                        .ledger()
                        .session(id)
                        .map(|s| s.duration)
                        .unwrap_or(0.0);
                    println!("✓ Closed session ({})", format_duration(duration));
                }
                None => println!("No open session for {}", workout),
            }
        }
        SessionAction::Finish { id } => {
            app.sessions.finish_session(&mut app.store, id)?;
            println!("✓ Finished session {}", id);
        }
        SessionAction::Delete { id } => {
            app.sessions.delete_session(&mut app.store, id)?;
            println!("✓ Deleted session {}", id);
        }
    }
    Ok(())
}

fn cmd_export(app: &App, out: Option<PathBuf>) -> Result<()> {
    let csv = export_csv(app.store.ledger());
    match out {
        Some(path) => {
            std::fs::write(&path, csv)?;
            println!("✓ Exported to {}", path.display());
        }
        None => print!("{}", csv),
    }
    Ok(())
}

fn cmd_import(app: &mut App, file: PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(&file)?;
    let summary = import_csv(&mut app.store, &text, app.clock.now())?;
    println!(
        "✓ Imported {} workouts, {} exercises, {} sessions, {} sets",
        summary.workouts, summary.exercises, summary.sessions, summary.sets
    );
    if summary.skipped_rows > 0 {
        println!("  Skipped {} rows", summary.skipped_rows);
    }
    Ok(())
}

fn cmd_check(app: &App) -> Result<()> {
    let errors = app.store.ledger().validate();
    if errors.is_empty() {
        println!("✓ Ledger is consistent");
        return Ok(());
    }
    eprintln!("Ledger problems:");
    for error in &errors {
        eprintln!("  - {}", error);
    }
    Err(Error::Integrity(format!("{} problems found", errors.len())))
}

/// Count down in the terminal until the rest is over
fn run_rest(app: &App, duration: Duration) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let timer = CooldownTimer::with_settings(
        Arc::new(LogDisplay::default()),
        Arc::new(LogNotifier),
        Arc::clone(&app.clock),
        app.config.timer.cooldown_settings(),
    );

    runtime.block_on(async {
        timer.start(duration)?;
        while timer.is_active() {
            print!("\r  Rest {}  ", timer.time_string());
            io::stdout().flush()?;
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        println!("\r  Rest over!   ");
        Ok::<(), Error>(())
    })?;

    // Give the display dismissal a moment to finish
    runtime.shutdown_timeout(Duration::from_millis(100));
    Ok(())
}
