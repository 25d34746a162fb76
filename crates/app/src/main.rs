use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use course_core::model::{Course, CourseId, LearnerId, VideoId};
use services::{AppServices, Clock, GateSettings};

mod outline_file;

use outline_file::OutlineFile;

/// Gated course progress from the command line.
#[derive(Parser, Debug)]
#[command(name = "course-gate")]
#[command(about = "Sequential unlock, progress and navigation for video courses")]
#[command(version)]
struct Cli {
    /// SQLite database URL or file path
    #[arg(long, env = "COURSE_DB_URL", default_value = "sqlite://dev.sqlite3")]
    db: String,

    /// TOML file holding gate settings (`pass_threshold`, `strict_ordering`)
    #[arg(long, env = "COURSE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish a course outline (sections, videos, quiz counts) from JSON
    Import { path: PathBuf },
    /// Enroll a learner in a course
    Enroll(LearnerCourse),
    /// Whether the learner may watch a video
    Access(LearnerVideo),
    /// Completion summary for a course
    Progress(LearnerCourse),
    /// Previous/next links for a video
    Nav(LearnerVideo),
    /// Full course outline with per-video state
    Outline(LearnerCourse),
    /// Record a watch event
    Watch {
        #[command(flatten)]
        target: LearnerVideo,
        /// Seconds watched so far
        #[arg(long, default_value_t = 0)]
        secs: u32,
        /// Mark the video as watched to the end
        #[arg(long)]
        finished: bool,
    },
    /// Submit a quiz result
    Quiz {
        #[command(flatten)]
        target: LearnerVideo,
        #[arg(long)]
        correct: u32,
        #[arg(long)]
        total: u32,
    },
}

#[derive(ClapArgs, Debug, Clone, Copy)]
struct LearnerCourse {
    #[arg(long)]
    learner: LearnerId,
    #[arg(long)]
    course: CourseId,
}

#[derive(ClapArgs, Debug, Clone, Copy)]
struct LearnerVideo {
    #[arg(long)]
    learner: LearnerId,
    #[arg(long)]
    course: CourseId,
    #[arg(long)]
    video: VideoId,
}

fn init_tracing() {
    // Logs go to stderr; stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: Option<&Path>) -> Result<GateSettings> {
    let Some(path) = path else {
        return Ok(GateSettings::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let settings: GateSettings = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(settings)
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<()> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let Some(path) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid --db value: {db_url}");
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid --db value: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref())?;
    if cli.db.trim().is_empty() {
        bail!("invalid --db value: {:?}", cli.db);
    }
    let db_url = normalize_sqlite_url(&cli.db);

    // Open + migrate SQLite at startup, before any command runs.
    prepare_sqlite_file(&db_url)?;
    let app = AppServices::new_sqlite(&db_url, Clock::system(), settings)
        .await
        .with_context(|| format!("failed to open {db_url}"))?;
    let courses = app.courses();
    let progress = app.progress();

    match cli.command {
        Command::Import { path } => {
            let (course, quizzes) = OutlineFile::load(&path)?.into_course()?;
            courses.publish_course(&course, &quizzes).await?;
            info!(course = %course.id(), path = %path.display(), "imported outline");
            print_json(&ImportSummary::of(&course))
        }
        Command::Enroll(LearnerCourse { learner, course }) => {
            print_json(&courses.enroll(learner, course).await?)
        }
        Command::Access(LearnerVideo {
            learner,
            course,
            video,
        }) => print_json(&progress.check_access(learner, course, video).await?),
        Command::Progress(LearnerCourse { learner, course }) => {
            print_json(&progress.course_progress(learner, course).await?)
        }
        Command::Nav(LearnerVideo {
            learner,
            course,
            video,
        }) => print_json(&progress.navigation(learner, course, video).await?),
        Command::Outline(LearnerCourse { learner, course }) => {
            print_json(&progress.outline(learner, course).await?)
        }
        Command::Watch {
            target,
            secs,
            finished,
        } => print_json(
            &progress
                .record_watch(target.learner, target.course, target.video, secs, finished)
                .await?,
        ),
        Command::Quiz {
            target,
            correct,
            total,
        } => print_json(
            &progress
                .submit_quiz(target.learner, target.course, target.video, correct, total)
                .await?,
        ),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportSummary {
    course_id: CourseId,
    sections: usize,
    videos: usize,
}

impl ImportSummary {
    fn of(course: &Course) -> Self {
        Self {
            course_id: course.id(),
            sections: course.sections().len(),
            videos: course.video_count(),
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        // At this layer (binary glue), logging once is fine.
        error!("{err:#}");
        std::process::exit(2);
    }
}
