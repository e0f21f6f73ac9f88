use anyhow::Context;
use beatreel::analytics::Analytics;
use beatreel::dashboard::{self, DashboardState};
use beatreel::scheduler::Scheduler;
use beatreel::script::VideoFormat;
use beatreel::video::ensure_tools;
use beatreel::volume::Volume;
use beatreel::{AppConfig, Pipeline, RunRequest};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "beatreel")]
#[command(about = "Beat-locked short-form video generation", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Produce one video now
    Run {
        /// Topic to write about; a fresh seed topic is picked when omitted
        #[arg(short, long)]
        topic: Option<String>,

        /// story_lesson, scary_truth or hidden_psychology
        #[arg(short, long, value_parser = parse_format)]
        format: Option<VideoFormat>,
    },
    /// Seed the data volume, link persisted paths and decode secrets
    Bootstrap,
    /// Run the pipeline at today's peak-hour slots
    Schedule {
        /// Start with one run before waiting for the first slot
        #[arg(long)]
        run_now: bool,
    },
    /// Serve the dashboard
    Serve,
    /// Bootstrap, start the scheduler in the background and serve the dashboard
    Start,
    /// Mark a rendered run as checked by a human
    Approve { run_id: String },
    /// Print totals from the analytics store
    Stats,
}

fn parse_format(raw: &str) -> std::result::Result<VideoFormat, String> {
    VideoFormat::from_key(raw).ok_or_else(|| {
        let keys: Vec<&str> = VideoFormat::ALL.iter().map(|f| f.key()).collect();
        format!("unknown format '{}', expected one of: {}", raw, keys.join(", "))
    })
}

fn bootstrap(config: &AppConfig) -> anyhow::Result<()> {
    let data_dir = config
        .data_dir
        .clone()
        .context("DATA_DIR must be set to bootstrap a volume")?;
    let report = Volume::new(config.work_dir.clone(), data_dir)
        .bootstrap(|key| std::env::var(key).ok())
        .context("Volume bootstrap failed")?;
    info!(
        "Bootstrap: {} seeded, {} linked, {} secrets decoded",
        report.seeded, report.linked, report.decoded
    );
    Ok(())
}

async fn start(config: &AppConfig) -> anyhow::Result<()> {
    if config.data_dir.is_some() {
        bootstrap(config)?;
    } else {
        warn!("DATA_DIR not set; state stays in {}", config.work_dir.display());
    }

    let exe = std::env::current_exe().context("Failed to locate own executable")?;
    let mut scheduler = tokio::process::Command::new(exe)
        .arg("schedule")
        .kill_on_drop(true)
        .spawn()
        .context("Failed to start scheduler process")?;
    info!("Scheduler started (pid {:?})", scheduler.id());

    let served = dashboard::serve(DashboardState::new(config.analytics_db()), config.port).await;

    scheduler.kill().await.ok();
    info!("Scheduler stopped");
    served.context("Dashboard failed")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = AppConfig::from_env().context("Invalid configuration")?;

    match args.command {
        Command::Run { topic, format } => {
            ensure_tools()?;
            let pipeline = Pipeline::from_config(&config)?;
            match pipeline.run(&RunRequest { topic, format }).await {
                Ok(report) => {
                    info!(
                        "Run {} finished: {} ({:.2}s)",
                        report.run_id,
                        report.rendered.path.display(),
                        report.rendered.duration
                    );
                }
                Err(e) => {
                    error!("Video generation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Command::Bootstrap => bootstrap(&config)?,
        Command::Schedule { run_now } => {
            ensure_tools()?;
            let pipeline = Pipeline::from_config(&config)?;
            Scheduler::new(config, pipeline).run_forever(run_now).await?;
        }
        Command::Serve => {
            dashboard::serve(DashboardState::new(config.analytics_db()), config.port).await?;
        }
        Command::Start => start(&config).await?,
        Command::Approve { run_id } => {
            let analytics = Analytics::open(&config.analytics_db())?;
            if analytics.approve(&run_id)? {
                info!("Run {} approved", run_id);
            } else {
                anyhow::bail!("No run with id {}", run_id);
            }
        }
        Command::Stats => {
            let analytics = Analytics::open(&config.analytics_db())?;
            let stats = analytics.stats()?;
            println!("Videos:   {}", stats.total);
            println!("Approved: {}", stats.approved);
            println!("Today:    {}", analytics.today_count()?);
            for (format, count) in stats.by_format {
                println!("  {:<18} {}", format, count);
            }
        }
    }

    Ok(())
}
