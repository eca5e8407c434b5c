use clap::{Parser, Subcommand};
use slog::{info, o, Drain, Logger};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clusterboot::{ClusterPlan, DispatchServer, Kickstarter, LocalActions, PhaseReport, RunInfo};

#[derive(Parser, Debug)]
#[command(name = "clusterboot")]
#[command(about = "Boot, inspect and tear down a document-store cluster", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Launch the cluster described by a plan file
    Launch {
        /// Path to the cluster plan (JSON)
        #[arg(short, long)]
        plan: PathBuf,

        /// Identity of this dispatcher within the plan
        #[arg(short, long, default_value = "me")]
        myname: String,

        /// Where to save the launch results for later lifecycle calls
        #[arg(short, long, default_value = "runinfo.json")]
        run_info: PathBuf,
    },

    /// Launch the cluster again on top of existing data
    Relaunch {
        #[arg(short, long)]
        plan: PathBuf,

        #[arg(short, long, default_value = "me")]
        myname: String,

        #[arg(short, long, default_value = "runinfo.json")]
        run_info: PathBuf,
    },

    /// Stop every process recorded by a previous launch
    Shutdown {
        #[arg(short, long)]
        plan: PathBuf,

        #[arg(short, long, default_value = "me")]
        myname: String,

        /// Launch results saved by the launch that started the cluster
        #[arg(short, long, default_value = "runinfo.json")]
        run_info: PathBuf,
    },

    /// Remove the on-disk state the cluster left behind
    Cleanup {
        #[arg(short, long)]
        plan: PathBuf,

        #[arg(short, long, default_value = "me")]
        myname: String,
    },

    /// Report per-command process liveness
    Health {
        #[arg(short, long)]
        plan: PathBuf,

        #[arg(short, long, default_value = "me")]
        myname: String,

        #[arg(short, long, default_value = "runinfo.json")]
        run_info: PathBuf,
    },

    /// Serve the dispatch endpoint for commands relayed by peer hosts
    Serve {
        /// Address to listen on, e.g. 0.0.0.0:8529
        #[arg(short, long)]
        listen: SocketAddr,
    },
}

fn root_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

fn load_plan(path: &Path) -> Result<ClusterPlan, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn load_run_info(path: &Path) -> Result<Vec<RunInfo>, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn save_run_info(path: &Path, run_info: &[RunInfo]) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, serde_json::to_string_pretty(run_info)?)?;
    Ok(())
}

fn print_report(report: &PhaseReport) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let logger = root_logger();

    match args.command {
        CliCommand::Launch {
            plan,
            myname,
            run_info,
        } => {
            let plan = load_plan(&plan)?;
            let mut kickstarter = Kickstarter::new(plan, myname, logger.clone())?;
            let report = kickstarter.launch().await;
            save_run_info(&run_info, kickstarter.run_info())?;
            print_report(&report)?;
            if report.error {
                return Err("launch failed".into());
            }
            info!(logger, "cluster launched"; "commands" => report.results.len());
        }

        CliCommand::Relaunch {
            plan,
            myname,
            run_info,
        } => {
            let plan = load_plan(&plan)?;
            let mut kickstarter = Kickstarter::new(plan, myname, logger.clone())?;
            let report = kickstarter.relaunch().await;
            save_run_info(&run_info, kickstarter.run_info())?;
            print_report(&report)?;
            if report.error {
                return Err("relaunch failed".into());
            }
            info!(logger, "cluster relaunched"; "commands" => report.results.len());
        }

        CliCommand::Shutdown {
            plan,
            myname,
            run_info,
        } => {
            let plan = load_plan(&plan)?;
            let mut kickstarter = Kickstarter::new(plan, myname, logger.clone())?;
            kickstarter.set_run_info(load_run_info(&run_info)?);
            let report = kickstarter.shutdown().await;
            print_report(&report)?;
            if report.error {
                return Err("shutdown reported errors".into());
            }
            info!(logger, "cluster stopped");
        }

        CliCommand::Cleanup { plan, myname } => {
            let plan = load_plan(&plan)?;
            let kickstarter = Kickstarter::new(plan, myname, logger.clone())?;
            let report = kickstarter.cleanup().await;
            print_report(&report)?;
            if report.error {
                return Err("cleanup reported errors".into());
            }
            info!(logger, "cluster state removed");
        }

        CliCommand::Health {
            plan,
            myname,
            run_info,
        } => {
            let plan = load_plan(&plan)?;
            let mut kickstarter = Kickstarter::new(plan, myname, logger.clone())?;
            kickstarter.set_run_info(load_run_info(&run_info)?);
            let report = kickstarter.is_healthy().await;
            print_report(&report)?;
        }

        CliCommand::Serve { listen } => {
            let actions = Arc::new(LocalActions::new(logger.clone()));
            let server = DispatchServer::new(listen, actions, logger);
            server.start().await?;
        }
    }

    Ok(())
}
