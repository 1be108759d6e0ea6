//! trafficd - traffic camera vehicle counter
//!
//! This daemon:
//! 1. Discovers road locations and their cameras
//! 2. Counts vehicles in every camera image and stores annotated copies
//! 3. Publishes each completed cycle as one snapshot
//! 4. Serves the latest snapshot over HTTP

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};

use trafficcam::{
    api::{ApiConfig, ApiServer},
    config::TrafficConfig,
    detect::backend_from_settings,
    directory::OneMotoringDirectory,
    ingest::HttpImageSource,
    AnnotationStore, CameraProcessor, CycleOutcome, FilesystemAnnotationStore, FrameAnnotator,
    RefreshCoordinator, Scheduler, SnapshotStore, VehicleDetector,
};

#[derive(Parser, Debug)]
#[command(
    name = "trafficd",
    about = "Count vehicles on traffic cameras and serve the latest results"
)]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(long, value_name = "PATH", env = "TRAFFIC_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address for the viewer, overrides the config file
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,

    /// Run a single refresh cycle, print its report and exit
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = TrafficConfig::load_from(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.api_addr = addr;
    }

    let classes = config.classes()?;
    let backend = backend_from_settings(&config.detector)?;
    let detector = VehicleDetector::spawn(backend, classes, config.camera_timeout)?;
    log::info!(
        "detector backend '{}' counting {}",
        detector.backend_name(),
        config.vehicle_classes.join(", ")
    );

    let annotations: Arc<dyn AnnotationStore> =
        Arc::new(FilesystemAnnotationStore::new(config.static_dir.clone())?);
    let processor = CameraProcessor::new(
        Arc::new(HttpImageSource::new(config.camera_timeout)),
        detector,
        FrameAnnotator::new(annotations.clone()),
    );
    let directory = OneMotoringDirectory::new(
        &config.source.index_url,
        &config.source.camera_page_base,
        config.camera_timeout,
    )?;
    let store = Arc::new(SnapshotStore::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    let coordinator = Arc::new(
        RefreshCoordinator::new(Arc::new(directory), processor, store.clone())
            .with_shutdown(shutdown.clone()),
    );

    if args.once {
        return match coordinator.run_cycle()? {
            CycleOutcome::Published(report) => {
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(())
            }
            CycleOutcome::AlreadyRunning => Err(anyhow!("a refresh cycle is already running")),
        };
    }

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
    };
    let api_handle = ApiServer::new(api_config, store, annotations).spawn()?;
    let scheduler =
        Scheduler::new(coordinator, config.refresh_interval, shutdown).spawn()?;
    log::info!(
        "trafficd running. viewer on http://{}, refresh every {}s",
        api_handle.addr,
        config.refresh_interval.as_secs()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("trafficd waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping scheduler and viewer...");
    scheduler.stop()?;
    api_handle.stop()?;

    Ok(())
}
