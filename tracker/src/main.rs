use std::path::PathBuf;
use std::sync::Arc;

use alpaca_client::AlpacaMount;
use anyhow::{Context, Result};
use clap::Parser;
use mount_control::sky_coordinates::HorizontalPosition;
use mount_control::{
    filter_slots, AircraftFeed, LowPrecisionSun, MountDevice, SimulatedMount, Tracker,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod feed;
mod routes;

use config::{FeedSource, TrackerConfig};
use feed::{AirplanesLiveFeed, JsonFileFeed};
use routes::AppState;

#[derive(Parser, Debug)]
#[command(name = "tracker-gateway", version, about = "Aircraft tracking with solar safety")]
struct Args {
    /// JSON configuration file
    #[arg(short, long, env = "TRACKER_CONFIG")]
    config: Option<PathBuf>,

    /// Drive an in-process simulated mount instead of the Alpaca device
    #[arg(long)]
    simulate: bool,

    /// HTTP listen address, overrides the configuration
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "tracker_gateway=debug,mount_control=info,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = TrackerConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let observer = &config.observer;
    info!(
        "Observer {:.4}°, {:.4}° at {:.0} m",
        observer.latitude, observer.longitude, observer.elevation_m
    );

    let mut alpaca = None;
    let device: Arc<dyn MountDevice> = if args.simulate {
        info!("   Mount: simulated");
        Arc::new(
            SimulatedMount::new(HorizontalPosition::default(), config.control.max_rate_deg_s)
                .with_filter_wheel(filter_slots::UV_IR_CUT),
        )
    } else {
        let mount = Arc::new(AlpacaMount::new(config.alpaca.clone())?);
        mount
            .connect()
            .await
            .with_context(|| format!("connecting to mount at {}", config.alpaca.base_url))?;
        alpaca = Some(mount.clone());
        mount
    };

    let feed: Arc<dyn AircraftFeed> = match &config.feed {
        FeedSource::File { path } => {
            info!("   Feed: {}", path.display());
            Arc::new(JsonFileFeed::new(path.clone()))
        }
        FeedSource::AirplanesLive { base_url, radius_nm } => {
            info!("   Feed: {} within {:.0} nm", base_url, radius_nm);
            Arc::new(AirplanesLiveFeed::new(
                base_url.clone(),
                observer.latitude,
                observer.longitude,
                *radius_nm,
            )?)
        }
    };

    if !config.control.solar.enabled {
        warn!("Solar safety DISABLED - sun proximity will not stop tracking");
    }

    let tracker = Tracker::new(
        config.observer.clone(),
        config.control.clone(),
        device,
        feed,
        Arc::new(LowPrecisionSun),
    )?;
    let tasks = tracker.spawn();

    let app = routes::router(AppState {
        tracker: tracker.clone(),
    });

    info!("Tracker gateway starting on {}", config.server.bind);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl-C handler failed: {}", e);
            }
        })
        .await?;

    info!("Shutting down");
    tracker.shutdown().await;
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Periodic task ended abnormally: {}", e);
        }
    }
    if let Some(mount) = alpaca {
        if let Err(e) = mount.disconnect().await {
            warn!("Mount disconnect failed: {}", e);
        }
    }

    Ok(())
}
