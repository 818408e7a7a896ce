// climacell_exporter - Prometheus metrics exporter for the ClimaCell weather API
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use clap::Parser;
use climacell_exporter::cache::CachingClient;
use climacell_exporter::client::{ClimaCellClient, Location};
use climacell_exporter::collector::{CollectorOptions, ScrapeCoordinator};
use climacell_exporter::config::ExporterConfig;
use climacell_exporter::geo::Geocoder;
use climacell_exporter::http::RequestState;
use reqwest::Client;
use std::error::Error;
use std::io;
use std::process;
use std::sync::Arc;
use tokio::signal::unix::{self, SignalKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = ExporterConfig::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    tracing::info!(message = "powered by ClimaCell", url = "https://www.climacell.co/weather-api");

    if let Err(e) = opts.preflight() {
        tracing::error!(message = "invalid configuration", error = %e);
        process::exit(1)
    }

    let http_client = Client::builder().timeout(opts.timeout()).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    // Resolve the city to coordinates before starting the HTTP server. There's no point
    // in running if we don't know what location to request conditions for.
    let geocoder = Geocoder::new(http_client.clone(), opts.geocoder_url.clone());
    let coords = match geocoder.lookup(&opts.city).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(message = "failed to lookup city", city = %opts.city, error = %e);
            process::exit(1)
        }
    };

    let location = Location::new(coords.latitude, coords.longitude, &opts.city, opts.location_label());
    tracing::info!(
        message = "resolved city",
        city = %location.city,
        latitude = location.latitude,
        longitude = location.longitude,
    );

    let client = ClimaCellClient::new(http_client, opts.api_url.clone(), &opts.api_key, opts.unit_system);
    let fetcher = Arc::new(CachingClient::new(client, opts.cache_ttl()));
    let _janitor = fetcher.spawn_janitor(opts.cache_sweep());

    let coordinator = ScrapeCoordinator::new(
        fetcher,
        CollectorOptions {
            location,
            layers: opts.layers(),
        },
    );

    let state = Arc::new(RequestState::new(coordinator));
    let app = climacell_exporter::http::router(state);
    let bind = opts.bind();
    let server = axum::Server::try_bind(&bind)
        .unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %bind, error = %e);
            process::exit(1)
        })
        .serve(app.into_make_service());

    tracing::info!(
        message = "server started",
        address = %server.local_addr(),
        api_url = %opts.api_url,
        weather = opts.enable_weather,
        air_quality = opts.enable_air_quality,
    );

    server
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        })
        .await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
