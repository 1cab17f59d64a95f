// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use sensorium::config::{load_and_validate_config, Config, InterfaceConfig};
use sensorium::interfaces::InterfaceFactory;
use sensorium::peer::{LocalPeerConnector, PeerRuntime};
use sensorium::stream::StreamBuilder;
use sensorium::traits::{CaptureBackend, PeerConnector};
use std::env;
use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

const DEFAULT_SECONDS: u64 = 5;

/// A moving gradient and a sine tone, standing in for a real page.
struct SyntheticCapture {
    started: Instant,
}

#[async_trait]
impl CaptureBackend for SyntheticCapture {
    async fn video(
        &self,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        _max_w: u32,
        _max_h: u32,
    ) -> anyhow::Result<Vec<u8>> {
        let shift = (self.started.elapsed().as_millis() / 10) as u32;
        let mut rgb = Vec::with_capacity((w * h * 3) as usize);
        for row in y..y + h {
            for col in x..x + w {
                rgb.push(((col + shift) % 256) as u8);
                rgb.push(((row + shift) % 256) as u8);
                rgb.push(((col + row) % 256) as u8);
            }
        }
        Ok(rgb)
    }

    async fn audio(&self, samples: usize, sample_rate: u32) -> anyhow::Result<Vec<f32>> {
        let now = self.started.elapsed().as_secs_f32();
        let rate = sample_rate.max(1) as f32;
        Ok((0..samples)
            .map(|i| {
                let t = now - (samples - i) as f32 / rate;
                (TAU * 440.0 * t).sin()
            })
            .collect())
    }
}

/// The config used when no file is given.
fn default_config() -> Config {
    Config {
        interfaces: vec![
            InterfaceConfig::FrameTime {
                fps: 30.0,
                max_ms: None,
            },
            InterfaceConfig::Loopback { count: 4 },
            InterfaceConfig::ImageRect {
                x: 0,
                y: 0,
                width: 4,
                height: 4,
            },
            InterfaceConfig::Audio {
                samples: 64,
                sample_rate: 8000,
            },
            InterfaceConfig::RandomAgent { relative: 0.0 },
        ],
        ..Config::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sensorium=info".parse()?),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: {} [config.yaml|config.toml] [seconds]", args[0]);
        eprintln!("Example: {} configs/demo.yaml 10", args[0]);
        return Ok(());
    }

    let config = match args.get(1) {
        Some(path) => {
            info!("Loading configuration from {}", path);
            load_and_validate_config(path)?
        }
        None => default_config(),
    };
    let seconds = match args.get(2) {
        Some(s) => s.parse()?,
        None => DEFAULT_SECONDS,
    };

    let runtime = Arc::new(PeerRuntime::new(Arc::new(SyntheticCapture {
        started: Instant::now(),
    })));
    let connector: Arc<dyn PeerConnector> = Arc::new(LocalPeerConnector::new(
        runtime,
        config.protocol.max_payload_bytes,
    ));
    let interfaces = InterfaceFactory::new()
        .with_peer(connector, config.protocol.clone())
        .build_all(&config.interfaces);

    println!("Interfaces: {}", interfaces.iter().map(|i| i.name()).collect::<Vec<_>>().join(", "));
    let stream = StreamBuilder::new()
        .settings(config.stream.clone())
        .interfaces(interfaces)
        .open()
        .await?;
    println!(
        "Stream {} open: {} observations, {} actions",
        stream.id(),
        stream.reads(),
        stream.writes()
    );

    tokio::time::sleep(Duration::from_secs(seconds)).await;

    let observations = stream.observations().to_vec();
    let filled = observations.iter().filter(|v| !v.is_nan()).count();
    println!("Period: {:?}", stream.period());
    println!("Steps in flight: {}", stream.steps_in_flight());
    println!("Observations filled: {}/{}", filled, observations.len());

    stream.close().await;
    Ok(())
}
