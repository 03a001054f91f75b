/*
 *  bin/levels-sim.rs
 *
 *  LeVelS simulator - desktop testing tool
 *
 *  (c) 2020-26 Stuart Hunter
 *
 *  Feeds synthetic PCM through the metering pipeline and runs the
 *  overlay compose loop without a host media framework.
 *
 *  Usage:
 *    cargo run --bin levels-sim
 *    cargo run --bin levels-sim -- --bar-height 120 --position 6
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 */

use anyhow::Result;
use chrono::Utc;
use env_logger::Env;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;

use levels::config::{self, ConfigChange};
use levels::meter::{MeterStage, PcmBlock, Samples};
use levels::overlay::OverlayFilter;
use levels::registry::{SharedStreams, display_name};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = config::load()?;

    let level = cfg.log_level.clone().unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    info!("LeVelS simulator starting (built {})", BUILD_DATE);

    let shared = SharedStreams::new();
    let (data_tx, data_rx) = watch::channel(0u64);
    let data_tx = Arc::new(data_tx);
    let (chg_tx, chg_rx) = mpsc::channel::<ConfigChange>(16);
    let mut filter = OverlayFilter::new(&cfg.bargraph, Arc::clone(&shared), data_rx, chg_rx);

    // stereo program stream: swept tone, right channel padded down
    let entry = shared.add_stream(2, display_name(1, Some("eng")), 1);
    let tone = tokio::spawn(feed_tone(MeterStage::new(entry, Arc::clone(&data_tx))));

    // mono effects stream: noise bursts
    let entry = shared.add_stream(1, display_name(2, None), 2);
    let noise = tokio::spawn(feed_noise(MeterStage::new(entry, Arc::clone(&data_tx))));

    // exercise the runtime control path: alarm on/off every 5 seconds
    let alarm = tokio::spawn(async move {
        let mut on = false;
        loop {
            sleep(Duration::from_secs(5)).await;
            on = !on;
            if chg_tx.send(ConfigChange::Alarm(on)).await.is_err() {
                break;
            }
        }
    });

    // compose at 25 fps until interrupted
    let mut ticker = tokio::time::interval(Duration::from_millis(40));
    let mut emitted = 0u64;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {
                let date = Utc::now().timestamp_micros();
                if let Some(frame) = filter.compose(date) {
                    emitted += 1;
                    match &frame.picture {
                        Some(pic) => debug!(
                            "frame #{emitted}: {}x{} alpha {} labels {}",
                            pic.width, pic.height, frame.alpha, frame.labels.len()
                        ),
                        None => debug!("frame #{emitted}: clear"),
                    }
                    if emitted % 25 == 0 {
                        info!("{emitted} overlay frames emitted");
                    }
                }
            }
        }
    }

    info!("shutting down");
    tone.abort();
    noise.abort();
    alarm.abort();
    Ok(())
}

/// ~48 kHz swept tone blocks; amplitude breathes with a slow LFO so the
/// bars travel the whole scale.
async fn feed_tone(stage: MeterStage) {
    let mut phase = 0f32;
    let mut lfo = 0f32;
    let mut buf = [0i16; 2 * 1024];
    loop {
        for frame in 0..1024 {
            let amp = 0.5 * (1.0 + lfo.sin()) * 0.5;
            let s = phase.sin() * amp;
            buf[frame * 2] = (s * 32767.0) as i16;
            buf[frame * 2 + 1] = (s * 0.25 * 32767.0) as i16;
            phase += 0.142;
            lfo += 0.0005;
        }
        let block = PcmBlock { samples: Samples::S16(&buf), channels: 2 };
        let _ = stage.push_block(&block);
        // ~1024 frames worth of real time
        sleep(Duration::from_millis(21)).await;
    }
}

/// Mostly-quiet noise floor with occasional bursts.
async fn feed_noise(stage: MeterStage) {
    use rand::Rng;
    let mut buf = [0f32; 512];
    loop {
        {
            let mut rng = rand::rng();
            let amp: f32 = if rng.random::<f32>() < 0.3 {
                rng.random_range(0.2..0.9)
            } else {
                0.02
            };
            for s in buf.iter_mut() {
                *s = rng.random_range(-1.0f32..1.0) * amp;
            }
        }
        let block = PcmBlock { samples: Samples::F32(&buf), channels: 1 };
        let _ = stage.push_block(&block);
        sleep(Duration::from_millis(11)).await;
    }
}
