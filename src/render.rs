/*
 *  render.rs
 *
 *  LeVelS - audio bargraph overlay
 *  (c) 2020-26 Stuart Hunter
 *
 *  Rasterizes the shared stream set into the bargraph canvas: fixed
 *  chrome, then one tri-colored bar per channel plus the alarm strip
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use std::sync::Arc;
use thiserror::Error;

use crate::config::BarGraphConfig;
use crate::registry::{SharedStreams, StreamEntry};
use crate::scale::{amplitude_db, iec_scale};
use crate::vframebuf::{Rgba, VarFrameBuf};

/// Gap between bars, px.
pub const BAR_SEPARATOR: u32 = 5;

/// Rows reserved under the bars for the indicator strip and labels; the
/// canvas is `bar_height + 30` tall and bars start 20 rows up.
const BAR_BASE: i32 = 20;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot allocate {width}x{height} bargraph canvas")]
    Alloc { width: u32, height: u32 },
}

/// Render state: the canvas, bar geometry and the alarm/opacity flags.
/// Re-rasterized only when the owning filter sees a dirty signal.
pub struct BarGraph {
    pic: VarFrameBuf,
    bar_width: u32,
    bar_height: u32,
    alarm: bool,
    alpha: u8,
}

impl BarGraph {
    pub fn new(cfg: &BarGraphConfig) -> Self {
        Self {
            pic: VarFrameBuf::new(),
            bar_width: cfg.bar_width,
            bar_height: cfg.bar_height,
            alarm: false,
            alpha: cfg.transparency,
        }
    }

    pub fn picture(&self) -> &VarFrameBuf {
        &self.pic
    }

    pub fn width(&self) -> u32 {
        self.pic.width()
    }

    pub fn height(&self) -> u32 {
        self.pic.height()
    }

    pub fn bar_width(&self) -> u32 {
        self.bar_width
    }

    pub fn bar_height(&self) -> u32 {
        self.bar_height
    }

    pub fn alpha(&self) -> u8 {
        self.alpha
    }

    pub fn alarm(&self) -> bool {
        self.alarm
    }

    pub fn set_bar_width(&mut self, w: u32) {
        self.bar_width = w;
    }

    pub fn set_bar_height(&mut self, h: u32) {
        self.bar_height = h;
    }

    pub fn set_alpha(&mut self, alpha: u8) {
        self.alpha = alpha;
    }

    pub fn set_alarm(&mut self, alarm: bool) {
        self.alarm = alarm;
    }

    /// Canvas dimensions for the current stream set: one leading column
    /// of scale chrome, then `(channels + 1)` bar slots per stream.
    pub fn canvas_size(&self, shared: &SharedStreams) -> (u32, u32) {
        shared.with_streams(|streams| Self::layout(streams, self.bar_width, self.bar_height))
    }

    fn layout(streams: &[Arc<StreamEntry>], bar_width: u32, bar_height: u32) -> (u32, u32) {
        let mut w = bar_width;
        for entry in streams {
            w += (entry.channels() as u32 + 1) * (BAR_SEPARATOR + bar_width);
        }
        (w, bar_height + 30)
    }

    /// Rasterize the current registry state.  Holds the registry lock for
    /// the whole layout-plus-read phase so a concurrent stream removal
    /// can never tear the set mid-frame.  On allocation failure the
    /// previous canvas is retained and the cycle reports the error.
    pub fn draw(&mut self, shared: &SharedStreams) -> Result<(), RenderError> {
        let bar_width = self.bar_width as i32;
        let bar_height = self.bar_height as i32;

        shared.with_streams(|streams| {
            let (w, h) = Self::layout(streams, self.bar_width, self.bar_height);
            if self.pic.resize(w, h).is_err() {
                return Err(RenderError::Alloc { width: w, height: h });
            }
            let h = h as i32;

            self.pic.clear_color(Rgba::TRANSPARENT);

            // reference lines, black behind white for the bevel look
            self.fill(bar_width - 10, 10, 2, bar_height, Rgba::BLACK);
            self.fill(bar_width - 8, 10, 2, bar_height, Rgba::WHITE);

            // tick marks every -10 dB down to -60
            for i in 0..6 {
                let level =
                    (iec_scale(-((i + 1) as f32) * 10.0) * bar_height as f32) as i32 + BAR_BASE;
                self.fill(bar_width - 6, h - 1 - level - 1, 3, 1, Rgba::WHITE);
                self.fill(bar_width - 6, h - 1 - level, 3, 2, Rgba::BLACK);
            }

            let minus8 = (iec_scale(-8.0) * bar_height as f32) as i32 + BAR_BASE;
            let minus18 = (iec_scale(-18.0) * bar_height as f32) as i32 + BAR_BASE;
            let indicator = if self.alarm { Rgba::BRIGHT_RED } else { Rgba::BLACK };

            let mut pi = bar_width;
            for entry in streams {
                // peek latest: a live meter shows the current level, stale
                // backlog is pruned inside the fifo
                let latest = entry.latest();
                for ch in 0..entry.channels() {
                    self.fill(pi, h - BAR_BASE - 1, bar_width, 8, indicator);

                    let peak = latest.as_ref().map(|r| r.channel(ch)).unwrap_or(0.0);
                    let level = if peak > 0.0 {
                        (iec_scale(amplitude_db(peak)) * bar_height as f32)
                            .clamp(0.0, bar_height as f32) as i32
                    } else {
                        0
                    };

                    self.bar_rows(pi, BAR_BASE, BAR_BASE + level, h, minus18, minus8, true);
                    self.bar_rows(
                        pi,
                        BAR_BASE + level,
                        BAR_BASE + bar_height,
                        h,
                        minus18,
                        minus8,
                        false,
                    );
                    pi += (BAR_SEPARATOR as i32) + bar_width;
                }
                pi += (BAR_SEPARATOR as i32) + bar_width;
            }
            Ok(())
        })
    }

    /// One bar's rows [from, to), bottom-up (row r lands at y = h-r-1),
    /// split green/yellow/red at the -18 and -8 dB-equivalent heights.
    fn bar_rows(&mut self, x: i32, from: i32, to: i32, h: i32, minus18: i32, minus8: i32, lit: bool) {
        let (green, yellow, red) = if lit {
            (Rgba::BRIGHT_GREEN, Rgba::BRIGHT_YELLOW, Rgba::BRIGHT_RED)
        } else {
            (Rgba::GREEN, Rgba::YELLOW, Rgba::RED)
        };
        let bar_width = self.bar_width as i32;
        let bands = [
            (from, to.min(minus18), green),
            (from.max(minus18), to.min(minus8), yellow),
            (from.max(minus8), to, red),
        ];
        for (a, b, color) in bands {
            if b > a {
                self.fill(x, h - b, bar_width, b - a, color);
            }
        }
    }

    fn fill(&mut self, x: i32, y: i32, w: i32, h: i32, color: Rgba) {
        if w <= 0 || h <= 0 {
            return;
        }
        // drawing into VarFrameBuf is infallible and clipped
        let _ = Rectangle::new(Point::new(x, y), Size::new(w as u32, h as u32))
            .into_styled(PrimitiveStyle::with_fill(color))
            .draw(&mut self.pic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::{PcmBlock, Samples, extract_peaks};

    fn graph(bar_width: u32, bar_height: u32) -> BarGraph {
        let cfg = BarGraphConfig {
            bar_width,
            bar_height,
            ..Default::default()
        };
        BarGraph::new(&cfg)
    }

    #[test]
    fn test_canvas_dimensions_track_streams() {
        let shared = SharedStreams::new();
        let mut bg = graph(30, 300);

        assert_eq!(bg.canvas_size(&shared), (30, 330));

        let mono = shared.add_stream(1, "1".into(), 1);
        assert_eq!(bg.canvas_size(&shared), (30 + 2 * 35, 330));

        // a second 2-channel stream grows width by exactly (2+1)*(5+30)
        let stereo = shared.add_stream(2, "2".into(), 2);
        assert_eq!(bg.canvas_size(&shared), (30 + 2 * 35 + 3 * 35, 330));

        shared.remove_stream(&stereo);
        shared.remove_stream(&mono);
        bg.draw(&shared).unwrap();
        assert_eq!((bg.width(), bg.height()), (30, 330));
    }

    #[test]
    fn test_draw_twice_reuses_buffer() {
        let shared = SharedStreams::new();
        shared.add_stream(2, "1".into(), 1);
        let mut bg = graph(30, 300);

        bg.draw(&shared).unwrap();
        let ptr = bg.picture().as_slice().as_ptr();
        bg.draw(&shared).unwrap();
        assert_eq!(bg.picture().as_slice().as_ptr(), ptr);
    }

    #[test]
    fn test_draw_reallocates_on_stream_add() {
        let shared = SharedStreams::new();
        shared.add_stream(1, "1".into(), 1);
        let mut bg = graph(30, 300);

        bg.draw(&shared).unwrap();
        let w0 = bg.width();
        shared.add_stream(2, "2".into(), 2);
        bg.draw(&shared).unwrap();
        assert_eq!(bg.width(), w0 + 3 * 35);
    }

    #[test]
    fn test_chrome_on_empty_registry() {
        let shared = SharedStreams::new();
        let mut bg = graph(30, 300);
        bg.draw(&shared).unwrap();

        // white reference line at x = bar_width-8, rows 10..310
        assert_eq!(bg.picture().pixel(22, 10), Some(Rgba::WHITE));
        assert_eq!(bg.picture().pixel(22, 309), Some(Rgba::WHITE));
        assert_eq!(bg.picture().pixel(20, 10), Some(Rgba::BLACK));
        // nothing else: canvas stays transparent
        assert_eq!(bg.picture().pixel(0, 0), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn test_silent_channel_fully_unlit() {
        let shared = SharedStreams::new();
        let entry = shared.add_stream(1, "1".into(), 1);
        let data = [0i16; 64];
        entry.push_record(
            extract_peaks(&PcmBlock { samples: Samples::S16(&data), channels: 1 }).unwrap(),
        );

        let mut bg = graph(30, 300);
        bg.draw(&shared).unwrap();
        let h = bg.height() as i32;

        // bottom bar row (row 20) is dim green, top (row 319) dim red
        assert_eq!(bg.picture().pixel(30, (h - 20 - 1) as u32), Some(Rgba::GREEN));
        assert_eq!(bg.picture().pixel(30, (h - 319 - 1) as u32), Some(Rgba::RED));
    }

    #[test]
    fn test_half_scale_channel_lit_to_level() {
        let shared = SharedStreams::new();
        let entry = shared.add_stream(2, "1".into(), 1);
        let data = [16384i16, 0, 100, 0];
        entry.push_record(
            extract_peaks(&PcmBlock { samples: Samples::S16(&data), channels: 2 }).unwrap(),
        );

        let mut bg = graph(30, 300);
        bg.draw(&shared).unwrap();
        let h = bg.height() as i32;

        // scale(20*log10(0.5)) * 300 = 254.x -> rows 20..274 lit
        let level = (iec_scale(amplitude_db(0.5)) * 300.0) as i32;
        assert_eq!(level, 254);

        // row 250 sits between -18 and -8 equivalents: bright yellow, lit
        assert_eq!(
            bg.picture().pixel(30, (h - 250 - 1) as u32),
            Some(Rgba::BRIGHT_YELLOW)
        );
        // just above the level the bar goes dim (row 274 is past the -8
        // dB-equivalent height 260, hence dim red)
        assert_eq!(
            bg.picture().pixel(30, (h - (20 + level) - 1) as u32),
            Some(Rgba::RED)
        );
        // channel 1 carried nothing close to half scale: dim at row 250
        assert_eq!(
            bg.picture().pixel(30 + 35, (h - 250 - 1) as u32),
            Some(Rgba::YELLOW)
        );
    }

    #[test]
    fn test_alarm_strip() {
        let shared = SharedStreams::new();
        shared.add_stream(1, "1".into(), 1);
        let mut bg = graph(30, 300);

        bg.draw(&shared).unwrap();
        let h = bg.height() as i32;
        // the strip spans y h-21..h-13 but its first row is overdrawn by
        // the bar's bottom row, so sample one row below
        assert_eq!(bg.picture().pixel(30, (h - 20) as u32), Some(Rgba::BLACK));

        bg.set_alarm(true);
        bg.draw(&shared).unwrap();
        assert_eq!(bg.picture().pixel(30, (h - 20) as u32), Some(Rgba::BRIGHT_RED));
    }
}
