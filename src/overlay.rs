/*
 *  overlay.rs
 *
 *  LeVelS - audio bargraph overlay
 *  (c) 2020-26 Stuart Hunter
 *
 *  Overlay layout - places the rendered bargraph and its text labels
 *  on the video frame, gated on the dirty signal
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

use log::error;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::config::{BarGraphConfig, ConfigChange};
use crate::registry::SharedStreams;
use crate::render::{BAR_SEPARATOR, BarGraph};
use crate::scale::iec_scale;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    Center,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAlign {
    Center,
    Top,
    Bottom,
}

/// Where the overlay goes: one of the nine grid positions, or absolute
/// x/y when the configured position code is negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub absolute: bool,
    pub h: HAlign,
    pub v: VAlign,
}

impl Placement {
    /// Decode a position code: 1=left, 2=right, 4=top, 8=bottom, 0=center,
    /// combinable; anything negative selects absolute placement (the
    /// region itself anchors right/top in that mode).
    pub fn from_code(code: i32) -> Placement {
        if code < 0 {
            return Placement {
                absolute: true,
                h: HAlign::Right,
                v: VAlign::Top,
            };
        }
        let h = if code & 1 != 0 {
            HAlign::Left
        } else if code & 2 != 0 {
            HAlign::Right
        } else {
            HAlign::Center
        };
        let v = if code & 4 != 0 {
            VAlign::Top
        } else if code & 8 != 0 {
            VAlign::Bottom
        } else {
            VAlign::Center
        };
        Placement { absolute: false, h, v }
    }

    /// Center never survives anchoring; missing axes fall back to the
    /// near edge (left/top).
    pub fn effective(&self) -> (HAlign, VAlign) {
        (
            if self.h == HAlign::Right { HAlign::Right } else { HAlign::Left },
            if self.v == VAlign::Bottom { VAlign::Bottom } else { VAlign::Top },
        )
    }
}

/// One positioned text label for the host's text renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLabel {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub font_px: u32,
}

/// The rasterized bargraph, positioned.
#[derive(Debug, Clone)]
pub struct BitmapRegion {
    pub x: i32,
    pub y: i32,
    pub halign: HAlign,
    pub valign: VAlign,
    pub width: u32,
    pub height: u32,
    /// Packed RGBA8888, row-major.
    pub data: Vec<u8>,
}

/// What the compositor gets for one output frame.  `picture: None` with
/// an otherwise valid frame means "clear whatever was showing".
#[derive(Debug, Clone)]
pub struct OverlayFrame {
    pub date: i64,
    pub ephemeral: bool,
    pub absolute: bool,
    pub alpha: u8,
    pub picture: Option<BitmapRegion>,
    pub labels: Vec<TextLabel>,
}

/// The overlay side of the pipeline.  Owns the render state; consumes the
/// meter stages' data-generation signal and the host's config-change
/// channel; emits a frame only when something actually changed.
pub struct OverlayFilter {
    graph: BarGraph,
    shared: Arc<SharedStreams>,
    data_rx: watch::Receiver<u64>,
    changes_rx: mpsc::Receiver<ConfigChange>,
    pos: i32,
    pos_x: i32,
    pos_y: i32,
    pending_redraw: bool,
}

impl OverlayFilter {
    pub fn new(
        cfg: &BarGraphConfig,
        shared: Arc<SharedStreams>,
        data_rx: watch::Receiver<u64>,
        changes_rx: mpsc::Receiver<ConfigChange>,
    ) -> Self {
        Self {
            graph: BarGraph::new(cfg),
            shared,
            data_rx,
            changes_rx,
            pos: cfg.position,
            pos_x: cfg.x,
            pos_y: cfg.y,
            // draw the initial state on the first composed frame
            pending_redraw: true,
        }
    }

    pub fn graph(&self) -> &BarGraph {
        &self.graph
    }

    /// Apply one runtime parameter change and schedule a redraw.
    pub fn apply_change(&mut self, change: ConfigChange) {
        match change {
            ConfigChange::X(x) => self.pos_x = x,
            ConfigChange::Y(y) => self.pos_y = y,
            ConfigChange::Position(p) => self.pos = p,
            ConfigChange::Transparency(a) => self.graph.set_alpha(a),
            ConfigChange::BarWidth(w) => self.graph.set_bar_width(w),
            ConfigChange::BarHeight(h) => self.graph.set_bar_height(h),
            ConfigChange::Alarm(on) => self.graph.set_alarm(on),
        }
        self.pending_redraw = true;
    }

    /// Produce the overlay for one output frame, or None when neither
    /// fresh peak data nor a parameter change arrived since the last one.
    pub fn compose(&mut self, date: i64) -> Option<OverlayFrame> {
        while let Ok(change) = self.changes_rx.try_recv() {
            self.apply_change(change);
        }

        let fresh = self.data_rx.has_changed().unwrap_or(false);
        if !self.pending_redraw && !fresh {
            return None;
        }
        if fresh {
            self.data_rx.borrow_and_update();
        }
        self.pending_redraw = false;

        if let Err(e) = self.graph.draw(&self.shared) {
            // keep the previous canvas, try again next frame
            error!("bargraph render failed: {e}");
            self.pending_redraw = true;
            return None;
        }

        let placement = Placement::from_code(self.pos);
        let mut frame = OverlayFrame {
            date,
            ephemeral: true,
            absolute: placement.absolute,
            alpha: self.graph.alpha(),
            picture: None,
            labels: Vec::new(),
        };

        // fully transparent: ship the empty frame so the host clears
        if self.graph.alpha() == 0 || self.graph.picture().is_empty() {
            return Some(frame);
        }

        let (halign, valign) = placement.effective();
        let w = self.graph.width() as i32;
        let h = self.graph.height() as i32;
        frame.picture = Some(BitmapRegion {
            x: self.pos_x,
            y: self.pos_y,
            halign,
            valign,
            width: self.graph.width(),
            height: self.graph.height(),
            data: self.graph.picture().to_rgba_bytes(),
        });

        let font_w = (self.graph.bar_width() as f32 * 0.5) as i32;
        let font_h = (self.graph.bar_width() as f32 * 0.35) as i32;

        // dB scale numbers alongside the tick marks
        const SCALE_TEXT: [&str; 6] = ["10", "20", "30", "40", "50", "60"];
        for (i, text) in SCALE_TEXT.iter().enumerate() {
            let level = (iec_scale(-((i + 1) as f32) * 10.0) * self.graph.bar_height() as f32)
                as i32
                + 20;
            frame.labels.push(self.aligned_label(
                (*text).to_string(),
                self.pos_x,
                h - level - 4 + self.pos_y,
                w,
                h,
                font_w,
                font_h,
            ));
        }

        // stream names under their bar groups, in registry order
        let slot = (self.graph.bar_width() + BAR_SEPARATOR) as i32;
        let bar_width = self.graph.bar_width() as i32;
        let bar_height = self.graph.bar_height() as i32;
        let stream_labels = self.shared.with_streams(|streams| {
            let mut labels = Vec::with_capacity(streams.len());
            let mut x = bar_width;
            for entry in streams {
                labels.push(self.aligned_label(
                    entry.name().to_string(),
                    x + self.pos_x,
                    bar_height + 20 + self.pos_y,
                    w,
                    h,
                    font_w,
                    font_h,
                ));
                x += slot * (entry.channels() as i32 + 1);
            }
            labels
        });
        frame.labels.extend(stream_labels);

        Some(frame)
    }

    /// Offsets are distance-from-near-edge: a right/bottom anchor flips
    /// them across the overlay's bounding box.  Absolute placement keeps
    /// raw coordinates.
    fn aligned_label(
        &self,
        text: String,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        font_w: i32,
        font_h: i32,
    ) -> TextLabel {
        let placement = Placement::from_code(self.pos);
        let (mut lx, mut ly) = (x, y);
        if !placement.absolute {
            let (halign, valign) = placement.effective();
            if halign == HAlign::Right {
                lx = w - x - font_w;
            }
            if valign == VAlign::Bottom {
                ly = h - y - font_h;
            }
        }
        TextLabel {
            text,
            x: lx,
            y: ly,
            font_px: font_w.max(0) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter::{MeterStage, PcmBlock, Samples};
    use crate::vframebuf::Rgba;

    fn filter_parts(
        cfg: BarGraphConfig,
    ) -> (
        OverlayFilter,
        Arc<SharedStreams>,
        Arc<watch::Sender<u64>>,
        mpsc::Sender<ConfigChange>,
    ) {
        let shared = SharedStreams::new();
        let (data_tx, data_rx) = watch::channel(0u64);
        let (chg_tx, chg_rx) = mpsc::channel(16);
        let filter = OverlayFilter::new(&cfg, Arc::clone(&shared), data_rx, chg_rx);
        (filter, shared, Arc::new(data_tx), chg_tx)
    }

    #[test]
    fn test_placement_codes() {
        let p = Placement::from_code(6); // right | top
        assert_eq!((p.h, p.v), (HAlign::Right, VAlign::Top));
        let p = Placement::from_code(9); // left | bottom
        assert_eq!((p.h, p.v), (HAlign::Left, VAlign::Bottom));
        let p = Placement::from_code(0);
        assert_eq!((p.h, p.v), (HAlign::Center, VAlign::Center));
        assert_eq!(p.effective(), (HAlign::Left, VAlign::Top));
        // top-only fills in left
        assert_eq!(Placement::from_code(4).effective(), (HAlign::Left, VAlign::Top));
        assert!(Placement::from_code(-1).absolute);
    }

    #[test]
    fn test_label_flip_bottom_right() {
        let cfg = BarGraphConfig { position: 10, ..Default::default() };
        let (filter, _shared, _tx, _chg) = filter_parts(cfg);
        // bar_width 30 -> font_w 15, font_h 10
        let label = filter.aligned_label("60".into(), 7, 11, 200, 330, 15, 10);
        assert_eq!((label.x, label.y), (200 - 7 - 15, 330 - 11 - 10));
    }

    #[test]
    fn test_absolute_labels_not_flipped() {
        let cfg = BarGraphConfig { position: -1, ..Default::default() };
        let (filter, _shared, _tx, _chg) = filter_parts(cfg);
        let label = filter.aligned_label("60".into(), 7, 11, 200, 330, 15, 10);
        assert_eq!((label.x, label.y), (7, 11));
    }

    #[test]
    fn test_compose_gates_on_dirty() {
        let (mut filter, _shared, _tx, _chg) = filter_parts(BarGraphConfig::default());

        // initial state is pending, first compose emits
        assert!(filter.compose(1).is_some());
        // then nothing changed: silent, twice
        assert!(filter.compose(2).is_none());
        assert!(filter.compose(3).is_none());
    }

    #[test]
    fn test_compose_wakes_on_data() {
        let (mut filter, shared, data_tx, _chg) = filter_parts(BarGraphConfig::default());
        assert!(filter.compose(1).is_some());

        let entry = shared.add_stream(2, "1".into(), 1);
        let stage = MeterStage::new(entry, data_tx);
        let data = [16384i16, 0, 0, 0];
        stage
            .push_block(&PcmBlock { samples: Samples::S16(&data), channels: 2 })
            .unwrap();

        let frame = filter.compose(2).expect("fresh data must compose");
        let pic = frame.picture.expect("opaque frame has a picture");
        assert_eq!(pic.width, 30 + 3 * 35);
        // 6 scale numbers + 1 stream name
        assert_eq!(frame.labels.len(), 7);
        assert_eq!(frame.labels[6].text, "1");
        assert!(filter.compose(3).is_none());
    }

    #[test]
    fn test_config_change_triggers_redraw() {
        let (mut filter, shared, _tx, chg_tx) = filter_parts(BarGraphConfig::default());
        shared.add_stream(1, "1".into(), 1);
        assert!(filter.compose(1).is_some());
        assert!(filter.compose(2).is_none());

        chg_tx.try_send(ConfigChange::Alarm(true)).unwrap();
        let frame = filter.compose(3).expect("alarm change must compose");
        let pic = frame.picture.unwrap();
        // indicator strip went bright red (sampled below the bar's bottom
        // row, which overdraws the strip's first row)
        let h = pic.height as i32;
        let idx = (((h - 20) * pic.width as i32 + 30) * 4) as usize;
        assert_eq!(&pic.data[idx..idx + 4], &[0xFF, 0x00, 0x00, 0xFF]);
        assert_eq!(filter.graph().picture().pixel(30, (h - 20) as u32), Some(Rgba::BRIGHT_RED));
    }

    #[test]
    fn test_alpha_zero_clears() {
        let (mut filter, _shared, _tx, chg_tx) = filter_parts(BarGraphConfig::default());
        chg_tx.try_send(ConfigChange::Transparency(0)).unwrap();
        let frame = filter.compose(1).expect("transparency change composes");
        assert!(frame.picture.is_none());
        assert!(frame.labels.is_empty());
        assert_eq!(frame.alpha, 0);
    }

    #[test]
    fn test_scale_label_positions() {
        let (mut filter, _shared, _tx, _chg) = filter_parts(BarGraphConfig::default());
        let frame = filter.compose(1).expect("first compose");
        let labels = &frame.labels;
        assert_eq!(labels.len(), 6);
        // "10" sits at h - (scale(-10)*300 + 20) - 4
        let level = (iec_scale(-10.0) * 300.0) as i32 + 20;
        assert_eq!(labels[0].text, "10");
        assert_eq!(labels[0].y, 330 - level - 4);
        // labels descend down the canvas as dB drops
        for pair in labels.windows(2) {
            assert!(pair[1].y > pair[0].y);
        }
    }
}
