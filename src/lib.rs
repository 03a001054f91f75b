/*
 *  lib.rs
 *
 *  LeVelS - audio bargraph overlay
 *  (c) 2020-26 Stuart Hunter
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
//! Audio bargraph overlay: meters decoded PCM streams on the IEC 268-18
//! scale and rasterizes per-channel level bars plus a text layout for a
//! host video compositor.
//!
//! The metering side (`meter`) queues per-block peak records into the
//! shared stream registry (`registry`); the rendering side (`overlay` /
//! `render`) consumes the freshest record per stream once per output
//! frame, gated on an out-of-band dirty signal.

pub mod config;
pub mod meter;
pub mod overlay;
pub mod registry;
pub mod render;
pub mod scale;
pub mod vframebuf;

pub use config::{BarGraphConfig, Config, ConfigChange};
pub use meter::{MeterStage, PcmBlock, SampleFormat, Samples};
pub use overlay::{OverlayFilter, OverlayFrame, Placement, TextLabel};
pub use registry::{PeakRecord, SharedStreams, StreamEntry};
pub use render::BarGraph;
pub use scale::iec_scale;
pub use vframebuf::{Rgba, VarFrameBuf};
