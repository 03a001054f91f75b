/*
 *  meter.rs
 *
 *  LeVelS - audio bargraph overlay
 *  (c) 2020-26 Stuart Hunter
 *
 *  Peak extraction - one decoded PCM block in, one per-channel peak
 *  record out, queued on the stream's fifo
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

use arrayvec::ArrayVec;
use log::error;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use crate::registry::{MAX_METER_CHANNELS, PeakRecord, StreamEntry};

#[derive(Debug, Error)]
pub enum MeterError {
    #[error("unsupported audio format '{0}'")]
    UnsupportedFormat(String),
    #[error("block has {0} channels, meter caps at {MAX_METER_CHANNELS}")]
    TooManyChannels(usize),
}

/// The PCM layouts the meter understands, decoded from the host's codec
/// tag at stream-add time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
    F64,
}

impl SampleFormat {
    /// Map a decoder codec tag onto a sample format.  Anything outside the
    /// fixed enumeration is an unsupported-format error and the host drops
    /// the stream's blocks.
    pub fn from_tag(tag: &str) -> Result<Self, MeterError> {
        match tag {
            "u8" => Ok(SampleFormat::U8),
            "s16n" | "s16l" => Ok(SampleFormat::S16),
            "s32n" | "s32l" => Ok(SampleFormat::S32),
            "f32l" => Ok(SampleFormat::F32),
            "f64l" => Ok(SampleFormat::F64),
            other => Err(MeterError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Borrowed interleaved sample payload, typed per format.
#[derive(Debug, Clone, Copy)]
pub enum Samples<'a> {
    U8(&'a [u8]),
    S16(&'a [i16]),
    S32(&'a [i32]),
    F32(&'a [f32]),
    F64(&'a [f64]),
}

impl Samples<'_> {
    pub fn format(&self) -> SampleFormat {
        match self {
            Samples::U8(_) => SampleFormat::U8,
            Samples::S16(_) => SampleFormat::S16,
            Samples::S32(_) => SampleFormat::S32,
            Samples::F32(_) => SampleFormat::F32,
            Samples::F64(_) => SampleFormat::F64,
        }
    }
}

/// One decoded audio block as delivered by the decoder callback.
#[derive(Debug, Clone, Copy)]
pub struct PcmBlock<'a> {
    pub samples: Samples<'a>,
    pub channels: usize,
}

/// Per-channel maxima over whole interleaved frames.  The accumulator is
/// seeded with zero, so silence and negative-going signal both meter as
/// zero: this is a maximum detector, not an absolute-peak or RMS one.
/// A trailing partial frame is ignored.
fn channel_maxima<T: Copy + PartialOrd + Default>(
    data: &[T],
    channels: usize,
) -> ArrayVec<T, MAX_METER_CHANNELS> {
    let mut maxima: ArrayVec<T, MAX_METER_CHANNELS> = ArrayVec::new();
    for _ in 0..channels {
        maxima.push(T::default());
    }
    for frame in data.chunks_exact(channels) {
        for (m, &s) in maxima.iter_mut().zip(frame) {
            if s > *m {
                *m = s;
            }
        }
    }
    maxima
}

/// Reduce one block to a peak record, normalized to linear amplitude:
/// u8 loses its 128 bias, s16/s32 divide by full scale, floats pass
/// through (f64 narrowed).
pub fn extract_peaks(block: &PcmBlock<'_>) -> Result<PeakRecord, MeterError> {
    if block.channels > MAX_METER_CHANNELS {
        return Err(MeterError::TooManyChannels(block.channels));
    }
    if block.channels == 0 {
        return Ok(PeakRecord::default());
    }

    let peaks: ArrayVec<f32, MAX_METER_CHANNELS> = match block.samples {
        Samples::U8(data) => channel_maxima(data, block.channels)
            .iter()
            .map(|&v| (v as f32 - 128.0) / 128.0)
            .collect(),
        Samples::S16(data) => channel_maxima(data, block.channels)
            .iter()
            .map(|&v| v as f32 / 32768.0)
            .collect(),
        Samples::S32(data) => channel_maxima(data, block.channels)
            .iter()
            .map(|&v| v as f32 / 2147483648.0)
            .collect(),
        Samples::F32(data) => channel_maxima(data, block.channels).iter().copied().collect(),
        Samples::F64(data) => channel_maxima(data, block.channels)
            .iter()
            .map(|&v| v as f32)
            .collect(),
    };

    Ok(PeakRecord::new(peaks))
}

/// Metering stage for one stream: the decoder subsystem calls
/// `push_block` once per decoded block; records land on the stream's
/// fifo and the shared data generation ticks so the overlay side knows
/// fresh levels are waiting.
pub struct MeterStage {
    entry: Arc<StreamEntry>,
    data_tick: Arc<watch::Sender<u64>>,
}

impl MeterStage {
    pub fn new(entry: Arc<StreamEntry>, data_tick: Arc<watch::Sender<u64>>) -> Self {
        Self { entry, data_tick }
    }

    pub fn entry(&self) -> &Arc<StreamEntry> {
        &self.entry
    }

    /// Decoder callback surface.  The block is consumed either way; a bad
    /// format drops it with an error report and metering continues with
    /// the next block.
    pub fn push_block(&self, block: &PcmBlock<'_>) -> Result<(), MeterError> {
        let record = match extract_peaks(block) {
            Ok(record) => record,
            Err(e) => {
                error!("stream {}: {e}", self.entry.stream_id());
                return Err(e);
            }
        };
        self.entry.push_record(record);
        self.data_tick.send_modify(|g| *g = g.wrapping_add(1));
        Ok(())
    }
}
