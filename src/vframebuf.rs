/*
 *  vframebuf.rs
 *
 *  LeVelS - audio bargraph overlay
 *  (c) 2020-26 Stuart Hunter
 *
 *  Runtime-sized RGBA framebuffer for embedded-graphics.  The bargraph
 *  canvas resizes with the stream set, so the buffer reallocates only
 *  when the computed dimensions actually change.
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

use core::convert::Infallible;
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::PixelColor;
use embedded_graphics::pixelcolor::raw::RawU32;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use std::collections::TryReserveError;

/// Straight (non-premultiplied) RGBA pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Canvas background.
    pub const TRANSPARENT: Rgba = Rgba::new(0x00, 0x00, 0x00, 0x00);

    // The meter palette.  Bright colors light the active bar segment,
    // the dim variants fill the remainder.
    pub const BLACK: Rgba = Rgba::new(0x00, 0x00, 0x00, 0xFF);
    pub const WHITE: Rgba = Rgba::new(0xFF, 0xFF, 0xFF, 0xFF);
    pub const BRIGHT_RED: Rgba = Rgba::new(0xFF, 0x00, 0x00, 0xFF);
    pub const BRIGHT_GREEN: Rgba = Rgba::new(0x00, 0xFF, 0x00, 0xFF);
    pub const BRIGHT_YELLOW: Rgba = Rgba::new(0xFF, 0xFF, 0x00, 0xFF);
    pub const GREEN: Rgba = Rgba::new(0x00, 0x80, 0x00, 0xFF);
    pub const YELLOW: Rgba = Rgba::new(0x80, 0x80, 0x00, 0xFF);
    pub const RED: Rgba = Rgba::new(0x80, 0x00, 0x00, 0xFF);
}

impl PixelColor for Rgba {
    type Raw = RawU32;
}

impl From<RawU32> for Rgba {
    fn from(raw: RawU32) -> Self {
        let v = raw.into_inner();
        Rgba::new((v >> 24) as u8, (v >> 16) as u8, (v >> 8) as u8, v as u8)
    }
}

impl From<Rgba> for RawU32 {
    fn from(c: Rgba) -> Self {
        RawU32::new(
            ((c.r as u32) << 24) | ((c.g as u32) << 16) | ((c.b as u32) << 8) | c.a as u32,
        )
    }
}

/// A runtime-sized RGBA framebuffer for embedded-graphics.
#[derive(Debug, Clone, Default)]
pub struct VarFrameBuf {
    buf: Vec<Rgba>,
    w: usize,
    h: usize,
}

impl VarFrameBuf {
    /// Starts empty (0x0); `resize` allocates on first use.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(&self) -> u32 {
        self.w as u32
    }

    pub fn height(&self) -> u32 {
        self.h as u32
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Match the buffer to (width, height).  Unchanged dimensions reuse
    /// the existing allocation and return Ok(false).  Allocation is
    /// fallible; on failure the previous buffer and dimensions survive
    /// untouched so the caller can keep showing the last good frame.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool, TryReserveError> {
        let (w, h) = (width as usize, height as usize);
        if w == self.w && h == self.h && !self.buf.is_empty() {
            return Ok(false);
        }
        let len = w * h;
        let mut buf: Vec<Rgba> = Vec::new();
        buf.try_reserve_exact(len)?;
        buf.resize(len, Rgba::TRANSPARENT);
        self.buf = buf;
        self.w = w;
        self.h = h;
        Ok(true)
    }

    pub fn clear_color(&mut self, color: Rgba) {
        self.buf.fill(color);
    }

    pub fn as_slice(&self) -> &[Rgba] {
        &self.buf
    }

    /// Copy out as packed RGBA8888 bytes, row-major, for the compositor.
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.buf.len() * 4);
        for px in &self.buf {
            out.extend_from_slice(&[px.r, px.g, px.b, px.a]);
        }
        out
    }

    /// Pixel at (x, y), None when out of bounds.  Test hook.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        self.idx(Point::new(x as i32, y as i32)).map(|i| self.buf[i])
    }

    /// Map (x,y) to linear index; returns None if out of bounds
    #[inline]
    fn idx(&self, p: Point) -> Option<usize> {
        if p.x >= 0 && p.y >= 0 {
            let (x, y) = (p.x as usize, p.y as usize);
            if x < self.w && y < self.h {
                return Some(y * self.w + x);
            }
        }
        None
    }
}

impl OriginDimensions for VarFrameBuf {
    fn size(&self) -> Size {
        Size::new(self.w as u32, self.h as u32)
    }
}

impl DrawTarget for VarFrameBuf {
    type Color = Rgba;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, c) in pixels {
            if let Some(i) = self.idx(p) {
                self.buf[i] = c;
            }
        }
        Ok(())
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.clear_color(color);
        Ok(())
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        // fast path for the rectangle fills the renderer leans on
        let clipped = area.intersection(&self.bounding_box());
        let Size { width, height } = clipped.size;
        if width == 0 || height == 0 {
            return Ok(());
        }
        let (x0, y0) = (clipped.top_left.x as usize, clipped.top_left.y as usize);
        for row in 0..height as usize {
            let base = (y0 + row) * self.w + x0;
            self.buf[base..base + width as usize].fill(color);
        }
        Ok(())
    }
}
