use anyhow::Result;
use minifb::{Key, Window, WindowOptions};
use opencv::core::{Mat, Vec3b};
use opencv::prelude::*;

use crate::node::ImageSink;

/// Debug window showing the filtered image.
pub struct MinifbRenderer {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl MinifbRenderer {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self {
            window,
            buffer: vec![0u32; width * height],
            width,
            height,
        })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    /// Copies a BGR Mat into the buffer, cropping or leaving black borders
    /// when sizes differ.
    pub fn draw_frame(&mut self, frame: &Mat) -> Result<()> {
        let frame_width = frame.cols() as usize;
        let frame_height = frame.rows() as usize;

        self.buffer.fill(0);
        for y in 0..self.height.min(frame_height) {
            for x in 0..self.width.min(frame_width) {
                let pixel = frame.at_2d::<Vec3b>(y as i32, x as i32)?;
                self.buffer[y * self.width + x] = pack_rgb(pixel.0);
            }
        }

        Ok(())
    }

    pub fn update(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)?;
        Ok(())
    }
}

impl ImageSink for MinifbRenderer {
    fn show(&mut self, image: &Mat) -> Result<()> {
        self.draw_frame(image)?;
        self.update()
    }

    fn is_open(&self) -> bool {
        MinifbRenderer::is_open(self)
    }
}

/// Opens the window on the first frame, sized to it.
pub struct DebugView {
    title: String,
    window: Option<MinifbRenderer>,
}

impl DebugView {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            window: None,
        }
    }
}

impl ImageSink for DebugView {
    fn show(&mut self, image: &Mat) -> Result<()> {
        if self.window.is_none() {
            let (width, height) = (image.cols() as usize, image.rows() as usize);
            self.window = Some(MinifbRenderer::new(&self.title, width, height)?);
        }
        match self.window.as_mut() {
            Some(window) => window.show(image),
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.window.as_ref().map_or(true, |w| w.is_open())
    }
}

/// BGR -> 0RGB
fn pack_rgb([b, g, r]: [u8; 3]) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}
