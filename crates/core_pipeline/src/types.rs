//! Core types for the snaplist import pipeline
//!
//! Sources handed to the pipeline, the rotation applied to them, and the
//! capture session owned by whatever front-end drives the camera.

use crate::error::ImportError;
use image::{DynamicImage, ImageDecoder, ImageError, ImageReader, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

/// Immutable image source: a decoded file, a bitmap, or a captured frame
///
/// Always has non-zero width and height; construction fails with
/// `SourceUnavailable` otherwise.
#[derive(Debug, Clone)]
pub struct RawImage {
    image: DynamicImage,
}

impl RawImage {
    /// Wrap an already decoded image
    pub fn from_dynamic(image: DynamicImage) -> Result<Self, ImportError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ImportError::SourceUnavailable {
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(Self { image })
    }

    /// Decode an image file, honouring its embedded EXIF orientation
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let reader = ImageReader::open(path.as_ref())
            .map_err(ImageError::IoError)?
            .with_guessed_format()
            .map_err(ImageError::IoError)?;
        Self::decode_oriented(reader.into_decoder()?)
    }

    /// Decode an in-memory image file, honouring its embedded EXIF orientation
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImportError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(ImageError::IoError)?;
        Self::decode_oriented(reader.into_decoder()?)
    }

    /// Wrap a raw RGBA video frame
    ///
    /// A frame reported as 0x0 (stream not ready yet) or whose buffer does not
    /// match its dimensions is treated as unavailable.
    pub fn from_frame(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, ImportError> {
        if width == 0 || height == 0 || rgba.len() != width as usize * height as usize * 4 {
            return Err(ImportError::SourceUnavailable { width, height });
        }
        let frame = RgbaImage::from_raw(width, height, rgba)
            .ok_or(ImportError::SourceUnavailable { width, height })?;
        Self::from_dynamic(DynamicImage::ImageRgba8(frame))
    }

    fn decode_oriented(mut decoder: impl ImageDecoder) -> Result<Self, ImportError> {
        let orientation = decoder.orientation()?;
        let mut image = DynamicImage::from_decoder(decoder)?;
        image.apply_orientation(orientation);
        Self::from_dynamic(image)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Borrow the underlying bitmap
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// Clockwise rotation in quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Build from a multiple of 90 degrees; negative and >360 values wrap
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Cw90),
            180 => Some(Rotation::Cw180),
            270 => Some(Rotation::Cw270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }

    /// One quarter turn counter-clockwise
    pub fn rotate_left(self) -> Self {
        match self {
            Rotation::None => Rotation::Cw270,
            Rotation::Cw90 => Rotation::None,
            Rotation::Cw180 => Rotation::Cw90,
            Rotation::Cw270 => Rotation::Cw180,
        }
    }

    /// One quarter turn clockwise
    pub fn rotate_right(self) -> Self {
        match self {
            Rotation::None => Rotation::Cw90,
            Rotation::Cw90 => Rotation::Cw180,
            Rotation::Cw180 => Rotation::Cw270,
            Rotation::Cw270 => Rotation::None,
        }
    }

    /// True when width and height trade places
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotation::Cw90 | Rotation::Cw270)
    }
}

/// Which camera the capture session is using
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Facing {
    /// Rear camera, pointed at the list
    #[default]
    Environment,
    /// Front camera
    User,
}

/// Camera state owned by the capture front-end
///
/// Passed by reference into `ImportCoordinator::import_frame`, so the
/// pipeline never reads rotation from anywhere else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSession {
    /// Rotation applied to captured frames
    pub rotation: Rotation,
    /// Active camera
    pub facing: Facing,
    /// Whether the torch is lit (only meaningful if the device supports it)
    pub torch: bool,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// State when the camera view is (re)opened: upright, torch off
    pub fn reset(&mut self) {
        self.rotation = Rotation::None;
        self.torch = false;
    }

    pub fn rotate_left(&mut self) {
        self.rotation = self.rotation.rotate_left();
    }

    pub fn rotate_right(&mut self) {
        self.rotation = self.rotation.rotate_right();
    }

    pub fn switch_facing(&mut self) {
        self.facing = match self.facing {
            Facing::Environment => Facing::User,
            Facing::User => Facing::Environment,
        };
    }

    /// Record the torch state; `supported` is what the device reported
    ///
    /// Returns the resulting state, which stays off on unsupported devices.
    pub fn set_torch(&mut self, on: bool, supported: bool) -> bool {
        self.torch = on && supported;
        self.torch
    }
}
