//! Freehand alpha erasure along a stroke.
//!
//! A stroke is a sequence of points in raster pixel space. The first point
//! stamps a hard-edged disc; each later point walks a Bresenham line from
//! the previous point and stamps the disc at every step, so fast pointer
//! motion leaves no gaps.
//!
//! A pixel at offset `(dx, dy)` from a stamp center is erased when
//! `dx² + dy² < radius²`. A radius of 1 therefore erases exactly the
//! center pixel.

use imageproc::drawing::BresenhamLineIter;

use crate::types::{EngineError, RasterEdit, RgbaImage};

/// A point in raster pixel coordinates. May lie off the raster; only the
/// in-bounds part of each stamp is applied.
pub type Point = (i32, i32);

/// Zero the alpha of every pixel within `radius` of `center`.
///
/// Returns the number of pixels that were visible before the stamp.
pub fn stamp(image: &mut RgbaImage, center: Point, radius: u32) -> usize {
    let r = i64::from(radius);
    // Squares of u32 radii and i32 offsets need more than 64 bits.
    let r2 = i128::from(r) * i128::from(r);
    let (cx, cy) = (i64::from(center.0), i64::from(center.1));
    let (w, h) = (i64::from(image.width()), i64::from(image.height()));
    let mut erased = 0;
    for y in (cy - r + 1).max(0)..(cy + r).min(h) {
        for x in (cx - r + 1).max(0)..(cx + r).min(w) {
            let (dx, dy) = (i128::from(x - cx), i128::from(y - cy));
            if dx * dx + dy * dy >= r2 {
                continue;
            }
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let pixel = image.get_pixel_mut(x as u32, y as u32);
            if pixel.0[3] > 0 {
                pixel.0[3] = 0;
                erased += 1;
            }
        }
    }
    erased
}

/// Stamp along the line from `from` to `to`, both ends included.
pub fn stamp_segment(image: &mut RgbaImage, from: Point, to: Point, radius: u32) -> usize {
    #[expect(clippy::cast_precision_loss)]
    let line = BresenhamLineIter::new(
        (from.0 as f32, from.1 as f32),
        (to.0 as f32, to.1 as f32),
    );
    let mut erased = 0;
    for point in line {
        erased += stamp(image, point, radius);
    }
    erased + stamp(image, to, radius)
}

/// Erase a whole stroke from a copy of `image`.
#[must_use = "returns the erased raster"]
pub fn erase_stroke(image: &RgbaImage, points: &[Point], radius: u32) -> RgbaImage {
    let mut out = image.clone();
    let mut prev = None;
    for &point in points {
        match prev {
            None => stamp(&mut out, point, radius),
            Some(from) => stamp_segment(&mut out, from, point, radius),
        };
        prev = Some(point);
    }
    out
}

struct Stroke {
    before: RgbaImage,
    last: Point,
}

/// Owns the working raster of an interactive erase.
///
/// While a stroke is in progress the raster cannot be read by anything
/// else ([`read`](Self::read) returns [`EngineError::Busy`]), so an
/// automatic reprocess cannot observe or overwrite a half-finished edit.
/// [`finish`](Self::finish) hands back a [`RasterEdit`] spanning the whole
/// stroke for the caller's undo history.
pub struct EraseSession {
    working: RgbaImage,
    radius: u32,
    stroke: Option<Stroke>,
}

impl EraseSession {
    /// Start a session over `working` with the given brush radius.
    #[must_use]
    pub const fn new(working: RgbaImage, radius: u32) -> Self {
        Self {
            working,
            radius,
            stroke: None,
        }
    }

    /// Brush radius in pixels.
    #[must_use]
    pub const fn radius(&self) -> u32 {
        self.radius
    }

    /// Change the brush radius for subsequent points.
    pub const fn set_radius(&mut self, radius: u32) {
        self.radius = radius;
    }

    /// `true` between [`begin`](Self::begin) and [`finish`](Self::finish).
    #[must_use]
    pub const fn is_erasing(&self) -> bool {
        self.stroke.is_some()
    }

    /// Begin a stroke at `point`, stamping it immediately.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Busy`] if a stroke is already in progress.
    pub fn begin(&mut self, point: Point) -> Result<usize, EngineError> {
        if self.is_erasing() {
            return Err(EngineError::Busy("erase stroke already in progress"));
        }
        self.stroke = Some(Stroke {
            before: self.working.clone(),
            last: point,
        });
        Ok(stamp(&mut self.working, point, self.radius))
    }

    /// Continue the stroke to `point`. Starts a stroke if none is active.
    ///
    /// # Errors
    ///
    /// Never fails when a stroke is active; see [`begin`](Self::begin)
    /// otherwise.
    pub fn extend(&mut self, point: Point) -> Result<usize, EngineError> {
        let Some(stroke) = self.stroke.as_mut() else {
            return self.begin(point);
        };
        let from = stroke.last;
        stroke.last = point;
        Ok(stamp_segment(&mut self.working, from, point, self.radius))
    }

    /// End the stroke. Returns the reversible edit, or `None` if no
    /// stroke was in progress.
    ///
    /// # Errors
    ///
    /// Propagates [`EngineError::DimensionMismatch`] from [`RasterEdit::new`].
    pub fn finish(&mut self) -> Result<Option<RasterEdit>, EngineError> {
        let Some(stroke) = self.stroke.take() else {
            return Ok(None);
        };
        RasterEdit::new(stroke.before, self.working.clone()).map(Some)
    }

    /// Borrow the working raster.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Busy`] while a stroke is in progress.
    pub fn read(&self) -> Result<&RgbaImage, EngineError> {
        if self.is_erasing() {
            return Err(EngineError::Busy("erase stroke in progress"));
        }
        Ok(&self.working)
    }

    /// Revert `edit` on the working raster.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Busy`] during a stroke, or
    /// [`EngineError::DimensionMismatch`] if the edit is for another raster.
    pub fn undo(&mut self, edit: &RasterEdit) -> Result<(), EngineError> {
        if self.is_erasing() {
            return Err(EngineError::Busy("erase stroke in progress"));
        }
        edit.undo(&mut self.working)
    }

    /// Re-apply `edit` on the working raster.
    ///
    /// # Errors
    ///
    /// Same as [`undo`](Self::undo).
    pub fn redo(&mut self, edit: &RasterEdit) -> Result<(), EngineError> {
        if self.is_erasing() {
            return Err(EngineError::Busy("erase stroke in progress"));
        }
        edit.redo(&mut self.working)
    }

    /// Release the working raster.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Busy`] while a stroke is in progress.
    pub fn into_inner(self) -> Result<RgbaImage, EngineError> {
        if self.is_erasing() {
            return Err(EngineError::Busy("erase stroke in progress"));
        }
        Ok(self.working)
    }
}
