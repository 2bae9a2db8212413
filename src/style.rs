//! Turns a finished [`Matrix`] and the caller's [`Options`] into a [`RenderPlan`]:
//! pixel geometry, per-cell shape choices, resolved fills and the logo overlay.
//!
//! The plan does not depend on the output backend; the SVG writer and the
//! rasterizer both walk the same plan.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::GenericImageView;
use tracing::debug;

use crate::error::{QrStyleError, Result};
use crate::matrix::{Matrix, ModuleRole};
use crate::shapes::{Neighbors, Rect};
use crate::types::{CornerDotShape, CornerSquareShape, DotShape, Fill, Options};

const FINDER_SIDE: usize = 7;

/// What a cell belongs to, for styling purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    /// Outer ring of a finder pattern.
    CornerSquare,
    /// Inner 3×3 of a finder pattern.
    CornerDot,
    Plain,
}

/// Shape a drawn cell is covered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementShape {
    /// Drawn on its own with a dot shape.
    Dot(DotShape),
    /// Covered by the finder's single corner-square outline.
    CornerSquare(CornerSquareShape),
    /// Covered by the finder's single corner-dot outline.
    CornerDot(CornerDotShape),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedCell {
    pub x: usize,
    pub y: usize,
    pub kind: CellKind,
    /// Index into [`RenderPlan::finders`] for corner cells.
    pub finder: Option<usize>,
    pub shape: ElementShape,
    pub neighbors: Neighbors,
}

/// Centered square of modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleSquare {
    pub start: usize,
    pub side: usize,
}

impl ModuleSquare {
    /// Grows `side` by one when needed so the square sits on whole modules around the center.
    pub fn centered(matrix_size: usize, side: usize) -> Self {
        let side = if (matrix_size - side.min(matrix_size)) % 2 == 1 { side + 1 } else { side };
        let side = side.min(matrix_size);
        Self { start: (matrix_size - side) / 2, side }
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        let range = self.start..self.start + self.side;
        range.contains(&x) && range.contains(&y)
    }

    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let range = self.start..self.start + self.side;
        range.clone().flat_map(move |y| range.clone().map(move |x| (x, y)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedLogo {
    /// Where the logo is drawn, aspect ratio kept.
    pub rect: Rect,
    /// Modules kept free for the logo.
    pub square: ModuleSquare,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl PlannedLogo {
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub width: u32,
    pub height: u32,
    pub matrix_size: usize,
    pub module_size: f32,
    /// Pixel position of the matrix's top-left corner.
    pub origin: (f32, f32),
    /// Every dark cell that is drawn, row-major.
    pub cells: Vec<PlannedCell>,
    /// Module origins of the top-left, top-right and bottom-left finders.
    pub finders: [(usize, usize); 3],
    pub corner_square_shape: Option<CornerSquareShape>,
    pub corner_dot_shape: Option<CornerDotShape>,
    pub background: Option<Fill>,
    pub dots_fill: Fill,
    pub corner_square_fill: Fill,
    pub corner_dot_fill: Fill,
    pub logo: Option<PlannedLogo>,
    /// Data cells left empty under the logo.
    pub cleared: Vec<(usize, usize)>,
}

impl RenderPlan {
    pub fn cell_rect(&self, x: usize, y: usize) -> Rect {
        Rect::square(
            self.origin.0 + x as f32 * self.module_size,
            self.origin.1 + y as f32 * self.module_size,
            self.module_size,
        )
    }

    pub fn matrix_rect(&self) -> Rect {
        Rect::square(self.origin.0, self.origin.1, self.matrix_size as f32 * self.module_size)
    }

    pub fn canvas_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f32, self.height as f32)
    }

    pub fn corner_square_rect(&self, finder: usize) -> Rect {
        let (x, y) = self.finders[finder];
        let cell = self.cell_rect(x, y);
        Rect::square(cell.x, cell.y, FINDER_SIDE as f32 * self.module_size)
    }

    pub fn corner_dot_rect(&self, finder: usize) -> Rect {
        let (x, y) = self.finders[finder];
        let cell = self.cell_rect(x + 2, y + 2);
        Rect::square(cell.x, cell.y, 3.0 * self.module_size)
    }

    /// Styling class of any cell, drawn or not.
    pub fn classify(&self, x: usize, y: usize) -> (CellKind, Option<usize>) {
        classify(&self.finders, x, y)
    }
}

fn finder_origins(size: usize) -> [(usize, usize); 3] {
    [(0, 0), (size - FINDER_SIDE, 0), (0, size - FINDER_SIDE)]
}

fn classify(finders: &[(usize, usize); 3], x: usize, y: usize) -> (CellKind, Option<usize>) {
    for (i, &(fx, fy)) in finders.iter().enumerate() {
        if (fx..fx + FINDER_SIDE).contains(&x) && (fy..fy + FINDER_SIDE).contains(&y) {
            let (dx, dy) = (x - fx, y - fy);
            let kind = if (2..5).contains(&dx) && (2..5).contains(&dy) {
                CellKind::CornerDot
            } else {
                CellKind::CornerSquare
            };
            return (kind, Some(i));
        }
    }
    (CellKind::Plain, None)
}

/// Module size and matrix origin: the drawing area is the shorter side minus the
/// margin on both ends, split into whole-pixel modules and centered.
pub fn geometry(matrix_size: usize, width: u32, height: u32, margin: u32) -> Result<(f32, (f32, f32))> {
    let count = matrix_size as u32;
    let drawable = width.min(height).saturating_sub(margin.saturating_mul(2));
    let module = drawable / count;
    if module == 0 {
        return Err(QrStyleError::Config(format!(
            "{width}x{height} with margin {margin} leaves no room for a {count}x{count} symbol"
        )));
    }
    let offset_x = (width - count * module) / 2;
    let offset_y = (height - count * module) / 2;
    Ok((module as f32, (offset_x as f32, offset_y as f32)))
}

/// Largest number of data modules a logo of `image_size` may cover: the level's
/// fraction of `image_size × size²`, never more than that fraction of the raw data modules.
pub fn obscured_budget(matrix: &Matrix, image_size: f32) -> usize {
    let raw = matrix.version().raw_data_modules() as f32;
    let requested = image_size * (matrix.size() * matrix.size()) as f32;
    (matrix.level().recoverable_fraction() * raw.min(requested)).floor() as usize
}

/// Data cells under `square`, or `ImageTooLarge` if the square touches a structural
/// pattern or covers more than `budget` data modules.
pub fn overlay_cells(matrix: &Matrix, square: ModuleSquare, budget: usize) -> Result<Vec<(usize, usize)>> {
    let mut obscured = Vec::new();
    for (x, y) in square.cells() {
        match matrix.role(x, y) {
            ModuleRole::Data => obscured.push((x, y)),
            ModuleRole::Alignment => {}
            role => {
                return Err(QrStyleError::ImageTooLarge {
                    reason: format!(
                        "a {side}x{side} module area reaches the {role:?} pattern at ({x}, {y})",
                        side = square.side
                    ),
                });
            }
        }
    }
    if obscured.len() > budget {
        return Err(QrStyleError::ImageTooLarge {
            reason: format!(
                "{} data modules covered, level {} tolerates {budget}",
                obscured.len(),
                matrix.level()
            ),
        });
    }
    Ok(obscured)
}

fn looks_like_svg(bytes: &[u8]) -> bool {
    let text = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let start = text.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(text.len());
    let head = &text[start..text.len().min(start + 512)];
    head.starts_with(b"<svg") || (head.starts_with(b"<?xml") && head.windows(4).any(|w| w == b"<svg"))
}

/// Intrinsic size and MIME type of the logo bytes.
pub fn inspect_logo(bytes: &[u8]) -> Result<(f32, f32, &'static str)> {
    if looks_like_svg(bytes) {
        let tree = usvg::Tree::from_data(bytes, &usvg::Options::default())
            .map_err(|e| QrStyleError::InvalidSvg(e.to_string()))?;
        let size = tree.size();
        return Ok((size.width(), size.height(), "image/svg+xml"));
    }

    let format = image::guess_format(bytes).map_err(|e| QrStyleError::ImageLoad(e.to_string()))?;
    let mime = match format {
        image::ImageFormat::Png => "image/png",
        image::ImageFormat::Jpeg => "image/jpeg",
        image::ImageFormat::Gif => "image/gif",
        image::ImageFormat::WebP => "image/webp",
        other => return Err(QrStyleError::ImageLoad(format!("unsupported logo format {other:?}"))),
    };
    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| QrStyleError::ImageLoad(e.to_string()))?;
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(QrStyleError::ImageLoad("logo has no pixels".into()));
    }
    Ok((w as f32, h as f32, mime))
}

/// Sizes the logo and the module square cleared for it. The square shrinks one
/// ring at a time until it fits the level budget and stays off structural patterns.
fn plan_logo(
    matrix: &Matrix,
    options: &Options,
    module_size: f32,
    origin: (f32, f32),
) -> Result<Option<(PlannedLogo, Vec<(usize, usize)>)>> {
    let Some(bytes) = options.image.as_ref() else {
        return Ok(None);
    };
    let image_options = &options.image_options;
    if !image_options.image_size.is_finite() || image_options.image_size <= 0.0 {
        return Err(QrStyleError::Config(format!(
            "image_size must be positive, got {}",
            image_options.image_size
        )));
    }

    let (intrinsic_w, intrinsic_h, mime) = inspect_logo(bytes)?;
    let count = matrix.size();
    let requested = image_options.image_size * count as f32 * module_size;
    let halo = if image_options.hide_background_dots {
        2.0 * image_options.margin as f32
    } else {
        0.0
    };
    let budget = obscured_budget(matrix, image_options.image_size);

    let mut square = ModuleSquare::centered(count, ((requested + halo) / module_size).ceil() as usize);
    let cleared = loop {
        match overlay_cells(matrix, square, budget) {
            Ok(cleared) => break cleared,
            Err(e) if square.side <= 2 => return Err(e),
            Err(_) => square = ModuleSquare::centered(count, square.side - 2),
        }
    };

    let side = requested.min(square.side as f32 * module_size - halo);
    if side <= 0.0 {
        return Err(QrStyleError::ImageTooLarge {
            reason: format!(
                "a {}px logo margin leaves no room inside the {k}x{k} modules level {} allows",
                image_options.margin,
                matrix.level(),
                k = square.side
            ),
        });
    }
    if side < requested {
        debug!(requested, side, modules = square.side, budget, "logo shrunk to fit");
    }

    let scale = (side / intrinsic_w).min(side / intrinsic_h);
    let (w, h) = (intrinsic_w * scale, intrinsic_h * scale);
    let center = origin.0 + count as f32 * module_size / 2.0;
    let middle = origin.1 + count as f32 * module_size / 2.0;
    let logo = PlannedLogo {
        rect: Rect::new(center - w / 2.0, middle - h / 2.0, w, h),
        square,
        mime,
        bytes: bytes.clone(),
    };
    Ok(Some((logo, cleared)))
}

fn check_fill(element: &str, fill: &Fill) -> Result<()> {
    let invalid = |what: String| -> Result<()> { Err(QrStyleError::Config(format!("{element} fill: {what}"))) };
    let stops = match fill {
        Fill::Solid { .. } => return Ok(()),
        Fill::Linear { rotation, .. } if !rotation.is_finite() => {
            return invalid(format!("rotation must be finite, got {rotation}"));
        }
        Fill::Radial { center: Some([x, y]), .. } if !(x.is_finite() && y.is_finite()) => {
            return invalid(format!("center must be finite, got [{x}, {y}]"));
        }
        Fill::Linear { stops, .. } | Fill::Radial { stops, .. } => stops,
    };
    if stops.is_empty() {
        return invalid("gradient needs at least one color stop".into());
    }
    match stops.iter().find(|stop| !stop.offset.is_finite()) {
        Some(stop) => invalid(format!("stop offset must be finite, got {}", stop.offset)),
        None => Ok(()),
    }
}

/// Resolves `options` against `matrix`.
pub fn resolve(matrix: &Matrix, options: &Options) -> Result<RenderPlan> {
    let size = matrix.size();
    let (module_size, origin) = geometry(size, options.width, options.height, options.margin)?;
    let finders = finder_origins(size);

    check_fill("dots", &options.dots_options.fill)?;
    for (element, fill) in [
        ("corner square", &options.corners_square_options.fill),
        ("corner dot", &options.corners_dot_options.fill),
        ("background", &options.background_options.fill),
    ] {
        if let Some(fill) = fill {
            check_fill(element, fill)?;
        }
    }

    let (logo, cleared) = match plan_logo(matrix, options, module_size, origin)? {
        Some((logo, cleared)) => (Some(logo), cleared),
        None => (None, Vec::new()),
    };
    let mut is_cleared = vec![false; size * size];
    for &(x, y) in &cleared {
        is_cleared[y * size + x] = true;
    }

    let dot_shape = options.dots_options.shape;
    let corner_square_shape = options.corners_square_options.shape;
    let corner_dot_shape = options.corners_dot_options.shape;
    let drawn = |x: usize, y: usize| matrix.is_dark(x, y) && !is_cleared[y * size + x];

    let mut cells = Vec::new();
    for y in 0..size {
        for x in 0..size {
            if !drawn(x, y) {
                continue;
            }
            let (kind, finder) = classify(&finders, x, y);
            let shape = match kind {
                CellKind::CornerSquare => corner_square_shape.map_or(ElementShape::Dot(dot_shape), ElementShape::CornerSquare),
                CellKind::CornerDot => corner_dot_shape.map_or(ElementShape::Dot(dot_shape), ElementShape::CornerDot),
                CellKind::Plain => ElementShape::Dot(dot_shape),
            };

            let same_group = |nx: isize, ny: isize| {
                matrix.is_dark_at(nx, ny)
                    && drawn(nx as usize, ny as usize)
                    && classify(&finders, nx as usize, ny as usize) == (kind, finder)
            };
            let (xi, yi) = (x as isize, y as isize);
            let mut neighbors = Neighbors::NONE;
            for (dx, dy, side) in [
                (-1, 0, Neighbors::LEFT),
                (0, -1, Neighbors::TOP),
                (1, 0, Neighbors::RIGHT),
                (0, 1, Neighbors::BOTTOM),
            ] {
                if same_group(xi + dx, yi + dy) {
                    neighbors = neighbors | side;
                }
            }

            cells.push(PlannedCell { x, y, kind, finder, shape, neighbors });
        }
    }

    let dots_fill = options.dots_options.fill.clone();
    let corner_square_fill = options.corners_square_options.fill.clone().unwrap_or_else(|| dots_fill.clone());
    let corner_dot_fill = options.corners_dot_options.fill.clone().unwrap_or_else(|| dots_fill.clone());

    debug!(
        size,
        module_size,
        cells = cells.len(),
        cleared = cleared.len(),
        "resolved render plan"
    );

    Ok(RenderPlan {
        width: options.width,
        height: options.height,
        matrix_size: size,
        module_size,
        origin,
        cells,
        finders,
        corner_square_shape,
        corner_dot_shape,
        background: options.background_options.fill.clone(),
        dots_fill,
        corner_square_fill,
        corner_dot_fill,
        logo,
        cleared,
    })
}
