use std::fmt::{self, Write as _};
use std::io::Cursor;

use tracing::debug;

use crate::error::{QrStyleError, Result};
use crate::shapes::{DrawShape, Neighbors, Path, Rect, num};
use crate::style::{CellKind, ElementShape, RenderPlan};
use crate::types::{ColorStop, ExportFormat, Fill, OutputBackend};

/// A rendered symbol, either as pixels or as an SVG document.
#[derive(Clone)]
pub enum RenderedOutput {
    Raster(tiny_skia::Pixmap),
    Vector { svg: String, width: u32, height: u32 },
}

impl RenderedOutput {
    pub fn backend(&self) -> OutputBackend {
        match self {
            Self::Raster(_) => OutputBackend::Raster,
            Self::Vector { .. } => OutputBackend::Vector,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Raster(pixmap) => (pixmap.width(), pixmap.height()),
            Self::Vector { width, height, .. } => (*width, *height),
        }
    }
}

impl fmt::Debug for RenderedOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.dimensions();
        f.debug_struct("RenderedOutput")
            .field("backend", &self.backend())
            .field("width", &width)
            .field("height", &height)
            .finish()
    }
}

/// Writes the paint for `fill` over `area`, adding a gradient to `defs` when needed.
/// Returns the paint attributes for the filled element.
fn paint(defs: &mut String, id: &str, fill: &Fill, area: Rect) -> String {
    match fill {
        Fill::Solid { color } if color.a == 255 => format!(r#"fill="{}""#, color.hex_rgb()),
        Fill::Solid { color } => format!(r#"fill="{}" fill-opacity="{}""#, color.hex_rgb(), num(color.opacity())),
        Fill::Linear { rotation, stops } => {
            let (cx, cy) = area.center();
            let (sin, cos) = rotation.sin_cos();
            let half = (area.width * cos.abs() + area.height * sin.abs()) / 2.0;
            let _ = write!(
                defs,
                r#"<linearGradient id="{id}" gradientUnits="userSpaceOnUse" x1="{}" y1="{}" x2="{}" y2="{}">"#,
                num(cx - half * cos),
                num(cy - half * sin),
                num(cx + half * cos),
                num(cy + half * sin),
            );
            write_stops(defs, stops);
            defs.push_str("</linearGradient>");
            format!(r#"fill="url(#{id})""#)
        }
        Fill::Radial { center, stops } => {
            let [rx, ry] = center.unwrap_or([0.5, 0.5]);
            let cx = area.x + rx * area.width;
            let cy = area.y + ry * area.height;
            let r = (rx.max(1.0 - rx) * area.width).hypot(ry.max(1.0 - ry) * area.height);
            let _ = write!(
                defs,
                r#"<radialGradient id="{id}" gradientUnits="userSpaceOnUse" cx="{}" cy="{}" r="{}">"#,
                num(cx),
                num(cy),
                num(r),
            );
            write_stops(defs, stops);
            defs.push_str("</radialGradient>");
            format!(r#"fill="url(#{id})""#)
        }
    }
}

fn write_stops(defs: &mut String, stops: &[ColorStop]) {
    for stop in stops {
        let _ = write!(
            defs,
            r#"<stop offset="{}" stop-color="{}""#,
            num(stop.offset.clamp(0.0, 1.0)),
            stop.color.hex_rgb()
        );
        if stop.color.a != 255 {
            let _ = write!(defs, r#" stop-opacity="{}""#, num(stop.color.opacity()));
        }
        defs.push_str("/>");
    }
}

/// One element group: `path` becomes a clip path over a rect painted with `fill`.
fn write_element(body: &mut String, defs: &mut String, id: &str, path: &Path, fill: &Fill, area: Rect) {
    if path.is_empty() {
        return;
    }
    let _ = write!(
        defs,
        r#"<clipPath id="clip-{id}"><path clip-rule="evenodd" d="{}"/></clipPath>"#,
        path.to_svg_data()
    );
    let paint = paint(defs, &format!("fill-{id}"), fill, area);
    let _ = write!(
        body,
        r#"<rect x="{}" y="{}" width="{}" height="{}" clip-path="url(#clip-{id})" {paint}/>"#,
        num(area.x),
        num(area.y),
        num(area.width),
        num(area.height),
    );
}

/// SVG document for the plan. The raster backend renders this same document.
pub fn to_svg(plan: &RenderPlan) -> String {
    let mut dots = Path::new();
    let mut squares: [Path; 3] = Default::default();
    let mut centers: [Path; 3] = Default::default();

    for cell in &plan.cells {
        let ElementShape::Dot(shape) = cell.shape else {
            continue;
        };
        let outline = shape.draw(plan.cell_rect(cell.x, cell.y), cell.neighbors);
        match (cell.kind, cell.finder) {
            (CellKind::CornerSquare, Some(f)) => squares[f].append(outline),
            (CellKind::CornerDot, Some(f)) => centers[f].append(outline),
            _ => dots.append(outline),
        }
    }
    for f in 0..plan.finders.len() {
        if let Some(shape) = plan.corner_square_shape {
            squares[f] = shape.draw(plan.corner_square_rect(f), Neighbors::NONE);
        }
        if let Some(shape) = plan.corner_dot_shape {
            centers[f] = shape.draw(plan.corner_dot_rect(f), Neighbors::NONE);
        }
    }

    let mut defs = String::new();
    let mut body = String::new();

    if let Some(fill) = &plan.background {
        let canvas = plan.canvas_rect();
        let paint = paint(&mut defs, "background", fill, canvas);
        let _ = write!(body, r#"<rect x="0" y="0" width="{}" height="{}" {paint}/>"#, plan.width, plan.height);
    }

    write_element(&mut body, &mut defs, "dots", &dots, &plan.dots_fill, plan.matrix_rect());
    for f in 0..plan.finders.len() {
        let id = format!("corner-square-{f}");
        write_element(&mut body, &mut defs, &id, &squares[f], &plan.corner_square_fill, plan.corner_square_rect(f));
        let id = format!("corner-dot-{f}");
        write_element(&mut body, &mut defs, &id, &centers[f], &plan.corner_dot_fill, plan.corner_dot_rect(f));
    }

    if let Some(logo) = &plan.logo {
        let _ = write!(
            body,
            r#"<image x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="xMidYMid meet" xlink:href="{}"/>"#,
            num(logo.rect.x),
            num(logo.rect.y),
            num(logo.rect.width),
            num(logo.rect.height),
            logo.data_uri(),
        );
    }

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = plan.width,
        h = plan.height,
    );
    if !defs.is_empty() {
        let _ = write!(svg, "<defs>{defs}</defs>");
    }
    svg.push_str(&body);
    svg.push_str("</svg>");
    svg
}

/// Rasterizes an SVG document to exactly `width`×`height` pixels.
pub fn rasterize(svg: &str, width: u32, height: u32) -> Result<tiny_skia::Pixmap> {
    let tree = usvg::Tree::from_str(svg, &usvg::Options::default())
        .map_err(|e| QrStyleError::InvalidSvg(e.to_string()))?;
    let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or(QrStyleError::RenderFailed)?;

    let svg_size = tree.size();
    let sx = width as f32 / svg_size.width();
    let sy = height as f32 / svg_size.height();
    let scale = sx.min(sy);

    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );
    Ok(pixmap)
}

pub fn render(plan: &RenderPlan, backend: OutputBackend) -> Result<RenderedOutput> {
    let svg = to_svg(plan);
    debug!(%backend, bytes = svg.len(), "rendering plan");
    match backend {
        OutputBackend::Vector => Ok(RenderedOutput::Vector {
            svg,
            width: plan.width,
            height: plan.height,
        }),
        OutputBackend::Raster => Ok(RenderedOutput::Raster(rasterize(&svg, plan.width, plan.height)?)),
    }
}

fn to_rgba(pixmap: &tiny_skia::Pixmap) -> Result<image::RgbaImage> {
    let data = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    image::RgbaImage::from_raw(pixmap.width(), pixmap.height(), data).ok_or(QrStyleError::RenderFailed)
}

/// Composites onto white for formats without an alpha channel.
fn flatten(rgba: &image::RgbaImage) -> image::RgbImage {
    image::RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| ((c as u16 * a as u16 + 255 * (255 - a as u16)) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

fn encode_pixmap(pixmap: &tiny_skia::Pixmap, format: ExportFormat) -> Result<Vec<u8>> {
    let image_format = match format {
        ExportFormat::Png => {
            return pixmap.encode_png().map_err(|e| QrStyleError::Encode {
                format,
                message: e.to_string(),
            });
        }
        ExportFormat::Jpeg => image::ImageFormat::Jpeg,
        ExportFormat::Webp => image::ImageFormat::WebP,
        ExportFormat::Bmp => image::ImageFormat::Bmp,
        ExportFormat::Svg => {
            return Err(QrStyleError::UnsupportedOutputFormat {
                backend: OutputBackend::Raster,
                format,
            });
        }
    };

    let rgba = to_rgba(pixmap)?;
    let img = match format {
        ExportFormat::Jpeg => image::DynamicImage::ImageRgb8(flatten(&rgba)),
        _ => image::DynamicImage::ImageRgba8(rgba),
    };
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image_format)
        .map_err(|e| QrStyleError::Encode {
            format,
            message: e.to_string(),
        })?;
    Ok(buf)
}

/// Serializes rendered output. Raster output has no vector form; vector output is
/// rasterized for the pixel formats.
pub fn export(output: &RenderedOutput, format: ExportFormat) -> Result<Vec<u8>> {
    let bytes = match output {
        RenderedOutput::Vector { svg, .. } if format == ExportFormat::Svg => svg.clone().into_bytes(),
        RenderedOutput::Vector { svg, width, height } => encode_pixmap(&rasterize(svg, *width, *height)?, format)?,
        RenderedOutput::Raster(pixmap) => encode_pixmap(pixmap, format)?,
    };
    debug!(%format, bytes = bytes.len(), "exported");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder;
    use crate::matrix::Matrix;
    use crate::style;
    use crate::types::{Color, CornerDotShape, CornerSquareShape, DotShape, Options, QrOptions};

    fn plan(options: &Options) -> RenderPlan {
        let encoded = encoder::encode(&options.data, &options.qr_options).unwrap();
        let matrix = Matrix::build(&encoded, None).unwrap();
        style::resolve(&matrix, options).unwrap()
    }

    fn hello() -> Options {
        Options {
            data: "HELLO".into(),
            qr_options: QrOptions {
                version: Some(1),
                ..QrOptions::default()
            },
            ..Options::default()
        }
    }

    fn luma(pixmap: &tiny_skia::Pixmap, x: u32, y: u32) -> u8 {
        let c = pixmap.pixel(x, y).unwrap().demultiply();
        ((c.red() as u16 + c.green() as u16 + c.blue() as u16) / 3) as u8
    }

    #[test]
    fn svg_structure() {
        let svg = to_svg(&plan(&hello()));
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\""));
        assert!(svg.contains(r#"viewBox="0 0 300 300""#));
        assert!(svg.contains(r##"<rect x="0" y="0" width="300" height="300" fill="#ffffff"/>"##));
        assert!(svg.contains(r#"clip-path="url(#clip-dots)""#));
        for f in 0..3 {
            assert!(svg.contains(&format!("clip-corner-square-{f}")));
            assert!(svg.contains(&format!("clip-corner-dot-{f}")));
        }
        assert!(!svg.contains("<image"));
        assert!(svg.ends_with("</svg>"));
        usvg::Tree::from_str(&svg, &usvg::Options::default()).unwrap();
    }

    #[test]
    fn gradients_land_in_defs() {
        let mut options = hello();
        options.dots_options.fill = Fill::Linear {
            rotation: 0.0,
            stops: vec![
                ColorStop { offset: 0.0, color: Color::rgb(0x0f, 0x17, 0x2a) },
                ColorStop { offset: 1.0, color: Color { r: 0x25, g: 0x63, b: 0xeb, a: 128 } },
            ],
        };
        options.background_options.fill = Some(Fill::Radial {
            center: None,
            stops: vec![ColorStop { offset: 0.0, color: Color::WHITE }],
        });
        let svg = to_svg(&plan(&options));
        // 294 px matrix starting at 3 px: the gradient runs edge to edge.
        assert!(svg.contains(r#"<linearGradient id="fill-dots" gradientUnits="userSpaceOnUse" x1="3" y1="150" x2="297" y2="150">"#));
        assert!(svg.contains(r##"<stop offset="1" stop-color="#2563eb" stop-opacity="0.502"/>"##));
        assert!(svg.contains(r#"<radialGradient id="background" gradientUnits="userSpaceOnUse" cx="150" cy="150""#));
        assert!(svg.contains(r#"fill="url(#fill-dots)""#));
        // Corners inherit the dots gradient, each over its own box.
        assert!(svg.contains(r#"id="fill-corner-square-0""#));
    }

    #[test]
    fn transparent_background_has_no_rect() {
        let mut options = hello();
        options.background_options.fill = None;
        let plan = plan(&options);
        let svg = to_svg(&plan);
        assert!(!svg.contains(r#"<rect x="0" y="0""#));
        let pixmap = rasterize(&svg, 300, 300).unwrap();
        assert_eq!(pixmap.pixel(1, 1).unwrap().alpha(), 0);
    }

    #[test]
    fn corner_outlines_replace_cells() {
        let mut options = hello();
        options.corners_square_options.shape = Some(CornerSquareShape::Dot);
        options.corners_dot_options.shape = Some(CornerDotShape::Dot);
        let svg = to_svg(&plan(&options));
        // Outer circle of the top-left ring: radius 3.5 modules of 14 px.
        assert!(svg.contains("A49 49 0 0 1"));
        assert!(svg.contains("A21 21 0 0 1"));
    }

    #[test]
    fn raster_matches_geometry() {
        let options = Options {
            dots_options: crate::types::DotsOptions {
                shape: DotShape::Rounded,
                ..Default::default()
            },
            ..hello()
        };
        let plan = plan(&options);
        let output = render(&plan, OutputBackend::Raster).unwrap();
        let RenderedOutput::Raster(pixmap) = &output else {
            panic!("expected raster output");
        };
        assert_eq!((pixmap.width(), pixmap.height()), (300, 300));
        // Slack around the matrix is background.
        assert!(luma(pixmap, 1, 1) > 250);
        // Center of the top-left finder dot: module (3, 3) at 3 + 3·14 + 7.
        assert!(luma(pixmap, 52, 52) < 5);
        // Light ring inside the finder.
        assert!(luma(pixmap, 3 + 14 + 7, 52) > 250);
    }

    #[test]
    fn vector_output_is_the_same_document() {
        let plan = plan(&hello());
        let RenderedOutput::Vector { svg, width, height } = render(&plan, OutputBackend::Vector).unwrap() else {
            panic!("expected vector output");
        };
        assert_eq!((width, height), (300, 300));
        assert_eq!(svg, to_svg(&plan));
    }

    #[test]
    fn export_formats() {
        let plan = plan(&hello());
        let raster = render(&plan, OutputBackend::Raster).unwrap();
        assert!(export(&raster, ExportFormat::Png).unwrap().starts_with(b"\x89PNG"));
        assert!(export(&raster, ExportFormat::Jpeg).unwrap().starts_with(&[0xFF, 0xD8]));
        assert!(export(&raster, ExportFormat::Bmp).unwrap().starts_with(b"BM"));
        let webp = export(&raster, ExportFormat::Webp).unwrap();
        assert_eq!(&webp[..4], b"RIFF");
        assert_eq!(&webp[8..12], b"WEBP");

        let vector = render(&plan, OutputBackend::Vector).unwrap();
        assert!(export(&vector, ExportFormat::Svg).unwrap().starts_with(b"<svg"));
        let png = export(&vector, ExportFormat::Png).unwrap();
        assert_eq!(image::load_from_memory(&png).unwrap().width(), 300);
    }

    #[test]
    fn raster_cannot_become_svg() {
        let raster = render(&plan(&hello()), OutputBackend::Raster).unwrap();
        let err = export(&raster, ExportFormat::Svg).unwrap_err();
        assert!(matches!(
            err,
            QrStyleError::UnsupportedOutputFormat {
                backend: OutputBackend::Raster,
                format: ExportFormat::Svg
            }
        ));
    }

    #[test]
    fn invalid_svg_is_reported() {
        assert!(matches!(rasterize("<not-svg", 10, 10), Err(QrStyleError::InvalidSvg(_))));
    }

    #[test]
    fn jpeg_flattens_onto_white() {
        let mut pixmap = tiny_skia::Pixmap::new(2, 2).unwrap();
        pixmap.fill(tiny_skia::Color::TRANSPARENT);
        let flat = flatten(&to_rgba(&pixmap).unwrap());
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
    }
}
