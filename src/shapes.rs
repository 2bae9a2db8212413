//! Shape geometry for data dots, corner squares and corner dots.

use std::fmt::Write as _;

use crate::types::{CornerDotShape, CornerSquareShape, DotShape};

/// Axis-aligned box in output pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn square(x: f32, y: f32, side: f32) -> Self {
        Self::new(x, y, side, side)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Same center, shrunk by `by` on every side.
    pub fn inset(&self, by: f32) -> Self {
        Self::new(self.x + by, self.y + by, self.width - 2.0 * by, self.height - 2.0 * by)
    }
}

/// Orthogonal neighbors of a cell that are dark and drawn in the same element group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Neighbors(u8);

impl Neighbors {
    pub const NONE: Neighbors = Neighbors(0);
    pub const LEFT: Neighbors = Neighbors(0b0001);
    pub const TOP: Neighbors = Neighbors(0b0010);
    pub const RIGHT: Neighbors = Neighbors(0b0100);
    pub const BOTTOM: Neighbors = Neighbors(0b1000);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b1111)
    }

    pub fn contains(self, other: Neighbors) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Neighbors {
    type Output = Neighbors;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Which corners of a cell get rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CornerRounding {
    pub top_left: bool,
    pub top_right: bool,
    pub bottom_right: bool,
    pub bottom_left: bool,
}

impl CornerRounding {
    pub const ALL: CornerRounding = CornerRounding {
        top_left: true,
        top_right: true,
        bottom_right: true,
        bottom_left: true,
    };

    pub fn count(self) -> usize {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
            .iter()
            .filter(|&&r| r)
            .count()
    }
}

/// Shape families that react to neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingFamily {
    /// Every corner may round.
    Rounded,
    /// Only the top-left and bottom-right corners may round.
    Classy,
}

/// A corner rounds only when neither side meeting at it faces a dark neighbor.
pub fn corner_rounding(family: RoundingFamily, neighbors: Neighbors) -> CornerRounding {
    let left = neighbors.contains(Neighbors::LEFT);
    let top = neighbors.contains(Neighbors::TOP);
    let right = neighbors.contains(Neighbors::RIGHT);
    let bottom = neighbors.contains(Neighbors::BOTTOM);
    let free = CornerRounding {
        top_left: !top && !left,
        top_right: !top && !right,
        bottom_right: !bottom && !right,
        bottom_left: !bottom && !left,
    };
    match family {
        RoundingFamily::Rounded => free,
        RoundingFamily::Classy => CornerRounding {
            top_right: false,
            bottom_left: false,
            ..free
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Segment {
    MoveTo(f32, f32),
    LineTo(f32, f32),
    /// Clockwise circular arc to the end point.
    ArcTo { radius: f32, x: f32, y: f32 },
    Close,
}

/// Outline made of straight lines and clockwise circular arcs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn append(&mut self, other: Path) {
        self.segments.extend(other.segments);
    }

    pub fn rect(rect: Rect) -> Self {
        Self::rounded_rect(rect, [0.0; 4])
    }

    pub fn circle(rect: Rect) -> Self {
        let r = rect.width.min(rect.height) / 2.0;
        Self::rounded_rect(rect, [r; 4])
    }

    /// Radii are ordered top-left, top-right, bottom-right, bottom-left.
    pub fn rounded_rect(rect: Rect, radii: [f32; 4]) -> Self {
        let Rect { x, y, width: w, height: h } = rect;
        let [tl, tr, br, bl] = radii;
        let mut segments = vec![Segment::MoveTo(x + tl, y), Segment::LineTo(x + w - tr, y)];
        if tr > 0.0 {
            segments.push(Segment::ArcTo { radius: tr, x: x + w, y: y + tr });
        }
        segments.push(Segment::LineTo(x + w, y + h - br));
        if br > 0.0 {
            segments.push(Segment::ArcTo { radius: br, x: x + w - br, y: y + h });
        }
        segments.push(Segment::LineTo(x + bl, y + h));
        if bl > 0.0 {
            segments.push(Segment::ArcTo { radius: bl, x, y: y + h - bl });
        }
        segments.push(Segment::LineTo(x, y + tl));
        if tl > 0.0 {
            segments.push(Segment::ArcTo { radius: tl, x: x + tl, y });
        }
        segments.push(Segment::Close);
        Self { segments }
    }

    /// `outer` with `inner` cut out; render with the even-odd fill rule.
    pub fn ring(outer: Path, inner: Path) -> Self {
        let mut path = outer;
        path.append(inner);
        path
    }

    /// Every vertex and arc end point, in drawing order.
    pub fn points(&self) -> Vec<(f32, f32)> {
        self.segments
            .iter()
            .filter_map(|s| match *s {
                Segment::MoveTo(x, y) | Segment::LineTo(x, y) | Segment::ArcTo { x, y, .. } => Some((x, y)),
                Segment::Close => None,
            })
            .collect()
    }

    pub fn arc_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::ArcTo { .. }))
            .count()
    }

    /// SVG path data.
    pub fn to_svg_data(&self) -> String {
        let mut d = String::new();
        for segment in &self.segments {
            let _ = match *segment {
                Segment::MoveTo(x, y) => write!(d, "M{} {}", num(x), num(y)),
                Segment::LineTo(x, y) => write!(d, "L{} {}", num(x), num(y)),
                Segment::ArcTo { radius, x, y } => {
                    let r = num(radius);
                    write!(d, "A{r} {r} 0 0 1 {} {}", num(x), num(y))
                }
                Segment::Close => write!(d, "Z"),
            };
        }
        d
    }
}

/// Compact decimal for SVG output.
pub(crate) fn num(value: f32) -> String {
    let s = format!("{value:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

/// Drawing capability shared by every shape category.
pub trait DrawShape {
    /// Outline for the shape occupying `cell`, given its same-group dark neighbors.
    fn draw(&self, cell: Rect, neighbors: Neighbors) -> Path;
}

impl DotShape {
    pub fn rounding_family(self) -> Option<RoundingFamily> {
        match self {
            Self::Rounded | Self::ExtraRounded => Some(RoundingFamily::Rounded),
            Self::Classy | Self::ClassyRounded => Some(RoundingFamily::Classy),
            Self::Square | Self::Dots => None,
        }
    }

    /// Corner decision for a cell with the given neighbors.
    pub fn rounding(self, neighbors: Neighbors) -> CornerRounding {
        match self {
            Self::Square => CornerRounding::default(),
            Self::Dots => CornerRounding::ALL,
            _ => self
                .rounding_family()
                .map(|family| corner_rounding(family, neighbors))
                .unwrap_or_default(),
        }
    }
}

impl DrawShape for DotShape {
    fn draw(&self, cell: Rect, neighbors: Neighbors) -> Path {
        let side = cell.width.min(cell.height);
        let rounding = self.rounding(neighbors);
        let radius = match self {
            Self::ExtraRounded if rounding.count() == 1 => side,
            Self::ClassyRounded => side,
            _ => side / 2.0,
        };
        let r = |rounded: bool| if rounded { radius } else { 0.0 };
        Path::rounded_rect(
            cell,
            [
                r(rounding.top_left),
                r(rounding.top_right),
                r(rounding.bottom_right),
                r(rounding.bottom_left),
            ],
        )
    }
}

impl DrawShape for CornerSquareShape {
    /// `cell` is the whole 7×7 finder box.
    fn draw(&self, cell: Rect, _neighbors: Neighbors) -> Path {
        let module = cell.width / 7.0;
        let inner = cell.inset(module);
        match self {
            Self::Square => Path::ring(Path::rect(cell), Path::rect(inner)),
            Self::Dot => Path::ring(Path::circle(cell), Path::circle(inner)),
            Self::ExtraRounded => Path::ring(
                Path::rounded_rect(cell, [module * 2.5; 4]),
                Path::rounded_rect(inner, [module * 1.5; 4]),
            ),
        }
    }
}

impl DrawShape for CornerDotShape {
    /// `cell` is the 3×3 finder center.
    fn draw(&self, cell: Rect, _neighbors: Neighbors) -> Path {
        match self {
            Self::Square => Path::rect(cell),
            Self::Dot => Path::circle(cell),
        }
    }
}
