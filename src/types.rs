use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorCorrectionLevel {
    L,
    M,
    #[default]
    Q,
    H,
}

impl ErrorCorrectionLevel {
    pub const ALL: [ErrorCorrectionLevel; 4] = [Self::L, Self::M, Self::Q, Self::H];

    /// Row index into the per-level tables.
    pub(crate) fn ordinal(self) -> usize {
        match self {
            Self::L => 0,
            Self::M => 1,
            Self::Q => 2,
            Self::H => 3,
        }
    }

    /// Two-bit level indicator written into the format information.
    pub(crate) fn format_bits(self) -> u32 {
        match self {
            Self::L => 0b01,
            Self::M => 0b00,
            Self::Q => 0b11,
            Self::H => 0b10,
        }
    }

    pub(crate) fn from_format_bits(bits: u32) -> Option<Self> {
        match bits {
            0b01 => Some(Self::L),
            0b00 => Some(Self::M),
            0b11 => Some(Self::Q),
            0b10 => Some(Self::H),
            _ => None,
        }
    }

    /// Nominal fraction of codewords the level can restore.
    pub fn recoverable_fraction(self) -> f32 {
        match self {
            Self::L => 0.07,
            Self::M => 0.15,
            Self::Q => 0.25,
            Self::H => 0.30,
        }
    }
}

impl fmt::Display for ErrorCorrectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::L => write!(f, "L"),
            Self::M => write!(f, "M"),
            Self::Q => write!(f, "Q"),
            Self::H => write!(f, "H"),
        }
    }
}

impl FromStr for ErrorCorrectionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L" => Ok(Self::L),
            "M" => Ok(Self::M),
            "Q" => Ok(Self::Q),
            "H" => Ok(Self::H),
            other => Err(format!("unknown error correction level '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Numeric,
    Alphanumeric,
    Byte,
    Kanji,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric => write!(f, "numeric"),
            Self::Alphanumeric => write!(f, "alphanumeric"),
            Self::Byte => write!(f, "byte"),
            Self::Kanji => write!(f, "kanji"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "numeric" => Ok(Self::Numeric),
            "alphanumeric" => Ok(Self::Alphanumeric),
            "byte" => Ok(Self::Byte),
            "kanji" => Ok(Self::Kanji),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// RGBA color, written in configs as `#rgb`, `#rrggbb`, `#rrggbbaa` or `transparent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// `#rrggbb` without the alpha channel, for SVG paint attributes.
    pub fn hex_rgb(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn opacity(&self) -> f32 {
        self.a as f32 / 255.0
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("transparent") {
            return Ok(Self::TRANSPARENT);
        }
        let hex = s
            .strip_prefix('#')
            .ok_or_else(|| format!("color '{s}' must start with '#'"))?;
        let nibble = |c: u8| -> Result<u8, String> {
            (c as char)
                .to_digit(16)
                .map(|d| d as u8)
                .ok_or_else(|| format!("invalid hex digit in color '{s}'"))
        };
        let bytes = hex.as_bytes();
        let channels: Vec<u8> = match bytes.len() {
            3 | 4 => bytes
                .iter()
                .map(|&c| nibble(c).map(|v| v * 17))
                .collect::<Result<_, _>>()?,
            6 | 8 => bytes
                .chunks_exact(2)
                .map(|pair| Ok(nibble(pair[0])? << 4 | nibble(pair[1])?))
                .collect::<Result<_, String>>()?,
            _ => return Err(format!("color '{s}' must have 3, 4, 6 or 8 hex digits")),
        };
        Ok(Self {
            r: channels[0],
            g: channels[1],
            b: channels[2],
            a: channels.get(3).copied().unwrap_or(255),
        })
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "{}", self.hex_rgb())
        } else {
            write!(f, "{}{:02x}", self.hex_rgb(), self.a)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub offset: f32,
    pub color: Color,
}

/// Paint for one element group: a flat color or a gradient across the group's bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Fill {
    Solid { color: Color },
    /// `rotation` in radians, clockwise from a left-to-right gradient.
    Linear {
        #[serde(default)]
        rotation: f32,
        stops: Vec<ColorStop>,
    },
    /// `center` is relative to the bounding box; `[0.5, 0.5]` when unset.
    Radial {
        #[serde(default)]
        center: Option<[f32; 2]>,
        stops: Vec<ColorStop>,
    },
}

impl Fill {
    pub fn solid(color: Color) -> Self {
        Self::Solid { color }
    }
}

impl Default for Fill {
    fn default() -> Self {
        Self::solid(Color::BLACK)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DotShape {
    #[default]
    Square,
    Dots,
    Rounded,
    ExtraRounded,
    Classy,
    ClassyRounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CornerSquareShape {
    Square,
    Dot,
    ExtraRounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CornerDotShape {
    Square,
    Dot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputBackend {
    #[default]
    Raster,
    Vector,
}

impl fmt::Display for OutputBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raster => write!(f, "raster"),
            Self::Vector => write!(f, "vector"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Jpeg,
    Webp,
    Bmp,
    Svg,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Svg => "svg",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Jpeg => write!(f, "jpeg"),
            Self::Webp => write!(f, "webp"),
            Self::Bmp => write!(f, "bmp"),
            Self::Svg => write!(f, "svg"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            "bmp" => Ok(Self::Bmp),
            "svg" => Ok(Self::Svg),
            other => Err(format!("unknown export format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QrOptions {
    #[serde(default)]
    pub version: Option<u8>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub error_correction_level: ErrorCorrectionLevel,
    /// Forces a mask pattern instead of picking the lowest-penalty one.
    #[serde(default)]
    pub mask: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DotsOptions {
    #[serde(default)]
    pub shape: DotShape,
    #[serde(default)]
    pub fill: Fill,
}

/// Unset shape or fill falls back to the dots options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CornersSquareOptions {
    #[serde(default)]
    pub shape: Option<CornerSquareShape>,
    #[serde(default)]
    pub fill: Option<Fill>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CornersDotOptions {
    #[serde(default)]
    pub shape: Option<CornerDotShape>,
    #[serde(default)]
    pub fill: Option<Fill>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundOptions {
    /// `None` leaves the background transparent.
    #[serde(default = "default_background_fill")]
    pub fill: Option<Fill>,
}

fn default_background_fill() -> Option<Fill> { Some(Fill::solid(Color::WHITE)) }

impl Default for BackgroundOptions {
    fn default() -> Self {
        Self {
            fill: default_background_fill(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageOptions {
    /// Logo side relative to the drawn matrix side.
    #[serde(default = "default_image_size")]
    pub image_size: f32,
    /// Pixels of clearance around the logo.
    #[serde(default)]
    pub margin: u32,
    #[serde(default = "default_hide_background_dots")]
    pub hide_background_dots: bool,
}

fn default_image_size() -> f32 { 0.4 }
fn default_hide_background_dots() -> bool { true }

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            image_size: default_image_size(),
            margin: 0,
            hide_background_dots: default_hide_background_dots(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub qr_options: QrOptions,
    #[serde(default)]
    pub dots_options: DotsOptions,
    #[serde(default)]
    pub corners_square_options: CornersSquareOptions,
    #[serde(default)]
    pub corners_dot_options: CornersDotOptions,
    #[serde(default)]
    pub background_options: BackgroundOptions,
    /// Encoded logo bytes (PNG, JPEG, GIF, WebP or SVG).
    #[serde(skip)]
    pub image: Option<Vec<u8>>,
    #[serde(default)]
    pub image_options: ImageOptions,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Quiet zone in pixels.
    #[serde(default)]
    pub margin: u32,
    #[serde(default)]
    pub backend: OutputBackend,
}

fn default_width() -> u32 { 300 }
fn default_height() -> u32 { 300 }

impl Default for Options {
    fn default() -> Self {
        Self {
            data: String::new(),
            qr_options: QrOptions::default(),
            dots_options: DotsOptions::default(),
            corners_square_options: CornersSquareOptions::default(),
            corners_dot_options: CornersDotOptions::default(),
            background_options: BackgroundOptions::default(),
            image: None,
            image_options: ImageOptions::default(),
            width: default_width(),
            height: default_height(),
            margin: 0,
            backend: OutputBackend::default(),
        }
    }
}

/// Field-wise update for [`Options`]; unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialOptions {
    pub data: Option<String>,
    pub qr_options: Option<QrOptions>,
    pub dots_options: Option<DotsOptions>,
    pub corners_square_options: Option<CornersSquareOptions>,
    pub corners_dot_options: Option<CornersDotOptions>,
    pub background_options: Option<BackgroundOptions>,
    #[serde(skip)]
    pub image: Option<Option<Vec<u8>>>,
    pub image_options: Option<ImageOptions>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub margin: Option<u32>,
    pub backend: Option<OutputBackend>,
}

impl Options {
    pub fn merge(&mut self, partial: PartialOptions) {
        let PartialOptions {
            data,
            qr_options,
            dots_options,
            corners_square_options,
            corners_dot_options,
            background_options,
            image,
            image_options,
            width,
            height,
            margin,
            backend,
        } = partial;

        if let Some(v) = data { self.data = v; }
        if let Some(v) = qr_options { self.qr_options = v; }
        if let Some(v) = dots_options { self.dots_options = v; }
        if let Some(v) = corners_square_options { self.corners_square_options = v; }
        if let Some(v) = corners_dot_options { self.corners_dot_options = v; }
        if let Some(v) = background_options { self.background_options = v; }
        if let Some(v) = image { self.image = v; }
        if let Some(v) = image_options { self.image_options = v; }
        if let Some(v) = width { self.width = v; }
        if let Some(v) = height { self.height = v; }
        if let Some(v) = margin { self.margin = v; }
        if let Some(v) = backend { self.backend = v; }
    }
}

/// Encoding parameters of the last rendered symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrMetadata {
    pub version: u8,
    pub error_correction: ErrorCorrectionLevel,
    pub mask: u8,
    pub mode: Mode,
    pub size: usize,
}
