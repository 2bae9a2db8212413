pub mod ecc;
pub mod encoder;
pub mod error;
pub mod logging;
pub mod matrix;
pub mod render;
pub mod shapes;
pub mod style;
pub mod tables;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{QrStyleError, Result};
pub use matrix::{Matrix, ModuleRole};
pub use render::RenderedOutput;
pub use style::RenderPlan;
pub use tables::Version;
pub use types::{
    BackgroundOptions, Color, ColorStop, CornerDotShape, CornerSquareShape, CornersDotOptions,
    CornersSquareOptions, DotShape, DotsOptions, ErrorCorrectionLevel, ExportFormat, Fill, ImageOptions,
    Mode, Options, OutputBackend, PartialOptions, QrMetadata, QrOptions,
};

use tracing::debug;

const MAX_DIMENSION: u32 = 10_000;

fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(QrStyleError::DimensionsTooLarge {
            width,
            height,
            max_dimension: MAX_DIMENSION,
        });
    }
    Ok(())
}

/// Encodes `data` into a finished, masked matrix.
pub fn build_matrix(data: &str, qr_options: &QrOptions) -> Result<Matrix> {
    let encoded = encoder::encode(data, qr_options)?;
    Matrix::build(&encoded, qr_options.mask)
}

/// Receives rendered output, e.g. to save it or hand it to a UI.
pub trait OutputSink {
    fn attach(&mut self, output: &RenderedOutput) -> Result<()>;
}

impl<F> OutputSink for F
where
    F: FnMut(&RenderedOutput) -> Result<()>,
{
    fn attach(&mut self, output: &RenderedOutput) -> Result<()> {
        self(output)
    }
}

#[derive(Debug, Clone)]
struct Rendered {
    metadata: QrMetadata,
    plan: RenderPlan,
    output: RenderedOutput,
}

fn render_all(options: &Options) -> Result<Rendered> {
    validate_dimensions(options.width, options.height)?;
    let encoded = encoder::encode(&options.data, &options.qr_options)?;
    let matrix = Matrix::build(&encoded, options.qr_options.mask)?;
    let plan = style::resolve(&matrix, options)?;
    let output = render::render(&plan, options.backend)?;
    let metadata = QrMetadata {
        version: matrix.version().value(),
        error_correction: matrix.level(),
        mask: matrix.mask(),
        mode: encoded.mode,
        size: matrix.size(),
    };
    debug!(?metadata, backend = %options.backend, "rendered");
    Ok(Rendered { metadata, plan, output })
}

/// One-shot render of `options`.
pub fn render(options: &Options) -> Result<RenderedOutput> {
    render_all(options).map(|r| r.output)
}

/// Holds a configuration and renders it lazily; any update discards the previous result.
#[derive(Debug, Clone)]
pub struct QrCodeStyling {
    options: Options,
    rendered: Option<Rendered>,
}

impl QrCodeStyling {
    pub fn new(options: Options) -> Self {
        Self { options, rendered: None }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Merges `partial` into the current options. The next read renders again.
    pub fn update(&mut self, partial: PartialOptions) {
        self.options.merge(partial);
        self.rendered = None;
    }

    fn rendered(&mut self) -> Result<&Rendered> {
        let rendered = match self.rendered.take() {
            Some(rendered) => rendered,
            None => render_all(&self.options)?,
        };
        Ok(&*self.rendered.insert(rendered))
    }

    pub fn render(&mut self) -> Result<&RenderedOutput> {
        Ok(&self.rendered()?.output)
    }

    pub fn plan(&mut self) -> Result<&RenderPlan> {
        Ok(&self.rendered()?.plan)
    }

    pub fn metadata(&mut self) -> Result<QrMetadata> {
        Ok(self.rendered()?.metadata)
    }

    pub fn export_bytes(&mut self, format: ExportFormat) -> Result<Vec<u8>> {
        render::export(self.render()?, format)
    }

    pub fn attach_to<S: OutputSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        sink.attach(self.render()?)
    }
}
