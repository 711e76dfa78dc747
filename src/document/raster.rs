use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use std::ffi::OsStr;
use std::path::Path;
use tempfile::tempdir;

use super::command::{command_exists, run_tool};

const POINTS_PER_INCH: f32 = 72.0;

/// Resolution that renders one PDF point as `zoom` pixels.
pub(super) fn zoom_to_dpi(zoom: f32) -> u32 {
    (POINTS_PER_INCH * zoom).round().max(1.0) as u32
}

/// Renders one page (0-based) to RGBA through mutool or pdftoppm.
pub(super) fn render_page(pdf_path: &Path, page: usize, zoom: f32) -> Result<RgbaImage> {
    let dir = tempdir().with_context(|| "failed to create temp dir for page render")?;
    let dpi = zoom_to_dpi(zoom).to_string();
    let page_number = (page + 1).to_string();

    let png_path = if command_exists("mutool") {
        let out = dir.path().join("page.png");
        run_tool(
            "mutool",
            [
                OsStr::new("draw"),
                OsStr::new("-r"),
                OsStr::new(&dpi),
                OsStr::new("-F"),
                OsStr::new("png"),
                OsStr::new("-o"),
                out.as_os_str(),
                pdf_path.as_os_str(),
                OsStr::new(&page_number),
            ],
        )?;
        out
    } else if command_exists("pdftoppm") {
        let prefix = dir.path().join("page");
        run_tool(
            "pdftoppm",
            [
                OsStr::new("-png"),
                OsStr::new("-r"),
                OsStr::new(&dpi),
                OsStr::new("-f"),
                OsStr::new(&page_number),
                OsStr::new("-l"),
                OsStr::new(&page_number),
                OsStr::new("-singlefile"),
                pdf_path.as_os_str(),
                prefix.as_os_str(),
            ],
        )?;
        prefix.with_extension("png")
    } else {
        return Err(anyhow!(
            "pdf rendering requires mutool or pdftoppm (install mupdf or poppler)"
        ));
    };

    let image = image::open(&png_path)
        .with_context(|| format!("failed to decode rendered page {}", page_number))?;
    Ok(image.to_rgba8())
}

#[cfg(test)]
mod tests {
    use super::zoom_to_dpi;

    #[test]
    fn double_zoom_renders_at_144_dpi() {
        assert_eq!(zoom_to_dpi(2.0), 144);
        assert_eq!(zoom_to_dpi(1.0), 72);
        assert_eq!(zoom_to_dpi(0.0), 1);
    }
}
