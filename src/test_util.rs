#[cfg(test)]
pub(crate) fn with_temp_home<F, R>(func: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    static HOME_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
    let _guard = HOME_MUTEX
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let dir = tempfile::tempdir().expect("tempdir");
    let old_home = std::env::var("HOME").ok();
    // SAFETY: every test touching HOME holds HOME_MUTEX.
    unsafe { std::env::set_var("HOME", dir.path()) };
    let result = func(dir.path());
    match old_home {
        Some(old) => unsafe { std::env::set_var("HOME", old) },
        None => unsafe { std::env::remove_var("HOME") },
    }
    result
}

/// In-memory page source: each page is a fixed-size white canvas plus the
/// tokens handed in, in whatever order the test lists them.
#[cfg(test)]
pub(crate) struct MemoryDocument {
    pub(crate) pages: Vec<Vec<crate::document::Token>>,
    pub(crate) width: f32,
    pub(crate) height: f32,
}

#[cfg(test)]
impl MemoryDocument {
    pub(crate) fn new(pages: Vec<Vec<crate::document::Token>>) -> Self {
        Self {
            pages,
            width: 200.0,
            height: 100.0,
        }
    }
}

#[cfg(test)]
impl crate::document::PageSource for MemoryDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn words(&self, page: usize) -> anyhow::Result<Vec<crate::document::Token>> {
        self.pages
            .get(page)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("page {} out of range", page))
    }

    fn rasterize(&self, _page: usize, zoom: f32) -> anyhow::Result<image::RgbaImage> {
        let width = (self.width * zoom) as u32;
        let height = (self.height * zoom) as u32;
        Ok(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([255, 255, 255, 255]),
        ))
    }
}

/// Tokens laid out left to right on one line, 30pt apart.
#[cfg(test)]
pub(crate) fn line_of(words: &[&str], baseline: f32) -> Vec<crate::document::Token> {
    words
        .iter()
        .enumerate()
        .map(|(idx, text)| {
            let left = 10.0 + idx as f32 * 30.0;
            crate::document::Token::new(left, baseline - 10.0, left + 25.0, baseline, *text)
        })
        .collect()
}
