use anyhow::{Context, Result, anyhow};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use super::command::{command_exists, run_tool};
use super::{PageText, Token};

/// Extracts the words of every page, preferring poppler's word boxes and
/// falling back to grouping MuPDF's character boxes.
pub(super) fn extract_pages(pdf_path: &Path) -> Result<Vec<PageText>> {
    let dir = pdf_path
        .parent()
        .ok_or_else(|| anyhow!("pdf path has no parent directory"))?;

    if command_exists("pdftotext") {
        let out = dir.join("words.html");
        run_tool(
            "pdftotext",
            [
                OsStr::new("-bbox"),
                OsStr::new("-enc"),
                OsStr::new("UTF-8"),
                pdf_path.as_os_str(),
                out.as_os_str(),
            ],
        )?;
        let xml = fs::read_to_string(&out).with_context(|| "failed to read pdftotext output")?;
        return parse_pdftotext_bbox(&xml);
    }

    if command_exists("mutool") {
        let out = dir.join("words.stext");
        run_tool(
            "mutool",
            [
                OsStr::new("draw"),
                OsStr::new("-F"),
                OsStr::new("stext"),
                OsStr::new("-o"),
                out.as_os_str(),
                pdf_path.as_os_str(),
            ],
        )?;
        let xml = fs::read_to_string(&out).with_context(|| "failed to read mutool output")?;
        return parse_mutool_stext(&xml);
    }

    Err(anyhow!(
        "pdf text extraction requires pdftotext or mutool (install poppler or mupdf)"
    ))
}

/// Parses `pdftotext -bbox` XHTML: `<page>` elements holding `<word>`
/// elements with `xMin`/`yMin`/`xMax`/`yMax` attributes.
pub fn parse_pdftotext_bbox(xml: &str) -> Result<Vec<PageText>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut pages = Vec::new();
    let mut current: Option<PageText> = None;
    let mut word: Option<Token> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"page" => current = Some(page_header(&e)?),
                b"word" => {
                    let token = Token::new(
                        required_f32(&e, b"xMin")?,
                        required_f32(&e, b"yMin")?,
                        required_f32(&e, b"xMax")?,
                        required_f32(&e, b"yMax")?,
                        String::new(),
                    );
                    word = Some(token);
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.name().as_ref() == b"page" => {
                pages.push(page_header(&e)?);
            }
            Ok(Event::Text(t)) => {
                if let Some(token) = word.as_mut() {
                    token.text.push_str(&text_value(&t));
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"word" => {
                    if let Some(token) = word.take()
                        && let Some(page) = current.as_mut()
                        && !token.text.trim().is_empty()
                    {
                        page.words.push(token);
                    }
                }
                b"page" => {
                    if let Some(page) = current.take() {
                        pages.push(page);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(anyhow!(
                    "failed to parse pdftotext output at byte {}: {}",
                    reader.buffer_position(),
                    err
                ));
            }
            _ => {}
        }
    }

    Ok(pages)
}

/// Parses MuPDF structured text (`mutool draw -F stext`). Characters are
/// grouped into words; whitespace and line ends close a word.
pub fn parse_mutool_stext(xml: &str) -> Result<Vec<PageText>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut pages = Vec::new();
    let mut current: Option<PageText> = None;
    let mut word = WordBuilder::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"page" => {
                current = Some(page_header(&e)?);
            }
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"char" => {
                let glyph = attr_string(&e, b"c")?.unwrap_or_default();
                if glyph.chars().all(char::is_whitespace) {
                    word.flush(current.as_mut());
                    continue;
                }
                let rect = char_rect(&e)?;
                word.push(&glyph, rect);
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"line" | b"block" => word.flush(current.as_mut()),
                b"page" => {
                    word.flush(current.as_mut());
                    if let Some(page) = current.take() {
                        pages.push(page);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(anyhow!(
                    "failed to parse mutool output at byte {}: {}",
                    reader.buffer_position(),
                    err
                ));
            }
            _ => {}
        }
    }

    Ok(pages)
}

#[derive(Default)]
struct WordBuilder {
    text: String,
    rect: Option<[f32; 4]>,
}

impl WordBuilder {
    fn push(&mut self, glyph: &str, rect: [f32; 4]) {
        self.text.push_str(glyph);
        self.rect = Some(match self.rect {
            Some([l, t, r, b]) => [l.min(rect[0]), t.min(rect[1]), r.max(rect[2]), b.max(rect[3])],
            None => rect,
        });
    }

    fn flush(&mut self, page: Option<&mut PageText>) {
        let text = std::mem::take(&mut self.text);
        let rect = self.rect.take();
        if let (Some(page), Some([left, top, right, bottom])) = (page, rect)
            && !text.is_empty()
        {
            page.words.push(Token::new(left, top, right, bottom, text));
        }
    }
}

fn page_header(e: &BytesStart<'_>) -> Result<PageText> {
    Ok(PageText {
        width: attr_f32(e, b"width")?.unwrap_or(0.0),
        height: attr_f32(e, b"height")?.unwrap_or(0.0),
        words: Vec::new(),
    })
}

/// Character box from MuPDF's `quad` (8 numbers, newer releases) or `bbox`
/// (4 numbers, older releases).
fn char_rect(e: &BytesStart<'_>) -> Result<[f32; 4]> {
    let raw = match attr_string(e, b"quad")? {
        Some(value) => value,
        None => attr_string(e, b"bbox")?
            .ok_or_else(|| anyhow!("stext char has neither quad nor bbox"))?,
    };
    let values = raw
        .split_whitespace()
        .map(|value| {
            value
                .parse::<f32>()
                .with_context(|| format!("invalid char coordinate '{}'", value))
        })
        .collect::<Result<Vec<_>>>()?;
    match values.len() {
        4 => Ok([values[0], values[1], values[2], values[3]]),
        8 => {
            let xs = [values[0], values[2], values[4], values[6]];
            let ys = [values[1], values[3], values[5], values[7]];
            Ok([
                xs.iter().copied().fold(f32::INFINITY, f32::min),
                ys.iter().copied().fold(f32::INFINITY, f32::min),
                xs.iter().copied().fold(f32::NEG_INFINITY, f32::max),
                ys.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            ])
        }
        count => Err(anyhow!("unexpected char box with {} values", count)),
    }
}

fn text_value(t: &BytesText<'_>) -> String {
    match t.unescape() {
        Ok(value) => value.into_owned(),
        Err(_) => String::from_utf8_lossy(t).into_owned(),
    }
}

fn attr_string(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn attr_f32(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<f32>> {
    let Some(raw) = attr_string(e, name)? else {
        return Ok(None);
    };
    let value = raw.trim().parse::<f32>().with_context(|| {
        format!(
            "invalid number '{}' for attribute {}",
            raw,
            String::from_utf8_lossy(name)
        )
    })?;
    Ok(Some(value))
}

fn required_f32(e: &BytesStart<'_>, name: &[u8]) -> Result<f32> {
    attr_f32(e, name)?.ok_or_else(|| {
        anyhow!(
            "missing attribute {} on <{}>",
            String::from_utf8_lossy(name),
            String::from_utf8_lossy(e.name().as_ref())
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDFTOTEXT: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
<title></title>
<meta name="Producer" content="pdfTeX"/>
</head>
<body>
<doc>
  <page width="612.000000" height="792.000000">
    <word xMin="72.000000" yMin="70.500000" xMax="93.250000" yMax="82.000000">The</word>
    <word xMin="96.000000" yMin="70.500000" xMax="125.500000" yMax="82.000000">R&amp;D</word>
  </page>
  <page width="612.000000" height="792.000000">
  </page>
</doc>
</body>
</html>
"#;

    const STEXT: &str = r##"<?xml version="1.0"?>
<document name="input.pdf">
<page id="page1" width="612" height="792">
<block bbox="72 70 200 82">
<line bbox="72 70 200 82" wmode="0" dir="1 0">
<font name="Times-Roman" size="12">
<char quad="72 70 80 70 72 82 80 82" x="72" y="80" color="#000000" c="H"/>
<char quad="80 70 86 70 80 82 86 82" x="80" y="80" color="#000000" c="i"/>
<char quad="86 70 89 70 86 82 89 82" x="86" y="80" color="#000000" c=" "/>
<char quad="89 70 95 70 89 82 95 82" x="89" y="80" color="#000000" c="&lt;"/>
</font>
</line>
<line bbox="72 90 90 102" wmode="0" dir="1 0">
<font name="Times-Roman" size="12">
<char bbox="72 90 80 102" x="72" y="100" c="o"/>
<char bbox="80 90 88 102" x="80" y="100" c="k"/>
</font>
</line>
</block>
</page>
<page id="page2" width="612" height="792">
</page>
</document>
"##;

    #[test]
    fn pdftotext_words_keep_boxes_and_unescape_text() {
        let pages = parse_pdftotext_bbox(PDFTOTEXT).expect("parse");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].width, 612.0);
        assert_eq!(
            pages[0].words,
            vec![
                Token::new(72.0, 70.5, 93.25, 82.0, "The"),
                Token::new(96.0, 70.5, 125.5, 82.0, "R&D"),
            ]
        );
        assert!(pages[1].words.is_empty());
    }

    #[test]
    fn stext_chars_group_into_words_per_line() {
        let pages = parse_mutool_stext(STEXT).expect("parse");
        assert_eq!(pages.len(), 2);
        let words: Vec<_> = pages[0]
            .words
            .iter()
            .map(|word| word.text.as_str())
            .collect();
        assert_eq!(words, vec!["Hi", "<", "ok"]);
        assert_eq!(pages[0].words[0], Token::new(72.0, 70.0, 86.0, 82.0, "Hi"));
        assert_eq!(pages[0].words[2], Token::new(72.0, 90.0, 88.0, 102.0, "ok"));
        assert!(pages[1].words.is_empty());
    }

    #[test]
    fn word_without_coordinates_is_rejected() {
        let xml = r#"<doc><page width="10" height="10"><word xMin="1">x</word></page></doc>"#;
        let err = parse_pdftotext_bbox(xml).unwrap_err();
        assert!(err.to_string().contains("missing attribute yMin"));
    }
}
