//! GROBID client: TEI fulltext to coordinate-normalized text chunks.

use std::collections::HashMap;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::models::{Chunk, Coordinates, StageError};
use crate::pdf;
use crate::pipeline::{Item, ParallelMode, Stage};

/// One page's absolute surface box from the TEI facsimile.
#[derive(Debug, Clone, Copy)]
struct Surface {
    ulx: f64,
    uly: f64,
    lrx: f64,
    lry: f64,
}

/// A paragraph with its raw coordinate references.
#[derive(Debug, Default)]
struct TeiParagraph {
    section: String,
    text: String,
    /// `(page, x, y, w, h)` boxes, top-origin as GROBID reports them.
    coords: Vec<(u32, f64, f64, f64, f64)>,
}

#[derive(Debug, Default)]
struct TeiDocument {
    title: String,
    doi: String,
    abstract_: String,
    authors: Vec<String>,
    pub_date: String,
    surfaces: HashMap<u32, Surface>,
    paragraphs: Vec<TeiParagraph>,
}

/// Posts the first `max_pages` pages to GROBID and maps returned TEI
/// sections to text chunks with page-relative, bottom-origin bounding
/// boxes. With `extract_meta` set, header metadata (doi, title,
/// authors, publication date, abstract) is captured as well.
pub struct GrobidTextExtractor {
    client: reqwest::Client,
    grobid_url: String,
    max_pages: u32,
    extract_meta: bool,
}

impl GrobidTextExtractor {
    pub fn new(
        client: reqwest::Client,
        grobid_url: impl Into<String>,
        max_pages: u32,
        extract_meta: bool,
    ) -> Self {
        Self {
            client,
            grobid_url: grobid_url.into(),
            max_pages,
            extract_meta,
        }
    }

    async fn fetch_tei(&self, filename: &str, bytes: Vec<u8>) -> Result<String, StageError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("input", part)
            .text("teiCoordinates", "p");
        let response = self
            .client
            .post(format!(
                "{}/api/processFulltextDocument",
                self.grobid_url
            ))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(StageError::External(format!(
                "grobid returned {}",
                response.status()
            )));
        }
        Ok(response.text().await?)
    }

    fn chunk_from_paragraph(parsed: &TeiDocument, paragraph: &TeiParagraph) -> Chunk {
        let mut chunk = Chunk::text(paragraph.text.clone());
        chunk.section = paragraph.section.clone();

        if paragraph.coords.is_empty() {
            return chunk;
        }

        // Boxes can span pages; keep the page most of them sit on.
        let mut counts: HashMap<u32, usize> = HashMap::new();
        for (page, ..) in &paragraph.coords {
            *counts.entry(*page).or_default() += 1;
        }
        let page = counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(page, _)| page)
            .unwrap_or(1);

        let Some(surface) = parsed.surfaces.get(&page) else {
            chunk.page = Some(page);
            return chunk;
        };

        let boxes: Vec<(f64, f64, f64, f64)> = paragraph
            .coords
            .iter()
            .filter(|(p, ..)| *p == page)
            .map(|(_, x, y, w, h)| (*x, *y, *x + *w, *y + *h))
            .collect();
        let xmin = boxes.iter().map(|b| b.0).fold(f64::INFINITY, f64::min);
        let ymin = boxes.iter().map(|b| b.1).fold(f64::INFINITY, f64::min);
        let xmax = boxes.iter().map(|b| b.2).fold(f64::NEG_INFINITY, f64::max);
        let ymax = boxes.iter().map(|b| b.3).fold(f64::NEG_INFINITY, f64::max);

        let width = surface.lrx - surface.ulx;
        let height = surface.lry - surface.uly;
        if width <= 0.0 || height <= 0.0 {
            chunk.page = Some(page);
            return chunk;
        }

        // GROBID reports top-origin boxes; storage convention is
        // y-axis up, so the vertical extent flips.
        let coordinates: Coordinates = (
            (
                (xmin - surface.ulx) / width,
                1.0 - (ymax - surface.uly) / height,
            ),
            (
                (xmax - surface.ulx) / width,
                1.0 - (ymin - surface.uly) / height,
            ),
        );
        chunk.page = Some(page);
        chunk.coordinates = Some(clamp(coordinates));
        chunk
    }
}

fn clamp(((xmin, ymin), (xmax, ymax)): Coordinates) -> Coordinates {
    let unit = |v: f64| v.clamp(0.0, 1.0);
    ((unit(xmin), unit(ymin)), (unit(xmax), unit(ymax)))
}

/// Parse the subset of TEI that the chunk mapping needs.
fn parse_tei(tei: &str) -> Result<TeiDocument, StageError> {
    let mut reader = Reader::from_str(tei);
    reader.config_mut().trim_text(true);

    let mut doc = TeiDocument::default();
    let mut path: Vec<String> = Vec::new();
    let mut current_section = String::new();
    let mut paragraph: Option<TeiParagraph> = None;
    let mut author_parts: Vec<String> = Vec::new();
    let mut doi_pending = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| StageError::Parse(format!("tei parse failed: {e}")))?;
        match event {
            Event::Start(ref start) | Event::Empty(ref start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                let empty = matches!(&event, Event::Empty(_));

                match name.as_str() {
                    "surface" => {
                        let mut n = None;
                        let mut surface = Surface {
                            ulx: 0.0,
                            uly: 0.0,
                            lrx: 0.0,
                            lry: 0.0,
                        };
                        for attr in start.attributes().flatten() {
                            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                            let value = String::from_utf8_lossy(&attr.value).to_string();
                            match key.as_str() {
                                "n" => n = value.parse::<u32>().ok(),
                                "ulx" => surface.ulx = value.parse().unwrap_or(0.0),
                                "uly" => surface.uly = value.parse().unwrap_or(0.0),
                                "lrx" => surface.lrx = value.parse().unwrap_or(0.0),
                                "lry" => surface.lry = value.parse().unwrap_or(0.0),
                                _ => {}
                            }
                        }
                        if let Some(n) = n {
                            doc.surfaces.insert(n, surface);
                        }
                    }
                    "p" if in_body(&path) => {
                        let mut p = TeiParagraph {
                            section: current_section.clone(),
                            ..Default::default()
                        };
                        for attr in start.attributes().flatten() {
                            if attr.key.as_ref() == b"coords" {
                                let value = String::from_utf8_lossy(&attr.value);
                                p.coords = parse_coords(&value);
                            }
                        }
                        paragraph = Some(p);
                    }
                    "idno" => {
                        doi_pending = start.attributes().flatten().any(|attr| {
                            attr.key.as_ref() == b"type"
                                && attr.value.as_ref().eq_ignore_ascii_case(b"doi")
                        });
                    }
                    "date" if path.iter().any(|p| p == "publicationStmt") => {
                        for attr in start.attributes().flatten() {
                            if attr.key.as_ref() == b"when" && doc.pub_date.is_empty() {
                                doc.pub_date = String::from_utf8_lossy(&attr.value).to_string();
                            }
                        }
                    }
                    "persName" if path.iter().any(|p| p == "sourceDesc") => {
                        author_parts.clear();
                    }
                    _ => {}
                }
                if !empty {
                    path.push(name);
                }
            }
            Event::Text(text) => {
                let content = text
                    .unescape()
                    .map_err(|e| StageError::Parse(e.to_string()))?
                    .to_string();
                let here = path.last().map(String::as_str).unwrap_or("");
                match (here, paragraph.as_mut()) {
                    ("p", Some(p)) => {
                        if !p.text.is_empty() {
                            p.text.push(' ');
                        }
                        p.text.push_str(&content);
                    }
                    ("title", _) if in_title_stmt(&path) && doc.title.is_empty() => {
                        doc.title = content;
                    }
                    ("idno", _) if doi_pending && doc.doi.is_empty() => {
                        doc.doi = content;
                    }
                    ("forename" | "surname", _) if path.iter().any(|p| p == "persName") => {
                        author_parts.push(content);
                    }
                    ("head", _) if in_body(&path) => {
                        current_section = content;
                    }
                    _ if path.iter().any(|p| p == "abstract") => {
                        if !doc.abstract_.is_empty() {
                            doc.abstract_.push(' ');
                        }
                        doc.abstract_.push_str(&content);
                    }
                    _ => {}
                }
            }
            Event::End(end) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).to_string();
                if name == "p" {
                    if let Some(p) = paragraph.take() {
                        if !p.text.is_empty() {
                            doc.paragraphs.push(p);
                        }
                    }
                }
                if name == "persName"
                    && path.iter().any(|p| p == "sourceDesc")
                    && !author_parts.is_empty()
                {
                    doc.authors.push(author_parts.join(" "));
                    author_parts.clear();
                }
                if name == "idno" {
                    doi_pending = false;
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(doc)
}

fn in_body(path: &[String]) -> bool {
    path.iter().any(|p| p == "body")
}

fn in_title_stmt(path: &[String]) -> bool {
    path.iter().any(|p| p == "titleStmt")
}

/// Parse `page,x,y,w,h;page,x,y,w,h;...`.
fn parse_coords(value: &str) -> Vec<(u32, f64, f64, f64, f64)> {
    value
        .split(';')
        .filter_map(|group| {
            let parts: Vec<&str> = group.split(',').collect();
            if parts.len() != 5 {
                return None;
            }
            Some((
                parts[0].parse().ok()?,
                parts[1].parse().ok()?,
                parts[2].parse().ok()?,
                parts[3].parse().ok()?,
                parts[4].parse().ok()?,
            ))
        })
        .collect()
}

#[async_trait]
impl Stage for GrobidTextExtractor {
    fn name(&self) -> &'static str {
        "grobid"
    }

    fn parallel(&self) -> ParallelMode {
        ParallelMode::Thread
    }

    async fn process_single(&self, item: Item) -> Result<Item, StageError> {
        let mut doc = item.into_document()?;
        let filename = doc.metainfo.file_features.filename.clone();

        // Cap the upload at max_pages when the page count is known to
        // exceed it.
        let bytes = match (doc.metainfo.file_features.npages, doc.file_path().ok()) {
            (Some(npages), Some(path)) if npages > self.max_pages => {
                let truncated = path.with_extension("head.pdf");
                pdf::truncate_pages(&path, self.max_pages, &truncated)?;
                std::fs::read(&truncated)?
            }
            _ => doc.file()?.read()?,
        };

        let tei = self.fetch_tei(&filename, bytes).await?;
        let parsed = parse_tei(&tei)?;

        if self.extract_meta {
            let meta = &mut doc.metainfo;
            if meta.title.is_empty() {
                meta.title = parsed.title.clone();
            }
            if meta.doi.is_empty() {
                meta.doi = parsed.doi.clone();
            }
            if meta.abstract_.is_empty() {
                meta.abstract_ = parsed.abstract_.clone();
            }
            if meta.authors.is_empty() {
                meta.authors = parsed.authors.clone();
            }
            if meta.pub_date.is_empty() {
                meta.pub_date = parsed.pub_date.clone();
            }
        }

        for paragraph in &parsed.paragraphs {
            doc.chunks
                .push(Self::chunk_from_paragraph(&parsed, paragraph));
        }
        Ok(doc.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEI: &str = r#"<TEI>
      <teiHeader>
        <fileDesc>
          <titleStmt><title>Attention Is All You Need</title></titleStmt>
          <publicationStmt><date when="2017-06-12"/></publicationStmt>
          <sourceDesc><biblStruct><analytic>
            <author><persName><forename>Ashish</forename><surname>Vaswani</surname></persName></author>
            <idno type="DOI">10.5555/3295222</idno>
          </analytic></biblStruct></sourceDesc>
        </fileDesc>
        <profileDesc><abstract><p>The dominant sequence models.</p></abstract></profileDesc>
      </teiHeader>
      <facsimile>
        <surface n="1" ulx="0" uly="0" lrx="612" lry="792"/>
      </facsimile>
      <text><body>
        <div><head>Introduction</head>
          <p coords="1,61.2,79.2,489.6,158.4">The Transformer follows this overall architecture.</p>
        </div>
      </body></text>
    </TEI>"#;

    #[test]
    fn test_parse_tei_header() {
        let doc = parse_tei(TEI).unwrap();
        assert_eq!(doc.title, "Attention Is All You Need");
        assert_eq!(doc.doi, "10.5555/3295222");
        assert_eq!(doc.authors, vec!["Ashish Vaswani"]);
        assert_eq!(doc.pub_date, "2017-06-12");
        assert!(doc.abstract_.contains("dominant sequence"));
    }

    #[test]
    fn test_paragraph_coordinates_normalized_and_flipped() {
        let doc = parse_tei(TEI).unwrap();
        assert_eq!(doc.paragraphs.len(), 1);
        let chunk = GrobidTextExtractor::chunk_from_paragraph(&doc, &doc.paragraphs[0]);
        assert_eq!(chunk.page, Some(1));
        assert_eq!(chunk.section, "Introduction");
        let ((xmin, ymin), (xmax, ymax)) = chunk.coordinates.unwrap();
        assert!((xmin - 0.1).abs() < 1e-6);
        assert!((xmax - 0.9).abs() < 1e-6);
        // Top-origin box at y=79.2..237.6 flips to 0.7..0.9 bottom-up.
        assert!((ymin - 0.7).abs() < 1e-6);
        assert!((ymax - 0.9).abs() < 1e-6);
        assert!(xmin <= xmax && ymin <= ymax);
    }

    #[test]
    fn test_parse_coords_malformed_groups_skipped() {
        let coords = parse_coords("1,1.0,2.0,3.0,4.0;bad;2,5,6,7,8");
        assert_eq!(coords.len(), 2);
        assert_eq!(coords[1].0, 2);
    }
}
