//! Scanned-PDF detection from embedded image metadata.
//!
//! A scanned document is effectively one full-page image per page. The
//! heuristic checks three things against the XObject images: one image
//! per page, image dimensions at or above the mediabox for the
//! majority of pages, and low variance in image size (median absolute
//! deviation at most 0.1). The thresholds are absolute; documents
//! mixing scanned and native pages can misclassify.

use lopdf::{Dictionary, Document, Object};

const SIZE_MAD_LIMIT: f64 = 0.1;

/// Decide whether `doc` looks like a scanned document.
pub fn is_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    let number_of_pages = pages.len();

    let mut sizes: Vec<(f64, f64)> = Vec::new();
    for (_number, page_id) in pages {
        let (width, height) = mediabox(doc, page_id).unwrap_or((612.0, 792.0));
        for (img_w, img_h) in page_image_sizes(doc, page_id) {
            sizes.push((img_h / height, img_w / width));
        }
    }

    // In a scanned PDF the number of images equals the number of pages.
    if number_of_pages != sizes.len() || sizes.is_empty() {
        return false;
    }

    // The majority of images must cover the mediabox.
    let covering = sizes
        .iter()
        .flat_map(|(h, w)| [*h >= 1.0, *w >= 1.0])
        .map(f64::from)
        .collect::<Vec<f64>>();
    if median(&covering) < 1.0 {
        return false;
    }

    // And the majority must share roughly one size.
    let flat: Vec<f64> = sizes.iter().flat_map(|(h, w)| [*h, *w]).collect();
    mad(&flat) <= SIZE_MAD_LIMIT
}

fn mediabox(doc: &Document, page_id: lopdf::ObjectId) -> Option<(f64, f64)> {
    let page = doc.get_dictionary(page_id).ok()?;
    let media = resolve(doc, page.get(b"MediaBox").ok()?)?;
    let values: Vec<f64> = media.as_array().ok()?.iter().filter_map(number).collect();
    if values.len() != 4 {
        return None;
    }
    Some(((values[2] - values[0]).abs(), (values[3] - values[1]).abs()))
}

/// Dimensions of every image XObject referenced by the page resources.
fn page_image_sizes(doc: &Document, page_id: lopdf::ObjectId) -> Vec<(f64, f64)> {
    let mut sizes = Vec::new();
    let Ok((resources, resource_ids)) = doc.get_page_resources(page_id) else {
        return sizes;
    };

    let mut dicts: Vec<&Dictionary> = Vec::new();
    if let Some(dict) = resources {
        dicts.push(dict);
    }
    for id in resource_ids {
        if let Ok(Object::Dictionary(dict)) = doc.get_object(id) {
            dicts.push(dict);
        }
    }

    for resources in dicts {
        let Ok(xobjects) = resources.get(b"XObject") else {
            continue;
        };
        let Some(xobjects) = resolve(doc, xobjects).and_then(|o| o.as_dict().ok()) else {
            continue;
        };
        for (_name, entry) in xobjects.iter() {
            let Some(Object::Stream(stream)) = resolve(doc, entry) else {
                continue;
            };
            let is_image = stream
                .dict
                .get(b"Subtype")
                .ok()
                .and_then(|o| o.as_name().ok())
                .is_some_and(|name| name == b"Image");
            if !is_image {
                continue;
            }
            let width = stream.dict.get(b"Width").ok().and_then(number);
            let height = stream.dict.get(b"Height").ok().and_then(number);
            if let (Some(w), Some(h)) = (width, height) {
                sizes.push((w, h));
            }
        }
    }
    sizes
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median absolute deviation.
fn mad(values: &[f64]) -> f64 {
    let m = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - m).abs()).collect();
    median(&deviations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&[1.0, 3.0, 2.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn test_mad_uniform_is_zero() {
        assert_eq!(mad(&[1.0, 1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_mad_spread() {
        assert!(mad(&[0.5, 1.0, 1.5, 2.0]) > SIZE_MAD_LIMIT);
    }

    #[test]
    fn test_empty_document_not_scanned() {
        let doc = Document::with_version("1.5");
        assert!(!is_scanned(&doc));
    }
}
