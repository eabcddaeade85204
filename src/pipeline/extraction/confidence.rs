use super::types::{BoundingBox, OcrResult, WordColor, WordDetection, WordObject};

/// A detection carries a real word: non-blank text and a non-negative score.
pub fn is_valid_detection(detection: &WordDetection) -> bool {
    !detection.text.trim().is_empty() && detection.confidence >= 0.0
}

/// Color a word for review.
pub fn word_color(confidence: f64, threshold: f64) -> WordColor {
    if confidence >= threshold {
        WordColor::Green
    } else {
        WordColor::Red
    }
}

/// Scale one engine box back to original-image pixels, truncating toward zero.
fn scale_box(detection: &WordDetection, scale_factor: f64) -> BoundingBox {
    let b = &detection.bbox;
    BoundingBox {
        x: (b.x / scale_factor) as i32,
        y: (b.y / scale_factor) as i32,
        width: (b.width / scale_factor) as i32,
        height: (b.height / scale_factor) as i32,
    }
}

/// Turn raw engine detections into review-ready words.
///
/// Returns the retained words (input order preserved) and their mean
/// confidence, 0.0 when nothing survives.
pub fn normalize_detections(
    detections: &[WordDetection],
    scale_factor: f64,
    threshold: f64,
) -> (Vec<WordObject>, f64) {
    let scale = if scale_factor > 0.0 { scale_factor } else { 1.0 };

    let words: Vec<WordObject> = detections
        .iter()
        .filter(|d| is_valid_detection(d))
        .map(|d| WordObject {
            text: d.text.clone(),
            confidence: d.confidence,
            bbox: scale_box(d, scale),
            color: word_color(d.confidence, threshold),
        })
        .collect();

    let mean = mean_confidence(&words);
    (words, mean)
}

/// Mean confidence over words, 0.0 for an empty list.
pub fn mean_confidence(words: &[WordObject]) -> f64 {
    if words.is_empty() {
        return 0.0;
    }
    words.iter().map(|w| w.confidence).sum::<f64>() / words.len() as f64
}

/// Space-joined word texts, the text form used when a backend gives no full text.
pub fn join_words(words: &[WordObject]) -> String {
    words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Assemble a page result from normalized words and optional full text.
///
/// Missing or blank full text falls back to the word join.
pub fn build_page_result(
    full_text: Option<String>,
    words: Vec<WordObject>,
    mean_confidence: f64,
    warnings: Vec<String>,
) -> OcrResult {
    let text = match full_text {
        Some(t) if !t.trim().is_empty() => t,
        _ => join_words(&words),
    };
    OcrResult {
        text,
        word_objects: words,
        mean_confidence,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::types::{RawBox, NO_CONFIDENCE};

    fn det(text: &str, confidence: f64, x: f64) -> WordDetection {
        WordDetection {
            text: text.to_string(),
            confidence,
            bbox: RawBox {
                x,
                y: 21.0,
                width: 41.0,
                height: 15.0,
            },
        }
    }

    #[test]
    fn drops_blank_and_undetected_words() {
        let dets = vec![
            det("Aorta", 95.0, 10.0),
            det("   ", 99.0, 20.0),
            det("ghost", NO_CONFIDENCE, 30.0),
            det("32mm", 70.0, 40.0),
        ];
        let (words, _) = normalize_detections(&dets, 1.0, 90.0);
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["Aorta", "32mm"]);
    }

    #[test]
    fn boxes_are_divided_and_truncated() {
        let (words, _) = normalize_detections(&[det("VDF", 91.0, 201.0)], 2.0, 90.0);
        assert_eq!(
            words[0].bbox,
            BoundingBox {
                x: 100,
                y: 10,
                width: 20,
                height: 7
            }
        );
    }

    #[test]
    fn threshold_is_inclusive_for_green() {
        assert_eq!(word_color(90.0, 90.0), WordColor::Green);
        assert_eq!(word_color(89.99, 90.0), WordColor::Red);
    }

    #[test]
    fn mean_over_retained_words_only() {
        let dets = vec![det("a", 80.0, 0.0), det("b", 100.0, 0.0), det("c", -1.0, 0.0)];
        let (words, mean) = normalize_detections(&dets, 1.0, 90.0);
        assert_eq!(words.len(), 2);
        assert!((mean - 90.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_has_zero_mean() {
        let (words, mean) = normalize_detections(&[], 2.0, 90.0);
        assert!(words.is_empty());
        assert_eq!(mean, 0.0);
    }

    #[test]
    fn missing_text_falls_back_to_word_join() {
        let (words, mean) =
            normalize_detections(&[det("FE", 95.0, 0.0), det("65%", 92.0, 0.0)], 1.0, 90.0);
        let result = build_page_result(None, words.clone(), mean, vec![]);
        assert_eq!(result.text, "FE 65%");

        let result = build_page_result(Some("  \n".into()), words, mean, vec![]);
        assert_eq!(result.text, "FE 65%");
    }

    #[test]
    fn full_text_is_kept_verbatim() {
        let result = build_page_result(Some("Aorta: 32 mm\n".into()), vec![], 0.0, vec![]);
        assert_eq!(result.text, "Aorta: 32 mm\n");
    }
}
