//! CAD ↔ OCR cross-validation and quality scoring
//!
//! Correlates recognized words against the annotations already parsed
//! from the drawing. A word matching a CAD text validates the vector
//! data; a word with no counterpart is a discovery, text that exists
//! only rasterized. Both end up as typed relationships on the graph.

use serde::Serialize;
use serde_json::{json, Value};

use super::{OcrOutcome, Region, RegionType};

/// Words below this confidence are dropped before correlation.
const MIN_WORD_CONFIDENCE: f64 = 0.30;

/// Per-region rollup for the `OCRRegion` node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSummary {
    pub region_id: String,
    pub region_type: RegionType,
    pub text_count: u64,
    pub average_confidence: f64,
}

/// How a recognized word relates to the vector data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Correlation {
    /// The word confirms an annotation already in the graph
    Validates {
        correlation_type: String,
        cad_text: String,
    },
    /// The word has no CAD counterpart
    Discovers { context: String },
}

/// One word destined for an `OCRText` node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextFinding {
    pub text: String,
    pub confidence: f64,
    pub region_id: String,
    pub region_type: RegionType,
    pub engine: String,
    pub extracted_info: Value,
    pub correlation: Correlation,
}

/// The cross-validation product handed to projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OcrEnrichment {
    pub regions: Vec<RegionSummary>,
    pub texts: Vec<TextFinding>,
    pub validations: usize,
    pub discoveries: usize,
}

/// Correlate OCR outcomes with the drawing's annotation texts.
pub fn cross_validate(outcomes: &[(Region, OcrOutcome)], cad_texts: &[String]) -> OcrEnrichment {
    let normalized_cad: Vec<(String, &String)> = cad_texts
        .iter()
        .map(|t| (normalize_text(t), t))
        .collect();

    let mut enrichment = OcrEnrichment::default();
    for (region, outcome) in outcomes {
        let words: Vec<_> = outcome
            .words
            .iter()
            .filter(|w| w.confidence >= MIN_WORD_CONFIDENCE && !w.text.trim().is_empty())
            .collect();
        if words.is_empty() {
            continue;
        }
        let average_confidence =
            words.iter().map(|w| w.confidence).sum::<f64>() / words.len() as f64;
        enrichment.regions.push(RegionSummary {
            region_id: region.region_id.clone(),
            region_type: region.region_type,
            text_count: words.len() as u64,
            average_confidence,
        });

        for word in words {
            let normalized = normalize_text(&word.text);
            let correlation = match correlate(&normalized, &normalized_cad) {
                Some((correlation_type, cad_text)) => {
                    enrichment.validations += 1;
                    Correlation::Validates {
                        correlation_type: correlation_type.to_string(),
                        cad_text: cad_text.clone(),
                    }
                }
                None => {
                    enrichment.discoveries += 1;
                    Correlation::Discovers {
                        context: format!("uncorrelated text in {}", region.region_type.name()),
                    }
                }
            };
            enrichment.texts.push(TextFinding {
                text: word.text.trim().to_string(),
                confidence: word.confidence,
                region_id: region.region_id.clone(),
                region_type: region.region_type,
                engine: outcome.engine.clone(),
                extracted_info: json!({
                    "full_text_length": outcome.full_text.len(),
                    "engine_confidence": outcome.confidence_score,
                }),
                correlation,
            });
        }
    }
    enrichment
}

fn correlate<'a>(
    normalized_word: &str,
    cad_texts: &'a [(String, &String)],
) -> Option<(&'static str, &'a String)> {
    for (normalized, original) in cad_texts {
        if normalized == normalized_word {
            return Some(("exact_match", *original));
        }
    }
    // Partial containment either way, long enough to be meaningful.
    if normalized_word.len() >= 3 {
        for (normalized, original) in cad_texts {
            if normalized.contains(normalized_word) || normalized_word.contains(normalized.as_str())
            {
                return Some(("partial_match", *original));
            }
        }
    }
    None
}

fn normalize_text(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Health rollup over one enrichment run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    /// 0–100 composite score
    pub health_score: f64,
    pub total_words: usize,
    pub validations: usize,
    pub discoveries: usize,
    pub average_confidence: f64,
    pub regions_with_text: usize,
    pub processing_time: f64,
}

/// Score an enrichment run.
///
/// Weights: recognition confidence 50%, CAD correlation rate 30%,
/// regions that produced any text 20%.
pub fn score_quality(
    enrichment: &OcrEnrichment,
    regions_total: usize,
    processing_time: f64,
) -> QualityReport {
    let total_words = enrichment.texts.len();
    let average_confidence = if total_words == 0 {
        0.0
    } else {
        enrichment.texts.iter().map(|t| t.confidence).sum::<f64>() / total_words as f64
    };
    let correlation_rate = if total_words == 0 {
        0.0
    } else {
        enrichment.validations as f64 / total_words as f64
    };
    let coverage = if regions_total == 0 {
        0.0
    } else {
        enrichment.regions.len() as f64 / regions_total as f64
    };
    let health_score =
        (100.0 * (0.5 * average_confidence + 0.3 * correlation_rate + 0.2 * coverage))
            .clamp(0.0, 100.0);

    QualityReport {
        health_score,
        total_words,
        validations: enrichment.validations,
        discoveries: enrichment.discoveries,
        average_confidence,
        regions_with_text: enrichment.regions.len(),
        processing_time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{Bounds, OcrWord};

    fn region(id: &str, region_type: RegionType) -> Region {
        Region {
            region_id: id.to_string(),
            region_type,
            bounds: Bounds::new(0.0, 0.0, 10.0, 10.0),
            priority: 0.5,
        }
    }

    fn outcome(words: &[(&str, f64)]) -> OcrOutcome {
        OcrOutcome {
            engine: "test-ocr".to_string(),
            full_text: words.iter().map(|(t, _)| *t).collect::<Vec<_>>().join(" "),
            words: words
                .iter()
                .map(|(t, c)| OcrWord { text: t.to_string(), confidence: *c })
                .collect(),
            confidence_score: 0.9,
            processing_time: 0.1,
        }
    }

    #[test]
    fn test_exact_match_validates() {
        let outcomes = vec![(
            region("title_block_000", RegionType::TitleBlock),
            outcome(&[("ROOM 101", 0.95)]),
        )];
        let cad = vec!["Room 101".to_string()];
        let e = cross_validate(&outcomes, &cad);
        assert_eq!(e.validations, 1);
        assert_eq!(e.discoveries, 0);
        match &e.texts[0].correlation {
            Correlation::Validates { correlation_type, cad_text } => {
                assert_eq!(correlation_type, "exact_match");
                assert_eq!(cad_text, "Room 101");
            }
            other => panic!("expected validation, got {other:?}"),
        }
    }

    #[test]
    fn test_unmatched_word_discovers() {
        let outcomes = vec![(
            region("border_area_001", RegionType::BorderArea),
            outcome(&[("REV B", 0.8)]),
        )];
        let e = cross_validate(&outcomes, &[]);
        assert_eq!(e.discoveries, 1);
        match &e.texts[0].correlation {
            Correlation::Discovers { context } => {
                assert!(context.contains("border_area"));
            }
            other => panic!("expected discovery, got {other:?}"),
        }
    }

    #[test]
    fn test_partial_match() {
        let outcomes = vec![(
            region("legend_002", RegionType::Legend),
            outcome(&[("ESC 1:50", 0.9)]),
        )];
        let cad = vec!["Plan ESC 1:50 Final".to_string()];
        let e = cross_validate(&outcomes, &cad);
        match &e.texts[0].correlation {
            Correlation::Validates { correlation_type, .. } => {
                assert_eq!(correlation_type, "partial_match");
            }
            other => panic!("expected partial match, got {other:?}"),
        }
    }

    #[test]
    fn test_low_confidence_words_dropped() {
        let outcomes = vec![(
            region("title_block_000", RegionType::TitleBlock),
            outcome(&[("noise", 0.1), ("signal", 0.9)]),
        )];
        let e = cross_validate(&outcomes, &[]);
        assert_eq!(e.texts.len(), 1);
        assert_eq!(e.texts[0].text, "signal");
        assert_eq!(e.regions[0].text_count, 1);
    }

    #[test]
    fn test_region_without_text_not_summarized() {
        let outcomes = vec![(
            region("legend_002", RegionType::Legend),
            outcome(&[]),
        )];
        let e = cross_validate(&outcomes, &[]);
        assert!(e.regions.is_empty());
        assert!(e.texts.is_empty());
    }

    #[test]
    fn test_quality_score_composition() {
        let outcomes = vec![(
            region("title_block_000", RegionType::TitleBlock),
            outcome(&[("A-01", 1.0), ("B-02", 1.0)]),
        )];
        let cad = vec!["A-01".to_string(), "B-02".to_string()];
        let e = cross_validate(&outcomes, &cad);
        let q = score_quality(&e, 1, 2.5);
        // Full confidence, full correlation, full coverage.
        assert!((q.health_score - 100.0).abs() < 1e-9);
        assert_eq!(q.validations, 2);
        assert_eq!(q.processing_time, 2.5);
    }

    #[test]
    fn test_quality_score_empty_run() {
        let q = score_quality(&OcrEnrichment::default(), 3, 0.5);
        assert_eq!(q.health_score, 0.0);
        assert_eq!(q.total_words, 0);
    }
}
