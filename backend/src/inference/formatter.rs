use shared::{ClassificationResult, PredictionItem};

use super::labels::LabelTable;

pub const DEFAULT_TOP_K: usize = 5;

/// Turns a probability vector into a thresholded, ranked result.
///
/// `total_predictions` is the number of top-K candidates considered, which is
/// `min(top_k, probabilities.len())`.
pub fn format_predictions(
    probabilities: &[f32],
    labels: &LabelTable,
    threshold: f32,
    top_k: usize,
) -> ClassificationResult {
    let mut ranked: Vec<(usize, f32)> = probabilities
        .iter()
        .enumerate()
        .map(|(index, score)| (index, sanitize(*score)))
        .collect();
    // Stable, so equal scores keep class-index order.
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(top_k);

    let total_predictions = ranked.len();
    let predictions = ranked
        .into_iter()
        .filter(|(_, score)| *score >= threshold)
        .map(|(index, score)| PredictionItem {
            label: labels.label(index).into_owned(),
            score,
        })
        .collect();

    ClassificationResult::new(predictions, total_predictions)
}

fn sanitize(score: f32) -> f32 {
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> LabelTable {
        LabelTable::parse("a\nb\nc\nd\ne\nf\ng")
    }

    #[test]
    fn keeps_top_k_in_descending_order() {
        let probs = [0.05, 0.4, 0.1, 0.2, 0.15, 0.06, 0.04];
        let result = format_predictions(&probs, &labels(), 0.0, 5);
        assert_eq!(result.total_predictions, 5);
        assert_eq!(result.filtered_predictions, 5);
        let names: Vec<&str> = result.predictions.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(names, ["b", "d", "e", "c", "f"]);
        assert!(result.predictions.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn threshold_filters_inclusively() {
        let probs = [0.5, 0.3, 0.2];
        let result = format_predictions(&probs, &labels(), 0.3, 5);
        assert_eq!(result.total_predictions, 3);
        assert_eq!(result.filtered_predictions, 2);
        assert_eq!(result.predictions.len(), result.filtered_predictions);
        assert!(result.predictions.iter().all(|p| p.score >= 0.3));
    }

    #[test]
    fn ties_keep_class_order() {
        let probs = [0.25, 0.25, 0.25, 0.25];
        let result = format_predictions(&probs, &labels(), 0.0, 3);
        let names: Vec<&str> = result.predictions.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn empty_result_is_valid() {
        let result = format_predictions(&[0.1, 0.2], &labels(), 0.9, 5);
        assert_eq!(result.total_predictions, 2);
        assert_eq!(result.filtered_predictions, 0);
        assert!(result.predictions.is_empty());

        let result = format_predictions(&[], &labels(), 0.0, 5);
        assert_eq!(result.total_predictions, 0);
    }

    #[test]
    fn threshold_one_admits_only_certain_scores() {
        let result = format_predictions(&[1.0, 0.0], &labels(), 1.0, 5);
        assert_eq!(result.filtered_predictions, 1);
        assert_eq!(result.predictions[0].label, "a");
    }

    #[test]
    fn nan_scores_rank_last() {
        let result = format_predictions(&[f32::NAN, 0.3], &labels(), 0.0, 5);
        assert_eq!(result.predictions[0].label, "b");
        assert_eq!(result.predictions[1].score, 0.0);
    }
}
