use crate::history::HistoryEntry;

/// Chart points `(attempt, score)` for entries already sorted oldest first.
pub fn history_points(entries: &[HistoryEntry]) -> Vec<(f64, f64)> {
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| ((i + 1) as f64, f64::from(e.score)))
        .collect()
}

/// Compute X (attempts) and Y (score) upper bounds for the history chart
pub fn compute_chart_params(points: &[(f64, f64)]) -> (f64, f64) {
    let highest_score = points.iter().map(|&(_, s)| s).fold(0.0, f64::max);
    let attempts = points.last().map_or(1.0, |p| p.0).max(2.0);

    // keep a flat all-zero history off the x axis
    (attempts, highest_score.max(1.0).round())
}

/// Format a simple numeric label consistently
pub fn format_label(val: f64) -> String {
    if (val - val.round()).abs() < f64::EPSILON {
        format!("{}", val.round())
    } else {
        format!("{val:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_points_are_numbered_from_one() {
        let entries = vec![
            HistoryEntry::new("2024-01-01T00:00:00.000Z", 4),
            HistoryEntry::new("2024-01-02T00:00:00.000Z", 9),
        ];

        assert_eq!(history_points(&entries), vec![(1.0, 4.0), (2.0, 9.0)]);
    }

    #[test]
    fn test_compute_chart_params() {
        assert_eq!(compute_chart_params(&[]), (2.0, 1.0));
        assert_eq!(compute_chart_params(&[(1.0, 0.0)]), (2.0, 1.0));
        assert_eq!(
            compute_chart_params(&[(1.0, 4.0), (2.0, 12.0), (3.0, 7.0)]),
            (3.0, 12.0)
        );
    }

    #[test]
    fn test_format_label() {
        assert_eq!(format_label(1.0), "1");
        assert_eq!(format_label(1.2345), "1.23");
    }
}
