//! Render
//!
//! Plain text rendering of estimates and importance charts for the terminal.
use crate::constants::CHART_WIDTH;
use crate::context::PriceEstimate;
use crate::explain::{Attribution, GlobalImportance};
use crate::utils::format_price;

/// Horizontal bars scaled to the largest magnitude. Negative values draw with `-`.
pub fn bar_chart(attributions: &[&Attribution], width: usize) -> String {
    let label_width = attributions.iter().map(|a| a.feature.chars().count()).max().unwrap_or(0);
    let largest = attributions.iter().map(|a| a.value.abs()).fold(0.0, f64::max);
    attributions
        .iter()
        .map(|a| {
            let len = if largest > 0.0 {
                ((a.value.abs() / largest) * width as f64).round() as usize
            } else {
                0
            };
            let glyph = if a.value < 0.0 { "-" } else { "+" };
            format!(
                "{:<label_width$} | {:<width$} {:>14.2}\n",
                a.feature,
                glyph.repeat(len),
                a.value,
                label_width = label_width,
                width = width
            )
        })
        .collect()
}

/// Price line, baseline and the `top` strongest attributions with families collapsed.
pub fn render_estimate(estimate: &PriceEstimate, top: usize) -> String {
    let grouped = estimate.explanation.grouped();
    format!(
        "Estimated price: {}\nBaseline:        {}\n\n{}",
        format_price(estimate.price),
        format_price(grouped.baseline),
        bar_chart(&grouped.top(top), CHART_WIDTH)
    )
}

/// Mean absolute attribution per feature, `top` rows.
pub fn render_importance(importance: &GlobalImportance, top: usize, grouped: bool) -> String {
    let importance = if grouped { importance.grouped() } else { importance.clone() };
    format!(
        "Feature importance over {} reference submissions\n\n{}",
        importance.n_samples,
        bar_chart(&importance.top(top), CHART_WIDTH)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::Explanation;

    fn attribution(feature: &str, value: f64) -> Attribution {
        Attribution {
            feature: feature.to_string(),
            value,
        }
    }

    #[test]
    fn test_bar_chart() {
        let a = attribution("m2_real", 100.0);
        let b = attribution("city", -50.0);
        let chart = bar_chart(&[&a, &b], 10);
        let lines: Vec<&str> = chart.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("m2_real | ++++++++++ "));
        assert!(lines[1].starts_with("city    | -----      "));
        assert!(lines[1].ends_with("-50.00"));
        assert_eq!(bar_chart(&[], 10), "");
    }

    #[test]
    fn test_bar_chart_exact_lines() {
        let a = attribution("zone", 4.0);
        let b = attribution("m2_real", -2.0);
        assert_eq!(
            bar_chart(&[&a, &b], 4),
            "zone    | ++++           4.00\nm2_real | --            -2.00\n"
        );
    }

    #[test]
    fn test_render_estimate() {
        let columns: Vec<String> = vec!["m2_real".to_string(), "city:Inca".to_string(), "city:Muro".to_string()];
        let explanation = Explanation::from_contributions(&columns, &[20_000.0, 5_000.0, 0.0, 200_000.0]).unwrap();
        let estimate = PriceEstimate {
            price: 225_000.0,
            explanation,
        };
        let text = render_estimate(&estimate, 5);
        assert!(text.starts_with("Estimated price: 225000.00 €\n"));
        assert!(text.contains("Baseline:        200000.00 €"));
        assert!(text.contains("city "));
        assert!(!text.contains("city:Inca"));
    }

    #[test]
    fn test_render_importance() {
        let importance = GlobalImportance {
            n_samples: 3,
            importances: vec![attribution("m2_real", 9.0), attribution("city:Inca", 2.0), attribution("city:Muro", 1.0)],
        };
        let text = render_importance(&importance, 2, false);
        assert!(text.contains("over 3 reference"));
        assert!(text.contains("city:Inca"));
        assert!(!text.contains("city:Muro"));
        assert!(render_importance(&importance, 10, true).contains("city "));
    }
}
