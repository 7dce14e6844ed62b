//! Cost report rendering.

use smz_models::CostReport;

/// Render a USD amount for the "Finished" line.
///
/// Positive costs that round to $0.00 at two decimals display as `<$0.01`;
/// two decimals is the maximum precision ever printed.
pub fn format_usd(cost: f64) -> String {
    if cost > 0.0 && cost < 0.005 {
        return "<$0.01".to_string();
    }
    format!("${:.2}", cost)
}

/// Render the unified report.
///
/// `detailed` adds one line per (provider, model) row and per service.
pub fn render_report(report: &CostReport, elapsed_secs: f64, detailed: bool) -> String {
    let mut lines = Vec::new();

    if detailed {
        for row in &report.rows {
            let tokens = match (row.usage.prompt, row.usage.completion) {
                (Some(p), Some(c)) => format!("{p} in / {c} out"),
                (Some(p), None) => format!("{p} in / ? out"),
                (None, Some(c)) => format!("? in / {c} out"),
                (None, None) => "token counts unavailable".to_string(),
            };
            let cost = row
                .cost_usd
                .map(format_usd)
                .unwrap_or_else(|| "unpriced".to_string());
            lines.push(format!(
                "  {} · {} call(s) · {} · {}",
                row.model, row.calls, tokens, cost
            ));
        }
        for (service, hits) in &report.services {
            lines.push(format!("  {service} · {hits} hit(s)"));
        }
    }

    let cost = match report.total_usd {
        Some(total) => format!(" · cost {}", format_usd(total)),
        None => String::new(),
    };
    lines.push(format!("Finished in {elapsed_secs:.1}s{cost}"));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use smz_models::{CallPurpose, CostBook, ModelId, PricingTable, TokenUsage};

    #[test]
    fn test_format_usd_tiny_positive() {
        assert_eq!(format_usd(0.0001), "<$0.01");
        assert_eq!(format_usd(0.004), "<$0.01");
        assert_eq!(format_usd(0.005), "$0.01");
        assert_eq!(format_usd(0.0), "$0.00");
        assert_eq!(format_usd(1.236), "$1.24");
    }

    #[test]
    fn test_finished_line_without_cost() {
        let report = CostReport::default();
        let text = render_report(&report, 2.34, false);
        assert_eq!(text, "Finished in 2.3s");
    }

    #[test]
    fn test_finished_line_never_exceeds_two_decimals() {
        let mut book = CostBook::new();
        book.record_call(
            ModelId::parse("openai/gpt-4o-mini").unwrap(),
            TokenUsage::new(1000, 100),
            CallPurpose::Summary,
        );
        let report = book.report(&PricingTable::builtin());
        let text = render_report(&report, 1.0, false);
        let cost_part = text.split("cost ").nth(1).unwrap();
        if let Some(stripped) = cost_part.strip_prefix('$') {
            let decimals = stripped.split('.').nth(1).unwrap_or("");
            assert!(decimals.len() <= 2, "too many decimals in {text}");
        }
    }

    #[test]
    fn test_detailed_lists_rows_and_services() {
        let mut book = CostBook::new();
        book.record_call(
            ModelId::parse("openai/gpt-4o-mini").unwrap(),
            TokenUsage::new(100, 10),
            CallPurpose::Summary,
        );
        book.record_service("firecrawl");
        let report = book.report(&PricingTable::builtin());
        let text = render_report(&report, 1.0, true);
        assert!(text.contains("openai/gpt-4o-mini"));
        assert!(text.contains("firecrawl"));
        assert!(text.lines().last().unwrap().starts_with("Finished in"));
    }
}
