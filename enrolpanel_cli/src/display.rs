use comfy_table::{presets::NOTHING, *};

use enrolpanel::normalize::NormalizeReport;
use enrolpanel::validate::QualityReport;
use polars::frame::DataFrame;

fn styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

/// Render a frame as a bordered table, optionally truncated.
pub fn display_frame(df: &DataFrame, max_results: Option<usize>) -> anyhow::Result<()> {
    let df_to_show = match max_results {
        Some(max) => df.head(Some(max)),
        None => df.clone(),
    };
    let mut table = styled_table();
    table.set_header(
        df_to_show
            .get_column_names()
            .iter()
            .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    for idx in 0..df_to_show.height() {
        let row = df_to_show.get_row(idx)?;
        table.add_row(row.0.iter().map(|value| format!("{value}")));
    }
    println!("\n{}", table);
    if let Some(max) = max_results {
        if df.height() > max {
            println!("{} more rows not shown.", df.height() - max);
        }
    }
    Ok(())
}

/// One accounting row per source dataset.
pub fn display_normalize_reports(reports: &[(&str, &NormalizeReport)]) -> anyhow::Result<()> {
    let mut table = styled_table();
    table.set_header(vec![
        Cell::new("Dataset").add_attribute(Attribute::Bold),
        Cell::new("Rows in").add_attribute(Attribute::Bold),
        Cell::new("Invalid dates").add_attribute(Attribute::Bold),
        Cell::new("Invalid states").add_attribute(Attribute::Bold),
        Cell::new("Duplicates").add_attribute(Attribute::Bold),
        Cell::new("Rows out").add_attribute(Attribute::Bold),
    ]);
    for (name, report) in reports {
        table.add_row(vec![
            name.to_string(),
            report.rows_in.to_string(),
            report.invalid_dates.to_string(),
            report.invalid_states.to_string(),
            report.duplicates_removed.to_string(),
            report.rows_out.to_string(),
        ]);
    }
    println!("\n{}", table);
    Ok(())
}

pub fn display_quality_report(report: &QualityReport) -> anyhow::Result<()> {
    let mut table = styled_table();
    table.set_header(vec![
        Cell::new("Column").add_attribute(Attribute::Bold),
        Cell::new("Placeholders").add_attribute(Attribute::Bold),
        Cell::new("Outliers").add_attribute(Attribute::Bold),
        Cell::new("Zero after nonzero").add_attribute(Attribute::Bold),
    ]);
    for (column, stats) in &report.columns {
        table.add_row(vec![
            column.clone(),
            stats.placeholder.to_string(),
            stats.outlier.to_string(),
            stats.zero_after_nonzero.to_string(),
        ]);
    }
    println!("\n{}", table);
    println!(
        "{} records, {} flags, mean quality score {:.1}, median {:.1}, {} below 80",
        report.total_records,
        report.total_flags,
        report.mean_quality_score,
        report.median_quality_score,
        report.records_below_80
    );
    if !report.small_sample_states.is_empty() {
        println!("States with small samples:");
        for state in &report.small_sample_states {
            println!("  {} ({} records)", state.state, state.sample_size);
        }
    }
    Ok(())
}
