//! Spreadsheet writer for comparison results: column layout, header
//! styling, row tints, and the `Change (%)` cell's independent
//! classification tint, built on `rust_xlsxwriter`.

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook, Worksheet, XlsxError};

use crate::compare::{Classification, ComparisonResult, MatchType};
use crate::config::ComparatorConfig;

const COLUMNS: &[&str] = &[
    "Baseline Kernel",
    "Base Avg (µs)",
    "Base Min",
    "Base Max",
    "Base StdDev",
    "New Kernel",
    "New Avg (µs)",
    "New Min",
    "New Max",
    "New StdDev",
    "Change (%)",
    "Match Type",
];

fn row_tint(match_type: MatchType) -> Color {
    match match_type {
        MatchType::Exact => Color::RGB(0xE2_EF_DA),
        MatchType::Similar => Color::RGB(0xDD_EB_F7),
        MatchType::NewOnly => Color::RGB(0xFF_F2_CC),
        MatchType::Removed => Color::RGB(0xFC_E4_E4),
    }
}

fn classification_tint(classification: Classification) -> Color {
    match classification {
        Classification::Improved => Color::RGB(0xC6_EF_CE),
        Classification::Regressed => Color::RGB(0xFF_C7_CE),
        Classification::Neutral => Color::RGB(0xFF_EB_9C),
        Classification::New => Color::RGB(0xFF_F2_CC),
    }
}

fn header_format() -> Format {
    Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x4F_81_BD))
        .set_font_color(Color::White)
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin)
}

fn write_header(worksheet: &mut Worksheet) -> Result<(), XlsxError> {
    let fmt = header_format();
    for (col, name) in COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *name, &fmt)?;
    }
    worksheet.set_freeze_panes(1, 0)?;
    Ok(())
}

fn write_summary_row(worksheet: &mut Worksheet, result: &ComparisonResult) -> Result<(), XlsxError> {
    worksheet.write_string(1, 0, format!("Total ({} baseline kernels)", result.baseline_kernel_count))?;
    worksheet.write_string(1, 5, format!("({} new kernels)", result.new_kernel_count))?;
    worksheet.write_number(1, 6, result.total_time)?;
    Ok(())
}

fn write_match_row(
    worksheet: &mut Worksheet,
    row: u32,
    result_match: &crate::compare::KernelMatch,
    config: &ComparatorConfig,
) -> Result<(), XlsxError> {
    let tint = Format::new().set_background_color(row_tint(result_match.match_type));

    let baseline_name = result_match
        .baseline_kernels
        .first()
        .cloned()
        .unwrap_or_else(|| crate::compare::REMOVED_SENTINEL.to_string());
    worksheet.write_string_with_format(row, 0, &baseline_name, &tint)?;

    if let Some(b) = result_match.baseline_timing {
        worksheet.write_number_with_format(row, 1, b.avg, &tint)?;
        worksheet.write_number_with_format(row, 2, b.min, &tint)?;
        worksheet.write_number_with_format(row, 3, b.max, &tint)?;
        worksheet.write_number_with_format(row, 4, b.stddev, &tint)?;
    } else {
        for col in 1..=4 {
            worksheet.write_string_with_format(row, col, "", &tint)?;
        }
    }

    let new_name = result_match
        .new_kernel
        .clone()
        .unwrap_or_else(|| crate::compare::REMOVED_SENTINEL.to_string());
    worksheet.write_string_with_format(row, 5, &new_name, &tint)?;

    if let Some(n) = result_match.new_timing {
        worksheet.write_number_with_format(row, 6, n.avg, &tint)?;
        worksheet.write_number_with_format(row, 7, n.min, &tint)?;
        worksheet.write_number_with_format(row, 8, n.max, &tint)?;
        worksheet.write_number_with_format(row, 9, n.stddev, &tint)?;
    } else {
        for col in 6..=9 {
            worksheet.write_string_with_format(row, col, "", &tint)?;
        }
    }

    let classification = result_match.classify(config);
    let change_fmt = Format::new().set_background_color(classification_tint(classification));
    match result_match.change_pct() {
        Some(pct) => worksheet.write_number_with_format(row, 10, pct, &change_fmt)?,
        None => {
            let label = match result_match.match_type {
                MatchType::NewOnly => "NEW",
                MatchType::Removed => "REMOVED",
                _ => "",
            };
            worksheet.write_string_with_format(row, 10, label, &change_fmt)?
        }
    };

    worksheet.write_string_with_format(row, 11, result_match.match_type.as_str(), &tint)?;
    Ok(())
}

fn fill_worksheet(
    worksheet: &mut Worksheet,
    result: &ComparisonResult,
    config: &ComparatorConfig,
) -> Result<(), XlsxError> {
    write_header(worksheet)?;
    write_summary_row(worksheet, result)?;

    for (i, m) in result.matches.iter().enumerate() {
        let row = 2 + i as u32;
        write_match_row(worksheet, row, m, config)?;
    }

    let last_row = 1 + result.matches.len() as u32;
    if last_row >= 1 {
        worksheet.autofilter(0, 0, last_row, (COLUMNS.len() - 1) as u16)?;
    }
    Ok(())
}

/// Writes a single [`ComparisonResult`] to an `.xlsx` workbook at `path`.
pub fn write_comparison_workbook(path: &std::path::Path, result: &ComparisonResult, config: &ComparatorConfig) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    fill_worksheet(worksheet, result, config)?;
    workbook.save(path)?;
    Ok(())
}

/// Packs several [`ComparisonResult`]s into one workbook, one sheet per
/// comparison. `sheet_names.len()` must equal `results.len()`
/// (`MismatchedSheetNames` otherwise).
pub fn write_multi_comparison_workbook(
    path: &std::path::Path,
    results: &[ComparisonResult],
    sheet_names: &[String],
    config: &ComparatorConfig,
) -> Result<(), crate::error::EngineError> {
    if sheet_names.len() != results.len() {
        return Err(crate::error::EngineError::MismatchedSheetNames {
            sheet_names: sheet_names.len(),
            comparisons: results.len(),
        });
    }

    let mut workbook = Workbook::new();
    for (result, name) in results.iter().zip(sheet_names.iter()) {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(name.as_str()).map_err(|e| {
            crate::error::EngineError::ComparisonInputInvalid(format!("invalid sheet name {name:?}: {e}"))
        })?;
        fill_worksheet(worksheet, result, config)
            .map_err(|e| crate::error::EngineError::ComparisonInputInvalid(e.to_string()))?;
    }
    workbook.save(path).map_err(|e| crate::error::EngineError::ComparisonInputInvalid(e.to_string()))?;
    Ok(())
}
