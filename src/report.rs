//! Сборка и сохранение HTML-дашборда с прогнозом.

mod chart;
mod page;

use std::error::Error;
use std::fs;
use std::path::Path;

use chrono::{NaiveDate, Utc};

use crate::model::Metrics;
use crate::present::{PredictionSeries, PredictionTable};
use crate::status::StatusEntry;

/// Всё, что показывается на странице за один запуск.
pub struct Dashboard<'a> {
    pub field: &'a str,
    pub location: &'a str,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub status: &'a [StatusEntry],
    /// Откуда взята модель (загружена/обучена), если до неё дошло.
    pub model: Option<String>,
    /// Источник признаков: файл датасета или синтетика.
    pub source: String,
    pub baseline: Option<Metrics>,
    pub validation: Option<Metrics>,
    pub table: &'a PredictionTable,
    pub series: &'a PredictionSeries,
}

pub fn render_dashboard(
    dashboard: &Dashboard<'_>,
    output_html: &Path,
    minify: bool,
) -> Result<(), Box<dyn Error>> {
    let plot = chart::build_prediction_chart(dashboard.series, dashboard.field);
    let page = page::render_dashboard_page(dashboard, plot.as_ref(), Utc::now());
    let page = if minify { minify_page(page) } else { page };

    // Создаём директорию для HTML, если её ещё нет.
    if let Some(parent) = output_html.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(output_html, page)?;
    Ok(())
}

fn minify_page(page: String) -> String {
    let cfg = minify_html::Cfg {
        minify_css: true,
        minify_js: true,
        ..minify_html::Cfg::default()
    };
    let minified = minify_html::minify(page.as_bytes(), &cfg);
    String::from_utf8(minified).unwrap_or(page)
}
