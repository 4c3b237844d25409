//! Рендер HTML-страницы дашборда: статусы, метрики, график и таблица прогноза.

use chrono::{DateTime, Utc};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use plotly::Plot;

use super::Dashboard;
use crate::constants::DATE_FORMAT;
use crate::model::Metrics;
use crate::present::{NO_PLOT_DATA_MESSAGE, NO_PREDICTIONS_MESSAGE};
use crate::status::Level;

const PAGE_TITLE: &str = "Weather forecast";
const PAGE_SUBTITLE: &str = "Random forest predictions per location and day.";
const GENERATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M UTC";
const GOOGLE_FONTS_CSS: &str =
    "https://fonts.googleapis.com/css2?family=IBM+Plex+Sans:wght@400;500;600&display=swap";
const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";
const PLOT_DIV_ID: &str = "forecast-plot";
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const STYLE: &str = "
:root {
    color-scheme: light;
    --bg: #f7f6f2;
    --card: #ffffff;
    --ink: #1f2430;
    --muted: #56606f;
    --accent: #2464a6;
    --border: rgba(31, 36, 48, 0.08);
    --warn: #b7791f;
    --err: #c53030;
    --ok: #2f855a;
}
* { box-sizing: border-box; }
body {
    margin: 0;
    background: var(--bg);
    color: var(--ink);
    font-family: \"IBM Plex Sans\", \"PT Sans\", sans-serif;
}
.page { max-width: 1240px; margin: 40px auto 60px; padding: 0 24px; }
.title { font-size: 26px; font-weight: 600; margin: 0; }
.subtitle { margin: 6px 0 22px; color: var(--muted); font-size: 13px; }
.card {
    background: var(--card);
    border-radius: 18px;
    padding: 16px;
    border: 1px solid var(--border);
    overflow-x: auto;
    margin-bottom: 18px;
}
.summary-grid {
    display: grid;
    grid-template-columns: repeat(auto-fit, minmax(200px, 1fr));
    gap: 12px;
    margin-bottom: 18px;
}
.summary-card {
    background: var(--card);
    border-radius: 14px;
    padding: 12px 14px;
    border: 1px solid var(--border);
}
.summary-label { color: var(--muted); font-size: 12px; text-transform: uppercase; }
.summary-value { font-size: 20px; font-weight: 600; margin-top: 4px; }
.summary-sub { color: var(--muted); font-size: 12px; margin-top: 4px; }
.status { list-style: none; margin: 0 0 18px; padding: 0; }
.status li {
    padding: 8px 12px;
    border-radius: 10px;
    margin-bottom: 6px;
    font-size: 13px;
    border-left: 4px solid var(--accent);
    background: var(--card);
}
.status li.warn { border-color: var(--warn); }
.status li.err { border-color: var(--err); color: var(--err); }
.status li.ok { border-color: var(--ok); }
.empty { color: var(--muted); font-style: italic; }
.table-controls { display: flex; gap: 8px; align-items: center; margin-bottom: 10px; font-size: 13px; }
.prediction-table { width: 100%; border-collapse: collapse; font-size: 13px; }
.prediction-table th, .prediction-table td { padding: 6px 10px; text-align: left; }
.prediction-table th { border-bottom: 1px solid var(--border); color: var(--muted); }
.prediction-table tbody tr:nth-child(even) { background: rgba(36, 100, 166, 0.04); }
.prediction-table td.value { font-variant-numeric: tabular-nums; }
#forecast-plot { min-height: 480px; }
footer { color: var(--muted); font-size: 12px; margin-top: 24px; }
";

const SORT_SCRIPT: &str = r"
(() => {
    const select = document.getElementById('prediction-sort');
    const tbody = document.querySelector('.prediction-table tbody');
    if (!select || !tbody) return;
    const apply = () => {
        const rows = Array.from(tbody.querySelectorAll('tr'));
        rows.sort((a, b) => {
            if (select.value === 'value') {
                return parseFloat(b.dataset.value) - parseFloat(a.dataset.value);
            }
            return a.dataset.date.localeCompare(b.dataset.date);
        });
        rows.forEach(row => tbody.appendChild(row));
    };
    select.addEventListener('change', apply);
})();
";

fn metrics_card(label: &str, note: &str, metrics: Option<Metrics>) -> Markup {
    html! {
        div class="summary-card" {
            div class="summary-label" { (label) }
            @if let Some(metrics) = metrics {
                div class="summary-value" { "MAE " (format!("{:.3}", metrics.mae)) }
                div class="summary-sub" {
                    "MSE " (format!("{:.3}", metrics.mse))
                    " · RMSE " (format!("{:.3}", metrics.rmse))
                }
            } @else {
                div class="summary-value" { "—" }
            }
            div class="summary-sub" { (note) }
        }
    }
}

pub(super) fn render_dashboard_page(
    dashboard: &Dashboard<'_>,
    plot: Option<&Plot>,
    generated_at: DateTime<Utc>,
) -> String {
    let generated_label = generated_at.format(GENERATED_AT_FORMAT).to_string();
    let range_label = format!(
        "{} — {}",
        dashboard.start.format(DATE_FORMAT),
        dashboard.end.format(DATE_FORMAT)
    );
    let plot_html = plot.map(|plot| plot.to_inline_html(Some(PLOT_DIV_ID)));
    let model_label = dashboard.model.as_deref().unwrap_or("Not available");

    let page = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (PAGE_TITLE) " · " (dashboard.field) }
                link rel="preconnect" href="https://fonts.googleapis.com";
                link rel="stylesheet" href=(GOOGLE_FONTS_CSS);
                script src=(PLOTLY_CDN) {}
                style { (PreEscaped(STYLE)) }
            }
            body {
                div class="page" {
                    header {
                        h1 class="title" { (PAGE_TITLE) ": " (dashboard.field) }
                        p class="subtitle" { (PAGE_SUBTITLE) }
                    }
                    @if !dashboard.status.is_empty() {
                        ul class="status" {
                            @for entry in dashboard.status {
                                li class=(entry.level.as_str()) {
                                    @if entry.level == Level::Error { "⚠ " }
                                    (entry.message)
                                }
                            }
                        }
                    }
                    section class="summary-grid" {
                        div class="summary-card" {
                            div class="summary-label" { "Location" }
                            div class="summary-value" { (dashboard.location) }
                            div class="summary-sub" { (range_label) }
                        }
                        div class="summary-card" {
                            div class="summary-label" { "Model" }
                            div class="summary-value" { (model_label) }
                            div class="summary-sub" { "Features: " (dashboard.source) }
                        }
                        (metrics_card(
                            "Spread around mean",
                            "Predictions against the mean of the target",
                            dashboard.baseline,
                        ))
                        (metrics_card(
                            "Validation",
                            "Held-out 20% of the training year",
                            dashboard.validation,
                        ))
                    }
                    div class="card" {
                        @if let Some(plot_html) = plot_html {
                            (PreEscaped(plot_html))
                        } @else {
                            p class="empty" { (NO_PLOT_DATA_MESSAGE) }
                        }
                    }
                    section class="card" {
                        div class="table-controls" {
                            span { "Sort:" }
                            select id="prediction-sort" {
                                option value="date" selected { "by date" }
                                option value="value" { "by value" }
                            }
                        }
                        @if dashboard.table.is_empty() {
                            p class="empty" { (NO_PREDICTIONS_MESSAGE) }
                        } @else {
                            table class="prediction-table" {
                                thead {
                                    tr {
                                        th { "DateTime" }
                                        th { "Location" }
                                        th { "Predicted Value" }
                                    }
                                }
                                tbody {
                                    @for row in &dashboard.table.rows {
                                        @let date = row.date.format(DATE_FORMAT).to_string();
                                        tr data-date=(date) data-value=(row.value) {
                                            td { (date) }
                                            td { (row.location.name()) }
                                            td class="value" { (format!("{:.3}", row.value)) }
                                        }
                                    }
                                }
                            }
                        }
                        script { (PreEscaped(SORT_SCRIPT)) }
                    }
                    footer {
                        "Version: " (APP_VERSION) " · Generated: " (generated_label)
                    }
                }
            }
        }
    };
    page.into_string()
}
