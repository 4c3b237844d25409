//! Линейный Plotly-график прогноза для выбранной локации.

use itertools::Itertools;
use plotly::color::{Rgb, Rgba};
use plotly::common::{Font, Line, Marker, Mode, Title};
use plotly::layout::{Axis, Layout, Margin, TicksDirection};
use plotly::{Configuration, Plot, Scatter};

use crate::constants::DATE_FORMAT;
use crate::present::PredictionSeries;

const FONT_FAMILY: &str = "IBM Plex Sans, Arial, sans-serif";
const TICK_FORMAT_DAY: &str = "%d %b\n%Y";
const LABEL_DATE: &str = "Date";
const LABEL_PREDICTED: &str = "Predicted value";
const FONT_SIZE_BASE: usize = 12;
const FONT_SIZE_AXIS_TITLE: usize = 13;
const FONT_SIZE_AXIS_TICK: usize = 11;
const LINE_WIDTH: f64 = 2.2;
const MARKER_SIZE: usize = 7;
const MARGIN_LEFT: usize = 70;
const MARGIN_RIGHT: usize = 30;
const MARGIN_TOP: usize = 50;
const MARGIN_BOTTOM: usize = 70;
const TICK_LENGTH: usize = 6;
const COLOR_LINE: (u8, u8, u8) = (36, 100, 166);
const COLOR_TEXT_BASE: (u8, u8, u8) = (40, 40, 40);
const COLOR_AXIS_TICK: (u8, u8, u8, f64) = (0, 0, 0, 0.45);
const COLOR_AXIS_LINE: (u8, u8, u8, f64) = (0, 0, 0, 0.35);
const COLOR_AXIS_GRID: (u8, u8, u8, f64) = (0, 0, 0, 0.08);

fn rgb(color: (u8, u8, u8)) -> Rgb {
    Rgb::new(color.0, color.1, color.2)
}

fn rgba(color: (u8, u8, u8, f64)) -> Rgba {
    Rgba::new(color.0, color.1, color.2, color.3)
}

/// Строит график ряда; для пустого ряда графика нет.
pub(super) fn build_prediction_chart(series: &PredictionSeries, field: &str) -> Option<Plot> {
    if series.is_empty() {
        return None;
    }
    let dates = series
        .dates
        .iter()
        .map(|date| date.format(DATE_FORMAT).to_string())
        .collect_vec();

    let mut plot = Plot::new();
    plot.add_trace(
        Scatter::new(dates, series.values.clone())
            .mode(Mode::LinesMarkers)
            .line(Line::new().color(rgb(COLOR_LINE)).width(LINE_WIDTH))
            .marker(Marker::new().size(MARKER_SIZE).color(rgb(COLOR_LINE)))
            .name(&series.location),
    );

    let axis = |title: &str| {
        Axis::new()
            .title(Title::with_text(title).font(Font::new().size(FONT_SIZE_AXIS_TITLE)))
            .tick_font(Font::new().size(FONT_SIZE_AXIS_TICK))
            .ticks(TicksDirection::Outside)
            .tick_length(TICK_LENGTH)
            .tick_color(rgba(COLOR_AXIS_TICK))
            .show_line(true)
            .line_color(rgba(COLOR_AXIS_LINE))
            .grid_color(rgba(COLOR_AXIS_GRID))
            .auto_margin(true)
    };
    let layout = Layout::new()
        .title(Title::with_text(&format!(
            "{field} predictions for {}",
            series.location
        )))
        .font(
            Font::new()
                .family(FONT_FAMILY)
                .size(FONT_SIZE_BASE)
                .color(rgb(COLOR_TEXT_BASE)),
        )
        .auto_size(true)
        .show_legend(true)
        .margin(
            Margin::new()
                .left(MARGIN_LEFT)
                .right(MARGIN_RIGHT)
                .top(MARGIN_TOP)
                .bottom(MARGIN_BOTTOM),
        )
        .x_axis(axis(LABEL_DATE).tick_format(TICK_FORMAT_DAY))
        .y_axis(axis(&format!("{LABEL_PREDICTED} ({field})")).separate_thousands(true));

    plot.set_layout(layout);
    plot.set_configuration(Configuration::new().responsive(true));
    Some(plot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn empty_series_has_no_chart() {
        assert!(build_prediction_chart(&PredictionSeries::default(), "Temperature").is_none());
    }

    #[test]
    fn chart_carries_dates_and_location() {
        let series = PredictionSeries {
            location: "Cheras".into(),
            dates: vec![NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()],
            values: vec![27.5],
        };
        let plot = build_prediction_chart(&series, "Temperature").unwrap();
        let json = plot.to_json();
        assert!(json.contains("2025-01-01"));
        assert!(json.contains("Cheras"));
    }
}
