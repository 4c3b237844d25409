//! Общие константы: имена колонок датасета, форматы дат и параметры синтеза.

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub const COL_YEAR: &str = "Year";
pub const COL_MONTH: &str = "Month";
pub const COL_DAY: &str = "Day";
pub const COL_HOUR: &str = "Hour";
pub const COL_LOCATION: &str = "LocationInNum";
pub const COL_DATETIME: &str = "DateTime";

/// Шаг маркера часа в формате HHMM (0, 100, …, 2300).
pub const HOUR_STEP: u32 = 100;
pub const HOURS_PER_CYCLE: u32 = 24;
