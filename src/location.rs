//! Фиксированный справочник локаций: числовой код ↔ отображаемое имя.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    BatuMuda,
    PetalingJaya,
    Cheras,
}

impl Location {
    /// Все локации в порядке кодов.
    pub const ALL: [Self; 3] = [Self::BatuMuda, Self::PetalingJaya, Self::Cheras];

    pub const fn code(self) -> u8 {
        match self {
            Self::BatuMuda => 1,
            Self::PetalingJaya => 2,
            Self::Cheras => 3,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::BatuMuda => "Batu Muda",
            Self::PetalingJaya => "Petaling Jaya",
            Self::Cheras => "Cheras",
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|location| location.code() == code)
    }

    /// Код из числовой ячейки датасета; дробные и отрицательные значения не принимаются.
    pub fn from_value(value: f64) -> Option<Self> {
        if value.fract() != 0.0 || !(0.0..=f64::from(u8::MAX)).contains(&value) {
            return None;
        }
        Self::from_code(value as u8)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|location| location.name() == name)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_bijective() {
        for location in Location::ALL {
            assert_eq!(Location::from_code(location.code()), Some(location));
            assert_eq!(Location::from_name(location.name()), Some(location));
        }
        let codes: Vec<u8> = Location::ALL.iter().map(|l| l.code()).collect();
        assert_eq!(codes, vec![1, 2, 3]);
    }

    #[test]
    fn unknown_values_are_rejected() {
        assert_eq!(Location::from_code(0), None);
        assert_eq!(Location::from_name("Mars"), None);
        assert_eq!(Location::from_value(2.5), None);
        assert_eq!(Location::from_value(-1.0), None);
        assert_eq!(Location::from_value(3.0), Some(Location::Cheras));
    }
}
