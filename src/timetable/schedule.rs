//! The weekly schedule data model: days, hour slots and temperature symbols.

use serde::de::{self, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One of the three named anchor temperatures, or a literal degree value.
///
/// Anchor names are resolved through `Timetable::anchors` at evaluation
/// time, never at storage time (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Temperature {
    Degrees(f64),
    T0,
    Tmin,
    Tmax,
}

impl Temperature {
    const ANCHOR_NAMES: [&'static str; 3] = ["t0", "tmin", "tmax"];

    /// Parse a JSON-schema-shaped temperature value: a finite number, a
    /// numeric string, or one of the anchor names.
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "t0" => Ok(Self::T0),
            "tmin" => Ok(Self::Tmin),
            "tmax" => Ok(Self::Tmax),
            other => other
                .parse::<f64>()
                .map_err(|_| format!("invalid temperature value `{other}`"))
                .and_then(|v| {
                    if v.is_finite() {
                        Ok(Self::Degrees(v))
                    } else {
                        Err(format!("temperature `{other}` is not finite"))
                    }
                }),
        }
    }

    #[must_use]
    pub const fn is_anchor(self) -> bool {
        matches!(self, Self::T0 | Self::Tmin | Self::Tmax)
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Degrees(v) => write!(f, "{v}"),
            Self::T0 => write!(f, "t0"),
            Self::Tmin => write!(f, "tmin"),
            Self::Tmax => write!(f, "tmax"),
        }
    }
}

struct TemperatureVisitor;

impl<'de> Visitor<'de> for TemperatureVisitor {
    type Value = Temperature;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a finite number, a numeric string, or one of \"t0\"/\"tmin\"/\"tmax\"")
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        if value.is_finite() {
            Ok(Temperature::Degrees(value))
        } else {
            Err(E::custom("temperature must be finite"))
        }
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        #[allow(
            clippy::cast_precision_loss,
            reason = "schedule temperatures never approach i64's precision limit"
        )]
        self.visit_f64(value as f64)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        #[allow(
            clippy::cast_precision_loss,
            reason = "schedule temperatures never approach u64's precision limit"
        )]
        self.visit_f64(value as f64)
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Temperature::parse(value).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Temperature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TemperatureVisitor)
    }
}

impl Serialize for Temperature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Degrees(v) => serializer.serialize_f64(*v),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

/// A day of the week. Day numbers `0` and `7` both alias `Sunday`
/// (spec.md §3), matching the POSIX `%w` convention used by the original
/// `thermod.const.JSON_DAYS_NAME_MAP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    pub const ALL: [Self; 7] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
        Self::Sunday,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|d| d.name().eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("invalid day name `{name}`"))
    }

    /// `0` and `7` both map to Sunday; `1..=6` map to Monday..Saturday.
    pub fn from_number(n: u32) -> Result<Self, String> {
        match n {
            0 | 7 => Ok(Self::Sunday),
            1 => Ok(Self::Monday),
            2 => Ok(Self::Tuesday),
            3 => Ok(Self::Wednesday),
            4 => Ok(Self::Thursday),
            5 => Ok(Self::Friday),
            6 => Ok(Self::Saturday),
            other => Err(format!("invalid day number `{other}`, must be 0-7")),
        }
    }

    /// Parse either a canonical English day name or a day number.
    pub fn parse(value: &str) -> Result<Self, String> {
        if let Ok(n) = value.parse::<u32>() {
            Self::from_number(n)
        } else {
            Self::from_name(value)
        }
    }

    /// chrono's `Weekday::num_days_from_sunday` already gives us `0..=6`
    /// with Sunday first, reuse `from_number` for the mapping.
    #[must_use]
    pub fn from_chrono(weekday: chrono::Weekday) -> Self {
        #[allow(
            clippy::missing_panics_doc,
            reason = "num_days_from_sunday is always in 0..=6"
        )]
        Self::from_number(weekday.num_days_from_sunday())
            .unwrap_or_else(|_| unreachable!("num_days_from_sunday is always 0..=6"))
    }
}

/// The 24-hour day subdivided into 24 hours of 4 quarter-hour slots.
pub type Hour = [Temperature; 4];

/// The full weekly schedule: one `[Hour; 24]` per day.
#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    days: std::collections::BTreeMap<Day, [Hour; 24]>,
}

impl Schedule {
    /// Build a schedule where every slot is the given temperature.
    #[must_use]
    pub fn uniform(temperature: Temperature) -> Self {
        let mut days = std::collections::BTreeMap::new();
        for day in Day::ALL {
            days.insert(day, [[temperature; 4]; 24]);
        }
        Self { days }
    }

    #[must_use]
    pub fn slot(&self, day: Day, hour: usize, quarter: usize) -> Option<Temperature> {
        self.days.get(&day)?.get(hour)?.get(quarter).copied()
    }

    /// Mutate a single slot. `hour` must be `0..24` and `quarter` `0..4`.
    pub fn set_slot(
        &mut self,
        day: Day,
        hour: usize,
        quarter: usize,
        temperature: Temperature,
    ) -> Result<(), String> {
        if hour >= 24 {
            return Err(format!("invalid hour `{hour}`, must be 0-23"));
        }
        if quarter >= 4 {
            return Err(format!("invalid quarter `{quarter}`, must be 0-3"));
        }
        let hours = self
            .days
            .get_mut(&day)
            .ok_or_else(|| format!("missing day `{}` in schedule", day.name()))?;
        hours[hour][quarter] = temperature;
        Ok(())
    }

    /// `true` if every one of the seven days is present with 24 hours of 4
    /// slots each (spec.md §3's "schedule covers all seven days" invariant).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        Day::ALL.iter().all(|d| self.days.contains_key(d))
    }
}

fn hour_key(hour: usize) -> String {
    format!("h{hour:02}")
}

impl Serialize for Schedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.days.len()))?;
        for day in Day::ALL {
            let Some(hours) = self.days.get(&day) else {
                continue;
            };
            let mut day_map = std::collections::BTreeMap::new();
            for (hour, slots) in hours.iter().enumerate() {
                day_map.insert(hour_key(hour), *slots);
            }
            map.serialize_entry(day.name(), &day_map)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct RawDay {
            h00: Hour,
            h01: Hour,
            h02: Hour,
            h03: Hour,
            h04: Hour,
            h05: Hour,
            h06: Hour,
            h07: Hour,
            h08: Hour,
            h09: Hour,
            h10: Hour,
            h11: Hour,
            h12: Hour,
            h13: Hour,
            h14: Hour,
            h15: Hour,
            h16: Hour,
            h17: Hour,
            h18: Hour,
            h19: Hour,
            h20: Hour,
            h21: Hour,
            h22: Hour,
            h23: Hour,
        }

        impl RawDay {
            fn into_hours(self) -> [Hour; 24] {
                [
                    self.h00, self.h01, self.h02, self.h03, self.h04, self.h05, self.h06,
                    self.h07, self.h08, self.h09, self.h10, self.h11, self.h12, self.h13,
                    self.h14, self.h15, self.h16, self.h17, self.h18, self.h19, self.h20,
                    self.h21, self.h22, self.h23,
                ]
            }
        }

        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct RawSchedule {
            monday: RawDay,
            tuesday: RawDay,
            wednesday: RawDay,
            thursday: RawDay,
            friday: RawDay,
            saturday: RawDay,
            sunday: RawDay,
        }

        let raw = RawSchedule::deserialize(deserializer)?;
        let mut days = std::collections::BTreeMap::new();
        days.insert(Day::Monday, raw.monday.into_hours());
        days.insert(Day::Tuesday, raw.tuesday.into_hours());
        days.insert(Day::Wednesday, raw.wednesday.into_hours());
        days.insert(Day::Thursday, raw.thursday.into_hours());
        days.insert(Day::Friday, raw.friday.into_hours());
        days.insert(Day::Saturday, raw.saturday.into_hours());
        days.insert(Day::Sunday, raw.sunday.into_hours());
        Ok(Self { days })
    }
}
