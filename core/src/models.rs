use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dates;

/// One diary line as returned by `food_entries.get.v2`.
///
/// The remote sends numbers as strings; decoding accepts either. Fields this
/// type does not name are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodEntry {
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub food_entry_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_int: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub food_entry_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub meal: String,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub calories: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub carbohydrate: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub fat: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub protein: f64,
    #[serde(
        default,
        deserialize_with = "lenient::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub sodium: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub sugar: Option<f64>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub fiber: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FoodEntry {
    /// Calendar date of `date_int`, if present and in range.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        self.date_int.and_then(dates::date_from_days)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(deserialize_with = "lenient::f64")]
    pub goal_weight_kg: f64,
    #[serde(deserialize_with = "lenient::f64")]
    pub height_cm: f64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub height_measure: String,
    #[serde(deserialize_with = "lenient::f64")]
    pub last_weight_kg: f64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub weight_measure: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_weight_date_int: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_weight_comment: Option<String>,
}

/// One day of a `food_entries.get_month` summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthDay {
    #[serde(deserialize_with = "lenient::i64")]
    pub date_int: i64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub calories: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub carbohydrate: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub protein: f64,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub fat: f64,
}

impl MonthDay {
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        dates::date_from_days(self.date_int)
    }
}

/// The remote collapses one-element lists into a bare object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(v) => v,
            Self::One(t) => vec![t],
        }
    }
}

/// Nutrient totals for one cached date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTotals {
    pub date: String,
    pub entries: usize,
    pub calories: f64,
    pub carbohydrate: f64,
    pub fat: f64,
    pub protein: f64,
}

impl DayTotals {
    pub fn from_entries(date: impl Into<String>, entries: &[FoodEntry]) -> Self {
        entries.iter().fold(
            Self {
                date: date.into(),
                entries: 0,
                calories: 0.0,
                carbohydrate: 0.0,
                fat: 0.0,
                protein: 0.0,
            },
            |mut acc, e| {
                acc.entries += 1;
                acc.calories += e.calories;
                acc.carbohydrate += e.carbohydrate;
                acc.fat += e.fat;
                acc.protein += e.protein;
                acc
            },
        )
    }
}

/// Deserializers for values that may arrive as JSON strings or numbers.
mod lenient {
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Int(i64),
        Float(f64),
        Bool(bool),
        Str(String),
    }

    fn parse_f64<E: Error>(s: &str) -> Result<Option<f64>, E> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(None);
        }
        s.parse()
            .map(Some)
            .map_err(|_| E::custom(format!("expected a number, got '{s}'")))
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        match Option::<Scalar>::deserialize(d)? {
            None => Ok(None),
            Some(Scalar::Int(i)) => Ok(Some(i as f64)),
            Some(Scalar::Float(f)) => Ok(Some(f)),
            Some(Scalar::Str(s)) => parse_f64(&s),
            Some(Scalar::Bool(_)) => Err(D::Error::custom("expected a number, got a boolean")),
        }
    }

    /// Blank or null reads as zero.
    pub fn f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        opt_f64(d).map(Option::unwrap_or_default)
    }

    pub fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        match Option::<Scalar>::deserialize(d)? {
            None => Ok(None),
            Some(Scalar::Int(i)) => Ok(Some(i)),
            #[allow(clippy::cast_possible_truncation)]
            Some(Scalar::Float(f)) if f.fract() == 0.0 => Ok(Some(f as i64)),
            Some(Scalar::Str(s)) if s.trim().is_empty() => Ok(None),
            Some(Scalar::Str(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("expected an integer, got '{s}'"))),
            Some(_) => Err(D::Error::custom("expected an integer")),
        }
    }

    pub fn i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        opt_i64(d)?.ok_or_else(|| D::Error::custom("expected an integer, got nothing"))
    }

    /// Empty strings read as absent.
    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Scalar>::deserialize(d)? {
            None => None,
            Some(Scalar::Str(s)) if s.is_empty() => None,
            Some(Scalar::Str(s)) => Some(s),
            Some(Scalar::Int(i)) => Some(i.to_string()),
            Some(Scalar::Float(f)) => Some(f.to_string()),
            Some(Scalar::Bool(b)) => Some(b.to_string()),
        })
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        opt_string(d).map(Option::unwrap_or_default)
    }
}
