use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::{lenient, Record};

/// A recurring care routine (medication round, journal entry, exercise).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    #[serde(deserialize_with = "lenient::id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    /// Weekdays the routine recurs on, 0 = Sunday. Entries are kept as sent.
    #[serde(default, deserialize_with = "one_or_many")]
    pub recurrence_days_of_week: Vec<Value>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub time_of_day: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Record for Routine {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Routine {
    /// Numeric entries, or numbers sent as strings, are compared against
    /// `weekday`. Anything else never matches.
    pub fn recurs_on(&self, weekday: u8) -> bool {
        self.recurrence_days_of_week.iter().any(|day| match day {
            Value::Number(n) => n.as_u64() == Some(u64::from(weekday)),
            Value::String(s) => s.trim().parse::<u8>().ok() == Some(weekday),
            _ => false,
        })
    }
}

/// The server has been seen sending a bare weekday instead of a list, and
/// `null` for routines without a schedule.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(days) => days,
        Value::Null => Vec::new(),
        day => vec![day],
    })
}
