use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

/// One record received on `POST /log` and forwarded verbatim in a batch.
///
/// Missing and `null` fields decode to their zero value; a field of the
/// wrong type rejects the whole event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    #[serde(deserialize_with = "null_as_default")]
    pub user_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub total: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub meta: Meta,
    #[serde(deserialize_with = "null_as_default")]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Meta {
    #[serde(deserialize_with = "null_as_default")]
    pub logins: Vec<Login>,
    #[serde(deserialize_with = "null_as_default")]
    pub phone_numbers: PhoneNumbers,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Login {
    #[serde(
        serialize_with = "time::serde::rfc3339::serialize",
        deserialize_with = "login_time"
    )]
    pub time: OffsetDateTime,
    #[serde(deserialize_with = "null_as_default")]
    pub ip: String,
}

impl Default for Login {
    fn default() -> Self {
        Self {
            time: OffsetDateTime::UNIX_EPOCH,
            ip: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhoneNumbers {
    #[serde(deserialize_with = "null_as_default")]
    pub home: String,
    #[serde(deserialize_with = "null_as_default")]
    pub mobile: String,
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(d).map(Option::unwrap_or_default)
}

fn login_time<'de, D>(d: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    time::serde::rfc3339::option::deserialize(d).map(|t| t.unwrap_or(OffsetDateTime::UNIX_EPOCH))
}

/// Events drained together, in receipt order.
pub type Batch = Vec<Event>;
