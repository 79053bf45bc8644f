// Serde helpers for wire fields that may come from the API in multiple formats.

use serde::{Deserialize, Deserializer};

/// Deserializes an optional numeric field sent either as a JSON string ("48.85") or a bare number (48.85).
/// Empty strings decode as `None`.
pub fn deserialize_number_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberFormat {
        Number(f64),
        String(String),
    }

    let value = Option::<NumberFormat>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(NumberFormat::Number(n)) => Ok(Some(n.to_string())),
        Some(NumberFormat::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s.to_string()))
            }
        }
    }
}
