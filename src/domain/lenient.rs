// Lenient decoding for loosely typed dashboard JSON
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Decode `null` the same way as a missing key: the type's default.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Grid units as a whole non-negative number.
///
/// Fractions are rounded, negatives and non-numbers become zero, numeric strings are parsed.
pub fn grid_units<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(match raw {
        Some(units) if units.is_finite() && units > 0.0 => units.round().min(u32::MAX as f64) as u32,
        _ => 0,
    })
}
