use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::future::Future;
use tracing::{info, warn};

/// Something whose named fields can be checked for presence.
pub trait FieldSource {
    fn has_field(&self, name: &str) -> bool;

    fn missing_fields<'a, S: AsRef<str>>(&self, required: &'a [S]) -> Vec<&'a str> {
        required
            .iter()
            .map(|field| field.as_ref())
            .filter(|field| !self.has_field(field))
            .collect()
    }
}

/// Non-objects have no fields. A key mapped to `null` is still present.
impl FieldSource for Value {
    fn has_field(&self, name: &str) -> bool {
        self.as_object().is_some_and(|fields| fields.contains_key(name))
    }
}

impl FieldSource for Map<String, Value> {
    fn has_field(&self, name: &str) -> bool {
        self.contains_key(name)
    }
}

impl<V> FieldSource for HashMap<String, V> {
    fn has_field(&self, name: &str) -> bool {
        self.contains_key(name)
    }
}

impl<V> FieldSource for BTreeMap<String, V> {
    fn has_field(&self, name: &str) -> bool {
        self.contains_key(name)
    }
}

/// Run `primary`, and only when it fails, `fallback`.
///
/// The fallback's result is used if it carries every required field. In every
/// other case the primary's error comes back, never the fallback's, so the
/// caller sees the root cause.
pub async fn execute_with_fallback<T, E, FE, P, PFut, F, FFut, S>(
    primary: P,
    fallback: F,
    required_fields: &[S],
) -> Result<T, E>
where
    P: FnOnce() -> PFut,
    PFut: Future<Output = Result<T, E>>,
    F: FnOnce() -> FFut,
    FFut: Future<Output = Result<T, FE>>,
    T: FieldSource,
    E: Display,
    FE: Display,
    S: AsRef<str>,
{
    let primary_err = match primary().await {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    warn!("Primary operation failed, trying fallback: {}", primary_err);

    match fallback().await {
        Ok(value) => {
            let missing = value.missing_fields(required_fields);
            if missing.is_empty() {
                info!("Fallback operation provided all required fields");
                Ok(value)
            } else {
                warn!("Fallback result is missing required fields: {:?}", missing);
                Err(primary_err)
            }
        }
        Err(fallback_err) => {
            warn!("Fallback operation failed as well: {}", fallback_err);
            Err(primary_err)
        }
    }
}
