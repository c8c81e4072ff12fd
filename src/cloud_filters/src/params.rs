//! Declarative parameter tables for filter construction.
//!
//! Each filter publishes a static table of [`ParamSpec`] entries (name,
//! description, default, optional bounds). Construction from a string map goes
//! through [`ParamReader`], which rejects unknown keys and checks every value
//! against its bounds before the filter exists. Typed configs built in code
//! are validated against the same table with [`ParamSpec::check`].

use std::collections::BTreeMap;
use std::fmt::{Display, Write};
use std::str::FromStr;

use crate::error::ConfigError;

/// Raw parameters as string key/value pairs.
pub type Parameters = BTreeMap<String, String>;

/// Build a [`Parameters`] map from string pairs.
pub fn parameters<K, V, I>(pairs: I) -> Parameters
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Documentation and bounds of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Default value; empty for optional parameters without default.
    pub default: &'static str,
    pub min: Option<&'static str>,
    pub max: Option<&'static str>,
}

impl ParamSpec {
    pub const fn new(name: &'static str, description: &'static str, default: &'static str) -> Self {
        Self {
            name,
            description,
            default,
            min: None,
            max: None,
        }
    }

    pub const fn min(mut self, min: &'static str) -> Self {
        self.min = Some(min);
        self
    }

    pub const fn range(mut self, min: &'static str, max: &'static str) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Check a typed value against this parameter's bounds.
    pub fn check<T>(&self, value: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Display,
    {
        let min = self.min.and_then(|m| m.parse::<T>().ok());
        let max = self.max.and_then(|m| m.parse::<T>().ok());

        // NaN fails both comparisons, so it is checked explicitly.
        #[allow(clippy::eq_op)]
        let is_nan = value != value;
        let below = min.as_ref().is_some_and(|m| value < *m);
        let above = max.as_ref().is_some_and(|m| value > *m);

        if is_nan || below || above {
            return Err(ConfigError::OutOfRange {
                name: self.name.to_string(),
                value: value.to_string(),
                min: self.min.unwrap_or("-inf").to_string(),
                max: self.max.unwrap_or("inf").to_string(),
            });
        }
        Ok(value)
    }
}

/// Find a parameter in a table.
///
/// Tables are static and lookups use names from the same module, so a
/// missing entry is a programming error.
pub fn spec(table: &'static [ParamSpec], name: &str) -> &'static ParamSpec {
    table
        .iter()
        .find(|s| s.name == name)
        .unwrap_or_else(|| panic!("parameter `{name}` missing from its table"))
}

/// Validated access to a parameter map.
#[derive(Debug)]
pub struct ParamReader<'a> {
    table: &'static [ParamSpec],
    params: &'a Parameters,
}

impl<'a> ParamReader<'a> {
    /// Check that every provided key is declared in `table`.
    pub fn new(
        filter: &'static str,
        table: &'static [ParamSpec],
        params: &'a Parameters,
    ) -> Result<Self, ConfigError> {
        if let Some(unknown) = params.keys().find(|k| !table.iter().any(|s| s.name == *k)) {
            return Err(ConfigError::UnknownParameter {
                filter,
                name: unknown.clone(),
            });
        }
        Ok(Self { table, params })
    }

    fn raw(&self, name: &str) -> (&'static ParamSpec, Option<&str>) {
        let spec = spec(self.table, name);
        let value = self
            .params
            .get(name)
            .map(|v| v.trim())
            .or(Some(spec.default).filter(|d| !d.is_empty()));
        (spec, value)
    }

    /// Parse a parameter without bounds checking.
    pub fn parsed<T: FromStr>(&self, name: &str) -> Result<T, ConfigError> {
        let (spec, raw) = self.raw(name);
        let raw = raw.unwrap_or_default();
        raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
            name: spec.name.to_string(),
            value: raw.to_string(),
        })
    }

    /// Parse a parameter and check it against its bounds.
    pub fn get<T>(&self, name: &str) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Display,
    {
        let value = self.parsed::<T>(name)?;
        spec(self.table, name).check(value)
    }

    /// Like [`Self::get`], for parameters without default.
    pub fn optional<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr + PartialOrd + Display,
    {
        match self.raw(name).1 {
            None => Ok(None),
            Some(_) => self.get(name).map(Some),
        }
    }

    /// Boolean flag, accepting `0`/`1` and `false`/`true`.
    pub fn flag(&self, name: &str) -> Result<bool, ConfigError> {
        let (spec, raw) = self.raw(name);
        match raw.unwrap_or_default() {
            "1" | "true" => Ok(true),
            "0" | "false" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                name: spec.name.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Human-readable documentation of a filter and its parameters.
pub fn describe(name: &str, description: &str, table: &[ParamSpec]) -> String {
    let mut out = format!("{name}\n{description}\n");
    for spec in table {
        let _ = write!(out, "- {}: {}", spec.name, spec.description);
        if !spec.default.is_empty() {
            let _ = write!(out, " (default: {})", spec.default);
        }
        match (spec.min, spec.max) {
            (Some(min), Some(max)) => {
                let _ = write!(out, " [{min}, {max}]");
            }
            (Some(min), None) => {
                let _ = write!(out, " [{min}, inf)");
            }
            _ => {}
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[ParamSpec] = &[
        ParamSpec::new("knn", "number of neighbors", "5").min("3"),
        ParamSpec::new("ratio", "ratio", "0.5").range("0.0000001", "0.9999999"),
        ParamSpec::new("keep", "flag", "1"),
        ParamSpec::new("seed", "random seed", ""),
    ];

    #[test]
    fn test_defaults() {
        let params = Parameters::new();
        let reader = ParamReader::new("Test", TABLE, &params).unwrap();
        assert_eq!(reader.get::<usize>("knn").unwrap(), 5);
        assert_eq!(reader.get::<f32>("ratio").unwrap(), 0.5);
        assert!(reader.flag("keep").unwrap());
        assert_eq!(reader.optional::<u64>("seed").unwrap(), None);
    }

    #[test]
    fn test_overrides() {
        let params = parameters([("knn", "12"), ("keep", "0"), ("seed", "42")]);
        let reader = ParamReader::new("Test", TABLE, &params).unwrap();
        assert_eq!(reader.get::<usize>("knn").unwrap(), 12);
        assert!(!reader.flag("keep").unwrap());
        assert_eq!(reader.optional::<u64>("seed").unwrap(), Some(42));
    }

    #[test]
    fn test_unknown_parameter() {
        let params = parameters([("kn", "12")]);
        let err = ParamReader::new("Test", TABLE, &params).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownParameter {
                filter: "Test",
                name: "kn".into()
            }
        );
    }

    #[test]
    fn test_out_of_range() {
        let params = parameters([("knn", "2"), ("ratio", "1.5")]);
        let reader = ParamReader::new("Test", TABLE, &params).unwrap();
        assert!(matches!(
            reader.get::<usize>("knn"),
            Err(ConfigError::OutOfRange { .. })
        ));
        assert!(matches!(
            reader.get::<f32>("ratio"),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_invalid_value() {
        let params = parameters([("knn", "-4"), ("keep", "maybe")]);
        let reader = ParamReader::new("Test", TABLE, &params).unwrap();
        assert!(matches!(
            reader.get::<usize>("knn"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            reader.flag("keep"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_check_rejects_nan() {
        let spec = ParamSpec::new("ratio", "ratio", "0.5").range("0", "1");
        assert!(spec.check(f32::NAN).is_err());
        assert_eq!(spec.check(0.25f32).unwrap(), 0.25);
    }

    #[test]
    fn test_describe_lists_parameters() {
        let doc = describe("TestFilter", "Does things.", TABLE);
        assert!(doc.starts_with("TestFilter\nDoes things.\n"));
        assert!(doc.contains("- knn: number of neighbors (default: 5) [3, inf)"));
    }
}
