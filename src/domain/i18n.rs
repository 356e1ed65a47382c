//! Localized names and display-name resolution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A name and description in one language, as stored beside an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedName {
    pub locale: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Language-keyed text values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultilingualString(BTreeMap<String, String>);

impl MultilingualString {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(locale: impl Into<String>, value: impl Into<String>) -> Self {
        let mut bundle = Self::new();
        bundle.insert(locale, value);
        bundle
    }

    /// Inserts a value unless the locale already has one.
    pub fn insert(&mut self, locale: impl Into<String>, value: impl Into<String>) -> bool {
        match self.0.entry(locale.into()) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(value.into());
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, locale: &str) -> Option<&str> {
        self.0.get(locale).map(String::as_str)
    }

    pub fn locales(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Adds every locale of `other` that is not present yet; existing
    /// values are kept on collision.
    pub fn merge_missing(&mut self, other: &MultilingualString) {
        for (locale, value) in &other.0 {
            self.0
                .entry(locale.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

impl<L: Into<String>, V: Into<String>> FromIterator<(L, V)> for MultilingualString {
    fn from_iter<I: IntoIterator<Item = (L, V)>>(iter: I) -> Self {
        let mut bundle = Self::new();
        for (locale, value) in iter {
            bundle.insert(locale, value);
        }
        bundle
    }
}

/// Names recorded for one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNames {
    /// Name in the default language.
    pub display: String,
    pub names: MultilingualString,
    pub descriptions: MultilingualString,
}

/// Derives a readable name from the last segment of an identifier URI/URN.
pub fn name_from_identifier(identifier: &str) -> &str {
    let trimmed = identifier.trim_end_matches(['/', ':', '#']);
    let tail = trimmed
        .rfind(['/', ':', '#'])
        .map_or(trimmed, |index| &trimmed[index + 1..]);
    if tail.is_empty() { identifier } else { tail }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn resolve_names(
    identifier: &str,
    name: Option<&str>,
    description: Option<&str>,
    translations: &[LocalizedName],
    default_locale: &str,
) -> ResolvedNames {
    let explicit = non_blank(name);
    let mut names = MultilingualString::new();
    let mut descriptions = MultilingualString::new();

    if let Some(explicit) = explicit {
        names.insert(default_locale, explicit);
    }
    if let Some(description) = non_blank(description) {
        descriptions.insert(default_locale, description);
    }
    for translation in translations {
        let locale = translation.locale.trim();
        if locale.is_empty() {
            continue;
        }
        if let Some(value) = non_blank(translation.name.as_deref()) {
            names.insert(locale, value);
        }
        if let Some(value) = non_blank(translation.description.as_deref()) {
            descriptions.insert(locale, value);
        }
    }

    let display = names
        .get(default_locale)
        .unwrap_or_else(|| name_from_identifier(identifier))
        .to_string();
    names.insert(default_locale, display.clone());

    ResolvedNames {
        display,
        names,
        descriptions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_segment_after_last_separator() {
        assert_eq!(name_from_identifier("http://example.org/sensors/ws-01"), "ws-01");
        assert_eq!(name_from_identifier("urn:ogc:def:property:airTemperature"), "airTemperature");
        assert_eq!(name_from_identifier("http://example.org/vocab#wind"), "wind");
        assert_eq!(name_from_identifier("http://example.org/things/"), "things");
        assert_eq!(name_from_identifier("plain"), "plain");
        assert_eq!(name_from_identifier("///"), "///");
    }

    #[test]
    fn explicit_name_wins_over_identifier_tail() {
        let resolved = resolve_names("urn:x:station:7", Some("Station Seven"), None, &[], "eng");
        assert_eq!(resolved.display, "Station Seven");
        assert_eq!(resolved.names.get("eng"), Some("Station Seven"));
    }

    #[test]
    fn translations_fill_other_locales() {
        let translations = vec![
            LocalizedName {
                locale: "ger".into(),
                name: Some("Temperatur".into()),
                description: Some("Lufttemperatur".into()),
            },
            LocalizedName {
                locale: "eng".into(),
                name: Some("Temperature".into()),
                description: None,
            },
        ];
        let resolved = resolve_names("urn:x:temp", None, Some("  "), &translations, "eng");
        assert_eq!(resolved.display, "Temperature");
        assert_eq!(resolved.names.get("ger"), Some("Temperatur"));
        assert_eq!(resolved.descriptions.get("ger"), Some("Lufttemperatur"));
        assert_eq!(resolved.descriptions.get("eng"), None);
        assert_eq!(resolved.names.locales().collect::<Vec<_>>(), vec!["eng", "ger"]);
    }

    #[test]
    fn derived_name_recorded_for_default_locale() {
        let resolved = resolve_names("http://example.org/procedure/p1", None, None, &[], "eng");
        assert_eq!(resolved.display, "p1");
        assert_eq!(resolved.names.get("eng"), Some("p1"));
    }

    #[test]
    fn merge_missing_keeps_existing_values() {
        let mut target = MultilingualString::single("eng", "Temperature");
        let source: MultilingualString =
            [("eng", "Temp"), ("fre", "Température")].into_iter().collect();
        target.merge_missing(&source);
        assert_eq!(target.get("eng"), Some("Temperature"));
        assert_eq!(target.get("fre"), Some("Température"));
    }
}
