//! Country selection shared by the CLI and the TUI.
//!
//! Both front-ends enforce the same display limit before querying the
//! pipeline: past `max` countries nothing is drawn and a message tells the
//! user how many to remove.

use crate::error::AppError;

/// Ordered set of selected countries (selection order is display order).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountrySelection {
    chosen: Vec<String>,
}

impl CountrySelection {
    pub fn new(countries: impl IntoIterator<Item = String>) -> Self {
        let mut selection = Self::default();
        for country in countries {
            selection.insert(country);
        }
        selection
    }

    pub fn as_slice(&self) -> &[String] {
        &self.chosen
    }

    pub fn len(&self) -> usize {
        self.chosen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chosen.is_empty()
    }

    pub fn contains(&self, country: &str) -> bool {
        self.chosen.iter().any(|c| c == country)
    }

    pub fn insert(&mut self, country: String) {
        if !self.contains(&country) {
            self.chosen.push(country);
        }
    }

    /// Add `country` if absent, remove it otherwise. Returns whether it is now selected.
    pub fn toggle(&mut self, country: &str) -> bool {
        if let Some(pos) = self.chosen.iter().position(|c| c == country) {
            self.chosen.remove(pos);
            false
        } else {
            self.chosen.push(country.to_string());
            true
        }
    }

    /// Drop countries that `known` does not list (e.g. after a refresh).
    pub fn retain_known(&mut self, known: &[String]) {
        self.chosen.retain(|c| known.binary_search(c).is_ok());
    }

    /// `None` while the selection can be displayed; otherwise the blocking message.
    pub fn over_limit(&self, max: usize) -> Option<String> {
        over_limit_message(self.chosen.len(), max)
    }

    pub fn check_limit(&self, max: usize) -> Result<(), AppError> {
        match self.over_limit(max) {
            None => Ok(()),
            Some(message) => Err(AppError::query(message)),
        }
    }
}

/// Message shown when `selected` countries exceed the display limit.
pub fn over_limit_message(selected: usize, max: usize) -> Option<String> {
    if selected <= max {
        return None;
    }
    let extra = selected - max;
    let (noun, verb) = if extra == 1 { ("country", "is") } else { ("countries", "are") };
    Some(format!(
        "Limited to {max} countries, display will be blocked until {extra} {noun} {verb} removed."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_adds_then_removes() {
        let mut sel = CountrySelection::new(["Switzerland".to_string()]);
        assert!(sel.toggle("Peru"));
        assert_eq!(sel.as_slice(), ["Switzerland", "Peru"]);
        assert!(!sel.toggle("Switzerland"));
        assert_eq!(sel.as_slice(), ["Peru"]);
    }

    #[test]
    fn limit_message_agrees_in_number() {
        assert_eq!(over_limit_message(6, 6), None);
        assert_eq!(
            over_limit_message(7, 6).as_deref(),
            Some("Limited to 6 countries, display will be blocked until 1 country is removed.")
        );
        assert_eq!(
            over_limit_message(9, 6).as_deref(),
            Some("Limited to 6 countries, display will be blocked until 3 countries are removed.")
        );
    }

    #[test]
    fn check_limit_is_a_query_error() {
        let sel = CountrySelection::new((0..7).map(|i| format!("C{i}")));
        let err = sel.check_limit(6).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Query);
    }

    #[test]
    fn retain_known_drops_vanished_countries() {
        let mut sel = CountrySelection::new(["Atlantis".to_string(), "Chile".to_string()]);
        sel.retain_known(&["Chile".to_string(), "Peru".to_string()]);
        assert_eq!(sel.as_slice(), ["Chile"]);
    }
}
