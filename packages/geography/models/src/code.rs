//! Country code assignment from upstream ISO tags.

use std::collections::{BTreeMap, HashSet};

/// The candidate tag keys, most specific first.
const CODE_KEYS: [&str; 4] = [
    "ISO3166-2",
    "ISO3166-1",
    "ISO3166-1:alpha2",
    "ISO3166-1:alpha3",
];

/// Assigns one country code per feature within a single refresh run.
///
/// The first pass refuses codes already handed out this run; the second
/// pass relaxes that constraint so a feature sharing all its ISO tags
/// with an earlier one still gets a code. Features without any usable
/// tag receive the literal `XX`. Codes are unique per run, not across
/// runs.
#[derive(Debug, Default)]
pub struct CountryCodeAssigner {
    used: HashSet<String>,
}

impl CountryCodeAssigner {
    /// Creates an assigner with no codes handed out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks a code for the feature with the given tags.
    pub fn get_unique(&mut self, tags: &BTreeMap<String, String>) -> String {
        for check_used in [true, false] {
            for key in CODE_KEYS {
                let Some(code) = tags.get(key) else { continue };
                if code.len() >= 2 && (!check_used || !self.used.contains(code)) {
                    self.used.insert(code.clone());
                    return code.clone();
                }
            }
        }

        "XX".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn prefers_most_specific_key() {
        let mut assigner = CountryCodeAssigner::new();
        let code = assigner.get_unique(&tags(&[
            ("ISO3166-1", "PL"),
            ("ISO3166-2", "PL-MZ"),
            ("ISO3166-1:alpha3", "POL"),
        ]));
        assert_eq!(code, "PL-MZ");
    }

    #[test]
    fn first_pass_skips_taken_codes() {
        let mut assigner = CountryCodeAssigner::new();
        assert_eq!(assigner.get_unique(&tags(&[("ISO3166-1", "PL")])), "PL");
        let code = assigner.get_unique(&tags(&[
            ("ISO3166-1", "PL"),
            ("ISO3166-1:alpha3", "POL"),
        ]));
        assert_eq!(code, "POL");
    }

    #[test]
    fn second_pass_relaxes_uniqueness() {
        let mut assigner = CountryCodeAssigner::new();
        assert_eq!(assigner.get_unique(&tags(&[("ISO3166-1", "PL")])), "PL");
        // All candidates taken: the relaxed pass re-issues the first one.
        assert_eq!(assigner.get_unique(&tags(&[("ISO3166-1", "PL")])), "PL");
    }

    #[test]
    fn rejects_short_codes_and_falls_back() {
        let mut assigner = CountryCodeAssigner::new();
        assert_eq!(assigner.get_unique(&tags(&[("ISO3166-1", "P")])), "XX");
        assert_eq!(assigner.get_unique(&tags(&[])), "XX");
    }
}
