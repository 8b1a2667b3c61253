pub mod calculator;
pub mod currency;
pub mod dictionary;
pub mod knowledge;
pub mod suggest;
pub mod units;
pub mod worldtime;

use std::path::Path;

use crate::core::types::{InstantAnswer, KnowledgePanel};

pub use dictionary::{Dictionary, Lookup};
pub use knowledge::KnowledgeBase;
pub use suggest::SuggestService;

/// The local computation and lookup services behind instant answers.
/// Everything here is a pure function of (input, stored tables).
pub struct InstantServices {
    pub rates: currency::RateTable,
    pub dictionary: Dictionary,
    pub knowledge: KnowledgeBase,
    pub suggest: SuggestService,
}

impl InstantServices {
    /// Load stored tables from `data_dir`; missing files fall back to the
    /// shipped defaults.
    pub fn load(data_dir: &Path) -> Self {
        Self {
            rates: currency::RateTable::load(&data_dir.join("rates.json")),
            dictionary: Dictionary::load(&data_dir.join("dictionary.json")),
            knowledge: KnowledgeBase::load(&data_dir.join("entities.json")),
            suggest: SuggestService::new(),
        }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            rates: currency::RateTable::default(),
            dictionary: Dictionary::default(),
            knowledge: KnowledgeBase::default(),
            suggest: SuggestService::new(),
        }
    }

    /// Match the query shape against each instant answer in a fixed order.
    /// Detection never errors; a non-matching or failing detector simply
    /// passes to the next.
    pub fn detect(&self, text: &str) -> Option<InstantAnswer> {
        if let Ok(value) = calculator::evaluate(text) {
            return Some(InstantAnswer::Calculation {
                expression: text.trim().to_string(),
                value,
            });
        }

        if let Some((amount, from, to)) = units::parse_conversion(text) {
            if let Ok(value) = units::convert(amount, &from, &to) {
                return Some(InstantAnswer::UnitConversion {
                    amount,
                    from: from.name.to_string(),
                    to: to.name.to_string(),
                    value,
                });
            }
        }

        if let Some((amount, from, to)) = currency::parse_conversion(text) {
            if let Ok((value, rate)) = self.rates.convert(amount, &from, &to) {
                return Some(InstantAnswer::Currency {
                    amount,
                    from,
                    to,
                    value,
                    rate,
                });
            }
        }

        if let Some(word) = dictionary::parse_define_query(text) {
            if let Lookup::Found(entry) = self.dictionary.lookup(&word) {
                return Some(InstantAnswer::Definition {
                    word: entry.word,
                    definition: entry.definition,
                    synonyms: entry.synonyms,
                });
            }
        }

        if let Some(location) = worldtime::parse_time_query(text) {
            if let Ok((zone, time)) = worldtime::current_time(&location) {
                return Some(InstantAnswer::WorldTime {
                    location,
                    zone,
                    time,
                });
            }
        }

        None
    }

    pub fn knowledge_panel(&self, text: &str) -> Option<KnowledgePanel> {
        self.knowledge.lookup(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_calculation() {
        let services = InstantServices::in_memory();
        match services.detect("5+3*2") {
            Some(InstantAnswer::Calculation { value, .. }) => assert_eq!(value, 11.0),
            other => panic!("expected calculation, got {:?}", other),
        }
    }

    #[test]
    fn detects_unit_conversion() {
        let services = InstantServices::in_memory();
        match services.detect("10 km to mi") {
            Some(InstantAnswer::UnitConversion { value, .. }) => {
                assert!((value - 6.2137).abs() < 1e-3)
            }
            other => panic!("expected conversion, got {:?}", other),
        }
    }

    #[test]
    fn detects_currency() {
        let services = InstantServices::in_memory();
        match services.detect("100 usd to eur") {
            Some(InstantAnswer::Currency { value, .. }) => assert!((value - 92.0).abs() < 1e-9),
            other => panic!("expected currency, got {:?}", other),
        }
    }

    #[test]
    fn plain_queries_detect_nothing() {
        let services = InstantServices::in_memory();
        assert!(services.detect("rust tutorial").is_none());
        // Malformed arithmetic stays silent rather than erroring.
        assert!(services.detect("5+").is_none());
    }
}
