//! The env preset selector from spec §4.I: `ES5 | ES2015 | ... | ES2024`,
//! controlling which built-ins [`super::register_globals`] exposes.

/// Ordered oldest-to-newest so [`EsVersion::at_least`] is a plain integer
/// comparison, the same trick the teacher's own feature-gating enums use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EsVersion {
    Es5,
    Es2015,
    Es2016,
    Es2017,
    Es2018,
    Es2019,
    Es2020,
    Es2021,
    Es2022,
    Es2023,
    Es2024,
}

impl EsVersion {
    #[must_use]
    pub fn at_least(self, floor: Self) -> bool {
        self >= floor
    }
}

impl Default for EsVersion {
    /// The newest preset is the default — a fresh `InterpreterOptions`
    /// exposes the full catalog unless the embedder dials it back.
    fn default() -> Self {
        Self::Es2024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_chronology() {
        assert!(EsVersion::Es2024.at_least(EsVersion::Es5));
        assert!(!EsVersion::Es5.at_least(EsVersion::Es2015));
    }
}
