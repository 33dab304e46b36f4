//! Whitelist/blacklist evaluation of asset names.

use std::collections::HashSet;

use regex::Regex;

use crate::assets::AssetKind;
use crate::config::Settings;
use crate::error::ConfigError;

/// One side of a filter: a literal name set or a single full-match pattern.
#[derive(Debug, Clone)]
enum NameList {
    Empty,
    Exact(HashSet<String>),
    Pattern(Regex),
}

impl NameList {
    fn build(entries: &[String], regex_mode: bool) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Ok(NameList::Empty);
        }
        if !regex_mode {
            return Ok(NameList::Exact(entries.iter().cloned().collect()));
        }

        if entries.len() > 1 {
            log::warn!(
                "Regex matching uses a single pattern, ignoring {} extra entries after '{}'",
                entries.len() - 1,
                entries[0]
            );
        }
        let pattern = &entries[0];
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
            ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(NameList::Pattern(regex))
    }

    fn is_empty(&self) -> bool {
        matches!(self, NameList::Empty)
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            NameList::Empty => false,
            NameList::Exact(names) => names.contains(name),
            NameList::Pattern(regex) => regex.is_match(name),
        }
    }
}

/// Decides which asset names take part in synchronization.
///
/// A blacklist match always excludes. Otherwise a configured whitelist must
/// match, and an empty whitelist admits every name.
#[derive(Debug, Clone)]
pub struct Filter {
    whitelist: NameList,
    blacklist: NameList,
    exact_names: Vec<String>,
}

impl Filter {
    pub fn new(whitelist: &[String], blacklist: &[String], regex_mode: bool) -> Result<Self, ConfigError> {
        Ok(Self {
            whitelist: NameList::build(whitelist, regex_mode)?,
            blacklist: NameList::build(blacklist, regex_mode)?,
            exact_names: if regex_mode { Vec::new() } else { whitelist.to_vec() },
        })
    }

    /// Filter that admits every name.
    pub fn allow_all() -> Self {
        Self {
            whitelist: NameList::Empty,
            blacklist: NameList::Empty,
            exact_names: Vec::new(),
        }
    }

    /// Builds the filter configured for an asset kind.
    pub fn for_kind(settings: &Settings, kind: AssetKind) -> Result<Self, ConfigError> {
        let (whitelist, blacklist) = settings.filter_lists(kind);
        Self::new(whitelist, blacklist, settings.regex_matching)
    }

    pub fn admits(&self, name: &str) -> bool {
        if self.blacklist.matches(name) {
            return false;
        }
        self.whitelist.is_empty() || self.whitelist.matches(name)
    }

    /// Literal whitelist usable as a server side name filter.
    ///
    /// `None` in regex mode or without a whitelist, where everything has to
    /// be fetched and filtered locally.
    pub fn server_side_names(&self) -> Option<&[String]> {
        if self.exact_names.is_empty() {
            None
        } else {
            Some(&self.exact_names)
        }
    }
}
