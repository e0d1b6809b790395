//! Instrument id to ticker table carried in a stream's metadata.
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Maps instrument ids to tickers.
///
/// Built once, from a literal mapping or a decoded header, and read-only
/// afterwards. Entries are kept ordered by id so iteration (and therefore
/// encoding) is deterministic; equality compares entries only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolMap {
    map: BTreeMap<u32, String>,
}

impl SymbolMap {
    pub fn new(map: BTreeMap<u32, String>) -> Self {
        Self { map }
    }

    /// Ticker for `id`, or [`Error::UnknownInstrument`].
    pub fn get_ticker(&self, id: u32) -> Result<&str> {
        self.map
            .get(&id)
            .map(String::as_str)
            .ok_or(Error::UnknownInstrument(id))
    }

    /// Reverse lookup; linear in the table size.
    pub fn get_instrument_id(&self, ticker: &str) -> Option<u32> {
        self.map
            .iter()
            .find(|(_, t)| t.as_str() == ticker)
            .map(|(id, _)| *id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.map.iter().map(|(id, t)| (*id, t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<u32, String> {
        &self.map
    }
}

impl<S: Into<String>> FromIterator<(u32, S)> for SymbolMap {
    fn from_iter<I: IntoIterator<Item = (u32, S)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().map(|(id, t)| (id, t.into())).collect(),
        }
    }
}

impl From<HashMap<u32, String>> for SymbolMap {
    fn from(map: HashMap<u32, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<BTreeMap<u32, String>> for SymbolMap {
    fn from(map: BTreeMap<u32, String>) -> Self {
        Self::new(map)
    }
}
