//! Method and event descriptors.

use std::collections::HashMap;

use serde::Serialize;

use crate::codec::{WireType, MAX_STRING_LEN};

/// Upper bound on entries addressable by a one-byte ordinal.
pub const MAX_ENTRIES: usize = u8::MAX as usize + 1;

/// Declared method: name, position and signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodDescriptor {
    /// Method name.
    pub name: String,
    /// 0-based declaration index.
    pub ordinal: u8,
    /// Parameter types, in order.
    pub params: Vec<WireType>,
    /// Result type; `None` for void methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<WireType>,
}

impl MethodDescriptor {
    /// Whether the method writes no response.
    #[inline]
    pub fn is_void(&self) -> bool {
        self.result.is_none()
    }
}

/// Declared event: name, position and payload signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventDescriptor {
    /// Event name.
    pub name: String,
    /// 0-based declaration index within the event table.
    pub ordinal: u8,
    /// Payload field types, in order.
    pub params: Vec<WireType>,
}

pub(crate) trait Named {
    fn name(&self) -> &str;
}

impl Named for MethodDescriptor {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for EventDescriptor {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Ordered table with both ordinal and name lookup.
///
/// Insertions that would break the table (duplicate name, name too long
/// for a wire string, more than 256 entries) are rejected with a message.
#[derive(Debug)]
pub(crate) struct Table<D> {
    entries: Vec<D>,
    by_name: HashMap<String, usize>,
}

impl<D: Named> Table<D> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Ordinal the next entry would receive.
    pub(crate) fn next_ordinal(&self, kind: &str, name: &str) -> Result<u8, String> {
        if name.len() > MAX_STRING_LEN {
            return Err(format!(
                "{} name '{}' is longer than {} bytes",
                kind, name, MAX_STRING_LEN
            ));
        }
        if self.by_name.contains_key(name) {
            return Err(format!("{} '{}' is declared twice", kind, name));
        }
        u8::try_from(self.entries.len())
            .map_err(|_| format!("more than {} {}s declared", MAX_ENTRIES, kind))
    }

    pub(crate) fn push(&mut self, entry: D) {
        self.by_name
            .insert(entry.name().to_string(), self.entries.len());
        self.entries.push(entry);
    }

    pub(crate) fn get(&self, name: &str) -> Option<&D> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    pub(crate) fn get_ordinal(&self, ordinal: u8) -> Option<&D> {
        self.entries.get(usize::from(ordinal))
    }

    pub(crate) fn iter(&self) -> std::slice::Iter<'_, D> {
        self.entries.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<D: Named> Default for Table<D> {
    fn default() -> Self {
        Self::new()
    }
}
