// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inline storage for prefix-typed identifiers.
//!
//! Ids flow through every hot path (queue keys, claim maps, event
//! routing), so they live in a fixed `Copy` buffer instead of a heap
//! `String`. [`crate::define_id!`] wraps this buffer per id type.

/// Maximum byte length for an inline id.
///
/// Generated ids are `{prefix}{nanoid}` with a ≤5-char prefix and an
/// [`ID_RAND_LEN`]-char nanoid; parsed ids may be shorter.
pub const ID_MAX_LEN: usize = 24;

/// Number of random characters in a generated id suffix.
pub const ID_RAND_LEN: usize = 18;

/// Short identifier held inline: at most [`ID_MAX_LEN`] bytes, `Copy`,
/// no allocation.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IdBuf {
    bytes: [u8; ID_MAX_LEN],
    len: u8,
}

impl IdBuf {
    pub fn new(id: &str) -> Self {
        debug_assert!(
            id.len() <= ID_MAX_LEN,
            "id too long ({} bytes, max {ID_MAX_LEN}): {id:?}",
            id.len(),
        );
        let clamped = id.len().min(ID_MAX_LEN);
        // Never split a multi-byte character when clamping.
        let len = (0..=clamped)
            .rev()
            .find(|n| id.is_char_boundary(*n))
            .unwrap_or(0);

        let mut bytes = [0u8; ID_MAX_LEN];
        bytes[..len].copy_from_slice(&id.as_bytes()[..len]);
        Self { bytes, len: len as u8 }
    }

    pub fn as_str(&self) -> &str {
        // Construction copies whole characters out of a &str, so the
        // active bytes are always valid UTF-8.
        std::str::from_utf8(&self.bytes[..usize::from(self.len)]).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::hash::Hash for IdBuf {
    fn hash<H: std::hash::Hasher>(&self, hasher: &mut H) {
        // Must agree with str::hash for Borrow<str> map lookups.
        str::hash(self.as_str(), hasher);
    }
}

impl std::borrow::Borrow<str> for IdBuf {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for IdBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self.as_str(), f)
    }
}

impl std::fmt::Debug for IdBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self.as_str(), f)
    }
}

impl serde::Serialize for IdBuf {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for IdBuf {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = String::deserialize(deserializer)?;
        if id.len() > ID_MAX_LEN {
            return Err(serde::de::Error::invalid_length(
                id.len(),
                &"an id of at most 24 bytes",
            ));
        }
        Ok(IdBuf::new(&id))
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
