//! core-keymap: user mapping tables.
//!
//! One [`KeyTrie`] per (mode, scope) pair. Lookups consult the buffer-local,
//! global and virtual layers together:
//! * if any layer still has a longer candidate the result is `Prefix`;
//! * otherwise the longest completed sequence wins, ties going to the
//!   buffer-local layer, then global, then virtual.
//!
//! The tables are pure data. Expansion, recursion limits and the ambiguity
//! timeout are handled by the dispatcher in `core-actions`.

pub mod trie;

use core_events::{KeyEvent, keys_to_notation};
use thiserror::Error;
use tracing::debug;

pub use trie::{KeyTrie, Resolution};

bitflags::bitflags! {
    /// Modes a mapping command applies to (`:nmap` -> NORMAL, `:map` ->
    /// NORMAL | VISUAL | SELECT | OP_PENDING, ...).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MapModes: u8 {
        const NORMAL     = 0b0000_0001;
        const VISUAL     = 0b0000_0010;
        const SELECT     = 0b0000_0100;
        const OP_PENDING = 0b0000_1000;
        const INSERT     = 0b0001_0000;
        const CMDLINE    = 0b0010_0000;
    }
}

impl MapModes {
    /// Modes covered by the bare `:map` family.
    pub const NVO: MapModes = MapModes::NORMAL
        .union(MapModes::VISUAL)
        .union(MapModes::SELECT)
        .union(MapModes::OP_PENDING);

    /// Modes covered by `:map!`.
    pub const INSERT_CMDLINE: MapModes = MapModes::INSERT.union(MapModes::CMDLINE);

    /// Single-letter tag used by `:map` listings.
    pub fn listing_tag(self) -> &'static str {
        if self == MapModes::NVO {
            " "
        } else if self == MapModes::INSERT_CMDLINE {
            "!"
        } else if self == MapModes::VISUAL | MapModes::SELECT {
            "v"
        } else if self == MapModes::NORMAL {
            "n"
        } else if self == MapModes::VISUAL {
            "x"
        } else if self == MapModes::SELECT {
            "s"
        } else if self == MapModes::OP_PENDING {
            "o"
        } else if self == MapModes::INSERT {
            "i"
        } else if self == MapModes::CMDLINE {
            "c"
        } else {
            "?"
        }
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MappingFlags: u8 {
        /// Expansion is fed back through the mapping tables (`:map`).
        const RECURSIVE = 0b0000_0001;
        /// Right-hand side is an expression evaluated at expansion time.
        const EXPR      = 0b0000_0010;
        const SILENT    = 0b0000_0100;
        /// Fire on an exact match even while longer mappings share the prefix.
        const NOWAIT    = 0b0000_1000;
        const UNIQUE    = 0b0001_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MappingScope {
    BufferLocal,
    Global,
    /// Mappings registered by the host (`<Plug>`/`<Action>` plumbing); never
    /// visible to `:unmap` without an explicit scope.
    Virtual,
}

impl MappingScope {
    const ORDER: [MappingScope; 3] = [
        MappingScope::BufferLocal,
        MappingScope::Global,
        MappingScope::Virtual,
    ];

    fn index(self) -> usize {
        match self {
            MappingScope::BufferLocal => 0,
            MappingScope::Global => 1,
            MappingScope::Virtual => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingTarget {
    Keys(Vec<KeyEvent>),
    /// Source text of a `<expr>` mapping.
    Expression(String),
    /// Named host action, run through the action capability.
    Action(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub lhs: Vec<KeyEvent>,
    pub rhs: MappingTarget,
    pub scope: MappingScope,
    pub flags: MappingFlags,
}

impl MappingEntry {
    pub fn keys(lhs: Vec<KeyEvent>, rhs: Vec<KeyEvent>, recursive: bool) -> Self {
        let flags = if recursive {
            MappingFlags::RECURSIVE
        } else {
            MappingFlags::empty()
        };
        Self {
            lhs,
            rhs: MappingTarget::Keys(rhs),
            scope: MappingScope::Global,
            flags,
        }
    }

    pub fn is_recursive(&self) -> bool {
        self.flags.contains(MappingFlags::RECURSIVE)
    }

    /// Right-hand side as shown by `:map`.
    pub fn rhs_display(&self) -> String {
        match &self.rhs {
            MappingTarget::Keys(keys) if keys.is_empty() => "<Nop>".to_string(),
            MappingTarget::Keys(keys) => keys_to_notation(keys),
            MappingTarget::Expression(src) => src.clone(),
            MappingTarget::Action(name) => format!("<Action>({name})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("E474: Invalid argument")]
    EmptyLhs,
    #[error("E31: No such mapping")]
    NoSuchMapping,
    #[error("E227: Mapping already exists for {0}")]
    AlreadyExists(String),
}

const MODE_COUNT: usize = 6;

fn mode_index(mode: MapModes) -> Option<usize> {
    let idx = match mode {
        m if m == MapModes::NORMAL => 0,
        m if m == MapModes::VISUAL => 1,
        m if m == MapModes::SELECT => 2,
        m if m == MapModes::OP_PENDING => 3,
        m if m == MapModes::INSERT => 4,
        m if m == MapModes::CMDLINE => 5,
        _ => return None,
    };
    Some(idx)
}

#[derive(Debug, Default, Clone)]
struct ModeTable {
    layers: [KeyTrie<MappingEntry>; 3],
}

/// All mapping tables of a session.
#[derive(Debug, Clone, Default)]
pub struct KeyMappings {
    tables: [ModeTable; MODE_COUNT],
}

impl KeyMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entry` for every mode in `modes`.
    pub fn add(&mut self, modes: MapModes, entry: MappingEntry) -> Result<(), MappingError> {
        if entry.lhs.is_empty() {
            return Err(MappingError::EmptyLhs);
        }
        let layer = entry.scope.index();
        if entry.flags.contains(MappingFlags::UNIQUE) {
            for mode in modes.iter() {
                if let Some(idx) = mode_index(mode)
                    && self.tables[idx].layers[layer].get(&entry.lhs).is_some()
                {
                    return Err(MappingError::AlreadyExists(keys_to_notation(&entry.lhs)));
                }
            }
        }
        for mode in modes.iter() {
            if let Some(idx) = mode_index(mode) {
                self.tables[idx].layers[layer].insert(&entry.lhs, entry.clone());
            }
        }
        debug!(
            target: "input.map",
            modes = ?modes,
            scope = ?entry.scope,
            lhs_len = entry.lhs.len(),
            recursive = entry.is_recursive(),
            "mapping_added"
        );
        Ok(())
    }

    /// Remove `lhs` from `scope` in every mode of `modes`; fails with `E31`
    /// when no mode had it.
    pub fn remove(
        &mut self,
        modes: MapModes,
        lhs: &[KeyEvent],
        scope: MappingScope,
    ) -> Result<(), MappingError> {
        let layer = scope.index();
        let mut removed = false;
        for mode in modes.iter() {
            if let Some(idx) = mode_index(mode) {
                removed |= self.tables[idx].layers[layer].remove(lhs).is_some();
            }
        }
        if removed {
            debug!(target: "input.map", modes = ?modes, scope = ?scope, "mapping_removed");
            Ok(())
        } else {
            Err(MappingError::NoSuchMapping)
        }
    }

    pub fn clear(&mut self, modes: MapModes, scope: MappingScope) {
        for mode in modes.iter() {
            if let Some(idx) = mode_index(mode) {
                self.tables[idx].layers[scope.index()].clear();
            }
        }
        debug!(target: "input.map", modes = ?modes, scope = ?scope, "mappings_cleared");
    }

    /// Mappings visible in any of `modes` whose lhs starts with `prefix`.
    ///
    /// Entries registered identically in several modes are reported once with
    /// the union of their modes, sorted by lhs notation.
    pub fn list(&self, modes: MapModes, prefix: &[KeyEvent]) -> Vec<(MapModes, MappingEntry)> {
        let mut out: Vec<(MapModes, MappingEntry)> = Vec::new();
        for mode in modes.iter() {
            let Some(idx) = mode_index(mode) else {
                continue;
            };
            for scope in MappingScope::ORDER {
                for entry in self.tables[idx].layers[scope.index()].values() {
                    if !entry.lhs.starts_with(prefix) {
                        continue;
                    }
                    match out.iter_mut().find(|(_, e)| e == entry) {
                        Some((m, _)) => *m |= mode,
                        None => out.push((mode, entry.clone())),
                    }
                }
            }
        }
        out.sort_by_key(|(_, e)| (keys_to_notation(&e.lhs), e.scope));
        out
    }

    pub fn get(&self, mode: MapModes, lhs: &[KeyEvent]) -> Option<&MappingEntry> {
        let idx = mode_index(mode)?;
        MappingScope::ORDER
            .iter()
            .find_map(|s| self.tables[idx].layers[s.index()].get(lhs))
    }

    pub fn is_prefix(&self, mode: MapModes, keys: &[KeyEvent]) -> bool {
        mode_index(mode).is_some_and(|idx| {
            self.tables[idx]
                .layers
                .iter()
                .any(|layer| layer.is_prefix(keys))
        })
    }

    /// Layered lookup for a single mode.
    pub fn resolve(&self, mode: MapModes, keys: &[KeyEvent]) -> Resolution<'_, MappingEntry> {
        let Some(idx) = mode_index(mode) else {
            return Resolution::NoMatch;
        };
        let mut waiting = false;
        let mut best: Option<(usize, &MappingEntry)> = None;
        for scope in MappingScope::ORDER {
            let candidate = match self.tables[idx].layers[scope.index()].resolve(keys) {
                Resolution::NoMatch => None,
                Resolution::Prefix { fallback } => {
                    waiting = true;
                    fallback
                }
                Resolution::Match { consumed, value } => Some((consumed, value)),
            };
            // Layers are visited in priority order, so only a strictly longer
            // candidate replaces the current best.
            if let Some((n, entry)) = candidate
                && best.is_none_or(|(m, _)| n > m)
            {
                best = Some((n, entry));
            }
        }
        if waiting {
            if let Some((n, entry)) = best
                && n == keys.len()
                && entry.flags.contains(MappingFlags::NOWAIT)
            {
                return Resolution::Match {
                    consumed: n,
                    value: entry,
                };
            }
            return Resolution::Prefix { fallback: best };
        }
        match best {
            Some((consumed, value)) => Resolution::Match { consumed, value },
            None => Resolution::NoMatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_events::parse_keys;
    use pretty_assertions::assert_eq;

    fn entry(lhs: &str, rhs: &str, scope: MappingScope) -> MappingEntry {
        MappingEntry {
            scope,
            ..MappingEntry::keys(parse_keys(lhs), parse_keys(rhs), false)
        }
    }

    #[test]
    fn buffer_local_shadows_global_on_equal_length() {
        let mut maps = KeyMappings::new();
        maps.add(MapModes::NORMAL, entry("gx", "dd", MappingScope::Global))
            .unwrap();
        maps.add(MapModes::NORMAL, entry("gx", "yy", MappingScope::BufferLocal))
            .unwrap();
        match maps.resolve(MapModes::NORMAL, &parse_keys("gx")) {
            Resolution::Match { consumed, value } => {
                assert_eq!(consumed, 2);
                assert_eq!(value.scope, MappingScope::BufferLocal);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn longer_global_match_beats_shorter_local() {
        let mut maps = KeyMappings::new();
        maps.add(MapModes::NORMAL, entry("g", "x", MappingScope::BufferLocal))
            .unwrap();
        maps.add(MapModes::NORMAL, entry("gy", "dd", MappingScope::Global))
            .unwrap();
        let res = maps.resolve(MapModes::NORMAL, &parse_keys("gy"));
        assert!(matches!(
            res,
            Resolution::Match { consumed: 2, value } if value.scope == MappingScope::Global
        ));
        // A prefix in any layer suspends resolution.
        assert!(matches!(
            maps.resolve(MapModes::NORMAL, &parse_keys("g")),
            Resolution::Prefix { fallback: Some((1, _)) }
        ));
    }

    #[test]
    fn nowait_fires_despite_longer_candidates() {
        let mut maps = KeyMappings::new();
        let mut e = entry(",", "x", MappingScope::Global);
        e.flags |= MappingFlags::NOWAIT;
        maps.add(MapModes::NORMAL, e).unwrap();
        maps.add(MapModes::NORMAL, entry(",a", "y", MappingScope::Global))
            .unwrap();
        assert!(matches!(
            maps.resolve(MapModes::NORMAL, &parse_keys(",")),
            Resolution::Match { consumed: 1, .. }
        ));
    }

    #[test]
    fn modes_are_independent() {
        let mut maps = KeyMappings::new();
        maps.add(MapModes::INSERT, entry("jk", "<Esc>", MappingScope::Global))
            .unwrap();
        assert!(maps.is_prefix(MapModes::INSERT, &parse_keys("j")));
        assert!(!maps.is_prefix(MapModes::NORMAL, &parse_keys("j")));
        assert_eq!(
            maps.resolve(MapModes::NORMAL, &parse_keys("jk")),
            Resolution::NoMatch
        );
    }

    #[test]
    fn remove_unknown_reports_e31() {
        let mut maps = KeyMappings::new();
        let err = maps
            .remove(MapModes::NORMAL, &parse_keys("Q"), MappingScope::Global)
            .unwrap_err();
        assert_eq!(err.to_string(), "E31: No such mapping");
    }

    #[test]
    fn unique_rejects_duplicates_and_empty_lhs_is_invalid() {
        let mut maps = KeyMappings::new();
        maps.add(MapModes::NORMAL, entry("Q", "gq", MappingScope::Global))
            .unwrap();
        let mut dup = entry("Q", "x", MappingScope::Global);
        dup.flags |= MappingFlags::UNIQUE;
        assert_eq!(
            maps.add(MapModes::NORMAL, dup).unwrap_err().to_string(),
            "E227: Mapping already exists for Q"
        );
        assert_eq!(
            maps.add(MapModes::NORMAL, entry("", "x", MappingScope::Global)),
            Err(MappingError::EmptyLhs)
        );
    }

    #[test]
    fn list_merges_modes_of_identical_entries() {
        let mut maps = KeyMappings::new();
        maps.add(MapModes::NVO, entry("Y", "y$", MappingScope::Global))
            .unwrap();
        let listed = maps.list(MapModes::all(), &[]);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, MapModes::NVO);
        assert_eq!(listed[0].0.listing_tag(), " ");
        assert_eq!(listed[0].1.rhs_display(), "y$");
    }
}
