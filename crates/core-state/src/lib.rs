//! Shared state vocabulary: modes, positions, and the host capability traits.
//!
//! Nothing here holds editor text. Hosts implement [`HostSurface`] and
//! [`RegexEngine`]; the dispatcher and the script interpreter only see those
//! traits. [`Registers`] is a ready-made register store for hosts that want
//! Vim's register rules without writing their own.

pub mod host;
pub mod mode;
pub mod registers;

pub use host::{
    HostError, HostSurface, Position, RegexEngine, RegisterContent, Selection, TextRange,
};
pub use mode::{Mode, SelectionKind};
pub use registers::Registers;
