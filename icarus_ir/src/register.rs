//! Register identities: a function-local, typed slot keyed by a 64-bit
//! integer. The top two bits partition the identity space into parameter,
//! output, and ordinary registers, mirroring the source compiler's
//! `arg_mask`/`out_mask` bit tagging on its own register type so that a
//! register's provenance can be read off its raw value alone.

use serde::{Deserialize, Serialize};

const PARAM_BIT: u64 = 1 << 63;
const OUTPUT_BIT: u64 = 1 << 62;
const INDEX_MASK: u64 = !(PARAM_BIT | OUTPUT_BIT);

/// A typed, function-local register identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Register(u64);

/// What a [`Register`]'s raw bits decode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    /// Input slot `i` of the owning function.
    Parameter(u32),
    /// Caller-provided return slot `i`.
    Output(u32),
    /// A value produced by an instruction or a stack allocation, assigned
    /// monotonically as the function is built.
    Ordinary(u64),
}

impl Register {
    pub fn parameter(index: u32) -> Self {
        Register(PARAM_BIT | index as u64)
    }

    pub fn output(index: u32) -> Self {
        Register(OUTPUT_BIT | index as u64)
    }

    pub fn ordinary(index: u64) -> Self {
        assert_eq!(index & !INDEX_MASK, 0, "ordinary register index {index} overflows the 62-bit identity space");
        Register(index)
    }

    pub fn kind(self) -> RegisterKind {
        if self.0 & PARAM_BIT != 0 {
            RegisterKind::Parameter((self.0 & INDEX_MASK) as u32)
        } else if self.0 & OUTPUT_BIT != 0 {
            RegisterKind::Output((self.0 & INDEX_MASK) as u32)
        } else {
            RegisterKind::Ordinary(self.0 & INDEX_MASK)
        }
    }

    pub fn is_ordinary(self) -> bool {
        matches!(self.kind(), RegisterKind::Ordinary(_))
    }

    /// Shift an ordinary register's index by `base`, used by the inliner to
    /// rebase a spliced callee's registers into the caller's identity
    /// space. Parameter and output registers are never rebased; the
    /// inliner substitutes them entirely instead (see `inliner.rs`).
    pub fn rebase_ordinary(self, base: u64) -> Self {
        match self.kind() {
            RegisterKind::Ordinary(i) => Register::ordinary(i + base),
            _ => self,
        }
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Register(raw)
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind() {
            RegisterKind::Parameter(i) => write!(f, "%arg{i}"),
            RegisterKind::Output(i) => write!(f, "%out{i}"),
            RegisterKind::Ordinary(i) => write!(f, "%r{i}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_three_kinds_partition_cleanly() {
        assert!(matches!(Register::parameter(3).kind(), RegisterKind::Parameter(3)));
        assert!(matches!(Register::output(1).kind(), RegisterKind::Output(1)));
        assert!(matches!(Register::ordinary(9).kind(), RegisterKind::Ordinary(9)));
    }

    #[test]
    fn rebase_only_moves_ordinary_registers() {
        assert_eq!(Register::ordinary(2).rebase_ordinary(10), Register::ordinary(12));
        assert_eq!(Register::parameter(0).rebase_ordinary(10), Register::parameter(0));
        assert_eq!(Register::output(0).rebase_ordinary(10), Register::output(0));
    }

    #[test]
    fn display_distinguishes_kinds() {
        assert_eq!(Register::parameter(0).to_string(), "%arg0");
        assert_eq!(Register::output(0).to_string(), "%out0");
        assert_eq!(Register::ordinary(0).to_string(), "%r0");
    }
}
