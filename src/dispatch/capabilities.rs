//! Behavioral guarantees a dispatch context may declare.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bitset of guarantees satisfied by a [`DispatchContext`](super::DispatchContext)
/// implementation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    /// No guarantees.
    pub const NONE: Self = Self(0);

    /// `post` never runs the callback on the caller's thread before returning.
    pub const ASYNC_NON_REENTRANT: Self = Self(1 << 0);

    /// `send` never runs the callback reentrantly on the caller's stack.
    pub const SEND_NON_REENTRANT: Self = Self(1 << 1);

    /// Callbacks never run concurrently with one another.
    pub const SERIALIZED_EXECUTION: Self = Self(1 << 2);

    /// Callbacks run in the order they were queued.
    pub const FIFO_EXECUTION: Self = Self(1 << 3);

    /// Every callback runs on the same thread.
    pub const SINGLE_THREAD: Self = Self(1 << 4);

    /// All five guarantees.
    pub const STANDARD: Self = Self::ASYNC_NON_REENTRANT
        .union(Self::SEND_NON_REENTRANT)
        .union(Self::SERIALIZED_EXECUTION)
        .union(Self::FIFO_EXECUTION)
        .union(Self::SINGLE_THREAD);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::ASYNC_NON_REENTRANT, "async-non-reentrant"),
        (Self::SEND_NON_REENTRANT, "send-non-reentrant"),
        (Self::SERIALIZED_EXECUTION, "serialized"),
        (Self::FIFO_EXECUTION, "fifo"),
        (Self::SINGLE_THREAD, "single-thread"),
    ];

    /// Returns the raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Checks if every flag of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the flags set in either `self` or `other`.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Capabilities {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("{}");
        }

        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();

        write!(f, "{{{}}}", names.join(", "))
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capabilities({self})")
    }
}
