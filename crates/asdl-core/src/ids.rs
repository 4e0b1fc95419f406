//! Opaque entity identifiers and their per-invocation allocators.
//!
//! Graph nodes refer to each other through numeric IDs rather than owning
//! pointers; provenance from atomized entities back to patterned ones is a
//! plain ID as well. Counters are scoped per entity kind and reset with the
//! allocator, so a fresh compilation always starts at zero.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub u32);

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                $name(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// A module definition, patterned or atomized.
    ModuleId, "m"
);
define_id!(
    /// A device definition.
    DeviceId, "d"
);
define_id!(
    /// An instance bundle or atom.
    InstId, "i"
);
define_id!(
    /// A net bundle or atom.
    NetId, "n"
);
define_id!(
    /// An endpoint bundle or atom.
    EndpointId, "e"
);
define_id!(
    /// A registered pattern expression.
    ExprId, "x"
);

/// Monotonic ID source for one entity kind.
#[derive(Debug)]
pub struct IdGen<T> {
    next: u32,
    _kind: PhantomData<T>,
}

impl<T: From<u32>> IdGen<T> {
    pub fn new() -> Self {
        IdGen {
            next: 0,
            _kind: PhantomData,
        }
    }

    pub fn next(&mut self) -> T {
        let id = T::from(self.next);
        self.next += 1;
        id
    }
}

impl<T: From<u32>> Default for IdGen<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One allocator per entity kind, carried through a single invocation.
#[derive(Debug, Default)]
pub struct IdAllocator {
    pub modules: IdGen<ModuleId>,
    pub devices: IdGen<DeviceId>,
    pub instances: IdGen<InstId>,
    pub nets: IdGen<NetId>,
    pub endpoints: IdGen<EndpointId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_per_kind() {
        let mut alloc = IdAllocator::default();
        assert_eq!(alloc.instances.next(), InstId(0));
        assert_eq!(alloc.instances.next(), InstId(1));
        // A different kind keeps its own counter.
        assert_eq!(alloc.nets.next(), NetId(0));
        assert_eq!(alloc.instances.next(), InstId(2));
    }

    #[test]
    fn display_is_prefixed() {
        assert_eq!(InstId(3).to_string(), "i3");
        assert_eq!(NetId(0).to_string(), "n0");
    }
}
