use std::fmt;
use std::num::NonZeroU64;

/// Opaque, never-zero context handle.
///
/// The low 32 bits index an arena slot, the high 32 bits hold the slot's
/// generation (always at least 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(NonZeroU64);

impl Handle {
    pub(crate) fn new(index: u32, generation: u32) -> Option<Self> {
        NonZeroU64::new(((generation as u64) << 32) | index as u64)
            .filter(|_| generation > 0)
            .map(Self)
    }

    /// Decode a raw value; `None` for zero or a zero generation.
    pub fn from_raw(raw: u64) -> Option<Self> {
        Self::new(raw as u32, (raw >> 32) as u32)
    }

    pub fn raw(&self) -> u64 {
        self.0.get()
    }

    pub(crate) fn index(&self) -> u32 {
        self.0.get() as u32
    }

    pub(crate) fn generation(&self) -> u32 {
        (self.0.get() >> 32) as u32
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index(), self.generation())
    }
}
