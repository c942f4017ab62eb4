use core::fmt;

/// A four-character chunk identifier, stored in file byte order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Container magic.
    pub const DXBC: FourCC = FourCC(*b"DXBC");
    /// Resource definitions (constant buffers and bound resources).
    pub const RDEF: FourCC = FourCC(*b"RDEF");
    /// Legacy constant table.
    pub const CTAB: FourCC = FourCC(*b"CTAB");

    /// Builds a FourCC from a little-endian token.
    pub fn from_u32_le(token: u32) -> Self {
        Self(token.to_le_bytes())
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC(\"{self}\")")
    }
}
