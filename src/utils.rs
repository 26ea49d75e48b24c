//! Support macros and formatting helpers used across the stack.

use core::fmt;

/// Creates an enum that can be converted from and to a primitive type, with invalid values becoming
/// a catch-all `Unknown` variant.
///
/// Several wire fields carry values this crate has no variant for: packet types the egress path
/// does not inspect, module tags minted by newer peers, driver families of exotic hardware.
/// Decoding must preserve those instead of failing, so [`PacketType`], [`Module`] and
/// [`DriverFamily`] are generated with this macro rather than written as plain enums.
///
/// The macro itself is adapted from [smoltcp].
///
/// [`PacketType`]: crate::link::packet::PacketType
/// [`Module`]: crate::link::packet::Module
/// [`DriverFamily`]: crate::link::registry::DriverFamily
/// [smoltcp]: https://github.com/m-labs/smoltcp/blob/cd893e6ab60f094d684b37be7bc013bf79f0459d/src/macros.rs
macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        $v:vis enum $name:ident($ty:ty) {
            $(
              $( #[$variant_attr:meta] )*
              $variant:ident = $value:expr $(,)*
            ),*
        }
    ) => {
        $( #[$enum_attr] )*
        $v enum $name {
            $(
              $( #[$variant_attr] )*
              $variant,
            )*
            Unknown($ty)
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant, )*
                    other => $name::Unknown(other)
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value, )*
                    $name::Unknown(other) => other
                }
            }
        }
    }
}

/// `Debug`-formats a byte slice as colon-separated hex octets, the way interface MACs appear in
/// the link diagnostics.
#[derive(Copy, Clone)]
pub struct HexSlice<T>(pub T)
where
    T: AsRef<[u8]>;

impl<T: AsRef<[u8]>> fmt::Debug for HexSlice<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, byte) in self.0.as_ref().iter().enumerate() {
            if i != 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        f.write_str("]")
    }
}

/// `Debug`-formats its contents in hexadecimal; used for capability bitsets in the link
/// diagnostics, which are easier to eyeball against the flag constants than decimal.
#[derive(Copy, Clone)]
pub struct Hex<T>(pub T)
where
    T: fmt::LowerHex;

impl<T: fmt::LowerHex> fmt::Debug for Hex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_macs_and_bitsets() {
        let mac = [0x02, 0x00, 0xde, 0xad, 0xbe, 0xef];
        assert_eq!(format!("{:?}", HexSlice(mac)), "[02:00:de:ad:be:ef]");
        assert_eq!(format!("{:?}", Hex(0x16u32)), "0x16");
    }
}
