// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The `ember_bitflags!` macro and the shader-stage visibility flags built with it.

/// Declares a copyable bit set type with named constants.
///
/// The generated type exposes `empty`, `bits`, `from_bits_truncate`, `contains`,
/// `intersects`, `insert`, `remove`, `set`, and the `|`/`&` operators.
#[macro_export]
macro_rules! ember_bitflags {
    (
        $(#[$outer:meta])*
        $vis:vis struct $name:ident: $ty:ty {
            $(
                $(#[$inner:meta])*
                const $flag:ident = $value:expr;
            )*
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        $vis struct $name {
            bits: $ty,
        }

        impl $name {
            $(
                $(#[$inner])*
                pub const $flag: Self = Self { bits: $value };
            )*

            /// A set with no flags.
            #[inline]
            pub const fn empty() -> Self {
                Self { bits: 0 }
            }

            /// The raw bit representation.
            #[inline]
            pub const fn bits(&self) -> $ty {
                self.bits
            }

            /// Builds a set from raw bits, dropping unknown bits.
            #[inline]
            pub const fn from_bits_truncate(bits: $ty) -> Self {
                Self {
                    bits: bits & (0 $(| $value)*),
                }
            }

            /// Returns `true` if every flag of `other` is set.
            #[inline]
            pub const fn contains(&self, other: Self) -> bool {
                (self.bits & other.bits) == other.bits
            }

            /// Returns `true` if any flag of `other` is set.
            #[inline]
            pub const fn intersects(&self, other: Self) -> bool {
                (self.bits & other.bits) != 0
            }

            /// Returns `true` if no flag is set.
            #[inline]
            pub const fn is_empty(&self) -> bool {
                self.bits == 0
            }

            /// Sets every flag of `other`.
            #[inline]
            pub fn insert(&mut self, other: Self) {
                self.bits |= other.bits;
            }

            /// Clears every flag of `other`.
            #[inline]
            pub fn remove(&mut self, other: Self) {
                self.bits &= !other.bits;
            }

            /// Sets or clears the flags of `other`.
            #[inline]
            pub fn set(&mut self, other: Self, value: bool) {
                if value {
                    self.insert(other);
                } else {
                    self.remove(other);
                }
            }
        }

        impl ::std::ops::BitOr for $name {
            type Output = Self;

            #[inline]
            fn bitor(self, rhs: Self) -> Self::Output {
                Self {
                    bits: self.bits | rhs.bits,
                }
            }
        }

        impl ::std::ops::BitOrAssign for $name {
            #[inline]
            fn bitor_assign(&mut self, rhs: Self) {
                self.bits |= rhs.bits;
            }
        }

        impl ::std::ops::BitAnd for $name {
            type Output = Self;

            #[inline]
            fn bitand(self, rhs: Self) -> Self::Output {
                Self {
                    bits: self.bits & rhs.bits,
                }
            }
        }
    };
}

crate::ember_bitflags! {
    /// Flags representing which shader stages can access a resource binding.
    pub struct ShaderStageFlags: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Fragment shader stage.
        const FRAGMENT = 1 << 1;
        /// Compute shader stage.
        const COMPUTE = 1 << 2;
    }
}

impl ShaderStageFlags {
    /// All graphics stages (vertex + fragment).
    pub const VERTEX_FRAGMENT: Self = Self {
        bits: Self::VERTEX.bits | Self::FRAGMENT.bits,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_and_query() {
        let mut flags = ShaderStageFlags::VERTEX | ShaderStageFlags::COMPUTE;
        assert!(flags.contains(ShaderStageFlags::VERTEX));
        assert!(!flags.contains(ShaderStageFlags::FRAGMENT));
        assert!(flags.intersects(ShaderStageFlags::VERTEX_FRAGMENT));

        flags.remove(ShaderStageFlags::VERTEX);
        assert_eq!(flags, ShaderStageFlags::COMPUTE);
        flags.set(ShaderStageFlags::FRAGMENT, true);
        assert_eq!(flags.bits(), 0b110);
    }

    #[test]
    fn from_bits_truncate_drops_unknown_bits() {
        let flags = ShaderStageFlags::from_bits_truncate(0xFF);
        assert_eq!(flags.bits(), 0b111);
        assert!(ShaderStageFlags::empty().is_empty());
    }
}
