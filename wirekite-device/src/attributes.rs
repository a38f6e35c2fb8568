//! Bit sets passed as port attributes.

/// Declares a `u16` newtype whose associated constants combine with `|`.
macro_rules! attribute_flags {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$flag_meta:meta])* const $flag:ident = $value:literal;)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
        pub struct $name(u16);

        impl $name {
            $($(#[$flag_meta])* pub const $flag: $name = $name($value);)+

            /// The raw attribute bits as sent to the board.
            pub const fn bits(self) -> u16 {
                self.0
            }

            /// Whether all bits of `other` are set.
            pub const fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            /// Whether any bit of `other` is set.
            pub const fn intersects(self, other: $name) -> bool {
                self.0 & other.0 != 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }
    };
}

pub(crate) use attribute_flags;
