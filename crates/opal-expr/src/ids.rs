macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Get the inner u32 value.
            pub fn inner(self) -> u32 {
                self.0
            }

            /// Create an ID from a u32 value.
            pub fn new(value: u32) -> Self {
                Self(value)
            }

            /// Position of this ID in its arena.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

define_id_type!(NodeId);
define_id_type!(SymbolId);
define_id_type!(CallSiteId);
