pub mod document;
pub mod id;

pub use document::{Collection, Document, ID_FIELD, with_id};
pub use id::{DocumentId, InvalidDocumentIdError};

#[macro_export]
macro_rules! define_array_type {
    (
        $(#[$outer:meta])*
        struct $t:tt, $n:literal
    ) => {
        $(#[$outer])*
        #[derive(Copy, Clone, Hash, Debug, PartialOrd, Ord, PartialEq, Eq)]
        pub struct $t([u8; $n]);

        impl $t {
            pub const LEN: usize = $n;

            pub fn as_slice(&self) -> &[u8] {
                self.0.as_slice()
            }

            pub fn to_bytes(self) -> [u8; $n] {
                self.0
            }
        }

        impl From<[u8; $n]> for $t {
            fn from(value: [u8; $n]) -> Self {
                Self(value)
            }
        }
    };
}
