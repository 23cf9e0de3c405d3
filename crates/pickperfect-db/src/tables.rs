use pickperfect_core::Collection;

#[macro_export]
macro_rules! def_table {
    ($(#[$outer:meta])*
        $name:ident : $k:ty => $v:ty) => {
        #[allow(unused)]
        $(#[$outer])*
        pub mod $name {
            use super::*;
            pub type Key = $k;
            pub type Value = $v;
            pub type Definition<'a> = redb::TableDefinition<'a, Key, Value>;
            pub trait ReadableTable: redb::ReadableTable<Key, Value> {}
            impl<RT> ReadableTable for RT where RT: redb::ReadableTable<Key, Value> {}
            pub type Table<'a> = redb::Table<'a, Key, Value>;
            pub const TABLE: Definition = redb::TableDefinition::new(stringify!($name));
        }
    };
}

def_table! {
    /// Tracks database/schema version
    db_version: () => u64
}

def_table! {
    /// Queries posted by users, keyed by hex [`pickperfect_core::DocumentId`],
    /// value is the JSON-encoded document
    users_queries: &'static str => &'static [u8]
}

def_table! {
    /// Recommendations, same layout as [`users_queries`]
    all_recommendations: &'static str => &'static [u8]
}

/// Both document tables share the layout of [`users_queries`]
pub mod documents {
    pub use super::users_queries::{Key, ReadableTable, Table, Value};
}

pub(crate) fn collection_table(collection: Collection) -> users_queries::Definition<'static> {
    match collection {
        Collection::Queries => users_queries::TABLE,
        Collection::Recommendations => all_recommendations::TABLE,
    }
}
