mod collection_ops;
mod results;
mod tables;

use std::path::{Path, PathBuf};
use std::{io, result};

pub use pickperfect_core::{Collection, Document, DocumentId};
use redb::{ReadTransaction, ReadableTable as _, WriteTransaction};
use snafu::{Location, ResultExt as _, Snafu};
use tokio::task::JoinError;
use tracing::{debug, info, instrument};

pub use self::results::{DeleteResult, InsertOneResult, UpdateResult};
pub use self::tables::*;

const LOG_TARGET: &str = "pickperfect::db";

/// Current schema version, bumped whenever table layout changes
const DB_VERSION: u64 = 0;

#[derive(Debug, Snafu)]
pub enum DbError {
    Database {
        source: redb::DatabaseError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Table {
        source: redb::TableError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Storage {
        source: redb::StorageError,
        #[snafu(implicit)]
        location: Location,
    },
    Transaction {
        source: redb::TransactionError,
        #[snafu(implicit)]
        location: Location,
    },
    Commit {
        source: redb::CommitError,
        #[snafu(implicit)]
        location: Location,
    },
    DbVersionTooHigh {
        db_ver: u64,
        code_ver: u64,
        #[snafu(implicit)]
        location: Location,
    },
    Join {
        source: JoinError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("Stored document is not valid JSON"))]
    DocumentDecoding {
        source: serde_json::Error,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(visibility(pub(crate)))]
    #[snafu(display("Cannot apply $inc to non-numeric field '{field}'"))]
    NonNumericField {
        field: String,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(visibility(pub(crate)))]
    #[snafu(display("Increment of field '{field}' overflows"))]
    IncrementOverflow {
        field: String,
        #[snafu(implicit)]
        location: Location,
    },
}
pub type DbResult<T> = result::Result<T, DbError>;

impl DbError {
    /// Whether the error was caused by the request rather than by the storage
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            DbError::NonNumericField { .. } | DbError::IncrementOverflow { .. }
        )
    }
}

/// Embedded document store holding the queries and recommendations
#[derive(Debug)]
pub struct Database {
    inner: redb::Database,
}

impl Database {
    pub async fn mk_db_path(data_dir: &Path) -> result::Result<PathBuf, io::Error> {
        tokio::fs::create_dir_all(&data_dir).await?;
        Ok(data_dir.join("pickperfect.redb"))
    }

    #[instrument(skip_all)]
    pub async fn open(path: impl Into<PathBuf>) -> DbResult<Database> {
        let path = path.into();
        debug!(target: LOG_TARGET, path = %path.display(), "Opening database");
        let inner = tokio::task::spawn_blocking(move || redb::Database::create(path))
            .await
            .context(JoinSnafu)?
            .context(DatabaseSnafu)?;

        Self::write_with_inner(&inner, |tx| {
            Self::init_tables_tx(tx)?;
            Self::handle_db_ver_tx(&mut tx.open_table(db_version::TABLE)?)?;
            Ok(())
        })
        .await?;

        Ok(Self { inner })
    }

    fn init_tables_tx(tx: &WriteTransaction) -> DbResult<()> {
        tx.open_table(db_version::TABLE)?;
        for collection in Collection::ALL {
            tx.open_table(tables::collection_table(collection))?;
        }
        Ok(())
    }

    fn handle_db_ver_tx(table_db_ver: &mut db_version::Table) -> DbResult<()> {
        let Some(cur_db_ver) = table_db_ver.get(&())?.map(|g| g.value()) else {
            info!(target: LOG_TARGET, "Initializing new database");
            table_db_ver.insert(&(), &DB_VERSION)?;
            return Ok(());
        };

        debug!(target: LOG_TARGET, db_ver = cur_db_ver, "Checking db version");
        if DB_VERSION < cur_db_ver {
            return DbVersionTooHighSnafu {
                db_ver: cur_db_ver,
                code_ver: DB_VERSION,
            }
            .fail();
        }

        Ok(())
    }

    /// Check that the database can start a transaction
    pub async fn ping(&self) -> DbResult<()> {
        self.read_with(|_tx| Ok(())).await
    }

    pub async fn write_with_inner<T>(
        inner: &redb::Database,
        f: impl FnOnce(&'_ WriteTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = inner.begin_write().context(TransactionSnafu)?;
            let res = f(&dbtx)?;

            dbtx.commit().context(CommitSnafu)?;

            Ok(res)
        })
    }

    pub async fn write_with<T>(
        &self,
        f: impl FnOnce(&'_ WriteTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        Self::write_with_inner(&self.inner, f).await
    }

    pub async fn read_with_inner<T>(
        inner: &redb::Database,
        f: impl FnOnce(&'_ ReadTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        tokio::task::block_in_place(|| {
            let dbtx = inner.begin_read().context(TransactionSnafu)?;

            f(&dbtx)
        })
    }

    pub async fn read_with<T>(
        &self,
        f: impl FnOnce(&'_ ReadTransaction) -> DbResult<T>,
    ) -> DbResult<T> {
        Self::read_with_inner(&self.inner, f).await
    }
}

#[cfg(test)]
mod tests;
