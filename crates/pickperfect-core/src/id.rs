use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU32, Ordering};

use snafu::Snafu;
use time::OffsetDateTime;

use crate::define_array_type;

define_array_type!(
    /// Identifier of a stored document
    ///
    /// Layout: 4 bytes of big-endian unix seconds, 5 bytes unique to the
    /// process, 3 bytes of a big-endian counter. Ids generated later by the
    /// same process sort after earlier ones (until the counter wraps within a
    /// single second).
    struct DocumentId, 12
);

/// Random bytes shared by all ids generated in this process.
static PROCESS_UNIQUE: LazyLock<[u8; 5]> = LazyLock::new(rand::random);

static COUNTER: LazyLock<AtomicU32> =
    LazyLock::new(|| AtomicU32::new(rand::random::<u32>() & COUNTER_MASK));

const COUNTER_MASK: u32 = 0x00ff_ffff;

#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display("Invalid document id: expected 24 hex characters"))]
pub struct InvalidDocumentIdError;

impl DocumentId {
    pub fn generate() -> Self {
        Self::generate_at(OffsetDateTime::now_utc())
    }

    pub fn generate_at(now: OffsetDateTime) -> Self {
        let secs = u32::try_from(now.unix_timestamp()).unwrap_or(u32::MAX);
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(PROCESS_UNIQUE.as_slice());
        bytes[9..12].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Unix timestamp (seconds) the id was generated at
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes(self.0[0..4].try_into().expect("Fixed slice len"))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        data_encoding::HEXLOWER.encode_write(self.as_slice(), f)
    }
}

impl FromStr for DocumentId {
    type Err = InvalidDocumentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::LEN * 2 {
            return Err(InvalidDocumentIdError);
        }
        let bytes = data_encoding::HEXLOWER_PERMISSIVE
            .decode(s.as_bytes())
            .map_err(|_| InvalidDocumentIdError)?;
        Ok(Self(bytes.try_into().map_err(|_| InvalidDocumentIdError)?))
    }
}

impl serde::Serialize for DocumentId {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        s.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for DocumentId {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let str = <String>::deserialize(d)?;
        str.parse().map_err(serde::de::Error::custom)
    }
}
