pub mod expiry;
pub mod meta;

// re-export so one can use with models::Expiry
// rather than models::expiry::Expiry
pub use expiry::Expiry;
pub use meta::RedisMeta;

pub type RedisString = Vec<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisType {
    String,
    List,
    Hash,
}

impl RedisType {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::String => b"string",
            Self::List => b"list",
            Self::Hash => b"hash",
        }
    }
}
