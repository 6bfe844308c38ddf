/// CAS（Compare-And-Swap）操作最大重试次数
pub const MAX_CAS_RETRIES: u32 = 20;

/// Page size requested from the Source per fetch.
pub const SOURCE_PAGE_SIZE: u16 = 100;

/// Number of backfilled events flushed to the grouping engine per chunk.
pub const BACKFILL_CHUNK_SIZE: usize = 100;

/// Number of channels returned by the top-channels ranking.
pub const TOP_CHANNELS_LIMIT: usize = 10;
