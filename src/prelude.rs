pub use crate::bridge::{Bridge, FanIn, Producer, Sink, fan_in, producer};
pub use crate::config::{BridgeConfig, PoolConfig, load_cfg};
pub use crate::error::{CancelCause, SeqError};
pub use crate::outcome::Outcome;
pub use crate::pool::{MapAsync, WorkerPool, map_async};
pub use crate::sequence::{
    Sequence, SequenceExt, all, any, fold, from_vec, range, reduce, take_n, to_vec,
};
pub use crate::utils::CancelToken;
pub use crate::utils::logger::LoggerConfig;
