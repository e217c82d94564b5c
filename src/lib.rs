pub mod cache;
pub mod config;
pub mod error;
pub mod file;
pub mod filter;
pub mod key;
pub mod scheduler;
pub mod signal;
pub mod table;

pub use cache::{filter_cache_key, Handle, MultiQueue};
pub use config::Options;
pub use error::{Error, Result};
pub use filter::{
    BloomFilterPolicy, FilterBlockBuilder, FilterBlockReader, FilterPolicy,
    InternalFilterPolicy,
};
pub use scheduler::MqScheduler;
pub use table::TableFilter;
