#![warn(clippy::pedantic)]
#![allow(
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation
)]

pub mod board;
mod compression;
mod config;
mod error;
mod file_handler;
mod generation;
mod indexer;
mod material;
mod perpetual;
mod probe;
mod score;

pub use compression::{BlockHeader, EncoderDecoder, BLOCK_CELLS};
pub use config::{EgtbMemMode, GeneratorConfig};
pub use error::{Error, Result};
pub use file_handler::{factor_order_id, file_stem, Header, TablebaseFile};
pub use generation::Generator;
pub use indexer::Indexer;
pub use material::Material;
pub use perpetual::{ChaseList, ChaseRecord};
pub use probe::TablebaseProber;
pub use score::{pick_best_from_rival_score, Score, Variant};
