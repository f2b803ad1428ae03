//! Build/probe tunables that the original C++ sources either hard-coded or
//! left as an `extern` with no definition. Surfaced explicitly per
//! REDESIGN FLAGS (b) and (d).

/// How much of a decompressed tablebase side is kept resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EgtbMemMode {
    /// Page blocks on demand, keep only the block index resident.
    Tiny,
    /// Decode everything into memory at load time.
    All,
    /// `All` when the decoded size is under 120 MiB, `Tiny` otherwise.
    #[default]
    Smart,
}

impl EgtbMemMode {
    /// Threshold used by `Smart` to decide between `All` and `Tiny`.
    pub const SMART_THRESHOLD_BYTES: u64 = 120 * 1024 * 1024;

    #[must_use]
    pub fn resolve(self, decoded_size_bytes: u64) -> Self {
        match self {
            Self::Smart if decoded_size_bytes < Self::SMART_THRESHOLD_BYTES => Self::All,
            Self::Smart => Self::Tiny,
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Max distance-to-mate that fits a 1-byte cell; deeper scores use 2-byte cells.
    pub dtm_max: u8,
    /// Clamp any score whose absolute DTM/ply-count exceeds 120 plies to `Draw`.
    pub rule120: bool,
    /// `check2Flip` in the original: whether a double check also triggers the
    /// canonical side flip during indexing. No definition was ever given in the
    /// included sources; defaults to off.
    pub check2_flip: bool,
    /// `xqRepetitionFofeiteForLastMoveOnly` in the original: when true, a
    /// perpetual-check/chase cycle only forfeits the side whose *last* move
    /// continued the perpetuation, rather than the whole cycle.
    pub xq_repetition_forfeit_for_last_move_only: bool,
    /// In-memory residency strategy used when a generated file is loaded back
    /// to serve as a sub-tablebase for a bigger build.
    pub mem_mode: EgtbMemMode,
    /// Number of worker threads for the retrograde fixed point. `0` picks the
    /// available parallelism of the host.
    pub threads: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            dtm_max: 125,
            rule120: true,
            check2_flip: false,
            xq_repetition_forfeit_for_last_move_only: false,
            mem_mode: EgtbMemMode::default(),
            threads: 0,
        }
    }
}

impl GeneratorConfig {
    #[must_use]
    pub fn resolved_threads(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
        } else {
            self.threads
        }
    }
}
