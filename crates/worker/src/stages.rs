//! Pipeline stages served by this worker.
//!
//! Each stage claims jobs of one category waiting in one state. The stage
//! key selects its `WORKERS_<KEY>` and `HANDLER_<KEY>_*` configuration.

/// One configured pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub key: &'static str,
    pub category: &'static str,
    pub state: &'static str,
}

/// All stages, in registration (and therefore tick) order.
pub const STAGES: [Stage; 3] = [
    Stage {
        key: "audio_convert",
        category: "audio",
        state: "toMp3",
    },
    Stage {
        key: "audio_analysis",
        category: "audio",
        state: "analyse",
    },
    Stage {
        key: "thermal",
        category: "thermalRaw",
        state: "getMetadata",
    },
];
