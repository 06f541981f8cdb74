//! audio_aac - Audio Library Normalisation to AAC-in-M4A
//!
//! Converts a mixed-format music library into a mirrored tree of AAC M4A
//! files with standardised metadata:
//! - AAC sources pass through untouched (no generation loss)
//! - ALAC sources are encoded directly by qaac
//! - everything else is decoded to WAV first, then encoded
//!
//! ## Probing a file
//! ```rust,ignore
//! use audio_aac::detect_route;
//! use std::path::Path;
//!
//! let route = detect_route(Path::new("track.flac"));
//! println!("{}", route.describe());
//! ```

pub mod convert;
pub mod probe;
pub mod standardise;
pub mod tag_store;
pub mod tags;
pub mod task;
pub mod transfer;

pub use convert::{convert_to_wav, encode_aac};
pub use probe::{detect_route, probe_codec, route_for_codec, Route};
pub use standardise::{standardise, StandardiseOptions};
pub use tag_store::{open_store, CoverArt, TagStore};
pub use tags::{Scheme, SchemeMap, TagValue};
pub use task::{run_task, Task, TaskOptions, TaskOutcome, MAX_RETRY_ATTEMPTS};
pub use transfer::{map_fields, transfer_fields};

pub use shared_utils::PipelineError;
