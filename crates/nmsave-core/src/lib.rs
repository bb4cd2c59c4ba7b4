//! nmsave-core: No Man's Sky save codec and metadata engine
//!
//! This crate covers everything between an account directory and a JSON
//! document:
//! - Per-platform meta layouts, encryption and LZ4 framing (Steam/GOG/Mac,
//!   Microsoft, Playstation, Switch)
//! - Key (de)obfuscation and version-aware path resolution
//! - Composite file version and game version inference
//! - Container bookkeeping, copy/swap/delete and zip backups
//!
pub mod backup;
pub mod binio;
pub mod cipher;
pub mod compression;
pub mod container;
pub mod error;
pub mod extra;
pub mod json;
pub mod layout;
pub mod mapping;
pub mod microsoft;
pub mod model;
pub mod paths;
pub mod pipeline;
pub mod platform;
pub mod settings;
pub mod version;

pub use container::{Container, Incompatibility};
pub use error::{Error, Result};
pub use extra::{MicrosoftExtra, PlatformExtra, PlatformSpecific};
pub use json::{get_by_pointer, set_raw_by_pointer};
pub use model::{
    Difficulty, GameMode, GameVersion, LoadingStrategy, MetaFormat, MicrosoftSyncState,
    PlatformKind, SaveContext, SaveType,
};
pub use pipeline::Codec;
pub use platform::{Platform, PlatformObserver, UserNameResolver};
pub use settings::PlatformSettings;
