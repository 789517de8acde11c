//! Customizer is the storage and rendering core behind a storefront photo customizer.
//!
//! A customer uploads a photo, positions and zooms it, and picks a decorative shape. The crate:
//!
//! - Renders the shaped result on a fixed canvas ([`ImagePipeline`])
//! - Decides the collision-free folder the upload lives in ([`IdentityResolver`])
//! - Persists original and shaped assets behind an [`ObjectStore`] ([`SessionStore`])
//! - Reclaims folders of abandoned sessions ([`Reclaimer`])
//!
//! Object store, order ledger and customization records are capability traits; in-memory and
//! local implementations ship with the crate.
#![forbid(unsafe_code)]

/// Error taxonomy, value types, configuration and capability handles.
pub mod foundation;
/// Order ledger and customization record gateways.
pub mod ledger;
/// Orphaned session folder reclamation.
pub mod reclaim;
/// Placement, masking and compositing.
pub mod render;
/// Upload identity resolution and the upload entrypoint.
pub mod session;
/// Object store gateway and implementations.
pub mod storage;

pub use crate::foundation::backend::Backend;
pub use crate::foundation::config::CustomizerConfig;
pub use crate::foundation::core::{
    Canvas, ImageMime, Placement, PlacementParams, RawPlacement, Shape, SourceImage,
};
pub use crate::foundation::error::{CustomizerError, CustomizerResult};

pub use crate::ledger::file::JsonFileOrderLedger;
pub use crate::ledger::memory::{MemoryCustomizationRecords, MemoryOrderLedger};
pub use crate::ledger::orders::{Order, OrderLedger, OrderProperty, OrderQuery, OrderStatus};
pub use crate::ledger::records::{CustomizationRecord, CustomizationRecords};
pub use crate::reclaim::reclaimer::{
    ReclaimFailure, ReclaimOpts, ReclaimReport, ReclaimRequest, Reclaimer,
};
pub use crate::render::mask::generate_mask;
pub use crate::render::pipeline::ImagePipeline;
pub use crate::render::placement::transform;
pub use crate::session::identity::{
    IdentityResolver, ResolutionOutcome, ResolverOpts, SessionIdentity,
};
pub use crate::session::upload::{FulfillmentUrls, UploadOutcome, UploadRequest, UploadService};
pub use crate::storage::gateway::{
    FolderKey, ObjectEntry, ObjectStore, SessionAssets, SessionStore, StoredAsset,
};
pub use crate::storage::local::LocalObjectStore;
pub use crate::storage::memory::MemoryObjectStore;
