//! Wire слой root motion репликации
//!
//! - archive: битовый архив (`Archive`, `BitWriter`, `BitReader`)
//! - registry: type tag ↔ вид источника
//! - codec: массивы источников и группа целиком
//! - snapshot: `RepRootMotionMontage` для montage-driven proxy

pub mod archive;
pub mod codec;
pub mod error;
pub mod registry;
pub mod snapshot;

pub use archive::{Archive, BitReader, BitWriter, NetSerialize, MAX_STRING_BYTES};
pub use codec::{
    decode_group, decode_group_into, encode_group, net_serialize_sources,
    DEFAULT_MAX_SOURCES_PER_MESSAGE,
};
pub use error::{WireError, WireResult};
pub use snapshot::{decode_rep_root_motion, encode_rep_root_motion, MontageId, RepRootMotionMontage};
