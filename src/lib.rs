//! Signed, compressed update-package container engine.
//!
//! A package is a single file: fixed header, optional upgrade metadata,
//! a component descriptor table, the compressed payload region, and a
//! trailing signature block. [`PkgManager`] packs component files into
//! such a container, verifies and loads existing ones, and extracts
//! components into any [`PkgStream`] destination with digest
//! verification on the way out.
//!
//! Everything is synchronous; every operation completes (and is durable
//! where it promises to be) before returning. Verification fails
//! closed: nothing from an unverified file is ever exposed.
//!
//! ```no_run
//! use upack::{
//!     ComponentInfo, DigestMethod, FileInfo, NullSigner, NullVerifier, PackMethod,
//!     PackParams, PkgEntry, PkgInfo, PkgManager, PkgType, SignMethod, UpgradePkgInfo,
//! };
//!
//! # fn main() -> upack::Result<()> {
//! let info = UpgradePkgInfo {
//!     pkg: PkgInfo {
//!         entry_count: 1,
//!         digest_method: DigestMethod::Sha256,
//!         sign_method: SignMethod::None,
//!         pkg_type: PkgType::Upgrade,
//!     },
//!     software_version: "1.0.0".into(),
//!     date: "2026-08-27".into(),
//!     time: "12:00".into(),
//!     product_update_id: "demo".into(),
//!     update_file_version: 1,
//! };
//! let component = ComponentInfo::new(FileInfo::new(
//!     "boot.img",
//!     PackMethod::Zip,
//!     DigestMethod::Sha256,
//! ));
//! let entry = PkgEntry::new(component, "boot.img", PackParams::default_for(PackMethod::Zip));
//!
//! let mut manager = PkgManager::new();
//! manager.create_package("update.bin".as_ref(), &NullSigner, &info, &[entry])?;
//! let names = manager.load_package("update.bin".as_ref(), &NullVerifier)?;
//! assert_eq!(names, ["boot.img"]);
//! # Ok(())
//! # }
//! ```

mod codec;
mod digest;
mod error;
mod format;
mod info;
mod manager;
mod sign;
mod stream;

pub use codec::{
    gzip_payload_offset, CodecStats, FCOMMENT, FEXTRA, FHCRC, FNAME, GZIP_BASE_HEADER_SIZE,
};
pub use digest::{build_file_digest, compute as compute_digest, DigestState};
pub use error::{Error, Result};
pub use format::{PkgHeader, HEADER_SIZE, PKG_MAGIC, PKG_VERSION};
pub use info::{
    ComponentInfo, DigestMethod, FileInfo, Lz4Params, PackMethod, PackParams, PkgInfo, PkgType,
    SignMethod, UpgradePkgInfo, ZipParams, COMP_FLAG_ZLIB_WRAPPER,
};
pub use manager::{PkgEntry, PkgManager};
pub use sign::{NullSigner, NullVerifier, PkgSigner, PkgVerifier, RsaSigner, RsaVerifier};
pub use stream::{
    FileMode, FileStream, MemoryMapStream, PkgStream, ProcessorFn, ProcessorStream, StreamType,
};
