//! Package engine entry point: packing, loading, extraction and the
//! buffer-level codec surface.
//!
//! A `PkgManager` holds at most one loaded package at a time. Packing
//! writes the payload region before the header and component table, and
//! the signature block last; a crash mid-pack leaves a file whose header
//! never parses. Loading verifies the signature over the serialized
//! header, metadata and table before any descriptor is trusted.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec::{self, IoSink, Sink};
use crate::digest::{self, DigestState};
use crate::format::{self, PkgHeader, TableEntry, HEADER_SIZE};
use crate::info::{
    ComponentInfo, FileInfo, PackMethod, PackParams, PkgType, UpgradePkgInfo, ZipParams,
    COMP_FLAG_ZLIB_WRAPPER,
};
use crate::sign::{PkgSigner, PkgVerifier};
use crate::stream::{PkgStream, ProcessorFn, StreamType};
use crate::{Error, Result};

/// One component to pack: its descriptor, the source file holding the
/// unpacked bytes, and the codec parameters to pack it with.
pub struct PkgEntry {
    pub info: ComponentInfo,
    pub source: PathBuf,
    pub params: PackParams,
}

impl PkgEntry {
    pub fn new(info: ComponentInfo, source: impl Into<PathBuf>, params: PackParams) -> Self {
        Self {
            info,
            source: source.into(),
            params,
        }
    }
}

struct LoadedPackage {
    path: PathBuf,
    upgrade: Option<UpgradePkgInfo>,
    entries: Vec<TableEntry>,
    payload_start: u64,
}

/// Update-package engine. All operations are synchronous and complete
/// before returning.
#[derive(Default)]
pub struct PkgManager {
    loaded: Option<LoadedPackage>,
}

impl PkgManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pack `entries` into a signed package at `path`.
    ///
    /// Validation failures (entry count mismatch, empty or duplicate
    /// identities, signer/method mismatch) are `InvalidParam`; an
    /// unreadable source is `InvalidFile` naming it. On success the file
    /// is durable on disk before the call returns.
    pub fn create_package(
        &self,
        path: &Path,
        signer: &dyn PkgSigner,
        info: &UpgradePkgInfo,
        entries: &[PkgEntry],
    ) -> Result<()> {
        validate_request(signer, info, entries)?;
        log::info!(
            "packing {} component(s) into {}",
            entries.len(),
            path.display()
        );

        // Digests and descriptor strings are known before any payload is
        // compressed, and the size fields are fixed-width, so the table
        // length (and with it the payload start) is computable up front.
        let mut table: Vec<TableEntry> = Vec::with_capacity(entries.len());
        let mut sources: Vec<Vec<u8>> = Vec::with_capacity(entries.len());
        for entry in entries {
            let data = std::fs::read(&entry.source).map_err(|err| {
                Error::InvalidFile(format!("{}: {err}", entry.source.display()))
            })?;

            let mut component = entry.info.clone();
            component.file.digest_method = info.pkg.digest_method;
            component.file.digest = digest::compute(info.pkg.digest_method, &data);
            component.file.pack_method = entry.params.method();
            component.file.unpacked_size = data.len() as u64;
            component.file.packed_size = 0; // patched after compression
            if component.original_size == 0 {
                component.original_size = data.len() as u64;
            }
            if let PackParams::Zip(zip) = &entry.params {
                if zip.window_bits >= 0 {
                    component.flags |= COMP_FLAG_ZLIB_WRAPPER;
                }
            }
            table.push(TableEntry {
                info: component,
                payload_offset: 0,
            });
            sources.push(data);
        }

        let meta = if info.pkg.pkg_type == PkgType::Upgrade {
            format::encode_upgrade_meta(info)?
        } else {
            Vec::new()
        };
        let table_len = format::encode_table(&table)?.len();
        let payload_start = (HEADER_SIZE + meta.len() + table_len) as u64;

        let mut out = File::create(path)?;

        // Payload region first. The header stays zeroed until the table
        // is final, so an interrupted pack never looks like a package.
        out.seek(SeekFrom::Start(payload_start))?;
        let mut payload_offset = 0u64;
        for ((entry, data), request) in table.iter_mut().zip(&sources).zip(entries) {
            let mut sink = IoSink::new(&mut out);
            let packed = codec::compress(&request.params, data, &mut sink)?;
            entry.payload_offset = payload_offset;
            entry.info.file.packed_size = packed;
            payload_offset += packed;
            log::debug!(
                "packed {}: {} -> {} bytes",
                entry.info.file.identity,
                entry.info.file.unpacked_size,
                packed
            );
        }

        let table_bytes = format::encode_table(&table)?;
        debug_assert_eq!(table_bytes.len(), table_len);
        let header = PkgHeader {
            pkg_type: info.pkg.pkg_type,
            digest_method: info.pkg.digest_method,
            sign_method: signer.method(),
            entry_count: entries.len() as u32,
            meta_len: meta.len() as u32,
            table_len: table_len as u32,
            signature_len: signer.signature_len() as u32,
        };

        let mut prefix = Vec::with_capacity(payload_start as usize);
        prefix.extend_from_slice(&header.to_bytes());
        prefix.extend_from_slice(&meta);
        prefix.extend_from_slice(&table_bytes);

        let signature = signer.sign(&prefix)?;
        if signature.len() != signer.signature_len() {
            return Err(Error::SignatureInvalid(format!(
                "signer produced {} bytes, declared {}",
                signature.len(),
                signer.signature_len()
            )));
        }

        out.seek(SeekFrom::Start(0))?;
        out.write_all(&prefix)?;
        out.seek(SeekFrom::Start(payload_start + payload_offset))?;
        out.write_all(&signature)?;
        out.sync_all()?;
        Ok(())
    }

    /// Load and verify the package at `path`. Returns the component
    /// identities in table order.
    ///
    /// Any previously loaded package is dropped first, so a failed load
    /// never leaves stale descriptors behind. Nothing from the file is
    /// exposed unless the signature verifies.
    pub fn load_package(&mut self, path: &Path, verifier: &dyn PkgVerifier) -> Result<Vec<String>> {
        self.loaded = None;

        let mut file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|err| Error::InvalidFile(format!("{}: {err}", path.display())))?;
        let file_len = file.metadata()?.len();

        let mut header_bytes = [0u8; HEADER_SIZE];
        read_exact_at(&mut file, &mut header_bytes, 0, path)?;
        let header = PkgHeader::from_bytes(&header_bytes)?;

        let prefix_len = HEADER_SIZE as u64 + header.meta_len as u64 + header.table_len as u64;
        let declared = prefix_len + header.signature_len as u64;
        if declared > file_len {
            return Err(Error::InvalidFile(format!(
                "{}: declared regions exceed file size",
                path.display()
            )));
        }
        if header.pkg_type != PkgType::Upgrade && header.meta_len != 0 {
            return Err(Error::InvalidFile(format!(
                "{}: metadata block on a non-upgrade package",
                path.display()
            )));
        }

        if verifier.method() != header.sign_method {
            return Err(Error::SignatureInvalid(format!(
                "package signed with {:?}, verifier handles {:?}",
                header.sign_method,
                verifier.method()
            )));
        }

        let mut prefix = vec![0u8; prefix_len as usize];
        read_exact_at(&mut file, &mut prefix, 0, path)?;
        let mut signature = vec![0u8; header.signature_len as usize];
        read_exact_at(
            &mut file,
            &mut signature,
            file_len - header.signature_len as u64,
            path,
        )?;
        verifier.verify(&prefix, &signature)?;

        let meta_start = HEADER_SIZE;
        let table_start = meta_start + header.meta_len as usize;
        let upgrade = if header.pkg_type == PkgType::Upgrade {
            Some(format::decode_upgrade_meta(
                &prefix[meta_start..table_start],
                crate::info::PkgInfo {
                    entry_count: header.entry_count,
                    digest_method: header.digest_method,
                    sign_method: header.sign_method,
                    pkg_type: header.pkg_type,
                },
            )?)
        } else {
            None
        };
        let entries = format::decode_table(&prefix[table_start..], header.entry_count)?;

        let payload_len = file_len - prefix_len - header.signature_len as u64;
        let mut identities = Vec::with_capacity(entries.len());
        for entry in &entries {
            let in_range = entry
                .payload_offset
                .checked_add(entry.info.file.packed_size)
                .is_some_and(|end| end <= payload_len);
            if !in_range {
                return Err(Error::InvalidFile(format!(
                    "{}: payload extent of {} out of range",
                    path.display(),
                    entry.info.file.identity
                )));
            }
            if identities.contains(&entry.info.file.identity) {
                return Err(Error::InvalidFile(format!(
                    "{}: duplicate component {}",
                    path.display(),
                    entry.info.file.identity
                )));
            }
            identities.push(entry.info.file.identity.clone());
        }

        log::info!(
            "loaded {} with {} component(s)",
            path.display(),
            identities.len()
        );
        self.loaded = Some(LoadedPackage {
            path: path.to_path_buf(),
            upgrade,
            entries,
            payload_start: prefix_len,
        });
        Ok(identities)
    }

    /// Descriptor lookup on the loaded package.
    pub fn get_file_info(&self, identity: &str) -> Option<&FileInfo> {
        self.get_component_info(identity).map(|info| &info.file)
    }

    pub fn get_component_info(&self, identity: &str) -> Option<&ComponentInfo> {
        self.loaded.as_ref().and_then(|pkg| {
            pkg.entries
                .iter()
                .map(|entry| &entry.info)
                .find(|info| info.file.identity == identity)
        })
    }

    /// Upgrade metadata of the loaded package, if it carries any.
    pub fn upgrade_info(&self) -> Option<&UpgradePkgInfo> {
        self.loaded.as_ref().and_then(|pkg| pkg.upgrade.as_ref())
    }

    /// Decompress one component into `dst`, recomputing its digest over
    /// the unpacked bytes. The signature does not cover the payload
    /// region, so a digest mismatch here is fatal.
    pub fn extract_file(&self, identity: &str, dst: &mut PkgStream) -> Result<()> {
        let pkg = self
            .loaded
            .as_ref()
            .ok_or(Error::InvalidParam("no package loaded"))?;
        let entry = pkg
            .entries
            .iter()
            .find(|entry| entry.info.file.identity == identity)
            .ok_or_else(|| Error::InvalidFile(format!("component {identity} not found")))?;
        let file_info = &entry.info.file;

        let mut file = OpenOptions::new()
            .read(true)
            .open(&pkg.path)
            .map_err(|err| Error::InvalidFile(format!("{}: {err}", pkg.path.display())))?;
        let mut packed = vec![0u8; file_info.packed_size as usize];
        read_exact_at(
            &mut file,
            &mut packed,
            pkg.payload_start + entry.payload_offset,
            &pkg.path,
        )?;

        let params = stored_params(file_info.pack_method, entry.info.flags);
        let mut sink = DigestSink {
            inner: dst,
            state: DigestState::new(file_info.digest_method),
        };
        let stats = codec::decompress(&params, &packed, &mut sink)?;

        if stats.consumed != file_info.packed_size {
            return Err(Error::InvalidFile(format!(
                "component {identity}: packed stream shorter than declared"
            )));
        }
        if stats.produced != file_info.unpacked_size {
            return Err(Error::InvalidFile(format!(
                "component {identity}: unpacked {} bytes, descriptor says {}",
                stats.produced, file_info.unpacked_size
            )));
        }
        if sink.state.finalize() != file_info.digest {
            return Err(Error::DigestMismatch {
                identity: identity.to_string(),
            });
        }
        dst.flush()?;
        log::debug!("extracted {identity}: {} bytes", stats.produced);
        Ok(())
    }

    /// Compress a resident buffer into `dst` and record the resulting
    /// sizes in the descriptor. `params` must match the descriptor's
    /// pack method.
    pub fn compress_buffer(
        &self,
        file: &mut FileInfo,
        params: &PackParams,
        src: &[u8],
        dst: &mut PkgStream,
    ) -> Result<()> {
        if params.method() != file.pack_method {
            return Err(Error::InvalidParam(
                "codec parameters do not match the descriptor pack method",
            ));
        }
        let packed = codec::compress(params, src, dst)?;
        file.unpacked_size = src.len() as u64;
        file.packed_size = packed;
        Ok(())
    }

    /// Decompress a packed stream from the front of `src` into `dst`.
    /// The descriptor's sizes are updated from what actually happened:
    /// `packed_size` becomes the consumed byte count, which may be less
    /// than `src.len()` when trailing bytes follow the stream.
    pub fn decompress_buffer(
        &self,
        file: &mut FileInfo,
        params: &PackParams,
        src: &[u8],
        dst: &mut PkgStream,
    ) -> Result<()> {
        if params.method() != file.pack_method {
            return Err(Error::InvalidParam(
                "codec parameters do not match the descriptor pack method",
            ));
        }
        let stats = codec::decompress(params, src, dst)?;
        file.packed_size = stats.consumed;
        file.unpacked_size = stats.produced;
        Ok(())
    }

    /// Open a stream of the requested kind. `size` applies to memory
    /// maps only.
    pub fn create_stream(&self, path: &Path, kind: StreamType, size: u64) -> Result<PkgStream> {
        match kind {
            StreamType::Read => PkgStream::open_read(path),
            StreamType::Write => PkgStream::create_write(path),
            StreamType::MemoryMap => PkgStream::create_memory_map(path, size),
            StreamType::Process => Err(Error::InvalidParam(
                "processor streams are created from a callback, not a path",
            )),
        }
    }

    pub fn create_processor_stream(
        &self,
        identity: impl Into<String>,
        processor: ProcessorFn,
    ) -> PkgStream {
        PkgStream::create_processor(identity, processor)
    }

    /// Flush and release a stream.
    pub fn close_stream(&self, stream: PkgStream) -> Result<()> {
        stream.close()
    }
}

/// Reconstruct decode parameters from what the table persists: the pack
/// method plus the zlib-wrapper flag.
fn stored_params(method: PackMethod, flags: u32) -> PackParams {
    match method {
        PackMethod::Zip => PackParams::Zip(ZipParams {
            window_bits: if flags & COMP_FLAG_ZLIB_WRAPPER != 0 {
                15
            } else {
                -15
            },
            ..ZipParams::default()
        }),
        other => PackParams::default_for(other),
    }
}

fn validate_request(
    signer: &dyn PkgSigner,
    info: &UpgradePkgInfo,
    entries: &[PkgEntry],
) -> Result<()> {
    if entries.is_empty() {
        return Err(Error::InvalidParam("package must contain at least one component"));
    }
    if info.pkg.entry_count as usize != entries.len() {
        return Err(Error::InvalidParam("entry count does not match component list"));
    }
    if signer.method() != info.pkg.sign_method {
        return Err(Error::InvalidParam("signer does not match declared sign method"));
    }
    for (pos, entry) in entries.iter().enumerate() {
        let identity = &entry.info.file.identity;
        if identity.is_empty() {
            return Err(Error::InvalidParam("component identity must be non-empty"));
        }
        if entries[..pos]
            .iter()
            .any(|prev| prev.info.file.identity == *identity)
        {
            return Err(Error::InvalidParam("duplicate component identity"));
        }
    }
    Ok(())
}

fn read_exact_at(file: &mut File, buf: &mut [u8], offset: u64, path: &Path) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
        .map_err(|_| Error::InvalidFile(format!("{}: unexpected end of file", path.display())))
}

/// Forwards decode output to the destination stream while accumulating
/// the component digest.
struct DigestSink<'a> {
    inner: &'a mut PkgStream,
    state: DigestState,
}

impl Sink for DigestSink<'_> {
    fn push(&mut self, data: &[u8], offset: u64, is_final: bool) -> Result<()> {
        self.state.update(data);
        self.inner.write(data, offset, is_final)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{DigestMethod, PkgInfo, SignMethod};
    use crate::sign::NullSigner;
    use tempfile::tempdir;

    fn upgrade_info(entry_count: u32) -> UpgradePkgInfo {
        UpgradePkgInfo {
            pkg: PkgInfo {
                entry_count,
                digest_method: DigestMethod::Sha256,
                sign_method: SignMethod::None,
                pkg_type: PkgType::Upgrade,
            },
            software_version: "1.0.0".to_string(),
            date: "2026-08-27".to_string(),
            time: "12:00".to_string(),
            product_update_id: "product".to_string(),
            update_file_version: 1,
        }
    }

    fn entry(identity: &str, source: &Path) -> PkgEntry {
        PkgEntry::new(
            ComponentInfo::new(FileInfo::new(
                identity,
                PackMethod::None,
                DigestMethod::Sha256,
            )),
            source,
            PackParams::None,
        )
    }

    #[test]
    fn empty_entry_list_is_invalid_param() {
        let dir = tempdir().expect("tempdir");
        let manager = PkgManager::new();
        let err = manager
            .create_package(&dir.path().join("p.bin"), &NullSigner, &upgrade_info(0), &[])
            .expect_err("must fail");
        assert!(matches!(err, Error::InvalidParam(_)));
    }

    #[test]
    fn entry_count_mismatch_is_invalid_param() {
        let dir = tempdir().expect("tempdir");
        let src = dir.path().join("a.bin");
        std::fs::write(&src, b"data").expect("seed");
        let manager = PkgManager::new();
        let err = manager
            .create_package(
                &dir.path().join("p.bin"),
                &NullSigner,
                &upgrade_info(2),
                &[entry("a", &src)],
            )
            .expect_err("must fail");
        assert!(matches!(err, Error::InvalidParam(_)));
    }

    #[test]
    fn duplicate_identity_is_invalid_param() {
        let dir = tempdir().expect("tempdir");
        let src = dir.path().join("a.bin");
        std::fs::write(&src, b"data").expect("seed");
        let manager = PkgManager::new();
        let err = manager
            .create_package(
                &dir.path().join("p.bin"),
                &NullSigner,
                &upgrade_info(2),
                &[entry("a", &src), entry("a", &src)],
            )
            .expect_err("must fail");
        assert!(matches!(err, Error::InvalidParam(_)));
    }

    #[test]
    fn signer_method_mismatch_is_invalid_param() {
        let dir = tempdir().expect("tempdir");
        let src = dir.path().join("a.bin");
        std::fs::write(&src, b"data").expect("seed");
        let mut info = upgrade_info(1);
        info.pkg.sign_method = SignMethod::Rsa;
        let manager = PkgManager::new();
        let err = manager
            .create_package(
                &dir.path().join("p.bin"),
                &NullSigner,
                &info,
                &[entry("a", &src)],
            )
            .expect_err("must fail");
        assert!(matches!(err, Error::InvalidParam(_)));
    }

    #[test]
    fn missing_source_is_invalid_file_naming_it() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("missing.bin");
        let manager = PkgManager::new();
        let err = manager
            .create_package(
                &dir.path().join("p.bin"),
                &NullSigner,
                &upgrade_info(1),
                &[entry("a", &missing)],
            )
            .expect_err("must fail");
        match err {
            Error::InvalidFile(msg) => assert!(msg.contains("missing.bin")),
            other => panic!("expected InvalidFile, got {other:?}"),
        }
    }

    #[test]
    fn extract_without_load_is_invalid_param() {
        let manager = PkgManager::new();
        let mut dst = PkgStream::create_processor("sink", Box::new(|_, _, _| Ok(())));
        assert!(matches!(
            manager.extract_file("a", &mut dst),
            Err(Error::InvalidParam(_))
        ));
    }

    #[test]
    fn compress_buffer_requires_matching_method() {
        let manager = PkgManager::new();
        let mut file = FileInfo::new("buf", PackMethod::Zip, DigestMethod::None);
        let mut dst = PkgStream::create_processor("sink", Box::new(|_, _, _| Ok(())));
        assert!(matches!(
            manager.compress_buffer(&mut file, &PackParams::None, b"data", &mut dst),
            Err(Error::InvalidParam(_))
        ));
    }

    #[test]
    fn buffer_codec_round_trip_updates_sizes() {
        let manager = PkgManager::new();
        let data: Vec<u8> = (0u32..10_000).flat_map(|i| (i % 13).to_le_bytes()).collect();

        let mut packed = Vec::new();
        {
            let mut file = FileInfo::new("buf", PackMethod::Zip, DigestMethod::None);
            let sink = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
            let out = std::rc::Rc::clone(&sink);
            let mut dst = PkgStream::create_processor(
                "packed",
                Box::new(move |chunk, _, _| {
                    out.borrow_mut().extend_from_slice(chunk);
                    Ok(())
                }),
            );
            let params = PackParams::Zip(ZipParams::default());
            manager
                .compress_buffer(&mut file, &params, &data, &mut dst)
                .expect("compress");
            assert_eq!(file.unpacked_size, data.len() as u64);
            packed.extend_from_slice(&sink.borrow());
            assert_eq!(file.packed_size as usize, packed.len());
        }

        // Trailing bytes past the deflate stream are not consumed.
        let stream_len = packed.len();
        packed.extend_from_slice(b"trailing");
        let mut file = FileInfo::new("buf", PackMethod::Zip, DigestMethod::None);
        let sink = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let out = std::rc::Rc::clone(&sink);
        let mut dst = PkgStream::create_processor(
            "unpacked",
            Box::new(move |chunk, _, _| {
                out.borrow_mut().extend_from_slice(chunk);
                Ok(())
            }),
        );
        manager
            .decompress_buffer(
                &mut file,
                &PackParams::Zip(ZipParams::default()),
                &packed,
                &mut dst,
            )
            .expect("decompress");
        assert_eq!(file.packed_size as usize, stream_len);
        assert_eq!(file.unpacked_size as usize, data.len());
        assert_eq!(*sink.borrow(), data);
    }

    #[test]
    fn stored_params_reconstruct_zlib_wrapper() {
        match stored_params(PackMethod::Zip, COMP_FLAG_ZLIB_WRAPPER) {
            PackParams::Zip(zip) => assert_eq!(zip.window_bits, 15),
            other => panic!("unexpected {other:?}"),
        }
        match stored_params(PackMethod::Zip, 0) {
            PackParams::Zip(zip) => assert_eq!(zip.window_bits, -15),
            other => panic!("unexpected {other:?}"),
        }
    }
}
