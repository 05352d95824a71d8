//! End-to-end pack / verify / load / extract coverage.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::OnceLock;

use rsa::{RsaPrivateKey, RsaPublicKey};
use tempfile::tempdir;
use upack::{
    ComponentInfo, DigestMethod, Error, FileInfo, NullSigner, NullVerifier, PackMethod,
    PackParams, PkgEntry, PkgInfo, PkgManager, PkgStream, PkgType, RsaSigner, RsaVerifier,
    SignMethod, UpgradePkgInfo,
};

fn test_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("rsa keygen"))
}

fn upgrade_info(entry_count: u32, sign_method: SignMethod) -> UpgradePkgInfo {
    UpgradePkgInfo {
        pkg: PkgInfo {
            entry_count,
            digest_method: DigestMethod::Sha256,
            sign_method,
            pkg_type: PkgType::Upgrade,
        },
        software_version: "100.100.100.100".to_string(),
        date: "2026-08-27".to_string(),
        time: "21:23:49".to_string(),
        product_update_id: "555.555.100.555".to_string(),
        update_file_version: 1000,
    }
}

fn write_source(dir: &Path, name: &str, data: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).expect("seed source");
    path
}

fn component(identity: &str, method: PackMethod) -> ComponentInfo {
    let mut info = ComponentInfo::new(FileInfo::new(identity, method, DigestMethod::Sha256));
    info.version = "2.2.2.2".to_string();
    info.id = 100;
    info.res_type = 1;
    info.comp_type = 22;
    info
}

fn extract_to_vec(manager: &PkgManager, identity: &str) -> Vec<u8> {
    let out: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&out);
    let mut dst = PkgStream::create_processor(
        identity,
        Box::new(move |chunk, _, _| {
            sink.borrow_mut().extend_from_slice(chunk);
            Ok(())
        }),
    );
    manager.extract_file(identity, &mut dst).expect("extract");
    let data = out.borrow().clone();
    data
}

#[test]
fn uncompressed_component_keeps_its_size() {
    let dir = tempdir().expect("tempdir");
    let data = vec![0x5Au8; 100];
    let src = write_source(dir.path(), "raw.bin", &data);
    let pkg = dir.path().join("update.bin");

    let mut manager = PkgManager::new();
    manager
        .create_package(
            &pkg,
            &NullSigner,
            &upgrade_info(1, SignMethod::None),
            &[PkgEntry::new(
                component("raw.bin", PackMethod::None),
                &src,
                PackParams::None,
            )],
        )
        .expect("pack");

    let names = manager.load_package(&pkg, &NullVerifier).expect("load");
    assert_eq!(names, ["raw.bin"]);

    let info = manager.get_file_info("raw.bin").expect("descriptor");
    assert_eq!(info.unpacked_size, 100);
    assert_eq!(info.packed_size, 100);
    assert_eq!(info.pack_method, PackMethod::None);

    assert_eq!(extract_to_vec(&manager, "raw.bin"), data);
}

#[test]
fn multi_codec_package_round_trips() {
    let dir = tempdir().expect("tempdir");
    let payload: Vec<u8> = (0u32..50_000).flat_map(|i| (i % 251).to_le_bytes()).collect();

    let entries = vec![
        PkgEntry::new(
            component("plain", PackMethod::None),
            write_source(dir.path(), "plain.bin", &payload),
            PackParams::None,
        ),
        PkgEntry::new(
            component("deflated", PackMethod::Zip),
            write_source(dir.path(), "deflated.bin", &payload),
            PackParams::default_for(PackMethod::Zip),
        ),
        PkgEntry::new(
            component("gzipped", PackMethod::Gzip),
            write_source(dir.path(), "gzipped.bin", &payload),
            PackParams::default_for(PackMethod::Gzip),
        ),
        PkgEntry::new(
            component("lz4framed", PackMethod::Lz4),
            write_source(dir.path(), "lz4framed.bin", &payload),
            PackParams::default_for(PackMethod::Lz4),
        ),
    ];

    let pkg = dir.path().join("update.bin");
    let signer = RsaSigner::new(test_key().clone());
    let verifier = RsaVerifier::new(RsaPublicKey::from(test_key()));

    let mut manager = PkgManager::new();
    manager
        .create_package(&pkg, &signer, &upgrade_info(4, SignMethod::Rsa), &entries)
        .expect("pack");

    let names = manager.load_package(&pkg, &verifier).expect("load");
    assert_eq!(names, ["plain", "deflated", "gzipped", "lz4framed"]);

    for name in &names {
        assert_eq!(extract_to_vec(&manager, name), payload, "component {name}");
        let info = manager.get_file_info(name).expect("descriptor");
        assert_eq!(info.unpacked_size, payload.len() as u64);
        if name != "plain" {
            assert!(info.packed_size < info.unpacked_size);
        }
    }

    let meta = manager.upgrade_info().expect("upgrade metadata");
    assert_eq!(meta.software_version, "100.100.100.100");
    assert_eq!(meta.product_update_id, "555.555.100.555");
    assert_eq!(meta.update_file_version, 1000);

    let comp = manager.get_component_info("deflated").expect("component");
    assert_eq!(comp.version, "2.2.2.2");
    assert_eq!(comp.id, 100);
    assert_eq!(comp.original_size, payload.len() as u64);
}

#[test]
fn zlib_wrapped_deflate_survives_reload() {
    let dir = tempdir().expect("tempdir");
    let payload = b"wrapper flag must persist".repeat(1000);
    let src = write_source(dir.path(), "z.bin", &payload);
    let pkg = dir.path().join("update.bin");

    let params = PackParams::Zip(upack::ZipParams {
        window_bits: 15,
        ..upack::ZipParams::default()
    });
    let mut manager = PkgManager::new();
    manager
        .create_package(
            &pkg,
            &NullSigner,
            &upgrade_info(1, SignMethod::None),
            &[PkgEntry::new(component("z", PackMethod::Zip), &src, params)],
        )
        .expect("pack");

    // A fresh manager sees only what the table persists.
    let mut fresh = PkgManager::new();
    fresh.load_package(&pkg, &NullVerifier).expect("load");
    assert_eq!(extract_to_vec(&fresh, "z"), payload);
    let comp = fresh.get_component_info("z").expect("component");
    assert_ne!(comp.flags & upack::COMP_FLAG_ZLIB_WRAPPER, 0);
}

#[test]
fn payload_tamper_is_digest_mismatch() {
    let dir = tempdir().expect("tempdir");
    let data = vec![0xC3u8; 4096];
    let src = write_source(dir.path(), "a.bin", &data);
    let pkg = dir.path().join("update.bin");

    let mut manager = PkgManager::new();
    manager
        .create_package(
            &pkg,
            &NullSigner,
            &upgrade_info(1, SignMethod::None),
            &[PkgEntry::new(
                component("a", PackMethod::None),
                &src,
                PackParams::None,
            )],
        )
        .expect("pack");

    // No signature block, so the last byte is payload. The signature
    // covers only the header and table; payload corruption must be
    // caught by the digest at extraction.
    let mut bytes = std::fs::read(&pkg).expect("read package");
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&pkg, &bytes).expect("rewrite package");

    manager.load_package(&pkg, &NullVerifier).expect("load");
    let mut dst = PkgStream::create_processor("sink", Box::new(|_, _, _| Ok(())));
    match manager.extract_file("a", &mut dst) {
        Err(Error::DigestMismatch { identity }) => assert_eq!(identity, "a"),
        other => panic!("expected DigestMismatch, got {other:?}"),
    }
}

#[test]
fn table_tamper_is_signature_failure() {
    let dir = tempdir().expect("tempdir");
    let src = write_source(dir.path(), "a.bin", &vec![1u8; 1000]);
    let pkg = dir.path().join("update.bin");

    let signer = RsaSigner::new(test_key().clone());
    let mut manager = PkgManager::new();
    manager
        .create_package(
            &pkg,
            &signer,
            &upgrade_info(1, SignMethod::Rsa),
            &[PkgEntry::new(
                component("a", PackMethod::None),
                &src,
                PackParams::None,
            )],
        )
        .expect("pack");

    // Flip a byte past the fixed header, inside the signed prefix.
    let mut bytes = std::fs::read(&pkg).expect("read package");
    bytes[40] ^= 0xFF;
    std::fs::write(&pkg, &bytes).expect("rewrite package");

    let verifier = RsaVerifier::new(RsaPublicKey::from(test_key()));
    match manager.load_package(&pkg, &verifier) {
        Err(Error::SignatureInvalid(_)) => {}
        other => panic!("expected SignatureInvalid, got {other:?}"),
    }
    // Nothing from the rejected file is exposed.
    assert!(manager.get_file_info("a").is_none());
}

#[test]
fn wrong_public_key_is_signature_failure() {
    let dir = tempdir().expect("tempdir");
    let src = write_source(dir.path(), "a.bin", b"content");
    let pkg = dir.path().join("update.bin");

    let signer = RsaSigner::new(test_key().clone());
    let mut manager = PkgManager::new();
    manager
        .create_package(
            &pkg,
            &signer,
            &upgrade_info(1, SignMethod::Rsa),
            &[PkgEntry::new(
                component("a", PackMethod::None),
                &src,
                PackParams::None,
            )],
        )
        .expect("pack");

    let other_key = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("rsa keygen");
    let verifier = RsaVerifier::new(RsaPublicKey::from(&other_key));
    assert!(matches!(
        manager.load_package(&pkg, &verifier),
        Err(Error::SignatureInvalid(_))
    ));
}

#[test]
fn verifier_method_mismatch_is_signature_failure() {
    let dir = tempdir().expect("tempdir");
    let src = write_source(dir.path(), "a.bin", b"content");
    let pkg = dir.path().join("update.bin");

    let mut manager = PkgManager::new();
    manager
        .create_package(
            &pkg,
            &NullSigner,
            &upgrade_info(1, SignMethod::None),
            &[PkgEntry::new(
                component("a", PackMethod::None),
                &src,
                PackParams::None,
            )],
        )
        .expect("pack");

    let verifier = RsaVerifier::new(RsaPublicKey::from(test_key()));
    assert!(matches!(
        manager.load_package(&pkg, &verifier),
        Err(Error::SignatureInvalid(_))
    ));
}

#[test]
fn non_package_file_is_invalid_file() {
    let dir = tempdir().expect("tempdir");
    let junk = write_source(dir.path(), "junk.bin", &vec![0xEEu8; 500]);

    let mut manager = PkgManager::new();
    assert!(matches!(
        manager.load_package(&junk, &NullVerifier),
        Err(Error::InvalidFile(_))
    ));
}

#[test]
fn missing_package_is_invalid_file() {
    let dir = tempdir().expect("tempdir");
    let mut manager = PkgManager::new();
    assert!(matches!(
        manager.load_package(&dir.path().join("absent.bin"), &NullVerifier),
        Err(Error::InvalidFile(_))
    ));
}

#[test]
fn truncated_package_is_invalid_file() {
    let dir = tempdir().expect("tempdir");
    let src = write_source(dir.path(), "a.bin", &vec![9u8; 10_000]);
    let pkg = dir.path().join("update.bin");

    let mut manager = PkgManager::new();
    manager
        .create_package(
            &pkg,
            &NullSigner,
            &upgrade_info(1, SignMethod::None),
            &[PkgEntry::new(
                component("a", PackMethod::None),
                &src,
                PackParams::None,
            )],
        )
        .expect("pack");

    let bytes = std::fs::read(&pkg).expect("read package");
    std::fs::write(&pkg, &bytes[..bytes.len() - 5000]).expect("truncate");

    match manager.load_package(&pkg, &NullVerifier) {
        // Payload extent now runs past the end of the file.
        Err(Error::InvalidFile(_)) => {}
        other => panic!("expected InvalidFile, got {other:?}"),
    }
}

#[test]
fn failed_load_drops_previous_package() {
    let dir = tempdir().expect("tempdir");
    let src = write_source(dir.path(), "a.bin", b"content");
    let pkg = dir.path().join("update.bin");

    let mut manager = PkgManager::new();
    manager
        .create_package(
            &pkg,
            &NullSigner,
            &upgrade_info(1, SignMethod::None),
            &[PkgEntry::new(
                component("a", PackMethod::None),
                &src,
                PackParams::None,
            )],
        )
        .expect("pack");
    manager.load_package(&pkg, &NullVerifier).expect("load");
    assert!(manager.get_file_info("a").is_some());

    let junk = write_source(dir.path(), "junk.bin", b"not a package");
    assert!(manager.load_package(&junk, &NullVerifier).is_err());
    assert!(manager.get_file_info("a").is_none());
}

#[test]
fn unknown_component_is_invalid_file() {
    let dir = tempdir().expect("tempdir");
    let src = write_source(dir.path(), "a.bin", b"content");
    let pkg = dir.path().join("update.bin");

    let mut manager = PkgManager::new();
    manager
        .create_package(
            &pkg,
            &NullSigner,
            &upgrade_info(1, SignMethod::None),
            &[PkgEntry::new(
                component("a", PackMethod::None),
                &src,
                PackParams::None,
            )],
        )
        .expect("pack");
    manager.load_package(&pkg, &NullVerifier).expect("load");

    assert!(manager.get_file_info("nope").is_none());
    let mut dst = PkgStream::create_processor("sink", Box::new(|_, _, _| Ok(())));
    assert!(matches!(
        manager.extract_file("nope", &mut dst),
        Err(Error::InvalidFile(_))
    ));
}
