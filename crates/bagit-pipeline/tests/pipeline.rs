use std::fs;
use std::path::Path;

use bagit_core::{Algorithm, Bag, BagFile, LoadMode, Loader, ManifestKind, Version, Writer, load};
use bagit_pipeline::{
    Category, Completer, DefaultCompleter, FailMode, HolePuncher, HoleyBagVerifier, UpdateCompleter, ValidVerifier,
    Verifier,
};
use proptest::prelude::*;
use tempfile::tempdir;

fn seed_payload(root: &Path) {
    for (rel, content) in [
        ("data/a.txt", "hello"),
        ("data/nested/b.txt", "abc"),
        ("data/with space.txt", "space"),
    ] {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
}

#[test]
fn test_create_write_verify_on_disk() {
    let dir = tempdir().unwrap();
    seed_payload(dir.path());

    let bag = load(dir.path()).unwrap();
    assert_eq!(bag.payload_len(), 3);
    let completed = DefaultCompleter::new()
        .payload_algorithm(Algorithm::Sha256)
        .complete(&bag)
        .unwrap()
        .unwrap();
    Writer::new().write(&completed, dir.path()).unwrap();

    let reloaded = load(dir.path()).unwrap();
    let result = ValidVerifier::new().verify(&reloaded, FailMode::FailSlow);
    assert!(result.success, "{result}");
    assert!(dir.path().join("manifest-sha256.txt").exists());
    assert!(dir.path().join("tagmanifest-md5.txt").exists());

    // Corrupt one payload file behind the bag's back.
    fs::write(dir.path().join("data/a.txt"), "HELLO").unwrap();
    let result = ValidVerifier::new().verify(&load(dir.path()).unwrap(), FailMode::FailSlow);
    assert!(!result.success);
    assert_eq!(result.invalid_files().collect::<Vec<_>>(), vec!["data/a.txt"]);
}

#[test]
fn test_update_after_payload_change() {
    let dir = tempdir().unwrap();
    seed_payload(dir.path());
    let bag = DefaultCompleter::new().complete(&load(dir.path()).unwrap()).unwrap().unwrap();
    Writer::new().write(&bag, dir.path()).unwrap();

    fs::write(dir.path().join("data/added.txt"), "more").unwrap();
    fs::remove_file(dir.path().join("data/nested/b.txt")).unwrap();
    let updated = UpdateCompleter::new().complete(&load(dir.path()).unwrap()).unwrap().unwrap();
    Writer::new().write(&updated, dir.path()).unwrap();

    let reloaded = load(dir.path()).unwrap();
    let result = ValidVerifier::new().verify(&reloaded, FailMode::FailSlow);
    assert!(result.success, "{result}");
    let manifest = reloaded.manifest(ManifestKind::Payload, Algorithm::Md5).unwrap();
    assert!(manifest.contains("data/added.txt"));
    assert!(!manifest.contains("data/nested/b.txt"));
}

#[test]
fn test_holey_bag_on_disk() {
    let src = tempdir().unwrap();
    seed_payload(src.path());
    let bag = DefaultCompleter::new().complete(&load(src.path()).unwrap()).unwrap().unwrap();

    let holey = HolePuncher::new(&format!("file://{}", src.path().display()))
        .unwrap()
        .make_holey(&bag)
        .unwrap();
    let dst = tempdir().unwrap();
    Writer::new().write(&holey, dst.path()).unwrap();
    assert!(!dst.path().join("data").exists());

    let loaded = Loader::new(LoadMode::Manifests).load(dst.path()).unwrap();
    assert_eq!(loaded.fetch_manifest().unwrap().len(), 3);
    let result = HoleyBagVerifier::new().verify(&loaded, FailMode::FailSlow);
    assert!(result.success, "{result}");

    // Every hole shows up as missing until it is fetched.
    let result = ValidVerifier::new().verify(&loaded, FailMode::FailSlow);
    assert!(result.has(Category::PayloadManifestContainsMissingFile));
    assert_eq!(result.missing_files().count(), 3);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_complete_then_valid(
        files in prop::collection::btree_map("[a-z]{1,8}(/[a-z]{1,8})?", prop::collection::vec(any::<u8>(), 0..64), 1..8)
    ) {
        let mut bag = Bag::new(Version::V1_0);
        for (name, bytes) in &files {
            bag.put(BagFile::from_bytes(format!("data/{name}.bin"), bytes)).unwrap();
        }
        let completed = DefaultCompleter::new().threads(2).complete(&bag).unwrap().unwrap();
        let result = ValidVerifier::new().verify(&completed, FailMode::FailSlow);
        prop_assert!(result.success, "{}", result);

        let manifest = completed.manifest(ManifestKind::Payload, Algorithm::Md5).unwrap();
        prop_assert_eq!(manifest.len(), files.len());
        let oxum = completed.bag_info().unwrap().payload_oxum().unwrap();
        prop_assert_eq!(oxum.octets, files.values().map(|b| b.len() as u64).sum::<u64>());
    }
}
