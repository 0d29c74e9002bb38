//! Bag and archive fixtures.

use depot_core::PayloadDigest;
use std::io::{Cursor, Write};
use zip::write::{SimpleFileOptions, ZipWriter};

/// Lowercase hex MD5 of a byte slice.
#[allow(dead_code)]
pub fn md5_hex(data: &[u8]) -> String {
    PayloadDigest::compute(data).to_hex()
}

/// Build a ZIP archive with the given entries.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

const BAGIT_TXT: &[u8] = b"BagIt-Version: 0.97\nTag-File-Character-Encoding: UTF-8\n";
const README: &[u8] = b"survey measurements, run 7\n";
const SAMPLES: &[u8] = b"4.2,9.1,0.3\n7.7,1.1,5.9\n";

/// A well-formed single-directory bag archive.
///
/// The bag contains two payload files and a matching MD5 manifest.
pub fn valid_bag_zip(bag_name: &str) -> Vec<u8> {
    let manifest = format!(
        "{}  data/readme.txt\n{}  data/samples.csv\n",
        md5_hex(README),
        md5_hex(SAMPLES),
    );
    let declaration = format!("{bag_name}/bagit.txt");
    let manifest_name = format!("{bag_name}/manifest-md5.txt");
    let readme_name = format!("{bag_name}/data/readme.txt");
    let samples_name = format!("{bag_name}/data/samples.csv");

    zip_bytes(&[
        (declaration.as_str(), BAGIT_TXT),
        (manifest_name.as_str(), manifest.as_bytes()),
        (readme_name.as_str(), README),
        (samples_name.as_str(), SAMPLES),
    ])
}

/// A bag archive whose manifest declares a payload file that is not in the
/// archive.
#[allow(dead_code)]
pub fn incomplete_bag_zip(bag_name: &str) -> Vec<u8> {
    let manifest = format!(
        "{}  data/readme.txt\n{}  data/absent.csv\n",
        md5_hex(README),
        md5_hex(b"never written"),
    );
    let declaration = format!("{bag_name}/bagit.txt");
    let manifest_name = format!("{bag_name}/manifest-md5.txt");
    let readme_name = format!("{bag_name}/data/readme.txt");

    zip_bytes(&[
        (declaration.as_str(), BAGIT_TXT),
        (manifest_name.as_str(), manifest.as_bytes()),
        (readme_name.as_str(), README),
    ])
}
