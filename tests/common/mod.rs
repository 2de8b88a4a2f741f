//! Shared helpers for the integration tests.
//!
//! Each integration test file compiles as its own crate and uses only some of
//! these helpers, hence `#![allow(dead_code)]`.

#![allow(dead_code)]

use std::io::Cursor;

use rand::{Rng, SeedableRng, rngs::StdRng};
use sevenz_container::{
    CodecRegistry, Compressor, ExtractOptions, Extractor, Method, Selection, WriteOptions,
    WriteResult,
};

/// Builds an in-memory archive from `(name, data)` pairs.
pub fn create_archive_with_result(
    registry: &CodecRegistry,
    options: WriteOptions,
    entries: &[(&str, &[u8])],
) -> sevenz_container::Result<(Vec<u8>, WriteResult)> {
    let mut compressor = Compressor::new(Cursor::new(Vec::new()), registry, options)?;
    for (name, data) in entries {
        compressor.add_bytes(name, data.to_vec(), None)?;
    }
    let result = compressor.finalize()?;
    Ok((compressor.into_inner().into_inner(), result))
}

/// Builds an in-memory archive, panicking on failure.
pub fn create_archive(options: WriteOptions, entries: &[(&str, &[u8])]) -> Vec<u8> {
    let registry = CodecRegistry::default();
    create_archive_with_result(&registry, options, entries)
        .expect("failed to create test archive")
        .0
}

/// Options for a small, fast, uncompressed archive.
pub fn copy_options() -> WriteOptions {
    WriteOptions::new().method(Method::Copy).compress_header(false)
}

/// Opens an in-memory archive with default options.
pub fn open_archive(registry: &CodecRegistry, data: Vec<u8>) -> Extractor<'_, Cursor<Vec<u8>>> {
    Extractor::open(Cursor::new(data), registry, ExtractOptions::default())
        .expect("failed to open test archive")
}

/// Extracts every file entry into memory as `(index, name, data)`.
pub fn extract_to_memory(
    extractor: &mut Extractor<'_, Cursor<Vec<u8>>>,
) -> sevenz_container::Result<Vec<(usize, String, Vec<u8>)>> {
    let mut out = Vec::new();
    extractor.extract_many(
        &Selection::All,
        |_, _| Ok(Vec::new()),
        |index, entry, data: Vec<u8>| {
            out.push((index, entry.name.clone(), data));
            Ok(())
        },
    )?;
    Ok(out)
}

/// Deterministic pseudo-random payload.
pub fn random_payload(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(data.as_mut_slice());
    data
}

/// Payload that compresses well.
pub fn text_payload(len: usize) -> Vec<u8> {
    b"the quick brown fox jumps over the lazy dog\n"
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}
