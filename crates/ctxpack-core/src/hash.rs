//! Content hashing
//!
//! File hashes ignore the embedded `@uif` metadata header so that
//! regenerating the header never invalidates a contract.

use crate::contract::{Composition, Interface};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Prefix for module-level hashes (file and semantic)
pub const MODULE_HASH_PREFIX: &str = "uif:";

/// Prefix for bundle hashes
pub const BUNDLE_HASH_PREFIX: &str = "uifb:";

/// Number of hex digits kept from the digest
const HASH_HEX_LEN: usize = 24;

fn leading_block_comment() -> &'static Regex {
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    BLOCK.get_or_init(|| {
        Regex::new(r"^\s*/\*\*[^*]*\*+(?:[^/*][^*]*\*+)*/[ \t]*(?:\r?\n)?")
            .expect("block comment pattern is valid")
    })
}

/// Byte offset just past the metadata header, if the source starts with one
fn header_end(source: &str) -> Option<usize> {
    let block = leading_block_comment().find(source)?;
    block.as_str().contains("@uif").then_some(block.end())
}

/// Truncated hex SHA-256 of `bytes` with the given prefix
pub fn prefixed_digest(prefix: &str, bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex = hex::encode(digest);
    format!("{}{}", prefix, &hex[..HASH_HEX_LEN])
}

/// Extract the leading `@uif` metadata header block, if present
pub fn metadata_header(source: &str) -> Option<&str> {
    header_end(source).map(|end| source[..end].trim())
}

/// Remove the leading `@uif` metadata header block, if present
pub fn strip_metadata_header(source: &str) -> &str {
    match header_end(source) {
        Some(end) => &source[end..],
        None => source,
    }
}

/// Hash of raw source with the metadata header stripped
pub fn file_hash(source: &str) -> String {
    prefixed_digest(MODULE_HASH_PREFIX, strip_metadata_header(source).as_bytes())
}

/// Hash of a component's structural meaning.
///
/// Collections are sorted before hashing, so declaration order and
/// formatting never affect the result.
pub fn semantic_hash(interface: &Interface, composition: &Composition) -> String {
    let mut components = composition.components.clone();
    components.sort();
    components.dedup();
    let mut functions = composition.functions.clone();
    functions.sort();
    functions.dedup();
    let mut imports = composition.imports.clone();
    imports.sort();
    imports.dedup();

    let canonical = serde_json::json!({
        "props": interface.props,
        "emits": interface.emits,
        "state": interface.state,
        "components": components,
        "functions": functions,
        "imports": imports,
    });

    prefixed_digest(MODULE_HASH_PREFIX, canonical.to_string().as_bytes())
}
