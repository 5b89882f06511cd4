use std::path::Path;

use sha2::{Digest, Sha256};

/// Content hash over the root document plus every included file. Include
/// entries are separated by their normalized relative path and a zero byte
/// so moving bytes between files cannot produce the same digest.
pub(crate) fn hash_document_inputs(root: &[u8], includes: &[(String, Vec<u8>)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root);
    for (rel_path, bytes) in includes {
        hasher.update([0u8]);
        hasher.update(rel_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
    }
    to_hex_lower(&hasher.finalize())
}

pub(crate) fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn hash_is_sensitive_to_include_order_and_content() {
        let a = ("a.xml".to_string(), b"<Variables/>".to_vec());
        let b = ("b.xml".to_string(), b"<Images/>".to_vec());

        let forward = hash_document_inputs(b"<Scenario/>", &[a.clone(), b.clone()]);
        let reversed = hash_document_inputs(b"<Scenario/>", &[b, a.clone()]);
        assert_ne!(forward, reversed);

        let edited = hash_document_inputs(b"<Scenario name=\"x\"/>", &[a]);
        assert_ne!(forward, edited);
    }

    #[test]
    fn hash_separates_file_boundaries() {
        let joined = hash_document_inputs(b"<Scenario/><Variables/>", &[]);
        let split = hash_document_inputs(
            b"<Scenario/>",
            &[("vars.xml".to_string(), b"<Variables/>".to_vec())],
        );
        assert_ne!(joined, split);
    }

    #[test]
    fn rel_paths_use_forward_slashes() {
        let path: PathBuf = ["sections", "vars.xml"].iter().collect();
        assert_eq!(normalize_rel_path(&path), "sections/vars.xml");
    }
}
