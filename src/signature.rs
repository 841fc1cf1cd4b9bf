//! Coarse kernel-name normalization.
//!
//! A signature groups kernels that differ only in tuning/template
//! parameters. Signatures are reference material only: they never replace
//! the original name in output, they only drive equivalence checks.

/// Compile-time parameter tags that mark the start of a suffix to drop.
/// Order doesn't matter for correctness (the earliest match in the string
/// wins, not the earliest entry in this list); kept roughly grouped by
/// kernel family for readability.
const CONFIG_MARKERS: &[&str] = &[
    "_GROUP_K_",
    "_GROUP_N_",
    "_GROUP_SIZE_",
    "_BLOCK_SIZE_",
    "_SPLITK_BLOCK_SIZE_",
    "_NUM_KSPLIT_",
    "_ACTUAL_KSPLIT_",
    "_MAX_KSPLIT_",
    "_GRID_MN_",
    "_GRID_",
    "_EVEN_K_",
    "_cache_modifier_",
    "_MT",
    "_MI",
    "_SN_",
    "_AFC",
    "_LDSB",
    "_LPA",
    "_LPB",
    "_UserArgs_",
    "_shortname",
];

/// 64-bit FNV-1a. Used only as a fast, collision-tolerant equality proxy:
/// every positive is rechecked against the original name at a higher level,
/// so collisions are acceptable.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Reduce a kernel name to its coarse equivalence class.
///
/// Applies, in order: template truncation, single earliest-marker
/// truncation, repeated trailing `_<digits>` stripping, trailing-underscore
/// stripping, and a hashed fallback for anything left under 3 characters.
pub fn signature(name: &str) -> String {
    // 1. Truncate at the first `<` (C++ template instantiations).
    let mut s: &str = match name.find('<') {
        Some(idx) => &name[..idx],
        None => name,
    };

    // 2. Strip the suffix starting at the earliest recognized config marker.
    let mut earliest: Option<usize> = None;
    for marker in CONFIG_MARKERS {
        if let Some(idx) = s.find(marker) {
            earliest = Some(match earliest {
                Some(cur) => cur.min(idx),
                None => idx,
            });
        }
    }
    if let Some(idx) = earliest {
        s = &s[..idx];
    }

    // 3. Strip a trailing `_<digits>` suffix repeatedly.
    let mut owned = s.to_string();
    loop {
        match strip_trailing_digit_suffix(&owned) {
            Some(stripped) => owned = stripped,
            None => break,
        }
    }

    // 4. Strip trailing underscores.
    let trimmed = owned.trim_end_matches('_');

    // 5. Fallback for too-short remainders. Hashes the already-reduced form,
    // not the raw input, so names that reduce to the same short string
    // (e.g. two template instantiations both truncating to "k") still
    // collapse to one signature instead of diverging by their untouched
    // tails.
    if trimmed.chars().count() < 3 {
        let h = fnv1a_64(trimmed.as_bytes());
        format!("other_{}", h % 1000)
    } else {
        trimmed.to_string()
    }
}

/// Strips one trailing `_<digits>` suffix, returning `None` if the string
/// doesn't end that way.
fn strip_trailing_digit_suffix(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let mut i = bytes.len();
    while i > 0 && bytes[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == bytes.len() || i == 0 || bytes[i - 1] != b'_' {
        return None;
    }
    Some(s[..i - 1].to_string())
}

/// Two names are signature-equivalent iff their signatures are byte-equal.
pub fn signatures_equal(a: &str, b: &str) -> bool {
    signature(a) == signature(b)
}

/// Secondary normalization used by the alternative, name-equality-based
/// detector path: strips a trailing `_<digits>` from names beginning
/// `triton_`, collapsing numerically-indexed Triton kernels into one class.
pub fn normalize_kernel_name(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("triton_") {
        if let Some(stripped) = strip_trailing_digit_suffix(rest) {
            return format!("triton_{stripped}");
        }
    }
    name.to_string()
}
