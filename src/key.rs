// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Key normalization
//!
//! Derives the canonical matching key of a raw upload path. Two files in
//! different viewers line up when their keys coincide, so the key ignores
//! the uploaded root directory, filename encoding quirks and the extension.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::OnceLock;

fn percent_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:%[0-9A-Fa-f]{2})+").expect("valid percent pattern"))
}

fn mangled_unicode() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#U([0-9A-Fa-f]{4,5})").expect("valid unicode pattern"))
}

/// Normalize a raw root-relative path into its matching key.
///
/// An empty result means the entry has no usable key.
pub fn normalize_key(raw_path: &str) -> String {
    let relative = strip_root(raw_path);
    let decoded = decode_escapes(relative);
    strip_extension(&decoded).to_string()
}

/// Name of the uploaded root directory, if the path has one.
pub fn root_segment(raw_path: &str) -> Option<&str> {
    raw_path
        .split_once('/')
        .map(|(root, _)| root)
        .filter(|root| !root.is_empty())
}

/// Drop the first path segment. A bare filename is returned unchanged.
pub fn strip_root(raw_path: &str) -> &str {
    match raw_path.split_once('/') {
        Some((_, rest)) => rest,
        None => raw_path,
    }
}

/// Decode percent escapes and `#UXXXX` sequences left by browsers that
/// mangle non-ASCII filenames.
pub fn decode_escapes(input: &str) -> Cow<'_, str> {
    let percent = percent_run().replace_all(input, |caps: &Captures| {
        let run = &caps[0];
        let bytes: Vec<u8> = run
            .as_bytes()
            .chunks(3)
            .filter_map(|chunk| {
                std::str::from_utf8(&chunk[1..])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            })
            .collect();
        match String::from_utf8(bytes) {
            Ok(decoded) => decoded,
            Err(_) => run.to_string(),
        }
    });

    if !mangled_unicode().is_match(&percent) {
        return percent;
    }

    let decoded = mangled_unicode()
        .replace_all(&percent, |caps: &Captures| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();
    Cow::Owned(decoded)
}

/// Remove the extension of the final path component, then any trailing
/// dots left behind (`file....png` and `file.glb` both become `file`).
///
/// A dot at the start of the basename does not begin an extension.
pub fn strip_extension(path: &str) -> &str {
    let base_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let basename = &path[base_start..];

    match basename.rfind('.') {
        Some(dot) if dot > 0 => path[..base_start + dot].trim_end_matches('.'),
        _ => path,
    }
}
