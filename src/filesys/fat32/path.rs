//! Path parsing and the 8.3 filename codec

use alloc::string::String;
use arrayvec::ArrayVec;

use super::super::FsError;
use super::constants::*;

/// A path split into 8.3-packed components, bounded at
/// [`MAX_PATH_COMPONENTS`].
pub type PathComponents = ArrayVec<[u8; 11], MAX_PATH_COMPONENTS>;

/// Returns true if `path` names its target from the root directory.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with('/') || path.starts_with('\\')
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Characters FAT directory entries may not contain, beyond the
/// separators themselves.
fn is_disallowed(c: char) -> bool {
    matches!(c, '"' | '*' | ':' | '<' | '>' | '?' | '|') || (c as u32) < 0x20 || c == '\x7F'
}

/// Splits `path` on `/` or `\` and converts each component to packed
/// 8.3 form. Empty components (repeated separators, trailing slash)
/// are skipped. Fails with `InvalidPath` on more than
/// [`MAX_PATH_COMPONENTS`] components, a component longer than
/// [`MAX_FILENAME_LENGTH`] characters, or a disallowed character.
pub fn parse_path(path: &str) -> Result<PathComponents, FsError> {
    let mut components = PathComponents::new();

    for component in path.split(is_separator) {
        if component.is_empty() {
            continue;
        }
        if component.chars().count() > MAX_FILENAME_LENGTH {
            return Err(FsError::InvalidPath);
        }
        if component.chars().any(is_disallowed) {
            return Err(FsError::InvalidPath);
        }
        components
            .try_push(filename_to_83(component))
            .map_err(|_| FsError::InvalidPath)?;
    }

    Ok(components)
}

/// Converts a filename to packed 8.3 form: the main part truncated and
/// space padded to 8 bytes, the extension (text after the last dot) to
/// 3 bytes, lowercase uppercased, interior dots and spaces skipped.
/// The `.` and `..` entries keep their literal dots.
pub fn filename_to_83(filename: &str) -> [u8; 11] {
    let mut shortname = [b' '; 11];

    if filename == "." || filename == ".." {
        shortname[..filename.len()].copy_from_slice(filename.as_bytes());
        return shortname;
    }

    let (main, ext) = match filename.rfind('.') {
        Some(pos) => (&filename[..pos], Some(&filename[pos + 1..])),
        None => (filename, None),
    };

    let mut j = 0;
    for c in main.bytes() {
        if j == SFN_NAME_SIZE {
            break;
        }
        if c == b'.' || c == b' ' {
            continue;
        }
        shortname[j] = c.to_ascii_uppercase();
        j += 1;
    }

    if let Some(ext) = ext {
        let mut j = SFN_NAME_SIZE;
        for c in ext.bytes() {
            if j == SFN_NAME_SIZE + SFN_EXT_SIZE {
                break;
            }
            if c == b'.' || c == b' ' {
                continue;
            }
            shortname[j] = c.to_ascii_uppercase();
            j += 1;
        }
    }

    shortname
}

/// Decodes a packed 8.3 name back to display form, inserting the dot
/// only when an extension is present.
pub fn name_from_83(raw: &[u8; 11]) -> String {
    let mut name = String::new();

    for &c in &raw[..SFN_NAME_SIZE] {
        if c != b' ' {
            name.push(c as char);
        }
    }

    if raw[SFN_NAME_SIZE] != b' ' {
        name.push('.');
        for &c in &raw[SFN_NAME_SIZE..] {
            if c != b' ' {
                name.push(c as char);
            }
        }
    }

    name
}
