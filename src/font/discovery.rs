//! System font discovery: candidate file paths tried in order when the
//! configuration does not name face files explicitly.

use std::path::PathBuf;

/// Candidate monospace faces, best first.
const MONOSPACE_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/firacode/FiraCode-Regular.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationMono-Regular.ttf",
    "/usr/share/fonts/truetype/ubuntu/UbuntuMono-R.ttf",
    "/usr/share/fonts/truetype/noto/NotoSansMono-Regular.ttf",
    "/usr/share/fonts/noto/NotoSansMono-Regular.ttf",
    "/System/Library/Fonts/Menlo.ttc",
    "/System/Library/Fonts/Monaco.ttf",
    "C:\\Windows\\Fonts\\consola.ttf",
];

/// Candidate color emoji faces.
const EMOJI_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/noto/NotoColorEmoji.ttf",
    "/usr/share/fonts/noto/NotoColorEmoji.ttf",
    "/usr/share/fonts/noto-emoji/NotoColorEmoji.ttf",
    "/System/Library/Fonts/Apple Color Emoji.ttc",
    "C:\\Windows\\Fonts\\seguiemj.ttf",
];

/// Resolve the default face list: one monospace face, plus a color emoji
/// face when one is installed. Returns `None` when no monospace face
/// exists anywhere on the candidate list.
pub fn default_faces() -> Option<Vec<PathBuf>> {
    let mono = first_existing(MONOSPACE_CANDIDATES)?;
    let mut faces = vec![mono];
    if let Some(emoji) = first_existing(EMOJI_CANDIDATES) {
        faces.push(emoji);
    }
    Some(faces)
}

/// First monospace candidate present on this system, for tests that need
/// any real face file.
pub fn any_monospace() -> Option<PathBuf> {
    first_existing(MONOSPACE_CANDIDATES)
}

fn first_existing(candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}
