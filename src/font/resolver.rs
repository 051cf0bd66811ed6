//! Face fallback resolution — shapes a line against each face in priority
//! order and assigns every glyph position to the first face that produced
//! a real glyph there.

use super::{FaceCollection, ShapedLine};

/// Shape one line of text against the collection, producing the resolved
/// face/glyph assignment.
///
/// Faces are tried in collection order; a later face never overrides a
/// position an earlier face already covered. Positions no face can render
/// resolve to face 0's replacement-character glyph.
pub fn shape_line(text: &str, collection: &FaceCollection) -> ShapedLine {
    let faces = collection.shaping_faces();
    let features = collection.features();
    resolve(faces.len(), collection.replacement_glyph(), |i| {
        shape_against(&faces[i], features, text)
    })
}

/// The assignment algorithm over per-face glyph runs.
///
/// `shape(i)` returns the glyph-id sequence produced by shaping the line
/// against face `i`, with 0 marking a glyph the face does not contain.
/// Every face is assumed to shape the line to the same number of
/// positions; a face that disagrees aborts the process, since glyph runs
/// of different lengths cannot be aligned positionally.
fn resolve<F>(face_count: usize, replacement: u32, mut shape: F) -> ShapedLine
where
    F: FnMut(usize) -> Vec<u32>,
{
    let mut slots: Vec<Option<(u32, u32)>> = Vec::new();

    for face_index in 0..face_count {
        let run = shape(face_index);

        if face_index == 0 {
            slots = vec![None; run.len()];
        } else {
            assert_eq!(
                run.len(),
                slots.len(),
                "face {face_index} shaped a different number of glyphs than face 0",
            );
        }

        let mut any_unassigned = false;
        for (slot, glyph) in slots.iter_mut().zip(run) {
            if slot.is_none() && glyph != 0 {
                *slot = Some((face_index as u32, glyph));
            }
            if slot.is_none() {
                any_unassigned = true;
            }
        }

        if !any_unassigned {
            break;
        }
    }

    let (faces, glyphs) = slots
        .into_iter()
        .map(|s| s.unwrap_or((0, replacement)))
        .unzip();
    ShapedLine { faces, glyphs }
}

fn shape_against(
    face: &rustybuzz::Face<'_>,
    features: &[rustybuzz::Feature],
    text: &str,
) -> Vec<u32> {
    let mut buffer = rustybuzz::UnicodeBuffer::new();
    buffer.push_str(text);
    buffer.set_direction(rustybuzz::Direction::LeftToRight);
    buffer.set_script(rustybuzz::script::LATIN);
    if let Ok(lang) = "en".parse() {
        buffer.set_language(lang);
    }

    let glyphs = rustybuzz::shape(face, features, buffer);
    glyphs.glyph_infos().iter().map(|i| i.glyph_id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::discovery;

    const REPLACEMENT: u32 = 99;

    #[test]
    fn all_positions_in_primary_face() {
        let shaped = resolve(2, REPLACEMENT, |i| match i {
            0 => vec![5, 6, 7],
            _ => vec![1, 1, 1],
        });
        assert_eq!(shaped.faces, vec![0, 0, 0]);
        assert_eq!(shaped.glyphs, vec![5, 6, 7]);
    }

    #[test]
    fn missing_glyph_falls_back_to_next_face() {
        let shaped = resolve(2, REPLACEMENT, |i| match i {
            0 => vec![5, 0, 7],
            _ => vec![9, 9, 9],
        });
        assert_eq!(shaped.faces, vec![0, 1, 0]);
        assert_eq!(shaped.glyphs, vec![5, 9, 7]);
    }

    #[test]
    fn earlier_assignment_is_never_overridden() {
        // Face 1 covers every position, but only position 1 is still open.
        let shaped = resolve(3, REPLACEMENT, |i| match i {
            0 => vec![5, 0, 7],
            1 => vec![8, 8, 8],
            _ => vec![2, 2, 2],
        });
        assert_eq!(shaped.faces, vec![0, 1, 0]);
        assert_eq!(shaped.glyphs, vec![5, 8, 7]);
    }

    #[test]
    fn unresolvable_position_gets_replacement_in_face_zero() {
        let shaped = resolve(2, REPLACEMENT, |i| match i {
            0 => vec![5, 0],
            _ => vec![4, 0],
        });
        assert_eq!(shaped.faces, vec![0, 0]);
        assert_eq!(shaped.glyphs, vec![5, REPLACEMENT]);
    }

    #[test]
    fn stops_after_first_face_when_fully_assigned() {
        let mut calls = 0;
        let shaped = resolve(3, REPLACEMENT, |_| {
            calls += 1;
            vec![1, 2]
        });
        assert_eq!(calls, 1);
        assert_eq!(shaped.len(), 2);
    }

    #[test]
    fn stops_as_soon_as_no_position_is_open() {
        let mut calls = 0;
        let shaped = resolve(4, REPLACEMENT, |i| {
            calls += 1;
            match i {
                0 => vec![0, 2],
                _ => vec![3, 3],
            }
        });
        assert_eq!(calls, 2);
        assert_eq!(shaped.faces, vec![1, 0]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let shape = |i: usize| match i {
            0 => vec![5, 0, 7],
            _ => vec![9, 9, 9],
        };
        assert_eq!(
            resolve(2, REPLACEMENT, shape),
            resolve(2, REPLACEMENT, shape),
        );
    }

    #[test]
    fn empty_line_resolves_to_empty_assignment() {
        let shaped = resolve(2, REPLACEMENT, |_| Vec::new());
        assert!(shaped.is_empty());
    }

    #[test]
    #[should_panic(expected = "different number of glyphs")]
    fn diverging_run_lengths_abort() {
        resolve(2, REPLACEMENT, |i| match i {
            0 => vec![0, 5],
            _ => vec![1, 2, 3],
        });
    }

    // Engine-backed tests; skipped when no system font is installed.

    #[test]
    fn shapes_ascii_with_a_real_face() {
        let Some(path) = discovery::any_monospace() else { return };
        let Ok(fc) = FaceCollection::load(&[path], 17.0) else { return };

        let shaped = shape_line("Hello", &fc);
        assert!(!shaped.is_empty());
        assert!(shaped.faces.iter().all(|&f| f == 0));
        assert!(shaped.glyphs.iter().all(|&g| g != 0));
    }

    #[test]
    fn real_face_resolution_is_idempotent() {
        let Some(path) = discovery::any_monospace() else { return };
        let Ok(fc) = FaceCollection::load(&[path], 17.0) else { return };

        let a = shape_line("fn main() { println!(\"hi\"); }", &fc);
        let b = shape_line("fn main() { println!(\"hi\"); }", &fc);
        assert_eq!(a, b);
    }
}
