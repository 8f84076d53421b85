//! Translation of positions between generated and original documents
//!
//! Positions follow the LSP default encoding: `character` counts UTF-16 code units.
//! Offsets are UTF-16 offsets from the start of the text, which is also how the
//! character-index tables of embedded documents are expressed.

use tower_lsp::lsp_types::{Position, Range};

use crate::types::CharacterIndexes;

/// UTF-16 offset of a position. Positions past the end of a line clamp to the line end,
/// positions past the last line clamp to the end of the text.
pub fn offset_at(text: &str, position: Position) -> usize {
    let mut offset = 0;
    for (line_number, line) in text.split_inclusive('\n').enumerate() {
        if line_number as u32 == position.line {
            let content = line.trim_end_matches(['\n', '\r']);
            let line_len: usize = content.chars().map(char::len_utf16).sum();
            return offset + line_len.min(position.character as usize);
        }
        offset += line.chars().map(char::len_utf16).sum::<usize>();
    }
    offset
}

/// Position of a UTF-16 offset, clamped to the end of the text
pub fn position_at(text: &str, offset: usize) -> Position {
    let mut line = 0;
    let mut character = 0;
    let mut consumed = 0;
    for c in text.chars() {
        if consumed >= offset {
            break;
        }
        consumed += c.len_utf16();
        if c == '\n' {
            line += 1;
            character = 0;
        } else {
            character += c.len_utf16() as u32;
        }
    }
    Position::new(line, character)
}

/// Byte index of a position, for slicing
pub fn byte_index_at(text: &str, position: Position) -> usize {
    let target = offset_at(text, position);
    let mut utf16 = 0;
    for (byte, c) in text.char_indices() {
        if utf16 >= target {
            return byte;
        }
        utf16 += c.len_utf16();
    }
    text.len()
}

/// Text covered by a range
pub fn text_in_range(text: &str, range: Range) -> &str {
    let start = byte_index_at(text, range.start);
    let end = byte_index_at(text, range.end).max(start);
    &text[start..end]
}

/// Move a position by a number of UTF-16 units along the text
pub fn advance(text: &str, position: Position, units: usize) -> Position {
    position_at(text, offset_at(text, position) + units)
}

fn original_position(
    original: &str,
    generated: &str,
    indexes: &CharacterIndexes,
    position: Position,
) -> Option<Position> {
    let original_offset = indexes.get(offset_at(generated, position))?;
    Some(position_at(original, original_offset))
}

/// Map a range of the generated document back onto the original document.
///
/// The end of a non-empty range is exclusive, so it is mapped through the last character
/// the range covers. Returns `None` when either end lands on a synthetic character.
pub fn original_doc_range(
    original: &str,
    generated: &str,
    indexes: &CharacterIndexes,
    range: Range,
) -> Option<Range> {
    let start = original_position(original, generated, indexes, range.start)?;
    let start_offset = offset_at(generated, range.start);
    let end_offset = offset_at(generated, range.end);
    if end_offset <= start_offset {
        return Some(Range::new(start, start));
    }
    let last = indexes.get(end_offset - 1)?;
    let end = position_at(original, last + 1);
    Some(Range::new(start, end))
}
