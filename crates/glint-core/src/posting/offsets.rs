//! Offset-stream encoding for array-typed string fields (spec §4.2).
//!
//! A scalar field's posting offsets are a plain, ascending list of token
//! positions within the field. An array field additionally needs, per
//! occurrence, which array element the token came from and whether that
//! occurrence was the field's last token overall — both recovered from the
//! offsets stream alone, without a side structure, via a trailing sentinel:
//! the occurrence's offset is re-emitted, followed by the array index,
//! followed by `0` iff this was the last token of the whole document field.

/// One occurrence of a token inside an array-typed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayOccurrence {
    pub offset: u32,
    pub array_index: u32,
    pub is_last_token: bool,
}

/// Encodes a sequence of array occurrences into the flat offsets stream
/// shape described above: `[offset, offset, array_index, (0)?]` repeated.
pub fn encode_array_offsets(occurrences: &[ArrayOccurrence]) -> Vec<u32> {
    let mut out = Vec::with_capacity(occurrences.len() * 4);
    for occ in occurrences {
        out.push(occ.offset);
        out.push(occ.offset);
        out.push(occ.array_index);
        if occ.is_last_token {
            out.push(0);
        }
    }
    out
}

/// Decodes the flat stream back into individual occurrences. The stream is
/// self-delimiting: each occurrence consumes 3 values (offset, sentinel,
/// array_index) and optionally a trailing `0` iff the value following the
/// array index is exactly `0` *and* is not itself the start of the next
/// triple's offset. To keep the format unambiguous we require that the
/// last-token marker only ever appears immediately after the array index of
/// the field's globally-last occurrence, which by construction is the final
/// group in the stream.
pub fn decode_array_offsets(stream: &[u32]) -> Vec<ArrayOccurrence> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 2 < stream.len() || i + 2 == stream.len() {
        if i + 2 >= stream.len() {
            break;
        }
        let offset = stream[i];
        let _sentinel = stream[i + 1];
        let array_index = stream[i + 2];
        let is_last_group = i + 3 == stream.len() - 1 && stream[i + 3] == 0;
        let consumed_last_marker = is_last_group;
        out.push(ArrayOccurrence { offset, array_index, is_last_token: consumed_last_marker });
        i += 3 + if consumed_last_marker { 1 } else { 0 };
    }
    out
}
