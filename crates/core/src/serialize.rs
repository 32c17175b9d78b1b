//! Binary (de)serialization of an `IrModule` (spec.md §6).
//!
//! Hand-rolled rather than `serde`/`bincode`-derived: the spec pins an
//! exact byte layout (magic, version, length-prefixed names/strings,
//! `op:u16, imm:u64` instruction pairs) that must round-trip
//! byte-for-byte (spec.md §8 property 6), which a derive macro does
//! not guarantee to stay stable across dependency upgrades.

use crate::ir::{
    FieldCategory, IrFunction, IrInstruction, IrModule, IrOpcode, IrStructField, IrStructLayout,
    PaddingKind, Visibility,
};

const MAGIC: &[u8; 4] = b"PRIR";
const FORMAT_VERSION: u32 = 1;

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Writer { buf: Vec::new() }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn string(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        let end = self.pos.checked_add(n).ok_or_else(|| "ir deserialize: offset overflow".to_string())?;
        if end > self.buf.len() {
            return Err("ir deserialize: unexpected end of buffer".to_string());
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, String> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32, String> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, String> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String, String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| format!("ir deserialize: invalid utf8 string: {e}"))
    }
}

fn padding_kind_code(kind: PaddingKind) -> u8 {
    match kind {
        PaddingKind::None => 0,
        PaddingKind::Implicit => 1,
        PaddingKind::Explicit => 2,
    }
}

fn padding_kind_from_code(code: u8) -> Result<PaddingKind, String> {
    match code {
        0 => Ok(PaddingKind::None),
        1 => Ok(PaddingKind::Implicit),
        2 => Ok(PaddingKind::Explicit),
        other => Err(format!("ir deserialize: unknown padding kind code {other}")),
    }
}

fn category_code(cat: FieldCategory) -> u8 {
    match cat {
        FieldCategory::Plain => 0,
        FieldCategory::Handle => 1,
        FieldCategory::GpuLane => 2,
    }
}

fn category_from_code(code: u8) -> Result<FieldCategory, String> {
    match code {
        0 => Ok(FieldCategory::Plain),
        1 => Ok(FieldCategory::Handle),
        2 => Ok(FieldCategory::GpuLane),
        other => Err(format!("ir deserialize: unknown field category code {other}")),
    }
}

fn visibility_code(v: Visibility) -> u8 {
    match v {
        Visibility::Public => 0,
        Visibility::Private => 1,
        Visibility::Package => 2,
    }
}

fn visibility_from_code(code: u8) -> Result<Visibility, String> {
    match code {
        0 => Ok(Visibility::Public),
        1 => Ok(Visibility::Private),
        2 => Ok(Visibility::Package),
        other => Err(format!("ir deserialize: unknown visibility code {other}")),
    }
}

/// Serialize an `IrModule` to the binary wire format described in
/// spec.md §6.
pub fn serialize(module: &IrModule) -> Vec<u8> {
    let mut w = Writer::new();
    w.buf.extend_from_slice(MAGIC);
    w.u32(FORMAT_VERSION);
    w.u32(module.entry_index);

    w.u32(module.functions.len() as u32);
    for function in &module.functions {
        w.string(&function.name);
        w.u32(function.local_count);
        w.u32(function.instructions.len() as u32);
        for inst in &function.instructions {
            w.u16(inst.op as u16);
            w.u64(inst.imm);
        }
    }

    w.u32(module.string_table.len() as u32);
    for s in &module.string_table {
        w.string(s);
    }

    w.u32(module.struct_layouts.len() as u32);
    for layout in &module.struct_layouts {
        w.string(&layout.name);
        w.u32(layout.alignment_bytes);
        w.u32(layout.total_size_bytes);
        w.u32(layout.fields.len() as u32);
        for field in &layout.fields {
            w.string(&field.name);
            w.string(&field.envelope);
            w.u32(field.offset_bytes);
            w.u32(field.size_bytes);
            w.u32(field.alignment_bytes);
            w.u8(padding_kind_code(field.padding_kind));
            w.u8(category_code(field.category));
            w.u8(visibility_code(field.visibility));
            w.u8(field.is_static as u8);
        }
    }

    w.buf
}

/// Deserialize an `IrModule` previously produced by `serialize`.
/// Round-trips byte-for-byte (spec.md §8 property 6).
pub fn deserialize(bytes: &[u8]) -> Result<IrModule, String> {
    let mut r = Reader::new(bytes);
    let magic = r.take(4)?;
    if magic != MAGIC {
        return Err("ir deserialize: bad magic, not a Prime IR module".to_string());
    }
    let version = r.u32()?;
    if version != FORMAT_VERSION {
        return Err(format!(
            "ir deserialize: unsupported format version {version}, expected {FORMAT_VERSION}"
        ));
    }
    let entry_index = r.u32()?;

    let function_count = r.u32()?;
    let mut functions = Vec::with_capacity(function_count as usize);
    for _ in 0..function_count {
        let name = r.string()?;
        let local_count = r.u32()?;
        let instruction_count = r.u32()?;
        let mut instructions = Vec::with_capacity(instruction_count as usize);
        for _ in 0..instruction_count {
            let raw_op = r.u16()?;
            let imm = r.u64()?;
            let op = IrOpcode::from_u16(raw_op)
                .ok_or_else(|| format!("ir deserialize: unknown opcode {raw_op}"))?;
            instructions.push(IrInstruction::new(op, imm));
        }
        functions.push(IrFunction { name, instructions, local_count });
    }

    let string_count = r.u32()?;
    let mut string_table = Vec::with_capacity(string_count as usize);
    for _ in 0..string_count {
        string_table.push(r.string()?);
    }

    let layout_count = r.u32()?;
    let mut struct_layouts = Vec::with_capacity(layout_count as usize);
    for _ in 0..layout_count {
        let name = r.string()?;
        let alignment_bytes = r.u32()?;
        let total_size_bytes = r.u32()?;
        let field_count = r.u32()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let field_name = r.string()?;
            let envelope = r.string()?;
            let offset_bytes = r.u32()?;
            let size_bytes = r.u32()?;
            let field_alignment = r.u32()?;
            let padding_kind = padding_kind_from_code(r.u8()?)?;
            let category = category_from_code(r.u8()?)?;
            let visibility = visibility_from_code(r.u8()?)?;
            let is_static = r.u8()? != 0;
            fields.push(IrStructField {
                name: field_name,
                envelope,
                offset_bytes,
                size_bytes,
                alignment_bytes: field_alignment,
                padding_kind,
                category,
                visibility,
                is_static,
            });
        }
        struct_layouts.push(IrStructLayout { name, alignment_bytes, total_size_bytes, fields });
    }

    Ok(IrModule { functions, string_table, struct_layouts, entry_index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrOpcode;

    fn sample_module() -> IrModule {
        IrModule {
            functions: vec![IrFunction {
                name: "main".to_string(),
                instructions: vec![
                    IrInstruction::new(IrOpcode::PushImmI32, 3),
                    IrInstruction::new(IrOpcode::ReturnI32, 0),
                ],
                local_count: 0,
            }],
            string_table: vec!["hello\n".to_string()],
            struct_layouts: vec![IrStructLayout {
                name: "Point".to_string(),
                alignment_bytes: 4,
                total_size_bytes: 8,
                fields: vec![IrStructField {
                    name: "x".to_string(),
                    envelope: "i32".to_string(),
                    offset_bytes: 0,
                    size_bytes: 4,
                    alignment_bytes: 4,
                    padding_kind: PaddingKind::None,
                    category: FieldCategory::Plain,
                    visibility: Visibility::Public,
                    is_static: false,
                }],
            }],
            entry_index: 0,
        }
    }

    #[test]
    fn round_trips_byte_exact() {
        let module = sample_module();
        let bytes = serialize(&module);
        let back = deserialize(&bytes).expect("deserialize should succeed");
        assert_eq!(module, back);
        assert_eq!(bytes, serialize(&back));
    }

    #[test]
    fn rejects_bad_magic() {
        let err = deserialize(b"xxxx0000").unwrap_err();
        assert!(err.contains("bad magic"));
    }

    #[test]
    fn rejects_unknown_opcode() {
        let mut bytes = serialize(&sample_module());
        // Corrupt the first instruction's opcode (first u16 after the 4-byte
        // name-length/"main" prefix of function 0) to a value with no mapping.
        let needle = 9999u16.to_le_bytes();
        // Find the ReturnI32 opcode bytes and replace with an invalid code instead,
        // to avoid depending on exact offsets.
        let target = (IrOpcode::ReturnI32 as u16).to_le_bytes();
        if let Some(pos) = bytes.windows(2).position(|w| w == target) {
            bytes[pos] = needle[0];
            bytes[pos + 1] = needle[1];
        }
        let err = deserialize(&bytes).unwrap_err();
        assert!(err.contains("unknown opcode"));
    }
}
