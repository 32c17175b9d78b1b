//! The typed stack-machine IR produced by the lowerer (spec.md §3, §4.6).
//!
//! `IrModule` contains exactly one `IrFunction` (spec.md §4.6:
//! "inline-everything" — every non-entry definition call is expanded
//! at lowering time rather than kept as a callable), plus the interned
//! string table and serialized struct layouts it references.

use crate::types::NumKind;

/// Low bit of a print instruction's immediate: emit a trailing `\n`.
pub const PRINT_FLAG_NEWLINE: u64 = 1 << 0;
/// Second-lowest bit: write to stderr instead of stdout.
pub const PRINT_FLAG_STDERR: u64 = 1 << 1;

pub fn encode_print_flags(newline: bool, stderr: bool) -> u64 {
    (if newline { PRINT_FLAG_NEWLINE } else { 0 }) | (if stderr { PRINT_FLAG_STDERR } else { 0 })
}

pub fn decode_print_flags(imm: u64) -> (bool, bool) {
    (imm & PRINT_FLAG_NEWLINE != 0, imm & PRINT_FLAG_STDERR != 0)
}

/// Pack a string-table index and print flags into one immediate, per
/// spec.md §4.6 ("flags occupy low bits, table index the upper 32").
pub fn encode_string_print(table_index: u32, newline: bool, stderr: bool) -> u64 {
    ((table_index as u64) << 32) | encode_print_flags(newline, stderr)
}

pub fn decode_string_print(imm: u64) -> (u32, bool, bool) {
    let (newline, stderr) = decode_print_flags(imm);
    ((imm >> 32) as u32, newline, stderr)
}

/// The stack-machine opcode set. Each numeric family (`Add`, `Sub`,
/// comparisons, conversions) is spelled out per concrete `NumKind`
/// rather than parameterized, matching the concrete opcode names
/// spec.md §3 calls out by name (`AddI32`, `AddI64`, `AddF32`,
/// `AddF64`, ...) and keeping the binary encoding a flat `u16`.
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum IrOpcode {
    Nop = 0,

    PushImmI32 = 1,
    PushImmI64 = 2,
    PushImmU64 = 3,
    PushImmF32 = 4,
    PushImmF64 = 5,
    PushImmBool = 6,
    PushArgc = 7,

    LoadLocal = 10,
    StoreLocal = 11,
    AddressOfLocal = 12,
    LoadIndirect = 13,
    StoreIndirect = 14,

    AddI32 = 20,
    AddI64 = 21,
    AddU64 = 22,
    AddF32 = 23,
    AddF64 = 24,
    SubI32 = 25,
    SubI64 = 26,
    SubU64 = 27,
    SubF32 = 28,
    SubF64 = 29,
    MulI32 = 30,
    MulI64 = 31,
    MulU64 = 32,
    MulF32 = 33,
    MulF64 = 34,
    DivI32 = 35,
    DivI64 = 36,
    DivU64 = 37,
    DivF32 = 38,
    DivF64 = 39,

    PtrAdd = 40,
    PtrSub = 41,

    EqI32 = 50,
    EqI64 = 51,
    EqU64 = 52,
    EqF32 = 53,
    EqF64 = 54,
    EqBool = 55,
    NeI32 = 56,
    NeI64 = 57,
    NeU64 = 58,
    NeF32 = 59,
    NeF64 = 60,
    NeBool = 61,
    LtI32 = 62,
    LtI64 = 63,
    LtU64 = 64,
    LtF32 = 65,
    LtF64 = 66,
    LeI32 = 67,
    LeI64 = 68,
    LeU64 = 69,
    LeF32 = 70,
    LeF64 = 71,
    GtI32 = 72,
    GtI64 = 73,
    GtU64 = 74,
    GtF32 = 75,
    GtF64 = 76,
    GeI32 = 77,
    GeI64 = 78,
    GeU64 = 79,
    GeF32 = 80,
    GeF64 = 81,

    BoolAnd = 90,
    BoolOr = 91,
    BoolNot = 92,

    AtArray = 100,
    AtVector = 101,
    AtString = 102,
    AtMap = 103,
    Count = 104,
    Capacity = 105,
    VecPush = 106,
    VecPop = 107,
    VecReserve = 108,
    VecClear = 109,
    VecRemoveAt = 110,
    VecRemoveSwap = 111,

    Jump = 120,
    JumpIfZero = 121,

    ReturnI32 = 130,
    ReturnI64 = 131,
    ReturnU64 = 132,
    ReturnF32 = 133,
    ReturnF64 = 134,
    ReturnVoid = 135,

    ConvI32ToI64 = 140,
    ConvI32ToU64 = 141,
    ConvI32ToF32 = 142,
    ConvI32ToF64 = 143,
    ConvI64ToI32 = 144,
    ConvI64ToU64 = 145,
    ConvI64ToF32 = 146,
    ConvI64ToF64 = 147,
    ConvU64ToI32 = 148,
    ConvU64ToI64 = 149,
    ConvU64ToF32 = 150,
    ConvU64ToF64 = 151,
    ConvF32ToF64 = 152,
    ConvF32ToI32 = 153,
    ConvF32ToI64 = 154,
    ConvF32ToU64 = 155,
    ConvF64ToF32 = 156,
    ConvF64ToI32 = 157,
    ConvF64ToI64 = 158,
    ConvF64ToU64 = 159,

    PrintString = 170,
    PrintArgv = 171,
    PrintArgvUnsafe = 172,
    PrintInt = 173,
    PrintUnsigned = 174,
    PrintBool = 175,

    Notify = 180,
    Insert = 181,
    Take = 182,

    PowInt = 190,
    PowFloat = 191,
}

impl IrOpcode {
    pub fn from_u16(raw: u16) -> Option<Self> {
        use IrOpcode::*;
        let op = match raw {
            0 => Nop,
            1 => PushImmI32,
            2 => PushImmI64,
            3 => PushImmU64,
            4 => PushImmF32,
            5 => PushImmF64,
            6 => PushImmBool,
            7 => PushArgc,
            10 => LoadLocal,
            11 => StoreLocal,
            12 => AddressOfLocal,
            13 => LoadIndirect,
            14 => StoreIndirect,
            20 => AddI32,
            21 => AddI64,
            22 => AddU64,
            23 => AddF32,
            24 => AddF64,
            25 => SubI32,
            26 => SubI64,
            27 => SubU64,
            28 => SubF32,
            29 => SubF64,
            30 => MulI32,
            31 => MulI64,
            32 => MulU64,
            33 => MulF32,
            34 => MulF64,
            35 => DivI32,
            36 => DivI64,
            37 => DivU64,
            38 => DivF32,
            39 => DivF64,
            40 => PtrAdd,
            41 => PtrSub,
            50 => EqI32,
            51 => EqI64,
            52 => EqU64,
            53 => EqF32,
            54 => EqF64,
            55 => EqBool,
            56 => NeI32,
            57 => NeI64,
            58 => NeU64,
            59 => NeF32,
            60 => NeF64,
            61 => NeBool,
            62 => LtI32,
            63 => LtI64,
            64 => LtU64,
            65 => LtF32,
            66 => LtF64,
            67 => LeI32,
            68 => LeI64,
            69 => LeU64,
            70 => LeF32,
            71 => LeF64,
            72 => GtI32,
            73 => GtI64,
            74 => GtU64,
            75 => GtF32,
            76 => GtF64,
            77 => GeI32,
            78 => GeI64,
            79 => GeU64,
            80 => GeF32,
            81 => GeF64,
            90 => BoolAnd,
            91 => BoolOr,
            92 => BoolNot,
            100 => AtArray,
            101 => AtVector,
            102 => AtString,
            103 => AtMap,
            104 => Count,
            105 => Capacity,
            106 => VecPush,
            107 => VecPop,
            108 => VecReserve,
            109 => VecClear,
            110 => VecRemoveAt,
            111 => VecRemoveSwap,
            120 => Jump,
            121 => JumpIfZero,
            130 => ReturnI32,
            131 => ReturnI64,
            132 => ReturnU64,
            133 => ReturnF32,
            134 => ReturnF64,
            135 => ReturnVoid,
            140 => ConvI32ToI64,
            141 => ConvI32ToU64,
            142 => ConvI32ToF32,
            143 => ConvI32ToF64,
            144 => ConvI64ToI32,
            145 => ConvI64ToU64,
            146 => ConvI64ToF32,
            147 => ConvI64ToF64,
            148 => ConvU64ToI32,
            149 => ConvU64ToI64,
            150 => ConvU64ToF32,
            151 => ConvU64ToF64,
            152 => ConvF32ToF64,
            153 => ConvF32ToI32,
            154 => ConvF32ToI64,
            155 => ConvF32ToU64,
            156 => ConvF64ToF32,
            157 => ConvF64ToI32,
            158 => ConvF64ToI64,
            159 => ConvF64ToU64,
            170 => PrintString,
            171 => PrintArgv,
            172 => PrintArgvUnsafe,
            173 => PrintInt,
            174 => PrintUnsigned,
            175 => PrintBool,
            180 => Notify,
            181 => Insert,
            182 => Take,
            190 => PowInt,
            191 => PowFloat,
            _ => return None,
        };
        Some(op)
    }
}

/// One instruction: opcode plus a 64-bit immediate (spec.md §3).
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrInstruction {
    pub op: IrOpcode,
    pub imm: u64,
}

impl IrInstruction {
    pub fn new(op: IrOpcode, imm: u64) -> Self {
        IrInstruction { op, imm }
    }

    pub fn bare(op: IrOpcode) -> Self {
        IrInstruction { op, imm: 0 }
    }
}

/// Returns the arithmetic/comparison opcode family member for a given
/// `NumKind`, or `None` when the family has no member for that kind
/// (e.g. boolean `Add`).
pub fn arith_opcode(base: ArithOp, kind: NumKind) -> Option<IrOpcode> {
    use IrOpcode::*;
    use NumKind::*;
    Some(match (base, kind) {
        (ArithOp::Add, I32) => AddI32,
        (ArithOp::Add, I64) => AddI64,
        (ArithOp::Add, U64) => AddU64,
        (ArithOp::Add, F32) => AddF32,
        (ArithOp::Add, F64) => AddF64,
        (ArithOp::Sub, I32) => SubI32,
        (ArithOp::Sub, I64) => SubI64,
        (ArithOp::Sub, U64) => SubU64,
        (ArithOp::Sub, F32) => SubF32,
        (ArithOp::Sub, F64) => SubF64,
        (ArithOp::Mul, I32) => MulI32,
        (ArithOp::Mul, I64) => MulI64,
        (ArithOp::Mul, U64) => MulU64,
        (ArithOp::Mul, F32) => MulF32,
        (ArithOp::Mul, F64) => MulF64,
        (ArithOp::Div, I32) => DivI32,
        (ArithOp::Div, I64) => DivI64,
        (ArithOp::Div, U64) => DivU64,
        (ArithOp::Div, F32) => DivF32,
        (ArithOp::Div, F64) => DivF64,
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

pub fn cmp_opcode(base: CmpOp, kind: NumKind) -> Option<IrOpcode> {
    use IrOpcode::*;
    use NumKind::*;
    Some(match (base, kind) {
        (CmpOp::Eq, I32) => EqI32,
        (CmpOp::Eq, I64) => EqI64,
        (CmpOp::Eq, U64) => EqU64,
        (CmpOp::Eq, F32) => EqF32,
        (CmpOp::Eq, F64) => EqF64,
        (CmpOp::Eq, Bool) => EqBool,
        (CmpOp::Ne, I32) => NeI32,
        (CmpOp::Ne, I64) => NeI64,
        (CmpOp::Ne, U64) => NeU64,
        (CmpOp::Ne, F32) => NeF32,
        (CmpOp::Ne, F64) => NeF64,
        (CmpOp::Ne, Bool) => NeBool,
        (CmpOp::Lt, I32) => LtI32,
        (CmpOp::Lt, I64) => LtI64,
        (CmpOp::Lt, U64) => LtU64,
        (CmpOp::Lt, F32) => LtF32,
        (CmpOp::Lt, F64) => LtF64,
        (CmpOp::Le, I32) => LeI32,
        (CmpOp::Le, I64) => LeI64,
        (CmpOp::Le, U64) => LeU64,
        (CmpOp::Le, F32) => LeF32,
        (CmpOp::Le, F64) => LeF64,
        (CmpOp::Gt, I32) => GtI32,
        (CmpOp::Gt, I64) => GtI64,
        (CmpOp::Gt, U64) => GtU64,
        (CmpOp::Gt, F32) => GtF32,
        (CmpOp::Gt, F64) => GtF64,
        (CmpOp::Ge, I32) => GeI32,
        (CmpOp::Ge, I64) => GeI64,
        (CmpOp::Ge, U64) => GeU64,
        (CmpOp::Ge, F32) => GeF32,
        (CmpOp::Ge, F64) => GeF64,
        _ => return None,
    })
}

pub fn conv_opcode(from: NumKind, to: NumKind) -> Option<IrOpcode> {
    use IrOpcode::*;
    use NumKind::*;
    Some(match (from, to) {
        (I32, I64) => ConvI32ToI64,
        (I32, U64) => ConvI32ToU64,
        (I32, F32) => ConvI32ToF32,
        (I32, F64) => ConvI32ToF64,
        (I64, I32) => ConvI64ToI32,
        (I64, U64) => ConvI64ToU64,
        (I64, F32) => ConvI64ToF32,
        (I64, F64) => ConvI64ToF64,
        (U64, I32) => ConvU64ToI32,
        (U64, I64) => ConvU64ToI64,
        (U64, F32) => ConvU64ToF32,
        (U64, F64) => ConvU64ToF64,
        (F32, F64) => ConvF32ToF64,
        (F32, I32) => ConvF32ToI32,
        (F32, I64) => ConvF32ToI64,
        (F32, U64) => ConvF32ToU64,
        (F64, F32) => ConvF64ToF32,
        (F64, I32) => ConvF64ToI32,
        (F64, I64) => ConvF64ToI64,
        (F64, U64) => ConvF64ToU64,
        _ => return None,
    })
}

pub fn return_opcode(kind: NumKind) -> IrOpcode {
    match kind {
        NumKind::I32 => IrOpcode::ReturnI32,
        NumKind::I64 => IrOpcode::ReturnI64,
        NumKind::U64 => IrOpcode::ReturnU64,
        NumKind::F32 => IrOpcode::ReturnF32,
        NumKind::F64 => IrOpcode::ReturnF64,
        NumKind::Bool => IrOpcode::ReturnI32,
    }
}

/// One lowered function. Only the entry definition becomes an
/// `IrFunction` — every other call is inlined (spec.md §4.6).
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub instructions: Vec<IrInstruction>,
    pub local_count: u32,
}

/// Visibility of a struct field (spec.md §3).
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
    Package,
}

/// Whether a field's alignment padding was implicit (inserted by the
/// layout algorithm) or explicit (the field itself declared
/// `align_bytes`/`align_kbytes`), or there was none to insert.
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingKind {
    None,
    Implicit,
    Explicit,
}

/// The struct-family tag category a field carries, constraining which
/// other tags it may combine with (spec.md §4.5: `pod` rejects
/// `handle`/`gpu_lane`; `handle` and `gpu_lane` are mutually exclusive).
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCategory {
    Plain,
    Handle,
    GpuLane,
}

#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrStructField {
    pub name: String,
    /// The field's resolved type, rendered for the serializer/emitters
    /// (e.g. `"i32"`, `"Pointer<Vec3>"`).
    pub envelope: String,
    pub offset_bytes: u32,
    pub size_bytes: u32,
    pub alignment_bytes: u32,
    pub padding_kind: PaddingKind,
    pub category: FieldCategory,
    pub visibility: Visibility,
    pub is_static: bool,
}

#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct IrStructLayout {
    pub name: String,
    pub alignment_bytes: u32,
    pub total_size_bytes: u32,
    pub fields: Vec<IrStructField>,
}

/// The immutable compiled module (spec.md §3 "IrModule").
#[cfg_attr(feature = "serde-dump", derive(serde::Serialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IrModule {
    pub functions: Vec<IrFunction>,
    pub string_table: Vec<String>,
    pub struct_layouts: Vec<IrStructLayout>,
    pub entry_index: u32,
}

impl IrModule {
    pub fn entry(&self) -> Option<&IrFunction> {
        self.functions.get(self.entry_index as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_flag_round_trip() {
        let imm = encode_string_print(7, true, false);
        let (idx, newline, stderr) = decode_string_print(imm);
        assert_eq!(idx, 7);
        assert!(newline);
        assert!(!stderr);
    }

    #[test]
    fn opcode_numeric_round_trip() {
        for raw in 0u16..=200 {
            if let Some(op) = IrOpcode::from_u16(raw) {
                assert_eq!(op as u16, raw);
            }
        }
    }

    #[test]
    fn arith_opcode_family_covers_all_numeric_kinds() {
        for kind in [NumKind::I32, NumKind::I64, NumKind::U64, NumKind::F32, NumKind::F64] {
            assert!(arith_opcode(ArithOp::Add, kind).is_some());
        }
        assert!(arith_opcode(ArithOp::Add, NumKind::Bool).is_none());
    }
}
