//! Prime Core: shared AST, type system, and IR data model.
//!
//! This crate holds the data that every stage of the Prime toolchain
//! passes downstream — the uniform `Expr` tree (`ast`), the type and
//! effect vocabulary (`types`), the typed stack-machine IR (`ir`), and
//! its binary wire format (`serialize`). It contains no parsing,
//! validation, lowering, or execution logic; those live in
//! `prime-compiler`, `prime-vm`, and the backend crates.
//!
//! # Modules
//!
//! - `ast`: `Expr`, `Program`, `Definition`, `Execution`, `Transform`.
//! - `types`: `Type`, `NumKind`, the effect-name vocabulary.
//! - `ir`: `IrModule`, `IrFunction`, `IrInstruction`, `IrOpcode`,
//!   `IrStructLayout`.
//! - `serialize`: binary (de)serialization of `IrModule`.

pub mod ast;
pub mod ir;
pub mod serialize;
pub mod types;

pub use ast::{Definition, Execution, Expr, Phase, Program, Span, StringSuffix, Transform};
pub use ir::{IrFunction, IrInstruction, IrModule, IrOpcode, IrStructLayout};
pub use types::{NumKind, Type};
